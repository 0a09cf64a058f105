//! Turns the configured operation mix, key distribution and payload
//! policy into concrete wire requests.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::RunConfig;
use crate::protocol::Request;
use crate::rc4::Rc4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Idle,
    Get,
    Set,
    Del,
    Lpush,
    Lpop,
    Hset,
    Hget,
    Hgetall,
    SwapIn,
}

/// Percentage weights for each operation kind. Whatever is left to
/// reach 100 goes to GET.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpWeights {
    pub set: u32,
    pub del: u32,
    pub lpush: u32,
    pub lpop: u32,
    pub hset: u32,
    pub hget: u32,
    pub hgetall: u32,
    pub swapin: u32,
}

/// 100-slot weighted table. Picking an operation is one uniform draw
/// in [0,100), so the realized mix converges to the configured
/// percentages and replays exactly under a fixed seed.
pub struct OpTable {
    slots: [OpKind; 100],
}

impl OpTable {
    pub fn from_weights(weights: &OpWeights) -> Self {
        let mut slots = [OpKind::Get; 100];
        let mut next = 0usize;
        fill(&mut slots, &mut next, OpKind::Set, weights.set);
        fill(&mut slots, &mut next, OpKind::Del, weights.del);
        fill(&mut slots, &mut next, OpKind::Lpush, weights.lpush);
        fill(&mut slots, &mut next, OpKind::Lpop, weights.lpop);
        fill(&mut slots, &mut next, OpKind::Hset, weights.hset);
        fill(&mut slots, &mut next, OpKind::Hget, weights.hget);
        fill(&mut slots, &mut next, OpKind::Hgetall, weights.hgetall);
        fill(&mut slots, &mut next, OpKind::SwapIn, weights.swapin);
        OpTable { slots }
    }

    pub fn idle() -> Self {
        OpTable { slots: [OpKind::Idle; 100] }
    }

    pub fn pick(&self, rng: &mut StdRng) -> OpKind {
        self.slots[rng.gen_range(0..100)]
    }

    #[cfg(test)]
    fn slots(&self) -> &[OpKind; 100] {
        &self.slots
    }
}

fn fill(slots: &mut [OpKind; 100], next: &mut usize, op: OpKind, perc: u32) {
    for _ in 0..perc {
        if *next < slots.len() {
            slots[*next] = op;
            *next += 1;
        }
    }
}

/// How value payloads are synthesized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PayloadMode {
    /// Fixed filler byte, compressible.
    Fixed,
    /// Keystream bytes, incompressible; length still uniform.
    Random,
    /// Length and content both derived from the key id, so a read can
    /// be verified later without remembering what was written.
    Check,
}

/// One issued request, handed to a connection together with its
/// pre-encoded wire bytes.
#[derive(Debug)]
pub struct Op {
    pub kind: OpKind,
    pub key: u64,
    pub payload_len: usize,
    pub wire: Vec<u8>,
}

pub struct Workload {
    table: OpTable,
    rng: StdRng,
    rc4: Rc4,
    keyspace: u64,
    hash_keyspace: u64,
    longtail: Option<u32>,
    payload: PayloadMode,
    datasize_min: u64,
    datasize_max: u64,
}

impl Workload {
    pub fn new(cfg: &RunConfig) -> Self {
        let table = if cfg.idle {
            OpTable::idle()
        } else {
            OpTable::from_weights(&cfg.weights)
        };
        let payload = if cfg.check {
            PayloadMode::Check
        } else if cfg.rand_payload {
            PayloadMode::Random
        } else {
            PayloadMode::Fixed
        };
        Workload {
            table,
            rng: StdRng::seed_from_u64(cfg.seed),
            rc4: Rc4::new(cfg.seed),
            keyspace: cfg.keyspace,
            hash_keyspace: cfg.hash_keyspace,
            longtail: cfg.longtail.then_some(cfg.longtail_order),
            payload,
            datasize_min: cfg.datasize_min,
            datasize_max: cfg.datasize_max,
        }
    }

    /// Produce the next request: operation kind, key draw, hash-field
    /// draw and payload synthesis are one atomic step against the
    /// run-level random sequence.
    pub fn next_op(&mut self) -> Op {
        let kind = self.table.pick(&mut self.rng);
        let key = self.draw_key(self.keyspace);
        let hashkey = self.draw_key(self.hash_keyspace);

        let (wire, payload_len) = match kind {
            OpKind::Idle => (Vec::new(), 0),
            OpKind::Get => (
                Request::new("GET").arg(&format!("string:{}", key)).finish(),
                0,
            ),
            OpKind::Set => {
                let payload = self.synth_payload(key);
                let wire = Request::new("SET")
                    .arg(&format!("string:{}", key))
                    .blob(&payload)
                    .finish();
                (wire, payload.len())
            }
            OpKind::Del => (
                Request::new("DEL")
                    .arg(&format!("string:{}", key))
                    .arg(&format!("list:{}", key))
                    .arg(&format!("hash:{}", key))
                    .finish(),
                0,
            ),
            OpKind::Lpush => {
                let payload = self.synth_payload(key);
                let wire = Request::new("LPUSH")
                    .arg(&format!("list:{}", key))
                    .blob(&payload)
                    .finish();
                (wire, payload.len())
            }
            OpKind::Lpop => (
                Request::new("LPOP").arg(&format!("list:{}", key)).finish(),
                0,
            ),
            OpKind::Hset => {
                let payload = self.synth_payload(key);
                let wire = Request::new("HSET")
                    .arg(&format!("hash:{}", key))
                    .arg(&format!("key:{}", hashkey))
                    .blob(&payload)
                    .finish();
                (wire, payload.len())
            }
            OpKind::Hget => (
                Request::new("HGET")
                    .arg(&format!("hash:{}", key))
                    .arg(&format!("key:{}", hashkey))
                    .finish(),
                0,
            ),
            OpKind::Hgetall => (
                Request::new("HGETALL").arg(&format!("hash:{}", key)).finish(),
                0,
            ),
            OpKind::SwapIn => (
                Request::new("DEBUG")
                    .arg("SWAPIN")
                    .arg(&format!("string:{}", key))
                    .finish(),
                0,
            ),
        };

        Op { kind, key, payload_len, wire }
    }

    fn draw_key(&mut self, space: u64) -> u64 {
        match self.longtail {
            Some(order) => longtail_sample(&mut self.rng, 0, space - 1, order),
            None => self.rng.gen_range(0..space),
        }
    }

    fn synth_payload(&mut self, key: u64) -> Vec<u8> {
        match self.payload {
            PayloadMode::Check => {
                self.rc4.seed(key);
                let len = self.rc4.between(self.datasize_min, self.datasize_max) as usize;
                let mut buf = vec![0u8; len];
                self.rc4.fill(&mut buf);
                buf
            }
            PayloadMode::Random => {
                let len = self.rng.gen_range(self.datasize_min..=self.datasize_max) as usize;
                self.rc4.seed(key);
                let mut buf = vec![0u8; len];
                self.rc4.fill(&mut buf);
                buf
            }
            PayloadMode::Fixed => {
                let len = self.rng.gen_range(self.datasize_min..=self.datasize_max) as usize;
                vec![b'x'; len]
            }
        }
    }
}

/// Sample `[min, max]` skewed toward the low end through the
/// closed-form inverse of a power-law CDF. Higher `order` concentrates
/// more of the draws on fewer keys (order 6: the lowest 20% of the
/// range receives about 79% of the draws).
pub fn longtail_sample(rng: &mut StdRng, min: u64, max: u64, order: u32) -> u64 {
    let r: f64 = rng.gen();
    let exp = f64::from(order + 1);
    let low = min as f64;
    let high = (max + 1) as f64;
    let pl = ((high.powf(exp) - low.powf(exp)) * r + low.powf(exp)).powf(1.0 / exp);
    max - (pl as u64).min(max) + min
}
