//! Run controller: keeps the live-connection count at the target
//! concurrency, hands each connection its next request, records
//! latency and drives drain / teardown.
//!
//! Everything runs on one control thread. Connections are cooperative
//! tasks whose only suspension points are socket readiness; their
//! completions are consumed here on the same turn of the event loop,
//! so no run state is ever shared across concurrent mutators.

use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};

use log::debug;
use tokio::task::JoinSet;

use crate::check;
use crate::config::RunConfig;
use crate::connection::Connection;
use crate::error::ClientError;
use crate::protocol::Reply;
use crate::workload::{Op, OpKind, Workload};

/// Latency ceiling in milliseconds; slower requests land in the last
/// bucket.
pub const MAX_LATENCY_MS: u64 = 5000;

/// Fixed-width latency histogram, one bucket per millisecond.
#[derive(Debug)]
pub struct Histogram {
    buckets: Vec<u64>,
    total: u64,
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

impl Histogram {
    pub fn new() -> Self {
        Histogram { buckets: vec![0; (MAX_LATENCY_MS + 1) as usize], total: 0 }
    }

    pub fn record(&mut self, latency: Duration) {
        let ms = (latency.as_millis() as u64).min(MAX_LATENCY_MS);
        self.buckets[ms as usize] += 1;
        self.total += 1;
    }

    /// Total recorded samples, equal to the completed request count.
    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn buckets(&self) -> &[u64] {
        &self.buckets
    }
}

/// Outcome of one benchmark pass.
#[derive(Debug)]
pub struct RunReport {
    pub issued: u64,
    pub completed: u64,
    pub elapsed: Duration,
    pub histogram: Histogram,
}

impl RunReport {
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.completed as f64 / secs
        } else {
            0.0
        }
    }

    /// Cumulative latency distribution plus throughput, or a single
    /// summary line in quiet mode.
    pub fn print(&self, cfg: &RunConfig) {
        if cfg.quiet {
            println!("{:.2} requests per second", self.throughput());
            return;
        }
        println!("====== Report ======");
        println!(
            "  {} requests in {:.3} seconds",
            self.completed,
            self.elapsed.as_secs_f64()
        );
        println!("  {:.2} requests per second", self.throughput());
        println!("  {} parallel clients", cfg.clients);
        println!("  payload: {}..{} bytes", cfg.datasize_min, cfg.datasize_max);
        println!("  keep alive: {}", cfg.keepalive as u8);
        println!();
        let mut seen = 0u64;
        for (ms, &count) in self.histogram.buckets().iter().enumerate() {
            if count > 0 {
                seen += count;
                let perc = seen as f64 * 100.0 / self.completed as f64;
                println!("{:6.2}% < {} ms", perc, ms + 1);
            }
        }
    }
}

/// Per-pass mutable state, owned by the control loop.
struct RunContext {
    workload: Workload,
    histogram: Histogram,
    issued: u64,
    budget: u64,
    done: bool,
}

impl RunContext {
    fn new(cfg: &RunConfig) -> Self {
        RunContext {
            workload: Workload::new(cfg),
            histogram: Histogram::new(),
            issued: 0,
            budget: cfg.requests,
            done: false,
        }
    }

    /// Draw the next request, counting it against the budget.
    fn next_op(&mut self) -> Op {
        self.issued += 1;
        if self.issued >= self.budget {
            self.done = true;
        }
        self.workload.next_op()
    }
}

type Completion = (Connection, Op, Reply, Duration);

/// Issue one request on a fresh or recycled connection. The request
/// clock starts at the first write attempt, after the connect.
fn spawn_request(
    tasks: &mut JoinSet<Result<Completion, ClientError>>,
    op: Op,
    conn: Option<Connection>,
    addr: String,
) {
    tasks.spawn(async move {
        let mut conn = match conn {
            Some(mut conn) => {
                conn.recycle();
                conn
            }
            None => Connection::open(&addr).await?,
        };
        let start = Instant::now();
        let reply = conn.exchange(&op.wire).await?;
        Ok((conn, op, reply, start.elapsed()))
    });
}

/// Run passes until the shutdown future fires or, without loop mode,
/// after the first one. Idle mode just parks the connections.
pub async fn run(
    cfg: RunConfig,
    shutdown: impl Future<Output = ()>,
) -> Result<(), ClientError> {
    tokio::pin!(shutdown);
    if cfg.idle {
        return run_idle(&cfg, shutdown).await;
    }
    loop {
        let (report, interrupted) = run_pass(&cfg, shutdown.as_mut()).await?;
        report.print(&cfg);
        if interrupted || !cfg.loop_forever {
            return Ok(());
        }
    }
}

/// One pass against a fresh run context. Convenience for tests and
/// embedders that do not need cancellation.
pub async fn run_once(cfg: &RunConfig) -> Result<RunReport, ClientError> {
    let never = std::future::pending::<()>();
    tokio::pin!(never);
    run_pass(cfg, never).await.map(|(report, _)| report)
}

/// Drive one pass to completion or drain. Returns the report and
/// whether the shutdown future fired.
pub async fn run_pass<F>(
    cfg: &RunConfig,
    mut shutdown: Pin<&mut F>,
) -> Result<(RunReport, bool), ClientError>
where
    F: Future<Output = ()>,
{
    let addr = cfg.addr();
    let mut ctx = RunContext::new(cfg);
    let mut tasks: JoinSet<Result<Completion, ClientError>> = JoinSet::new();
    let mut draining = false;
    let start = Instant::now();

    while tasks.len() < cfg.clients && !ctx.done {
        let op = ctx.next_op();
        spawn_request(&mut tasks, op, None, addr.clone());
    }

    while !tasks.is_empty() {
        tokio::select! {
            Some(joined) = tasks.join_next() => {
                let completion = joined
                    .map_err(|e| ClientError::Protocol(format!("connection task failed: {}", e)))?;
                match completion {
                    Ok((conn, op, reply, latency)) => {
                        if let Reply::Error(msg) = &reply {
                            return Err(ClientError::Server(msg.clone()));
                        }
                        ctx.histogram.record(latency);
                        debug!("{:?} key {} completed in {:?}", op.kind, op.key, latency);
                        if cfg.check && op.kind == OpKind::Get {
                            check::verify_read(
                                op.key,
                                &reply,
                                cfg.datasize_min,
                                cfg.datasize_max,
                                cfg.fail_on_missing,
                            )?;
                        }
                        if ctx.done || draining {
                            drop(conn);
                        } else if cfg.keepalive {
                            let op = ctx.next_op();
                            spawn_request(&mut tasks, op, Some(conn), addr.clone());
                        } else {
                            drop(conn);
                            let op = ctx.next_op();
                            spawn_request(&mut tasks, op, None, addr.clone());
                        }
                    }
                    Err(e) if draining && e.is_disconnect() => {
                        debug!("connection dropped during drain: {}", e);
                    }
                    Err(e) => return Err(e),
                }
            }
            _ = &mut shutdown, if !draining => {
                draining = true;
                ctx.done = true;
                println!("Waiting for pending requests to complete...");
            }
        }
    }

    let report = RunReport {
        issued: ctx.issued,
        completed: ctx.histogram.total(),
        elapsed: start.elapsed(),
        histogram: ctx.histogram,
    };
    Ok((report, draining))
}

/// Idle mode: open the target number of connections, issue nothing,
/// hold them until cancellation.
async fn run_idle<F>(cfg: &RunConfig, shutdown: Pin<&mut F>) -> Result<(), ClientError>
where
    F: Future<Output = ()>,
{
    let addr = cfg.addr();
    let mut conns = Vec::with_capacity(cfg.clients);
    for _ in 0..cfg.clients {
        conns.push(Connection::open(&addr).await?);
    }
    println!(
        "Created {} idle connections, waiting (Ctrl+C when done)",
        conns.len()
    );
    shutdown.await;
    Ok(())
}
