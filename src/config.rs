use crate::workload::OpWeights;

pub const DEFAULT_KEYSPACE: u64 = 100_000;
pub const DEFAULT_HASH_KEYSPACE: u64 = 1_000;

/// Payload sizes are clamped to this ceiling.
pub const MAX_DATASIZE: u64 = 1024 * 1024;

/// Everything a run needs, validated up front and passed around
/// explicitly. There is no ambient process-wide state.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub host: String,
    pub port: u16,
    /// Target number of parallel connections.
    pub clients: usize,
    /// Total request budget for one pass.
    pub requests: u64,
    pub datasize_min: u64,
    pub datasize_max: u64,
    pub keyspace: u64,
    pub hash_keyspace: u64,
    pub weights: OpWeights,
    /// Reuse each connection for successive requests instead of
    /// reconnecting after every reply.
    pub keepalive: bool,
    /// Incompressible pseudo-random payloads.
    pub rand_payload: bool,
    /// Verify values read back against regenerated expected content.
    pub check: bool,
    pub longtail: bool,
    pub longtail_order: u32,
    pub seed: u64,
    pub quiet: bool,
    pub loop_forever: bool,
    /// Open the connections and issue nothing.
    pub idle: bool,
    /// Treat a nil reply on a checked read as a corruption finding.
    pub fail_on_missing: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            host: "127.0.0.1".to_string(),
            port: 6379,
            clients: 50,
            requests: 10_000,
            datasize_min: 1,
            datasize_max: 64,
            keyspace: DEFAULT_KEYSPACE,
            hash_keyspace: DEFAULT_HASH_KEYSPACE,
            weights: OpWeights::default(),
            keepalive: true,
            rand_payload: false,
            check: false,
            longtail: false,
            longtail_order: 6,
            seed: 0,
            quiet: false,
            loop_forever: false,
            idle: false,
            fail_on_missing: false,
        }
    }
}

impl RunConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Clamp everything to sane bounds before the run starts.
    pub fn sanitize(&mut self) {
        self.datasize_min = self.datasize_min.clamp(1, MAX_DATASIZE);
        self.datasize_max = self.datasize_max.clamp(1, MAX_DATASIZE);
        if self.datasize_max < self.datasize_min {
            self.datasize_max = self.datasize_min;
        }
        if self.keyspace < 1 {
            self.keyspace = DEFAULT_KEYSPACE;
        }
        if self.hash_keyspace < 1 {
            self.hash_keyspace = DEFAULT_HASH_KEYSPACE;
        }
        self.longtail_order = self.longtail_order.clamp(2, 100);
        // Integrity checking regenerates content from the key id, so
        // payloads have to be the deterministic pseudo-random kind.
        if self.check {
            self.rand_payload = true;
        }
    }
}
