use clap::Parser;
use tokio::sync::oneshot;

use redload::config::RunConfig;
use redload::runner;
use redload::workload::OpWeights;

/// Load generation and integrity checking client for RESP key-value
/// servers.
#[derive(Parser, Debug)]
#[command(name = "redload", version, about)]
struct Cli {
    /// Server hostname
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Server port
    #[arg(long, default_value_t = 6379)]
    port: u16,

    /// Number of parallel connections
    #[arg(long, default_value_t = 50)]
    clients: usize,

    /// Total number of requests
    #[arg(long, default_value_t = 10_000)]
    requests: u64,

    /// Min data size of string values in bytes
    #[arg(long = "mindatasize", default_value_t = 1)]
    datasize_min: u64,

    /// Max data size of string values in bytes
    #[arg(long = "maxdatasize", default_value_t = 64)]
    datasize_max: u64,

    /// Set both min and max data size to the same value
    #[arg(long)]
    datasize: Option<u64>,

    /// 1 = reuse connections, 0 = reconnect per request
    #[arg(long, default_value_t = 1)]
    keepalive: u8,

    /// The number of different keys to use
    #[arg(long, default_value_t = redload::config::DEFAULT_KEYSPACE)]
    keyspace: u64,

    /// The number of different hash fields to use
    #[arg(long = "hashkeyspace", default_value_t = redload::config::DEFAULT_HASH_KEYSPACE)]
    hash_keyspace: u64,

    /// Percentage of SETs
    #[arg(long, default_value_t = 50)]
    set: u32,

    /// Percentage of DELs
    #[arg(long, default_value_t = 0)]
    del: u32,

    /// Percentage of LPUSHs
    #[arg(long, default_value_t = 0)]
    lpush: u32,

    /// Percentage of LPOPs
    #[arg(long, default_value_t = 0)]
    lpop: u32,

    /// Percentage of HSETs
    #[arg(long, default_value_t = 0)]
    hset: u32,

    /// Percentage of HGETs
    #[arg(long, default_value_t = 0)]
    hget: u32,

    /// Percentage of HGETALLs
    #[arg(long, default_value_t = 0)]
    hgetall: u32,

    /// Percentage of DEBUG SWAPINs
    #[arg(long, default_value_t = 0)]
    swapin: u32,

    /// Use random (incompressible) data payloads
    #[arg(long)]
    rand: bool,

    /// Check integrity when reading data back (implies --rand)
    #[arg(long)]
    check: bool,

    /// Fail when a checked read finds no value at all
    #[arg(long = "fail-on-missing")]
    fail_on_missing: bool,

    /// Use a long-tail key access pattern
    #[arg(long)]
    longtail: bool,

    /// Long-tail order: 2 => 20% of keys get 49% of accesses,
    /// 6 => 79%, 10 => 91%, 20 => 99%
    #[arg(long = "longtailorder", default_value_t = 6)]
    longtail_order: u32,

    /// PRNG seed for a deterministic load
    #[arg(long)]
    seed: Option<u64>,

    /// Alias for --keyspace 1000000 --requests 1000000
    #[arg(long)]
    big: bool,

    /// Alias for --keyspace 10000000 --requests 10000000
    #[arg(long)]
    verybig: bool,

    /// Quiet mode, print only the throughput line
    #[arg(long)]
    quiet: bool,

    /// Run the benchmark forever
    #[arg(long = "loop")]
    loop_forever: bool,

    /// Just open the connections and wait
    #[arg(long)]
    idle: bool,

    /// More verbose diagnostics
    #[arg(long)]
    debug: bool,
}

impl Cli {
    fn into_config(self) -> RunConfig {
        let mut cfg = RunConfig {
            host: self.host,
            port: self.port,
            clients: self.clients,
            requests: self.requests,
            datasize_min: self.datasize.unwrap_or(self.datasize_min),
            datasize_max: self.datasize.unwrap_or(self.datasize_max),
            keyspace: self.keyspace,
            hash_keyspace: self.hash_keyspace,
            weights: OpWeights {
                set: self.set,
                del: self.del,
                lpush: self.lpush,
                lpop: self.lpop,
                hset: self.hset,
                hget: self.hget,
                hgetall: self.hgetall,
                swapin: self.swapin,
            },
            keepalive: self.keepalive != 0,
            rand_payload: self.rand,
            check: self.check,
            fail_on_missing: self.fail_on_missing,
            longtail: self.longtail,
            longtail_order: self.longtail_order,
            seed: self.seed.unwrap_or_else(rand::random),
            quiet: self.quiet,
            loop_forever: self.loop_forever,
            idle: self.idle,
        };
        if self.big {
            cfg.keyspace = 1_000_000;
            cfg.requests = 1_000_000;
        }
        if self.verybig {
            cfg.keyspace = 10_000_000;
            cfg.requests = 10_000_000;
        }
        cfg.sanitize();
        cfg
    }
}

fn init_logging(debug: bool) {
    let mut builder = env_logger::Builder::from_default_env();
    if debug {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.debug);
    let cfg = cli.into_config();

    println!(
        "PRNG seed is: {} - pass --seed {} to reproduce this run",
        cfg.seed, cfg.seed
    );
    if !cfg.keepalive {
        println!(
            "WARNING: keepalive disabled, the OS may run out of \
             ephemeral ports under high request counts"
        );
    }

    // Two-stage cancellation: the first Ctrl+C drains in-flight
    // requests, a second one terminates immediately.
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = tx.send(());
        }
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nForcing exit...");
            std::process::exit(1);
        }
    });

    let shutdown = async move {
        let _ = rx.await;
    };
    if let Err(err) = runner::run(cfg, shutdown).await {
        eprintln!("redload: {}", err);
        std::process::exit(1);
    }
}
