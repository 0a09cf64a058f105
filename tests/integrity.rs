mod support;

use redload::config::RunConfig;
use redload::error::ClientError;
use redload::runner::run_once;
use redload::workload::OpWeights;

use support::{spawn_mock_server, MockOptions};

fn check_config(port: u16) -> RunConfig {
    let mut cfg = RunConfig {
        port,
        clients: 1,
        requests: 50,
        keyspace: 5,
        check: true,
        quiet: true,
        seed: 1234,
        ..RunConfig::default()
    };
    cfg.sanitize();
    cfg
}

#[tokio::test]
async fn corrupted_value_aborts_the_read_pass() {
    let opts = MockOptions { corrupt_reads: true, ..MockOptions::default() };
    let (addr, shutdown, handle) = spawn_mock_server(opts).await;

    // The write pass is unaffected by read corruption.
    let mut write_cfg = check_config(addr.port());
    write_cfg.weights = OpWeights { set: 100, ..OpWeights::default() };
    run_once(&write_cfg).await.expect("write pass");

    // Every GET hands back a flipped byte: the first read of a
    // written key must abort the run with a corruption finding.
    let read_cfg = check_config(addr.port());
    let err = run_once(&read_cfg).await.expect_err("corruption undetected");
    match err {
        ClientError::Corrupt { key, expected_len, actual_len } => {
            assert!(key < read_cfg.keyspace);
            assert_eq!(expected_len, actual_len, "content flip keeps the length");
        }
        other => panic!("expected a corruption finding, got {}", other),
    }

    shutdown.send(()).unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn missing_values_are_tolerated_by_default() {
    let (addr, shutdown, handle) = spawn_mock_server(MockOptions::default()).await;

    // Nothing was ever written: every checked GET sees nil.
    let cfg = check_config(addr.port());
    let report = run_once(&cfg).await.expect("all-nil read pass");
    assert_eq!(report.completed, 50);

    shutdown.send(()).unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn missing_values_are_fatal_when_strict() {
    let (addr, shutdown, handle) = spawn_mock_server(MockOptions::default()).await;

    let mut cfg = check_config(addr.port());
    cfg.fail_on_missing = true;
    let err = run_once(&cfg).await.expect_err("missing value accepted");
    assert!(matches!(err, ClientError::Missing { .. }));

    shutdown.send(()).unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn honest_server_passes_a_long_check_run() {
    let (addr, shutdown, handle) = spawn_mock_server(MockOptions::default()).await;

    // Interleaved writes and reads against the same keyspace: reads
    // may see nil before the first write of a key, never a mismatch.
    let mut cfg = check_config(addr.port());
    cfg.clients = 4;
    cfg.requests = 400;
    cfg.keyspace = 20;
    cfg.weights = OpWeights { set: 50, ..OpWeights::default() };
    cfg.sanitize();

    let report = run_once(&cfg).await.expect("interleaved check run");
    assert_eq!(report.completed, 400);
    assert_eq!(report.histogram.total(), 400);

    shutdown.send(()).unwrap();
    handle.await.unwrap().unwrap();
}
