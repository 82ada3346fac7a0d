use std::time::Duration;

use crate::support::{
    helpers::{fast_config, init_tracing, read_lines, wait_for_lines, wait_until},
    mock_ledger::{MockLedgerServer, MockNetwork},
};
use anyhow::{Context, Result};
use ledgerwatch::Runner;
use tokio::time::{sleep, timeout};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn runner_stops_when_token_is_cancelled() -> Result<()> {
    init_tracing();
    let network = MockNetwork::new(50);
    network.publish(45, &["QmA"]);
    network.serve_urls("QmA", &["http://a"]);
    let server = MockLedgerServer::start(network.clone()).await?;

    let dir = tempfile::tempdir()?;
    let sink_path = dir.path().join("seen_urls.txt");
    let config = fast_config(server.url(), &server.gateway_url(), &sink_path).build()?;

    let mut runner = Runner::new(config)?;
    let token = runner.cancellation_token();
    let handle = tokio::spawn(async move {
        let result = runner.run_until_ctrl_c().await;
        (runner, result)
    });

    wait_for_lines(&sink_path, 1, Duration::from_secs(5)).await?;
    token.cancel();

    let (runner, result) = timeout(Duration::from_secs(5), handle)
        .await
        .context("runner should stop after cancellation")??;
    result?;

    let snapshot = runner.telemetry();
    assert!(snapshot.passes >= 1);
    assert_eq!(snapshot.records_accepted, 1);

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn warm_start_prevents_re_emission_after_restart() -> Result<()> {
    init_tracing();
    let network = MockNetwork::new(50);
    network.publish(41, &["QmA"]);
    network.serve_urls("QmA", &["http://a", "http://b"]);
    let server = MockLedgerServer::start(network.clone()).await?;

    let dir = tempfile::tempdir()?;
    let sink_path = dir.path().join("seen_urls.txt");

    // First process lifetime.
    let config = fast_config(server.url(), &server.gateway_url(), &sink_path).build()?;
    let mut runner = Runner::new(config)?;
    let token = runner.cancellation_token();
    let handle = tokio::spawn(async move { runner.run().await });
    wait_for_lines(&sink_path, 2, Duration::from_secs(5)).await?;
    token.cancel();
    handle.await??;

    // Restart with warm start: QmA is fetched again but its records are filtered.
    let config = fast_config(server.url(), &server.gateway_url(), &sink_path)
        .warm_start(true)
        .build()?;
    let mut runner = Runner::new(config)?;
    let token = runner.cancellation_token();
    let handle = tokio::spawn(async move { runner.run().await });
    let observer = network.clone();
    wait_until("second fetch of QmA", Duration::from_secs(5), || {
        observer.fetch_count("QmA") >= 2
    })
    .await?;
    sleep(Duration::from_millis(200)).await;
    token.cancel();
    handle.await??;

    assert_eq!(read_lines(&sink_path), vec!["http://a", "http://b"]);

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cold_restart_re_emits_records_in_the_lag_window() -> Result<()> {
    init_tracing();
    let network = MockNetwork::new(50);
    network.publish(41, &["QmA"]);
    network.serve_urls("QmA", &["http://a"]);
    let server = MockLedgerServer::start(network.clone()).await?;

    let dir = tempfile::tempdir()?;
    let sink_path = dir.path().join("seen_urls.txt");

    for _ in 0..2 {
        let config = fast_config(server.url(), &server.gateway_url(), &sink_path).build()?;
        let mut runner = Runner::new(config)?;
        let token = runner.cancellation_token();
        let handle = tokio::spawn(async move { runner.run().await });
        let expected = network.fetch_count("QmA") + 1;
        let observer = network.clone();
        wait_until("fetch of QmA", Duration::from_secs(5), || {
            observer.fetch_count("QmA") >= expected
        })
        .await?;
        wait_for_lines(&sink_path, expected, Duration::from_secs(5)).await?;
        token.cancel();
        handle.await??;
    }

    assert_eq!(read_lines(&sink_path), vec!["http://a", "http://a"]);

    server.shutdown().await;
    Ok(())
}
