use std::sync::Arc;
use std::time::Duration;

use crate::support::{
    helpers::{fast_config, init_tracing, read_lines, wait_for_lines},
    mock_ledger::{MockLedgerServer, MockNetwork},
};
use anyhow::Result;
use ledgerwatch::{
    ContentFetcher, EvmLedgerClient, FileLogSink, GatewayFetcher, LedgerClient, PassOutcome,
    PollLoop, RecordSink,
};
use ledgerwatch::processor::IdleReason;
use tokio_util::sync::CancellationToken;

fn poll_loop(config: &ledgerwatch::MonitorConfig) -> Result<PollLoop> {
    let ledger: Arc<dyn LedgerClient> = Arc::new(EvmLedgerClient::from_config(config)?);
    let fetcher: Arc<dyn ContentFetcher> = Arc::new(GatewayFetcher::from_config(config)?);
    let sink: Arc<dyn RecordSink> = Arc::new(FileLogSink::new(config.sink_path()));
    Ok(PollLoop::new(config, ledger, fetcher, sink))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn trailing_window_is_scanned_in_chunks_and_deduplicated() -> Result<()> {
    init_tracing();
    let network = MockNetwork::new(50);
    network.publish(42, &["QmA"]);
    network.publish(47, &["QmB", "QmA"]);
    network.serve_urls("QmA", &["http://a"]);
    network.serve_urls("QmB", &["http://b", "http://a"]);
    let server = MockLedgerServer::start(network.clone()).await?;

    let dir = tempfile::tempdir()?;
    let sink_path = dir.path().join("seen_urls.txt");
    let config = fast_config(server.url(), &server.gateway_url(), &sink_path).build()?;
    let mut poll = poll_loop(&config)?;
    let token = CancellationToken::new();

    let outcome = poll.run_pass(&token).await?;
    assert!(matches!(outcome, PassOutcome::Completed(_)));
    assert_eq!(network.range_calls(), vec![(40, 44), (45, 49)]);
    assert_eq!(read_lines(&sink_path), vec!["http://a", "http://b"]);

    // The ledger advances; QmA is still inside the lag window but is not fetched again.
    network.set_head(52);
    network.publish(51, &["QmC"]);
    network.serve_urls("QmC", &["http://c", "http://b"]);

    let PassOutcome::Completed(stats) = poll.run_pass(&token).await? else {
        panic!("second pass should complete");
    };
    assert_eq!(&network.range_calls()[2..], &[(42, 46), (47, 51)]);
    assert_eq!(network.fetch_count("QmA"), 1);
    assert_eq!(network.fetch_count("QmB"), 1);
    assert_eq!(stats.refs_fetched, 1);
    assert_eq!(stats.records_found, 1);
    assert_eq!(
        read_lines(&sink_path),
        vec!["http://a", "http://b", "http://c"]
    );

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn bad_content_is_isolated_and_sink_is_trimmed() -> Result<()> {
    init_tracing();
    let network = MockNetwork::new(20);
    network.publish(11, &["QmMissing", "QmBroken", "QmMixed"]);
    network.serve_blob("QmBroken", "not json at all");
    network.serve_blob(
        "QmMixed",
        r#"{"items":[
            {"item":{"url":"http://1"}},
            {"item":{"title":"no url"}},
            {"item":{"url":"http://2"}},
            {"item":{"url":"http://3"}}
        ]}"#,
    );
    let server = MockLedgerServer::start(network.clone()).await?;

    let dir = tempfile::tempdir()?;
    let sink_path = dir.path().join("records.txt");
    let config = fast_config(server.url(), &server.gateway_url(), &sink_path)
        .max_retained_records(2)
        .build()?;
    let mut poll = poll_loop(&config)?;

    let PassOutcome::Completed(stats) = poll.run_pass(&CancellationToken::new()).await? else {
        panic!("pass should complete despite bad content");
    };

    assert_eq!(stats.fetch_failures, 2);
    assert_eq!(stats.items_skipped, 1);
    assert_eq!(stats.records_found, 3);
    assert_eq!(stats.trimmed, 1);
    assert_eq!(read_lines(&sink_path), vec!["http://2", "http://3"]);
    assert_eq!(poll.seen_refs().len(), 3);

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unavailable_head_idles_until_the_ledger_recovers() -> Result<()> {
    init_tracing();
    let network = MockNetwork::new(30);
    network.set_head_failing(true);
    network.publish(25, &["QmLate"]);
    network.serve_urls("QmLate", &["http://late"]);
    let server = MockLedgerServer::start(network.clone()).await?;

    let dir = tempfile::tempdir()?;
    let sink_path = dir.path().join("records.txt");
    let config = fast_config(server.url(), &server.gateway_url(), &sink_path).build()?;
    let mut poll = poll_loop(&config)?;
    let telemetry = poll.telemetry();
    let token = CancellationToken::new();

    assert_eq!(
        poll.run_pass(&token).await?,
        PassOutcome::Idle(IdleReason::HeadUnavailable)
    );
    assert!(network.range_calls().is_empty());

    network.set_head_failing(false);
    let task_token = token.clone();
    let handle = tokio::spawn(async move { poll.run(task_token).await });

    let lines = wait_for_lines(&sink_path, 1, Duration::from_secs(5)).await?;
    assert_eq!(lines, vec!["http://late"]);

    token.cancel();
    handle.await??;

    let snapshot = telemetry.snapshot();
    assert_eq!(snapshot.head_unavailable, 1);
    assert_eq!(snapshot.records_accepted, 1);

    server.shutdown().await;
    Ok(())
}
