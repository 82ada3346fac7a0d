use crate::content::{ContentFetcher, GatewayFetcher};
use crate::ledger::{EvmLedgerClient, LedgerClient};
use crate::processor::poll::PollLoop;
use crate::runtime::config::MonitorConfig;
use crate::runtime::telemetry::{Telemetry, TelemetrySnapshot};
use crate::sink::{FileLogSink, RecordSink};
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Wires the production collaborators into a [`PollLoop`] and drives it until shutdown.
pub struct Runner {
    poll: PollLoop,
    ledger: Option<Arc<EvmLedgerClient>>,
    telemetry: Arc<Telemetry>,
    shutdown: CancellationToken,
}

impl Runner {
    /// Builds the JSON-RPC ledger client, the gateway fetcher, and the file sink
    /// described by `config`.
    pub fn new(config: MonitorConfig) -> Result<Self> {
        let ledger = Arc::new(
            EvmLedgerClient::from_config(&config).context("failed to build ledger client")?,
        );
        let fetcher = Arc::new(
            GatewayFetcher::from_config(&config).context("failed to build gateway fetcher")?,
        );
        let sink = Arc::new(FileLogSink::new(config.sink_path()));

        let mut runner = Self::with_components(
            &config,
            Arc::clone(&ledger) as Arc<dyn LedgerClient>,
            fetcher,
            sink,
        );
        runner.ledger = Some(ledger);
        Ok(runner)
    }

    /// Uses caller-supplied collaborators, e.g. in-memory fakes.
    pub fn with_components(
        config: &MonitorConfig,
        ledger: Arc<dyn LedgerClient>,
        fetcher: Arc<dyn ContentFetcher>,
        sink: Arc<dyn RecordSink>,
    ) -> Self {
        let telemetry = Arc::new(Telemetry::default());
        let poll =
            PollLoop::new(config, ledger, fetcher, sink).with_telemetry(Arc::clone(&telemetry));

        Self {
            poll,
            ledger: None,
            telemetry,
            shutdown: CancellationToken::new(),
        }
    }

    /// Returns a clone of the root shutdown token so external callers can integrate
    /// with their own signal handlers or cancellation strategies.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn telemetry(&self) -> TelemetrySnapshot {
        self.telemetry.snapshot()
    }

    /// Runs the poll loop until the shutdown token is cancelled.
    pub async fn run(&mut self) -> Result<()> {
        let result = self.poll.run(self.shutdown.clone()).await;
        self.log_summary();
        result
    }

    /// Runs until a Ctrl-C (SIGINT) is received or the shutdown token is cancelled elsewhere.
    pub async fn run_until_ctrl_c(&mut self) -> Result<()> {
        tracing::info!("runner started; waiting for Ctrl-C (SIGINT) to initiate shutdown");

        let shutdown = self.shutdown.clone();
        let result = {
            let poll = self.poll.run(shutdown.clone());
            tokio::pin!(poll);

            let finished = tokio::select! {
                result = &mut poll => Some(result),
                _ = signal::ctrl_c() => None,
            };

            match finished {
                Some(result) => result,
                None => {
                    tracing::info!("Ctrl-C received; shutting down runner");
                    shutdown.cancel();
                    poll.await
                }
            }
        };

        self.log_summary();
        result
    }

    fn log_summary(&self) {
        let snapshot = self.telemetry.snapshot();
        tracing::info!(
            target: "ledgerwatch::metrics",
            passes = snapshot.passes,
            idle_passes = snapshot.idle_passes,
            refs_fetched = snapshot.refs_fetched,
            fetch_failures = snapshot.fetch_failures,
            records_accepted = snapshot.records_accepted,
            sink_errors = snapshot.sink_errors,
            "runner stopped"
        );

        if let Some(ledger) = &self.ledger {
            let rpc = ledger.metrics();
            tracing::info!(
                target: "ledgerwatch::metrics",
                head_calls = rpc.head.calls,
                head_failures = rpc.head.failures,
                head_timeouts = rpc.head.timeouts,
                head_malformed = rpc.head.malformed,
                head_avg_latency_ms = rpc.head.average_latency_ms,
                range_calls = rpc.range.calls,
                range_failures = rpc.range.failures,
                range_timeouts = rpc.range.timeouts,
                range_malformed = rpc.range.malformed,
                range_avg_latency_ms = rpc.range.average_latency_ms,
                refs_returned = rpc.refs_returned,
                "ledger rpc summary"
            );
        }
    }
}
