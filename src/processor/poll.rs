//! The ingestion loop. One pass reads the ledger head, plans the trailing scan
//! range, walks it chunk by chunk, and pushes every newly seen record into the
//! sink. Passes run back to back on a single task and never overlap.

use super::backoff::sleep_with_cancellation;
use super::cursor::{Cursor, HeadObservation};
use super::dedup::DedupWindow;
use super::head::ResilientHeadReader;
use super::planner::{BatchId, Chunk};
use crate::content::{ContentFetcher, ContentRef, Record};
use crate::error::{Cancelled, ErrorClass, MonitorError};
use crate::ledger::LedgerClient;
use crate::runtime::config::MonitorConfig;
use crate::runtime::telemetry::Telemetry;
use crate::sink::RecordSink;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Consecutive unavailable passes after which the loop escalates to `warn`.
const UNAVAILABLE_WARN_THRESHOLD: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    ReadHead,
    Plan,
    IterateChunks,
    Trim,
    Wait,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleReason {
    HeadUnavailable,
    HeadRegressed,
    NotEnoughBatches,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassStats {
    pub chunks: usize,
    pub failed_chunks: usize,
    pub refs_skipped: usize,
    pub refs_fetched: usize,
    pub fetch_failures: usize,
    pub items_skipped: usize,
    pub records_found: usize,
    pub records_duplicate: usize,
    pub sink_failures: usize,
    pub trimmed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    Idle(IdleReason),
    Completed(PassStats),
}

struct PassSettings {
    batch_size: u64,
    record_field: String,
    max_retained_records: usize,
    max_records_to_remember: usize,
    chunk_delay: Duration,
    pass_delay: Duration,
    idle_delay: Duration,
    warm_start: bool,
}

pub struct PollLoop {
    ledger: Arc<dyn LedgerClient>,
    fetcher: Arc<dyn ContentFetcher>,
    sink: Arc<dyn RecordSink>,
    head_reader: ResilientHeadReader,
    cursor: Cursor,
    seen_refs: DedupWindow<str>,
    seen_records: DedupWindow<str>,
    settings: PassSettings,
    telemetry: Arc<Telemetry>,
    state: LoopState,
    consecutive_unavailable: usize,
}

impl PollLoop {
    pub fn new(
        config: &MonitorConfig,
        ledger: Arc<dyn LedgerClient>,
        fetcher: Arc<dyn ContentFetcher>,
        sink: Arc<dyn RecordSink>,
    ) -> Self {
        let head_reader = ResilientHeadReader::new(
            Arc::clone(&ledger),
            config.max_retries(),
            config.head_backoff_unit(),
        );

        Self {
            ledger,
            fetcher,
            sink,
            head_reader,
            cursor: Cursor::new(config.lag_offset()),
            seen_refs: DedupWindow::new(config.max_files_to_remember()),
            seen_records: DedupWindow::new(config.max_records_to_remember()),
            settings: PassSettings {
                batch_size: config.batch_size(),
                record_field: config.record_field().to_owned(),
                max_retained_records: config.max_retained_records(),
                max_records_to_remember: config.max_records_to_remember(),
                chunk_delay: config.chunk_delay(),
                pass_delay: config.pass_delay(),
                idle_delay: config.idle_delay(),
                warm_start: config.warm_start(),
            },
            telemetry: Arc::new(Telemetry::default()),
            state: LoopState::ReadHead,
            consecutive_unavailable: 0,
        }
    }

    /// Shares an externally owned telemetry sink instead of the private one.
    pub fn with_telemetry(mut self, telemetry: Arc<Telemetry>) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    pub fn seen_refs(&self) -> &DedupWindow<str> {
        &self.seen_refs
    }

    pub fn seen_records(&self) -> &DedupWindow<str> {
        &self.seen_records
    }

    pub fn telemetry(&self) -> Arc<Telemetry> {
        Arc::clone(&self.telemetry)
    }

    /// Passes in a row that ended with the head unavailable or regressed.
    /// Reset by the next pass that observes a usable head.
    pub fn consecutive_unavailable(&self) -> usize {
        self.consecutive_unavailable
    }

    /// Runs passes until `shutdown` fires. Cancellation is a clean exit.
    pub async fn run(&mut self, shutdown: CancellationToken) -> Result<()> {
        if self.settings.warm_start {
            self.warm_start().await;
        }

        loop {
            let outcome = match self.run_pass(&shutdown).await {
                Ok(outcome) => outcome,
                Err(Cancelled) => break,
            };

            let delay = match outcome {
                PassOutcome::Idle(_) => self.settings.idle_delay,
                PassOutcome::Completed(_) => self.settings.pass_delay,
            };

            self.state = LoopState::Wait;
            if sleep_with_cancellation(delay, &shutdown).await.is_err() {
                break;
            }
        }

        tracing::info!(
            records_accepted = self.telemetry.records_accepted(),
            "poll loop stopped"
        );
        Ok(())
    }

    /// Executes a single pass. The returned outcome tells the caller which
    /// delay to observe before the next one.
    pub async fn run_pass(&mut self, shutdown: &CancellationToken) -> Result<PassOutcome, Cancelled> {
        self.state = LoopState::ReadHead;
        self.telemetry.record_pass();

        let Some(head) = self.head_reader.read_head(shutdown).await? else {
            self.telemetry.record_head_unavailable();
            return Ok(self.idle(IdleReason::HeadUnavailable));
        };

        self.state = LoopState::Plan;
        if let HeadObservation::Regressed { previous, observed } = self.cursor.observe(head) {
            tracing::warn!(
                previous,
                observed,
                "ledger head moved backwards; treating as a transient read error"
            );
            return Ok(self.idle(IdleReason::HeadRegressed));
        }
        self.consecutive_unavailable = 0;

        let Some(range) = self.cursor.plan() else {
            tracing::info!(head, "not enough new batches; waiting");
            return Ok(self.idle(IdleReason::NotEnoughBatches));
        };

        tracing::info!(
            head,
            scan_start = range.start(),
            scan_end = range.end(),
            "scanning trailing batches"
        );

        self.state = LoopState::IterateChunks;
        let mut stats = PassStats::default();
        for chunk in range.chunks(self.settings.batch_size) {
            sleep_with_cancellation(self.settings.chunk_delay, shutdown).await?;
            stats.chunks += 1;
            self.process_chunk(chunk, shutdown, &mut stats).await?;
        }

        self.state = LoopState::Trim;
        if shutdown.is_cancelled() {
            return Err(Cancelled);
        }
        match self.sink.trim(self.settings.max_retained_records).await {
            Ok(removed) => stats.trimmed = removed,
            Err(err) => {
                self.telemetry.record_sink_error();
                tracing::warn!(error = %err, "failed to trim record sink");
            }
        }

        self.log_pass(head, &stats);
        self.state = LoopState::Wait;
        Ok(PassOutcome::Completed(stats))
    }

    async fn process_chunk(
        &mut self,
        chunk: Chunk,
        shutdown: &CancellationToken,
        stats: &mut PassStats,
    ) -> Result<(), Cancelled> {
        let refs = tokio::select! {
            _ = shutdown.cancelled() => return Err(Cancelled),
            refs = self.ledger.batch_refs(chunk.start, chunk.end) => refs,
        };

        let refs = match refs {
            Ok(refs) => refs,
            Err(err) => {
                let err = MonitorError::from_ledger(err);
                if err.class() == ErrorClass::Cancelled {
                    return Err(Cancelled);
                }
                stats.failed_chunks += 1;
                self.telemetry.record_chunk_failure();
                tracing::warn!(
                    batch_start = chunk.start,
                    batch_end = chunk.end,
                    error = %err,
                    "range query failed; skipping chunk"
                );
                return Ok(());
            }
        };

        tracing::debug!(
            batch_start = chunk.start,
            batch_end = chunk.end,
            refs = refs.len(),
            "processing chunk"
        );

        for content_ref in refs {
            self.process_ref(content_ref, shutdown, stats).await?;
        }
        Ok(())
    }

    async fn process_ref(
        &mut self,
        content_ref: ContentRef,
        shutdown: &CancellationToken,
        stats: &mut PassStats,
    ) -> Result<(), Cancelled> {
        if self.seen_refs.contains(content_ref.as_str()) {
            stats.refs_skipped += 1;
            return Ok(());
        }
        if shutdown.is_cancelled() {
            return Err(Cancelled);
        }

        // Remembered before the fetch: a failed reference is not retried while
        // it stays in the window.
        self.seen_refs.insert(content_ref.as_str());

        let fetched = tokio::select! {
            _ = shutdown.cancelled() => return Err(Cancelled),
            fetched = self.fetcher.fetch(&content_ref) => fetched,
        };

        let payload = match fetched {
            Ok(payload) => payload,
            Err(err) => {
                let err = MonitorError::from_fetch(&content_ref, err);
                stats.fetch_failures += 1;
                self.telemetry
                    .record_fetch_failure(err.class() == ErrorClass::MalformedPayload);
                tracing::warn!(content_ref = %content_ref, error = %err, "content fetch failed");
                return Ok(());
            }
        };

        stats.refs_fetched += 1;
        self.telemetry.record_ref_fetched();

        let extraction = payload.extract(&self.settings.record_field);
        if extraction.skipped > 0 {
            tracing::debug!(
                content_ref = %content_ref,
                skipped = extraction.skipped,
                "payload items without the expected shape"
            );
        }
        stats.items_skipped += extraction.skipped;

        for record in extraction.records {
            self.accept_record(record, shutdown, stats).await?;
        }
        Ok(())
    }

    async fn accept_record(
        &mut self,
        record: Record,
        shutdown: &CancellationToken,
        stats: &mut PassStats,
    ) -> Result<(), Cancelled> {
        if self.seen_records.contains(record.as_str()) {
            stats.records_duplicate += 1;
            return Ok(());
        }
        if shutdown.is_cancelled() {
            return Err(Cancelled);
        }

        self.seen_records.insert(record.as_str());
        stats.records_found += 1;

        match self.sink.append(&record).await {
            Ok(()) => {
                self.telemetry.record_accepted();
                tracing::debug!(record = %record, "new record");
            }
            Err(err) => {
                stats.sink_failures += 1;
                self.telemetry.record_sink_error();
                let err = MonitorError::from_sink(&record, err);
                tracing::warn!(error = %err, "dropping record");
            }
        }
        Ok(())
    }

    async fn warm_start(&mut self) {
        match self.sink.recent(self.settings.max_records_to_remember).await {
            Ok(records) => {
                let loaded = records.len();
                self.seen_records.extend(records);
                tracing::info!(loaded, "record window seeded from sink");
            }
            Err(err) => {
                tracing::warn!(error = %err, "could not seed record window from sink");
            }
        }
    }

    fn idle(&mut self, reason: IdleReason) -> PassOutcome {
        self.telemetry.record_idle_pass();

        if matches!(reason, IdleReason::HeadUnavailable | IdleReason::HeadRegressed) {
            self.consecutive_unavailable += 1;
            if self.consecutive_unavailable >= UNAVAILABLE_WARN_THRESHOLD {
                tracing::warn!(
                    consecutive_passes = self.consecutive_unavailable,
                    ?reason,
                    "ledger head unavailable for consecutive passes"
                );
            }
        }

        self.state = LoopState::Wait;
        PassOutcome::Idle(reason)
    }

    fn log_pass(&self, head: BatchId, stats: &PassStats) {
        tracing::info!(
            target: "ledgerwatch::metrics",
            head,
            chunks = stats.chunks,
            failed_chunks = stats.failed_chunks,
            refs_fetched = stats.refs_fetched,
            refs_skipped = stats.refs_skipped,
            fetch_failures = stats.fetch_failures,
            records_found = stats.records_found,
            sink_failures = stats.sink_failures,
            trimmed = stats.trimmed,
            refs_remembered = self.seen_refs.len(),
            records_remembered = self.seen_records.len(),
            "pass complete"
        );
    }
}
