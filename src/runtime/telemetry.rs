use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use tracing_subscriber::EnvFilter;

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Installs a basic tracing subscriber (if one is not already active).
///
/// The subscriber honours `RUST_LOG` if it is present, otherwise it falls back to `info`.
/// Calling this function multiple times is harmless.
pub fn init_tracing() {
    if TRACING_INIT.get().is_some() {
        return;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .try_init();

    let _ = TRACING_INIT.set(());
}

/// Monotonic counters describing what the poll loop has done since startup.
#[derive(Default, Debug)]
pub struct Telemetry {
    passes: AtomicU64,
    idle_passes: AtomicU64,
    head_unavailable: AtomicU64,
    chunk_failures: AtomicU64,
    refs_fetched: AtomicU64,
    fetch_failures: AtomicU64,
    malformed_payloads: AtomicU64,
    records_accepted: AtomicU64,
    sink_errors: AtomicU64,
}

impl Telemetry {
    pub fn record_pass(&self) {
        self.passes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_idle_pass(&self) {
        self.idle_passes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_head_unavailable(&self) {
        self.head_unavailable.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_chunk_failure(&self) {
        self.chunk_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ref_fetched(&self) {
        self.refs_fetched.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts a failed fetch; malformed bodies are also tallied separately.
    pub fn record_fetch_failure(&self, malformed: bool) {
        self.fetch_failures.fetch_add(1, Ordering::Relaxed);
        if malformed {
            self.malformed_payloads.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_accepted(&self) {
        self.records_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sink_error(&self) {
        self.sink_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn records_accepted(&self) -> u64 {
        self.records_accepted.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            passes: self.passes.load(Ordering::Relaxed),
            idle_passes: self.idle_passes.load(Ordering::Relaxed),
            head_unavailable: self.head_unavailable.load(Ordering::Relaxed),
            chunk_failures: self.chunk_failures.load(Ordering::Relaxed),
            refs_fetched: self.refs_fetched.load(Ordering::Relaxed),
            fetch_failures: self.fetch_failures.load(Ordering::Relaxed),
            malformed_payloads: self.malformed_payloads.load(Ordering::Relaxed),
            records_accepted: self.records_accepted.load(Ordering::Relaxed),
            sink_errors: self.sink_errors.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct TelemetrySnapshot {
    pub passes: u64,
    pub idle_passes: u64,
    pub head_unavailable: u64,
    pub chunk_failures: u64,
    pub refs_fetched: u64,
    pub fetch_failures: u64,
    pub malformed_payloads: u64,
    pub records_accepted: u64,
    pub sink_errors: u64,
}
