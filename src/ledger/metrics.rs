//! Per-call counters for the two contract reads the monitor issues. Head reads
//! and range queries have very different cost and failure profiles on a sync
//! node, so they are tracked apart.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Contract read issued by the ledger client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerCall {
    Head,
    Range,
}

impl LedgerCall {
    /// Contract function name, used in logs and errors.
    pub fn method(self) -> &'static str {
        match self {
            LedgerCall::Head => "getLastCheckedBatchId",
            LedgerCall::Range => "getBatchsFilesByID",
        }
    }
}

#[derive(Debug, Default)]
struct CallCounters {
    calls: AtomicU64,
    failures: AtomicU64,
    timeouts: AtomicU64,
    malformed: AtomicU64,
    latency_ns: AtomicU64,
}

impl CallCounters {
    fn finish(&self, latency: Duration) {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let nanos = u64::try_from(latency.as_nanos()).unwrap_or(u64::MAX);
        self.latency_ns.fetch_add(nanos, Ordering::Relaxed);
    }

    fn snapshot(&self) -> CallSnapshot {
        let calls = self.calls.load(Ordering::Relaxed);
        let latency_ns = self.latency_ns.load(Ordering::Relaxed);
        CallSnapshot {
            calls,
            failures: self.failures.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            average_latency_ms: if calls == 0 {
                0.0
            } else {
                latency_ns as f64 / calls as f64 / 1_000_000.0
            },
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct LedgerMetrics {
    head: CallCounters,
    range: CallCounters,
    refs_returned: AtomicU64,
}

impl LedgerMetrics {
    fn counters(&self, call: LedgerCall) -> &CallCounters {
        match call {
            LedgerCall::Head => &self.head,
            LedgerCall::Range => &self.range,
        }
    }

    pub(crate) fn record_success(&self, call: LedgerCall, latency: Duration) {
        self.counters(call).finish(latency);
    }

    pub(crate) fn record_failure(&self, call: LedgerCall, latency: Duration) {
        let counters = self.counters(call);
        counters.finish(latency);
        counters.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_timeout(&self, call: LedgerCall, latency: Duration) {
        self.record_failure(call, latency);
        self.counters(call).timeouts.fetch_add(1, Ordering::Relaxed);
    }

    /// The transport succeeded but the ABI result could not be decoded.
    pub(crate) fn record_malformed(&self, call: LedgerCall) {
        let counters = self.counters(call);
        counters.malformed.fetch_add(1, Ordering::Relaxed);
        counters.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_refs(&self, count: usize) {
        self.refs_returned.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> LedgerMetricsSnapshot {
        LedgerMetricsSnapshot {
            head: self.head.snapshot(),
            range: self.range.snapshot(),
            refs_returned: self.refs_returned.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct CallSnapshot {
    pub calls: u64,
    pub failures: u64,
    pub timeouts: u64,
    pub malformed: u64,
    pub average_latency_ms: f64,
}

#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct LedgerMetricsSnapshot {
    pub head: CallSnapshot,
    pub range: CallSnapshot,
    /// Content references returned by successful range queries.
    pub refs_returned: u64,
}

impl LedgerMetricsSnapshot {
    pub fn total_requests(&self) -> u64 {
        self.head.calls + self.range.calls
    }

    pub fn total_errors(&self) -> u64 {
        self.head.failures + self.range.failures
    }
}
