pub mod content;
pub mod error;
pub mod ledger;
pub mod processor;
pub mod runtime;
pub mod sink;

pub use content::{ContentFetcher, ContentRef, FetchError, GatewayFetcher, Payload, Record};
pub use error::{Cancelled, ErrorClass, MonitorError};
pub use ledger::{EvmLedgerClient, LedgerClient, LedgerClientOptions, RpcError};
pub use processor::{DedupWindow, PassOutcome, PassStats, PollLoop};
pub use runtime::config::{MonitorConfig, MonitorConfigBuilder, MonitorConfigParams};
pub use runtime::runner::Runner;
pub use runtime::telemetry::{init_tracing, Telemetry, TelemetrySnapshot};
pub use sink::{FileLogSink, RecordSink, SinkError};
