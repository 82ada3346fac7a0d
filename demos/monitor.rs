//! Follows a batch ledger and appends every newly seen URL to `seen_urls.txt`.
//!
//! The ledger endpoint and contract address have no defaults and must be given
//! through `LEDGERWATCH_LEDGER_URL` and `LEDGERWATCH_CONTRACT_ADDRESS`. Every
//! other `LEDGERWATCH_*` variable overrides the constants below.

use std::env;
use std::time::Duration;

use anyhow::{Context, Result};
use ledgerwatch::{MonitorConfig, MonitorConfigBuilder, Runner};

const DEFAULT_GATEWAY_URL: &str = "http://ipfs-gateway.exorde.network/ipfs/";
const DEFAULT_SINK_PATH: &str = "seen_urls.txt";
const DEFAULT_RECORD_FIELD: &str = "url";
const DEFAULT_MAX_RETRIES: usize = 3;
const DEFAULT_BATCH_SIZE: u64 = 10;
const DEFAULT_LAG_OFFSET: u64 = 10;
const DEFAULT_MAX_FILES: usize = 1_000_000;
const DEFAULT_MAX_RECORDS: usize = 60_000;
const DEFAULT_RETAINED_RECORDS: usize = 500_000;
const DEFAULT_CHUNK_DELAY: Duration = Duration::from_secs(1);
const DEFAULT_PASS_DELAY: Duration = Duration::from_secs(3);
const DEFAULT_IDLE_DELAY: Duration = Duration::from_secs(1);
const DEFAULT_HEAD_BACKOFF: Duration = Duration::from_secs(1);
const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(3);
const DEFAULT_LOG_DIRECTIVE: &str = "info";

#[tokio::main]
async fn main() -> Result<()> {
    init_demo_tracing();

    let config = demo_defaults()
        .apply_env()?
        .build()
        .context("invalid monitor configuration")?;

    tracing::info!(
        ledger = config.ledger_url(),
        contract = config.contract_address(),
        gateway = config.gateway_url(),
        sink = %config.sink_path().display(),
        "starting ledger monitor"
    );

    let mut runner = Runner::new(config)?;
    runner.run_until_ctrl_c().await?;

    let summary = runner.telemetry();
    println!(
        "stopped after {} passes: {} records accepted, {} refs fetched, {} fetch failures",
        summary.passes, summary.records_accepted, summary.refs_fetched, summary.fetch_failures
    );
    Ok(())
}

fn demo_defaults() -> MonitorConfigBuilder {
    MonitorConfig::builder()
        .gateway_url(DEFAULT_GATEWAY_URL)
        .sink_path(DEFAULT_SINK_PATH)
        .record_field(DEFAULT_RECORD_FIELD)
        .max_retries(DEFAULT_MAX_RETRIES)
        .batch_size(DEFAULT_BATCH_SIZE)
        .lag_offset(DEFAULT_LAG_OFFSET)
        .max_files_to_remember(DEFAULT_MAX_FILES)
        .max_records_to_remember(DEFAULT_MAX_RECORDS)
        .max_retained_records(DEFAULT_RETAINED_RECORDS)
        .chunk_delay(DEFAULT_CHUNK_DELAY)
        .pass_delay(DEFAULT_PASS_DELAY)
        .idle_delay(DEFAULT_IDLE_DELAY)
        .head_backoff_unit(DEFAULT_HEAD_BACKOFF)
        .fetch_timeout(DEFAULT_FETCH_TIMEOUT)
}

fn init_demo_tracing() {
    if env::var_os("RUST_LOG").is_none() {
        env::set_var("RUST_LOG", DEFAULT_LOG_DIRECTIVE);
    }
    ledgerwatch::init_tracing();
}
