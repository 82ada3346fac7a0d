use std::{
    path::Path,
    time::{Duration, Instant},
};

use anyhow::{bail, Result};
use ledgerwatch::{MonitorConfig, MonitorConfigBuilder};
use once_cell::sync::Lazy;
use tokio::time::sleep;
use tracing_subscriber::EnvFilter;

static TRACING_SUBSCRIBER: Lazy<()> = Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
});

pub fn init_tracing() {
    Lazy::force(&TRACING_SUBSCRIBER);
}

/// Fast-cycling configuration pointed at a mock server.
pub fn fast_config(ledger_url: &str, gateway_url: &str, sink: &Path) -> MonitorConfigBuilder {
    MonitorConfig::builder()
        .ledger_url(ledger_url)
        .contract_address("0x00000000000000000000000000000000000000d5")
        .gateway_url(gateway_url)
        .sink_path(sink)
        .record_field("url")
        .max_retries(2)
        .batch_size(5)
        .lag_offset(10)
        .max_files_to_remember(1_000)
        .max_records_to_remember(1_000)
        .max_retained_records(1_000)
        .chunk_delay(Duration::from_millis(5))
        .pass_delay(Duration::from_millis(40))
        .idle_delay(Duration::from_millis(20))
        .head_backoff_unit(Duration::from_millis(5))
        .fetch_timeout(Duration::from_secs(2))
        .rpc_timeout(Duration::from_secs(2))
}

pub fn read_lines(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .map(|content| content.lines().map(str::to_owned).collect())
        .unwrap_or_default()
}

pub async fn wait_for_lines(path: &Path, target: usize, timeout: Duration) -> Result<Vec<String>> {
    let start = Instant::now();
    loop {
        let lines = read_lines(path);
        if lines.len() >= target {
            return Ok(lines);
        }
        if start.elapsed() > timeout {
            bail!(
                "sink did not reach {target} lines within {:?} (lines: {})",
                timeout,
                lines.len()
            );
        }
        sleep(Duration::from_millis(20)).await;
    }
}

pub async fn wait_until<F>(what: &str, timeout: Duration, mut condition: F) -> Result<()>
where
    F: FnMut() -> bool,
{
    let start = Instant::now();
    loop {
        if condition() {
            return Ok(());
        }
        if start.elapsed() > timeout {
            bail!("{what} did not happen within {:?}", timeout);
        }
        sleep(Duration::from_millis(20)).await;
    }
}
