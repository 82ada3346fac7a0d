use crate::content::fetcher::DEFAULT_MAX_CONTENT_BYTES;
use crate::ledger::abi;
use crate::ledger::options::{HEAD_SELECTOR, RANGE_SELECTOR};
use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_RPC_TIMEOUT_SECS: u64 = 10;
const MIN_LAG_OFFSET: u64 = 2;

/// Prefix shared by every environment variable understood by
/// [`MonitorConfigBuilder::apply_env`].
pub const ENV_PREFIX: &str = "LEDGERWATCH_";

/// Runtime configuration for the ledger monitor.
///
/// All instances must be constructed via [`MonitorConfig::builder`] or [`MonitorConfig::new`]
/// so invariants are validated before any consumer observes the values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    ledger_url: String,
    contract_address: String,
    gateway_url: String,
    sink_path: PathBuf,
    record_field: String,
    max_retries: usize,
    batch_size: u64,
    lag_offset: u64,
    max_files_to_remember: usize,
    max_records_to_remember: usize,
    max_retained_records: usize,
    chunk_delay: Duration,
    pass_delay: Duration,
    idle_delay: Duration,
    head_backoff_unit: Duration,
    fetch_timeout: Duration,
    rpc_timeout: Duration,
    max_content_bytes: usize,
    head_selector: [u8; 4],
    range_selector: [u8; 4],
    warm_start: bool,
}

pub struct MonitorConfigParams {
    pub ledger_url: String,
    pub contract_address: String,
    pub gateway_url: String,
    pub sink_path: PathBuf,
    pub record_field: String,
    pub max_retries: usize,
    pub batch_size: u64,
    pub lag_offset: u64,
    pub max_files_to_remember: usize,
    pub max_records_to_remember: usize,
    pub max_retained_records: usize,
    pub chunk_delay: Duration,
    pub pass_delay: Duration,
    pub idle_delay: Duration,
    pub head_backoff_unit: Duration,
    pub fetch_timeout: Duration,
    pub rpc_timeout: Duration,
    pub max_content_bytes: usize,
    pub head_selector: [u8; 4],
    pub range_selector: [u8; 4],
    pub warm_start: bool,
}

impl MonitorConfig {
    /// Returns a builder to incrementally construct and validate a configuration.
    pub fn builder() -> MonitorConfigBuilder {
        MonitorConfigBuilder::default()
    }

    /// Constructs a configuration directly from the provided values.
    pub fn new(params: MonitorConfigParams) -> Result<Self> {
        let MonitorConfigParams {
            ledger_url,
            contract_address,
            gateway_url,
            sink_path,
            record_field,
            max_retries,
            batch_size,
            lag_offset,
            max_files_to_remember,
            max_records_to_remember,
            max_retained_records,
            chunk_delay,
            pass_delay,
            idle_delay,
            head_backoff_unit,
            fetch_timeout,
            rpc_timeout,
            max_content_bytes,
            head_selector,
            range_selector,
            warm_start,
        } = params;

        let config = Self {
            ledger_url: trimmed_string(ledger_url),
            contract_address: trimmed_string(contract_address),
            gateway_url: trimmed_string(gateway_url),
            sink_path,
            record_field: trimmed_string(record_field),
            max_retries,
            batch_size,
            lag_offset,
            max_files_to_remember,
            max_records_to_remember,
            max_retained_records,
            chunk_delay,
            pass_delay,
            idle_delay,
            head_backoff_unit,
            fetch_timeout,
            rpc_timeout,
            max_content_bytes,
            head_selector,
            range_selector,
            warm_start,
        };

        config.validate()?;
        Ok(config)
    }

    /// JSON-RPC endpoint of the ledger node.
    pub fn ledger_url(&self) -> &str {
        &self.ledger_url
    }

    /// Address of the contract holding the batch ledger.
    pub fn contract_address(&self) -> &str {
        &self.contract_address
    }

    /// Base URL that content references are appended to.
    pub fn gateway_url(&self) -> &str {
        &self.gateway_url
    }

    /// Newline-delimited file receiving accepted records.
    pub fn sink_path(&self) -> &Path {
        &self.sink_path
    }

    /// Key read from each payload item (`items[*].item.<record_field>`).
    pub fn record_field(&self) -> &str {
        &self.record_field
    }

    /// Attempts made by the head reader before reporting the head unavailable.
    pub fn max_retries(&self) -> usize {
        self.max_retries
    }

    /// Maximum number of batch ids per range query.
    pub fn batch_size(&self) -> u64 {
        self.batch_size
    }

    /// Number of trailing batches re-scanned behind the head every pass.
    pub fn lag_offset(&self) -> u64 {
        self.lag_offset
    }

    /// Capacity of the content reference dedup window.
    pub fn max_files_to_remember(&self) -> usize {
        self.max_files_to_remember
    }

    /// Capacity of the record dedup window.
    pub fn max_records_to_remember(&self) -> usize {
        self.max_records_to_remember
    }

    /// Number of most recent records the sink keeps after each trim.
    pub fn max_retained_records(&self) -> usize {
        self.max_retained_records
    }

    /// Pause before every range query.
    pub fn chunk_delay(&self) -> Duration {
        self.chunk_delay
    }

    /// Pause after a completed pass.
    pub fn pass_delay(&self) -> Duration {
        self.pass_delay
    }

    /// Pause after a pass that found nothing to scan.
    pub fn idle_delay(&self) -> Duration {
        self.idle_delay
    }

    /// Backoff unit of the head reader; retry `k` waits `(2k + 1)` units.
    pub fn head_backoff_unit(&self) -> Duration {
        self.head_backoff_unit
    }

    /// Hard timeout for a single content fetch.
    pub fn fetch_timeout(&self) -> Duration {
        self.fetch_timeout
    }

    /// Per-call timeout applied to ledger JSON-RPC requests.
    pub fn rpc_timeout(&self) -> Duration {
        self.rpc_timeout
    }

    /// Largest content blob the fetcher accepts from the gateway.
    pub fn max_content_bytes(&self) -> usize {
        self.max_content_bytes
    }

    /// Selector of the ledger's head getter.
    pub fn head_selector(&self) -> [u8; 4] {
        self.head_selector
    }

    /// Selector of the ledger's range query.
    pub fn range_selector(&self) -> [u8; 4] {
        self.range_selector
    }

    /// Seed the record window from the sink tail on startup.
    pub fn warm_start(&self) -> bool {
        self.warm_start
    }

    /// Performs validation on an existing configuration instance.
    pub fn validate(&self) -> Result<()> {
        validate_url(&self.ledger_url, "ledger_url")?;
        validate_url(&self.gateway_url, "gateway_url")?;
        ensure_not_empty(&self.contract_address, "contract_address")?;
        ensure_not_empty(&self.record_field, "record_field")?;

        if self.sink_path.as_os_str().is_empty() {
            bail!("sink_path cannot be empty");
        }

        if self.max_retries == 0 {
            bail!("max_retries must be greater than 0");
        }

        if self.batch_size == 0 {
            bail!("batch_size must be greater than 0");
        }

        if self.lag_offset < MIN_LAG_OFFSET {
            bail!(
                "lag_offset must be at least {MIN_LAG_OFFSET} (got {}); smaller offsets never \
                 produce a scan range",
                self.lag_offset
            );
        }

        if self.max_files_to_remember == 0 {
            bail!("max_files_to_remember must be greater than 0");
        }

        if self.max_records_to_remember == 0 {
            bail!("max_records_to_remember must be greater than 0");
        }

        if self.max_retained_records == 0 {
            bail!("max_retained_records must be greater than 0");
        }

        if self.chunk_delay.is_zero() {
            bail!("chunk_delay must be greater than 0");
        }

        if self.pass_delay.is_zero() {
            bail!("pass_delay must be greater than 0");
        }

        if self.idle_delay.is_zero() {
            bail!("idle_delay must be greater than 0");
        }

        if self.head_backoff_unit.is_zero() {
            bail!("head_backoff_unit must be greater than 0");
        }

        if self.fetch_timeout.is_zero() {
            bail!("fetch_timeout must be greater than 0");
        }

        if self.rpc_timeout.is_zero() {
            bail!("rpc_timeout must be greater than 0");
        }

        if self.max_content_bytes == 0 {
            bail!("max_content_bytes must be greater than 0");
        }

        if self.head_selector == self.range_selector {
            bail!("head_selector and range_selector must differ");
        }

        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct MonitorConfigBuilder {
    ledger_url: Option<String>,
    contract_address: Option<String>,
    gateway_url: Option<String>,
    sink_path: Option<PathBuf>,
    record_field: Option<String>,
    max_retries: Option<usize>,
    batch_size: Option<u64>,
    lag_offset: Option<u64>,
    max_files_to_remember: Option<usize>,
    max_records_to_remember: Option<usize>,
    max_retained_records: Option<usize>,
    chunk_delay: Option<Duration>,
    pass_delay: Option<Duration>,
    idle_delay: Option<Duration>,
    head_backoff_unit: Option<Duration>,
    fetch_timeout: Option<Duration>,
    rpc_timeout: Option<Duration>,
    max_content_bytes: Option<usize>,
    head_selector: Option<[u8; 4]>,
    range_selector: Option<[u8; 4]>,
    warm_start: Option<bool>,
}

impl MonitorConfigBuilder {
    pub fn ledger_url(mut self, url: impl Into<String>) -> Self {
        self.ledger_url = Some(url.into());
        self
    }

    pub fn contract_address(mut self, address: impl Into<String>) -> Self {
        self.contract_address = Some(address.into());
        self
    }

    pub fn gateway_url(mut self, url: impl Into<String>) -> Self {
        self.gateway_url = Some(url.into());
        self
    }

    pub fn sink_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.sink_path = Some(path.into());
        self
    }

    pub fn record_field(mut self, field: impl Into<String>) -> Self {
        self.record_field = Some(field.into());
        self
    }

    pub fn max_retries(mut self, retries: usize) -> Self {
        self.max_retries = Some(retries);
        self
    }

    pub fn batch_size(mut self, size: u64) -> Self {
        self.batch_size = Some(size);
        self
    }

    pub fn lag_offset(mut self, offset: u64) -> Self {
        self.lag_offset = Some(offset);
        self
    }

    pub fn max_files_to_remember(mut self, capacity: usize) -> Self {
        self.max_files_to_remember = Some(capacity);
        self
    }

    pub fn max_records_to_remember(mut self, capacity: usize) -> Self {
        self.max_records_to_remember = Some(capacity);
        self
    }

    pub fn max_retained_records(mut self, records: usize) -> Self {
        self.max_retained_records = Some(records);
        self
    }

    pub fn chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = Some(delay);
        self
    }

    pub fn pass_delay(mut self, delay: Duration) -> Self {
        self.pass_delay = Some(delay);
        self
    }

    pub fn idle_delay(mut self, delay: Duration) -> Self {
        self.idle_delay = Some(delay);
        self
    }

    pub fn head_backoff_unit(mut self, unit: Duration) -> Self {
        self.head_backoff_unit = Some(unit);
        self
    }

    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = Some(timeout);
        self
    }

    pub fn rpc_timeout(mut self, timeout: Duration) -> Self {
        self.rpc_timeout = Some(timeout);
        self
    }

    pub fn max_content_bytes(mut self, limit: usize) -> Self {
        self.max_content_bytes = Some(limit);
        self
    }

    pub fn head_selector(mut self, selector: [u8; 4]) -> Self {
        self.head_selector = Some(selector);
        self
    }

    pub fn range_selector(mut self, selector: [u8; 4]) -> Self {
        self.range_selector = Some(selector);
        self
    }

    pub fn warm_start(mut self, enabled: bool) -> Self {
        self.warm_start = Some(enabled);
        self
    }

    /// Overrides fields from `LEDGERWATCH_*` process environment variables.
    pub fn apply_env(self) -> Result<Self> {
        self.apply_vars(|name| std::env::var(name).ok())
    }

    /// Overrides fields from variables resolved through `lookup`.
    ///
    /// Durations are given in milliseconds (`*_MS`). Unset variables leave the
    /// builder untouched; unparsable ones are an error naming the variable.
    pub fn apply_vars<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |suffix: &str| {
            let name = format!("{ENV_PREFIX}{suffix}");
            lookup(&name).map(|value| (name, value))
        };

        if let Some((_, value)) = var("LEDGER_URL") {
            self.ledger_url = Some(value);
        }
        if let Some((_, value)) = var("CONTRACT_ADDRESS") {
            self.contract_address = Some(value);
        }
        if let Some((_, value)) = var("GATEWAY_URL") {
            self.gateway_url = Some(value);
        }
        if let Some((_, value)) = var("SINK_PATH") {
            self.sink_path = Some(PathBuf::from(value));
        }
        if let Some((_, value)) = var("RECORD_FIELD") {
            self.record_field = Some(value);
        }
        if let Some((name, value)) = var("MAX_RETRIES") {
            self.max_retries = Some(parse_var(&name, &value)?);
        }
        if let Some((name, value)) = var("BATCH_SIZE") {
            self.batch_size = Some(parse_var(&name, &value)?);
        }
        if let Some((name, value)) = var("LAG_OFFSET") {
            self.lag_offset = Some(parse_var(&name, &value)?);
        }
        if let Some((name, value)) = var("MAX_FILES_TO_REMEMBER") {
            self.max_files_to_remember = Some(parse_var(&name, &value)?);
        }
        if let Some((name, value)) = var("MAX_RECORDS_TO_REMEMBER") {
            self.max_records_to_remember = Some(parse_var(&name, &value)?);
        }
        if let Some((name, value)) = var("MAX_RETAINED_RECORDS") {
            self.max_retained_records = Some(parse_var(&name, &value)?);
        }
        if let Some((name, value)) = var("CHUNK_DELAY_MS") {
            self.chunk_delay = Some(parse_millis(&name, &value)?);
        }
        if let Some((name, value)) = var("PASS_DELAY_MS") {
            self.pass_delay = Some(parse_millis(&name, &value)?);
        }
        if let Some((name, value)) = var("IDLE_DELAY_MS") {
            self.idle_delay = Some(parse_millis(&name, &value)?);
        }
        if let Some((name, value)) = var("HEAD_BACKOFF_MS") {
            self.head_backoff_unit = Some(parse_millis(&name, &value)?);
        }
        if let Some((name, value)) = var("FETCH_TIMEOUT_MS") {
            self.fetch_timeout = Some(parse_millis(&name, &value)?);
        }
        if let Some((name, value)) = var("RPC_TIMEOUT_MS") {
            self.rpc_timeout = Some(parse_millis(&name, &value)?);
        }
        if let Some((name, value)) = var("MAX_CONTENT_BYTES") {
            self.max_content_bytes = Some(parse_var(&name, &value)?);
        }
        if let Some((name, value)) = var("HEAD_SELECTOR") {
            self.head_selector = Some(parse_selector(&name, &value)?);
        }
        if let Some((name, value)) = var("RANGE_SELECTOR") {
            self.range_selector = Some(parse_selector(&name, &value)?);
        }
        if let Some((name, value)) = var("WARM_START") {
            self.warm_start = Some(parse_flag(&name, &value)?);
        }

        Ok(self)
    }

    pub fn build(self) -> Result<MonitorConfig> {
        let params = MonitorConfigParams {
            ledger_url: self.ledger_url.context("ledger_url is required")?,
            contract_address: self
                .contract_address
                .context("contract_address is required")?,
            gateway_url: self.gateway_url.context("gateway_url is required")?,
            sink_path: self.sink_path.context("sink_path is required")?,
            record_field: self.record_field.context("record_field is required")?,
            max_retries: self.max_retries.context("max_retries is required")?,
            batch_size: self.batch_size.context("batch_size is required")?,
            lag_offset: self.lag_offset.context("lag_offset is required")?,
            max_files_to_remember: self
                .max_files_to_remember
                .context("max_files_to_remember is required")?,
            max_records_to_remember: self
                .max_records_to_remember
                .context("max_records_to_remember is required")?,
            max_retained_records: self
                .max_retained_records
                .context("max_retained_records is required")?,
            chunk_delay: self.chunk_delay.context("chunk_delay is required")?,
            pass_delay: self.pass_delay.context("pass_delay is required")?,
            idle_delay: self.idle_delay.context("idle_delay is required")?,
            head_backoff_unit: self
                .head_backoff_unit
                .context("head_backoff_unit is required")?,
            fetch_timeout: self.fetch_timeout.context("fetch_timeout is required")?,
            rpc_timeout: self
                .rpc_timeout
                .unwrap_or_else(|| Duration::from_secs(DEFAULT_RPC_TIMEOUT_SECS)),
            max_content_bytes: self.max_content_bytes.unwrap_or(DEFAULT_MAX_CONTENT_BYTES),
            head_selector: self.head_selector.unwrap_or(HEAD_SELECTOR),
            range_selector: self.range_selector.unwrap_or(RANGE_SELECTOR),
            warm_start: self.warm_start.unwrap_or(false),
        };

        MonitorConfig::new(params)
    }
}

fn trimmed_string(value: String) -> String {
    value.trim().to_owned()
}

fn ensure_not_empty(value: &str, field: &str) -> Result<()> {
    if value.trim().is_empty() {
        bail!("{field} cannot be empty");
    }
    Ok(())
}

fn validate_url(url: &str, field: &str) -> Result<()> {
    let url = url.trim();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        bail!("{field} must start with http:// or https://");
    }
    Ok(())
}

fn parse_var<T>(name: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("{name} has invalid value {value:?}"))
}

fn parse_millis(name: &str, value: &str) -> Result<Duration> {
    parse_var::<u64>(name, value).map(Duration::from_millis)
}

fn parse_selector(name: &str, value: &str) -> Result<[u8; 4]> {
    abi::selector_from_hex(value).with_context(|| format!("{name} has invalid value {value:?}"))
}

fn parse_flag(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => bail!("{name} must be a boolean (got {value:?})"),
    }
}
