//! Transport knobs for the ledger client along with validation helpers so
//! callers can reason about timeouts, body limits, and contract selectors.

use anyhow::{bail, Result};
use std::time::Duration;

pub const DEFAULT_HTTP_BODY_LIMIT_BYTES: usize = 10 * 1024 * 1024;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// `getLastCheckedBatchId()`
pub const HEAD_SELECTOR: [u8; 4] = [0x47, 0xfe, 0x2d, 0x20];
/// `getBatchsFilesByID(uint256,uint256)`
pub const RANGE_SELECTOR: [u8; 4] = [0x42, 0xe1, 0xe0, 0x71];

#[derive(Debug, Clone)]
pub struct LedgerClientOptions {
    pub request_timeout: Duration,
    pub max_request_body_bytes: usize,
    pub max_response_body_bytes: usize,
    pub head_selector: [u8; 4],
    pub range_selector: [u8; 4],
}

impl Default for LedgerClientOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            max_request_body_bytes: DEFAULT_HTTP_BODY_LIMIT_BYTES,
            max_response_body_bytes: DEFAULT_HTTP_BODY_LIMIT_BYTES,
            head_selector: HEAD_SELECTOR,
            range_selector: RANGE_SELECTOR,
        }
    }
}

impl LedgerClientOptions {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.request_timeout.is_zero() {
            bail!("request_timeout must be greater than 0");
        }
        if self.max_request_body_bytes == 0 {
            bail!("max_request_body_bytes must be greater than 0");
        }
        if self.max_response_body_bytes == 0 {
            bail!("max_response_body_bytes must be greater than 0");
        }
        if self.head_selector == self.range_selector {
            bail!("head_selector and range_selector must differ");
        }
        Ok(())
    }
}
