//! Ledger client implementation and the reusable [`LedgerClient`] abstraction
//! consumed by the poll loop. `EvmLedgerClient` reads the batch counter and
//! per-range content references from a contract via JSON-RPC `eth_call`.

use crate::ledger::abi;
use crate::ledger::metrics::{LedgerCall, LedgerMetrics, LedgerMetricsSnapshot};
use crate::ledger::options::LedgerClientOptions;
use crate::runtime::config::MonitorConfig;
use anyhow::{anyhow, bail, Result};
use futures::future::BoxFuture;
use jsonrpsee::core::{
    client::{ClientT, Error as JsonRpcError},
    http_helpers::HttpError,
};
use jsonrpsee::http_client::transport::Error as HttpTransportError;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use jsonrpsee::rpc_params;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tokio::time::{timeout, Instant};

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("rpc method {method} timed out")]
    Timeout { method: &'static str },
    #[error("rpc {method} response exceeded HTTP size limits")]
    ResponseTooLarge { method: &'static str },
    #[error("rpc {method} returned a malformed result: {reason}")]
    MalformedResponse { method: &'static str, reason: String },
}

/// Remote view of the batch ledger.
///
/// `batch_refs` takes an inclusive `[start, end]` range; callers keep ranges
/// small (one chunk at a time).
pub trait LedgerClient: Send + Sync {
    fn head(&self) -> BoxFuture<'_, Result<u64>>;

    fn batch_refs(&self, start: u64, end: u64) -> BoxFuture<'_, Result<Vec<String>>>;
}

#[derive(Debug, Clone)]
pub struct EvmLedgerClient {
    rpc_url: Arc<String>,
    contract: Arc<String>,
    client: HttpClient,
    options: LedgerClientOptions,
    metrics: Arc<LedgerMetrics>,
}

impl LedgerClient for EvmLedgerClient {
    fn head(&self) -> BoxFuture<'_, Result<u64>> {
        Box::pin(self.last_batch_id())
    }

    fn batch_refs(&self, start: u64, end: u64) -> BoxFuture<'_, Result<Vec<String>>> {
        Box::pin(self.batch_content_refs(start, end))
    }
}

impl EvmLedgerClient {
    pub fn new(url: impl Into<String>, contract: impl Into<String>) -> Result<Self> {
        Self::with_options(url, contract, LedgerClientOptions::default())
    }

    pub fn with_options(
        url: impl Into<String>,
        contract: impl Into<String>,
        options: LedgerClientOptions,
    ) -> Result<Self> {
        options.validate()?;

        let rpc_url = url.into();
        let contract = contract.into();
        if contract.trim().is_empty() {
            bail!("contract address cannot be empty");
        }

        let max_request_body_size = options.max_request_body_bytes.min(u32::MAX as usize) as u32;
        let max_response_body_size = options.max_response_body_bytes.min(u32::MAX as usize) as u32;

        let client = HttpClientBuilder::default()
            .request_timeout(options.request_timeout)
            .max_request_size(max_request_body_size)
            .max_response_size(max_response_body_size)
            .build(&rpc_url)
            .map_err(|err| anyhow!("failed to build ledger RPC client: {err}"))?;

        Ok(Self {
            rpc_url: Arc::new(rpc_url),
            contract: Arc::new(contract.trim().to_owned()),
            client,
            options,
            metrics: Arc::new(LedgerMetrics::default()),
        })
    }

    pub fn from_config(config: &MonitorConfig) -> Result<Self> {
        config.validate()?;
        let options = LedgerClientOptions {
            request_timeout: config.rpc_timeout(),
            head_selector: config.head_selector(),
            range_selector: config.range_selector(),
            ..LedgerClientOptions::default()
        };
        Self::with_options(
            config.ledger_url().to_owned(),
            config.contract_address().to_owned(),
            options,
        )
    }

    pub fn endpoint(&self) -> &str {
        &self.rpc_url
    }

    pub fn contract_address(&self) -> &str {
        &self.contract
    }

    pub fn metrics(&self) -> LedgerMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Reads the ledger's current head batch identifier.
    pub async fn last_batch_id(&self) -> Result<u64> {
        let data = abi::encode_call(self.options.head_selector, &[]);
        let raw = self.eth_call(LedgerCall::Head, data).await?;
        let head = abi::decode_u64(&raw).map_err(|err| self.malformed(LedgerCall::Head, err))?;
        tracing::debug!(head, "read ledger head");
        Ok(head)
    }

    /// Lists the content references published in batches `start..=end`.
    pub async fn batch_content_refs(&self, start: u64, end: u64) -> Result<Vec<String>> {
        if end < start {
            bail!("invalid batch range [{start}, {end}]");
        }

        let data = abi::encode_call(self.options.range_selector, &[start, end]);
        let raw = self.eth_call(LedgerCall::Range, data).await?;
        let refs = abi::decode_string_array(&raw)
            .map_err(|err| self.malformed(LedgerCall::Range, err))?;
        self.metrics.record_refs(refs.len());

        tracing::debug!(
            batch_start = start,
            batch_end = end,
            count = refs.len(),
            "range query completed"
        );
        Ok(refs)
    }

    fn malformed(&self, call: LedgerCall, err: anyhow::Error) -> RpcError {
        self.metrics.record_malformed(call);
        RpcError::MalformedResponse {
            method: call.method(),
            reason: format!("{err:#}"),
        }
    }

    async fn eth_call(&self, call_kind: LedgerCall, data: String) -> Result<String> {
        let method = call_kind.method();
        let call = json!({
            "to": self.contract.as_str(),
            "data": data,
        });
        let start = Instant::now();

        let response = timeout(
            self.options.request_timeout,
            self.client
                .request::<String, _>("eth_call", rpc_params![call, "latest"]),
        )
        .await;

        match response {
            Err(_) => {
                self.metrics.record_timeout(call_kind, start.elapsed());
                Err(RpcError::Timeout { method }.into())
            }
            Ok(Err(err)) => {
                self.metrics.record_failure(call_kind, start.elapsed());
                Err(map_rpc_error(method, err))
            }
            Ok(Ok(raw)) => {
                self.metrics.record_success(call_kind, start.elapsed());
                Ok(raw)
            }
        }
    }
}

fn map_rpc_error(label: &'static str, err: JsonRpcError) -> anyhow::Error {
    if response_too_large(&err) {
        return RpcError::ResponseTooLarge { method: label }.into();
    }
    if let JsonRpcError::RequestTimeout = err {
        return RpcError::Timeout { method: label }.into();
    }
    anyhow!("rpc {label} call failed: {err}")
}

fn response_too_large(err: &JsonRpcError) -> bool {
    match err {
        JsonRpcError::Transport(inner) => {
            if let Some(transport_err) = inner.downcast_ref::<HttpTransportError>() {
                match transport_err {
                    HttpTransportError::Http(http_err) => matches!(http_err, HttpError::TooLarge),
                    HttpTransportError::RequestTooLarge => true,
                    _ => false,
                }
            } else {
                false
            }
        }
        _ => false,
    }
}
