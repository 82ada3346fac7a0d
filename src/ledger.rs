//! Ledger access plumbing: the [`LedgerClient`] seam consumed by the poll loop,
//! the EVM JSON-RPC implementation, ABI helpers, transport options, and
//! request metrics.

pub mod abi;
pub mod client;
pub mod metrics;
pub mod options;

pub use client::{EvmLedgerClient, LedgerClient, RpcError};
pub use metrics::{CallSnapshot, LedgerCall, LedgerMetricsSnapshot};
pub use options::LedgerClientOptions;
