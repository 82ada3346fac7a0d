//! Error taxonomy shared by the monitor components.
//!
//! Component errors stay narrow (`RpcError`, `FetchError`, `SinkError`) and are
//! folded into [`MonitorError`] when the poll loop needs to classify a failure
//! for logging and telemetry. Only [`Cancelled`] is allowed to end a pass.

use crate::content::fetcher::FetchError;
use crate::ledger::RpcError;
use crate::sink::SinkError;
use thiserror::Error;

/// Operator-requested shutdown observed at a suspension point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("operation cancelled by shutdown request")]
pub struct Cancelled;

/// How a failure inside a pass should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    TransientRemote,
    MalformedPayload,
    SinkWrite,
    Cancelled,
}

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("transient remote failure: {0}")]
    TransientRemote(#[source] anyhow::Error),

    #[error("malformed payload for {content_ref}: {reason}")]
    MalformedPayload { content_ref: String, reason: String },

    #[error("failed to persist record {record}: {source}")]
    SinkWrite {
        record: String,
        #[source]
        source: SinkError,
    },

    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

impl MonitorError {
    pub fn class(&self) -> ErrorClass {
        match self {
            MonitorError::TransientRemote(_) => ErrorClass::TransientRemote,
            MonitorError::MalformedPayload { .. } => ErrorClass::MalformedPayload,
            MonitorError::SinkWrite { .. } => ErrorClass::SinkWrite,
            MonitorError::Cancelled(_) => ErrorClass::Cancelled,
        }
    }

    pub fn from_fetch(content_ref: &str, err: FetchError) -> Self {
        match err {
            FetchError::Malformed { reason } => MonitorError::MalformedPayload {
                content_ref: content_ref.to_owned(),
                reason,
            },
            FetchError::TooLarge { limit } => MonitorError::MalformedPayload {
                content_ref: content_ref.to_owned(),
                reason: format!("body exceeds {limit} bytes"),
            },
            other => MonitorError::TransientRemote(anyhow::Error::new(other)),
        }
    }

    pub fn from_sink(record: &str, source: SinkError) -> Self {
        MonitorError::SinkWrite {
            record: record.to_owned(),
            source,
        }
    }

    /// Classifies an error bubbling out of a ledger call.
    pub fn from_ledger(err: anyhow::Error) -> Self {
        if err.downcast_ref::<Cancelled>().is_some() {
            return MonitorError::Cancelled(Cancelled);
        }
        if let Some(RpcError::MalformedResponse { method, reason }) = err.downcast_ref::<RpcError>()
        {
            return MonitorError::MalformedPayload {
                content_ref: (*method).to_owned(),
                reason: reason.clone(),
            };
        }
        MonitorError::TransientRemote(err)
    }
}
