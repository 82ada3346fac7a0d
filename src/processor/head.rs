//! Head reads with bounded retries. Exhausting the retries is not an error:
//! the pass simply has no new work.

use super::backoff::{retry_with_backoff, RetryBackoff, RetryDisposition};
use super::planner::BatchId;
use crate::error::Cancelled;
use crate::ledger::LedgerClient;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub struct ResilientHeadReader {
    ledger: Arc<dyn LedgerClient>,
    max_retries: usize,
    backoff_unit: Duration,
}

impl ResilientHeadReader {
    pub fn new(ledger: Arc<dyn LedgerClient>, max_retries: usize, backoff_unit: Duration) -> Self {
        Self {
            ledger,
            max_retries: max_retries.max(1),
            backoff_unit,
        }
    }

    pub fn max_retries(&self) -> usize {
        self.max_retries
    }

    /// Returns the ledger head, `Ok(None)` when every attempt failed, or
    /// `Err(Cancelled)` as soon as `shutdown` fires.
    pub async fn read_head(&self, shutdown: &CancellationToken) -> Result<Option<BatchId>, Cancelled> {
        let config =
            RetryBackoff::new(self.backoff_unit, self.max_retries).with_cancellation(shutdown);
        let ledger = &self.ledger;

        let result = retry_with_backoff(
            config,
            |_| async move {
                tokio::select! {
                    _ = shutdown.cancelled() => Err(Cancelled.into()),
                    head = ledger.head() => head,
                }
            },
            |attempt, backoff, err, will_retry| {
                if will_retry {
                    tracing::warn!(
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %err,
                        "ledger head read failed; retrying"
                    );
                }
            },
            |_, err| {
                if err.downcast_ref::<Cancelled>().is_some() {
                    RetryDisposition::Abort
                } else {
                    RetryDisposition::Retry
                }
            },
        )
        .await;

        match result {
            Ok(head) => Ok(Some(head)),
            Err(err) if err.downcast_ref::<Cancelled>().is_some() => Err(Cancelled),
            Err(err) => {
                tracing::warn!(
                    attempts = self.max_retries,
                    error = %err,
                    "ledger head unavailable after retries"
                );
                Ok(None)
            }
        }
    }
}
