use crate::error::Cancelled;
use anyhow::Result;
use std::time::Duration;
use tokio::task::yield_now;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// Bounded retry policy whose delay grows linearly: the wait after failed
/// attempt `k` (0-indexed) is `(2k + 1) * unit`.
#[derive(Clone, Copy)]
pub(crate) struct RetryBackoff<'a> {
    pub unit: Duration,
    pub max_attempts: usize,
    pub cancellation: Option<&'a CancellationToken>,
}

impl<'a> RetryBackoff<'a> {
    pub(crate) fn new(unit: Duration, max_attempts: usize) -> Self {
        Self {
            unit,
            max_attempts: max_attempts.max(1),
            cancellation: None,
        }
    }

    pub(crate) fn with_cancellation(mut self, token: &'a CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    pub(crate) fn delay_after(&self, failed_attempt: usize) -> Duration {
        let factor = failed_attempt
            .saturating_mul(2)
            .saturating_add(1)
            .min(u32::MAX as usize) as u32;
        self.unit.saturating_mul(factor)
    }
}

pub(crate) enum RetryDisposition {
    Retry,
    Abort,
}

/// Runs `operation` until it succeeds, `classify_error` aborts, attempts run
/// out, or the cancellation token fires. `on_retry` receives the 1-based
/// attempt number, the upcoming delay, the error, and whether another attempt
/// will follow.
pub(crate) async fn retry_with_backoff<'a, T, F, Fut, L, C>(
    config: RetryBackoff<'a>,
    mut operation: F,
    mut on_retry: L,
    mut classify_error: C,
) -> Result<T>
where
    F: FnMut(usize) -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
    L: FnMut(usize, Duration, &anyhow::Error, bool),
    C: FnMut(usize, &anyhow::Error) -> RetryDisposition,
{
    let mut attempt = 0;

    loop {
        attempt += 1;

        if let Some(token) = config.cancellation {
            if token.is_cancelled() {
                return Err(Cancelled.into());
            }
        }

        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => match classify_error(attempt, &err) {
                RetryDisposition::Abort => return Err(err),
                RetryDisposition::Retry => {
                    let exhausted = attempt >= config.max_attempts;
                    let delay = config.delay_after(attempt - 1);

                    on_retry(attempt, delay, &err, !exhausted);

                    if exhausted {
                        return Err(err);
                    }

                    match config.cancellation {
                        Some(token) => sleep_with_cancellation(delay, token).await?,
                        None => sleep(delay).await,
                    }
                }
            },
        }
    }
}

/// Sleeps for `delay` unless `token` fires first. A cancelled token is
/// reported even for zero delays so no new work starts after shutdown.
pub(crate) async fn sleep_with_cancellation(
    delay: Duration,
    token: &CancellationToken,
) -> Result<(), Cancelled> {
    if token.is_cancelled() {
        return Err(Cancelled);
    }

    if delay.is_zero() {
        yield_now().await;
        return Ok(());
    }

    tokio::select! {
        _ = token.cancelled() => Err(Cancelled),
        _ = sleep(delay) => Ok(()),
    }
}
