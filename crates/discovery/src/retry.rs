use crate::{DiscoveryError, ProcessContext, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time;

/// Bounded retry settings for one discovery step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    #[must_use]
    pub const fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    /// Many quick attempts, for providers backed by an in-memory code index.
    #[must_use]
    pub const fn fast() -> Self {
        Self::new(20, Duration::from_millis(250))
    }

    /// Few widely spaced attempts, for providers that hit slow machinery.
    #[must_use]
    pub const fn patient() -> Self {
        Self::new(3, Duration::from_secs(15))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fast()
    }
}

/// Result of a retried operation.
#[derive(Debug)]
pub enum RetryOutcome<T> {
    Success(T),
    /// The token fired; nothing was recorded and no further attempt ran.
    Cancelled,
    /// All attempts failed; the last error was recorded into the context.
    Exhausted(DiscoveryError),
}

impl<T> RetryOutcome<T> {
    /// Collapses to the caller's view: "found nothing this round" on
    /// exhaustion or cancellation.
    #[must_use]
    pub fn into_option(self) -> Option<T> {
        match self {
            Self::Success(value) => Some(value),
            Self::Cancelled | Self::Exhausted(_) => None,
        }
    }
}

/// Runs `op` up to `policy.max_attempts` times with a fixed delay between
/// attempts.
///
/// Cancellation, whether observed on the token or returned by the operation,
/// propagates immediately and is never retried. On exhaustion the final
/// error is recorded into the context under `source` and callers proceed
/// without a result.
pub async fn retry<T, F, Fut>(
    policy: RetryPolicy,
    ctx: &ProcessContext,
    source: &str,
    mut op: F,
) -> RetryOutcome<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut last_error = None;

    for attempt in 1..=max_attempts {
        if ctx.is_cancelled() {
            return RetryOutcome::Cancelled;
        }

        match op().await {
            Ok(value) => return RetryOutcome::Success(value),
            Err(DiscoveryError::Cancelled) => return RetryOutcome::Cancelled,
            Err(err) => {
                log::debug!("{source}: attempt {attempt}/{max_attempts} failed: {err}");
                last_error = Some(err);
                if attempt < max_attempts {
                    time::sleep(policy.delay).await;
                }
            }
        }
    }

    let error =
        last_error.unwrap_or_else(|| DiscoveryError::Other("retry attempts exhausted".into()));
    ctx.record_error(source, error.clone());
    RetryOutcome::Exhausted(error)
}
