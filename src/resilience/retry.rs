//! Bounded retry with fixed backoff.

use std::future::Future;
use std::time::Duration;

/// Returned when every attempt was used without the condition holding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryExhausted {
    pub attempts: u32,
}

impl std::fmt::Display for RetryExhausted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "condition still false after {} attempts", self.attempts)
    }
}

impl std::error::Error for RetryExhausted {}

/// Evaluate `check` up to `attempts` times, sleeping `backoff` between
/// evaluations. The first evaluation is immediate. Returns the number of
/// attempts used.
pub async fn retry_fixed<F, Fut>(
    backoff: Duration,
    attempts: u32,
    mut check: F,
) -> Result<u32, RetryExhausted>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let mut used = 0;
    let outcome = poll_fixed(backoff, attempts, || {
        used += 1;
        let fut = check();
        async move { fut.await.then_some(()) }
    })
    .await;
    outcome.map(|()| used)
}

/// Like `retry_fixed`, but `poll` yields a value once it is ready.
pub async fn poll_fixed<T, F, Fut>(
    backoff: Duration,
    attempts: u32,
    mut poll: F,
) -> Result<T, RetryExhausted>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    for attempt in 1..=attempts {
        if let Some(value) = poll().await {
            return Ok(value);
        }
        if attempt < attempts {
            tokio::time::sleep(backoff).await;
        }
    }
    Err(RetryExhausted { attempts })
}
