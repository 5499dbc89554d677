//! Timeout helpers.

use std::future::Future;
use std::time::Duration;

use crate::error::{GptscriptError, Result};

/// Wrap a future with a timeout.
pub async fn with_timeout<T>(
    duration: Duration,
    future: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => Err(GptscriptError::Timeout(duration.as_millis() as u64)),
    }
}

/// Call `probe` every `interval` until it returns true or `duration` elapses.
pub async fn poll_until<F, Fut>(duration: Duration, interval: Duration, mut probe: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    with_timeout(duration, async {
        loop {
            if probe().await {
                return Ok(());
            }
            tokio::time::sleep(interval).await;
        }
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn poll_until_returns_once_probe_succeeds() {
        let attempts = AtomicU32::new(0);
        let counter = &attempts;
        poll_until(Duration::from_secs(5), Duration::from_millis(100), move || async move {
            counter.fetch_add(1, Ordering::SeqCst) >= 2
        })
        .await
        .unwrap();
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn poll_until_times_out() {
        let err = poll_until(Duration::from_secs(1), Duration::from_millis(100), || async {
            false
        })
        .await
        .unwrap_err();
        assert!(matches!(err, GptscriptError::Timeout(1000)));
    }
}
