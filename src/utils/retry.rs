// Retry with exponential backoff

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::warn;

/// Run `operation` up to `max_attempts` times, doubling the delay after each
/// failure (capped at 32x `base_delay`). The last error is returned.
pub async fn with_retry<F, Fut, T, E>(
    mut operation: F,
    max_attempts: u32,
    base_delay: Duration,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(error) => {
                attempt += 1;
                if attempt >= max_attempts {
                    return Err(error);
                }

                let delay = base_delay * 2u32.pow((attempt - 1).min(5));
                warn!(attempt, max_attempts, delay_ms = delay.as_millis() as u64, error = %error, "Retrying after failure");
                sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<u32, String> = with_retry(
            move || async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(format!("attempt {} failed", n))
                } else {
                    Ok(n)
                }
            },
            3,
            Duration::from_millis(1),
        )
        .await;

        assert_eq!(result, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_returns_last_error() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), String> = with_retry(
            move || async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                Err(format!("failure {}", n))
            },
            2,
            Duration::from_millis(1),
        )
        .await;

        assert_eq!(result, Err("failure 2".to_string()));
    }

    #[tokio::test]
    async fn test_zero_attempts_runs_once() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let _: Result<(), String> = with_retry(
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("nope".to_string())
            },
            0,
            Duration::from_millis(1),
        )
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
