//! Retry and Timeout Helpers
//!
//! Bounded retry with exponential backoff for transient external-service
//! failures, and a timeout wrapper that maps elapsed deadlines into the
//! caller's error type.

use std::future::Future;
use std::time::{Duration, Instant};
use tokio::time::error::Elapsed;

/// Retry an operation on transient failure with exponential backoff.
///
/// **Algorithm:**
/// 1. Attempt operation
/// 2. If successful, return result
/// 3. If the error is transient and attempts remain: log WARN, back off, retry
/// 4. Otherwise return the error (non-transient errors are never retried)
///
/// The backoff starts at `initial_backoff` and doubles after each failed attempt.
///
/// # Arguments
/// * `operation_name` - Name for logging (e.g., "index lookup")
/// * `max_attempts` - Total attempts including the first (2 = a single retry)
/// * `initial_backoff` - Delay before the first retry
/// * `is_transient` - Classifies an error as retryable
/// * `operation` - Async closure performing one attempt
pub async fn retry_transient<F, Fut, T, E, C>(
    operation_name: &str,
    max_attempts: u32,
    initial_backoff: Duration,
    is_transient: C,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    C: Fn(&E) -> bool,
{
    let start_time = Instant::now();
    let mut attempt = 0u32;
    let mut backoff = initial_backoff;

    loop {
        attempt += 1;

        if attempt > 1 {
            tracing::debug!(operation = operation_name, attempt, "Retrying operation");
        }

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::info!(
                        operation = operation_name,
                        attempt,
                        elapsed_ms = start_time.elapsed().as_millis() as u64,
                        "Operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(err) => {
                if !is_transient(&err) {
                    return Err(err);
                }

                if attempt >= max_attempts {
                    tracing::error!(
                        operation = operation_name,
                        attempt,
                        elapsed_ms = start_time.elapsed().as_millis() as u64,
                        error = %err,
                        "Operation failed: retries exhausted"
                    );
                    return Err(err);
                }

                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %err,
                    "Transient failure, backing off"
                );

                tokio::time::sleep(backoff).await;
                backoff = backoff.saturating_mul(2);
            }
        }
    }
}

/// Run `future` with a deadline; `on_timeout` builds the error when it elapses
pub async fn with_timeout<T, E, Fut, O>(limit: Duration, future: Fut, on_timeout: O) -> Result<T, E>
where
    Fut: Future<Output = Result<T, E>>,
    O: FnOnce() -> E,
{
    match tokio::time::timeout(limit, future).await {
        Ok(result) => result,
        Err(_) => Err(on_timeout()),
    }
}

/// Run `operation` under a deadline, retrying only when the deadline elapses
///
/// Errors returned by the operation itself are passed through unretried.
/// When every attempt times out, `on_timeout` builds the final error.
pub async fn retry_on_timeout<F, Fut, T, E, O>(
    operation_name: &str,
    max_attempts: u32,
    initial_backoff: Duration,
    limit: Duration,
    mut operation: F,
    on_timeout: O,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    O: FnOnce() -> E,
{
    retry_transient(
        operation_name,
        max_attempts,
        initial_backoff,
        |_: &Elapsed| true,
        || tokio::time::timeout(limit, operation()),
    )
    .await
    .unwrap_or_else(|_| Err(on_timeout()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[derive(Debug, PartialEq)]
    enum TestError {
        Flaky,
        Broken,
    }

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{:?}", self)
        }
    }

    fn transient(e: &TestError) -> bool {
        *e == TestError::Flaky
    }

    #[tokio::test]
    async fn test_succeeds_after_one_retry() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result = retry_transient("test", 2, Duration::from_millis(1), transient, || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(TestError::Flaky)
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<(), TestError> =
            retry_transient("test", 2, Duration::from_millis(1), transient, || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(TestError::Flaky)
                }
            })
            .await;

        assert_eq!(result, Err(TestError::Flaky));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<(), TestError> =
            retry_transient("test", 5, Duration::from_millis(1), transient, || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(TestError::Broken)
                }
            })
            .await;

        assert_eq!(result, Err(TestError::Broken));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_timeout_maps_error() {
        let result: Result<(), TestError> = with_timeout(
            Duration::from_millis(5),
            async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            },
            || TestError::Flaky,
        )
        .await;

        assert_eq!(result, Err(TestError::Flaky));
    }

    #[tokio::test]
    async fn test_timeout_retried_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<u32, TestError> = retry_on_timeout(
            "test",
            2,
            Duration::from_millis(1),
            Duration::from_millis(20),
            || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                    Ok(7)
                }
            },
            || TestError::Flaky,
        )
        .await;

        assert_eq!(result, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_operation_error_not_retried_on_timeout_path() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<u32, TestError> = retry_on_timeout(
            "test",
            2,
            Duration::from_millis(1),
            Duration::from_secs(5),
            || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(TestError::Broken)
                }
            },
            || TestError::Flaky,
        )
        .await;

        assert_eq!(result, Err(TestError::Broken));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_repeated_timeout_builds_final_error() {
        let result: Result<(), TestError> = retry_on_timeout(
            "test",
            2,
            Duration::from_millis(1),
            Duration::from_millis(5),
            || async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            },
            || TestError::Flaky,
        )
        .await;

        assert_eq!(result, Err(TestError::Flaky));
    }
}
