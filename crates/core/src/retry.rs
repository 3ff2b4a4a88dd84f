//! Bounded retry with exponential backoff for external service calls.
//!
//! Every call to the embedding, vector index or generation services goes
//! through [`retry_transient`]. Each attempt carries its own timeout; a
//! timeout counts as a transient failure and is retried like any other.

use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// Retry and timeout settings shared by the gateways.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,

    /// Delay before the second attempt
    pub initial_backoff: Duration,

    /// Upper bound for any single delay
    pub max_backoff: Duration,

    /// Timeout applied to each individual attempt
    pub call_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(10),
            call_timeout: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries (still applies the call timeout).
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay to wait after the given failed attempt (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.initial_backoff
            .saturating_mul(1u32 << exponent)
            .min(self.max_backoff)
    }
}

/// Run `call` until it succeeds, fails permanently, or the attempts run out.
///
/// Only errors for which [`AppError::is_transient`] holds are retried.
/// `on_timeout` builds the transient error reported when an attempt exceeds
/// `policy.call_timeout`.
pub async fn retry_transient<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    on_timeout: fn(String) -> AppError,
    mut call: F,
) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;

        let error = match tokio::time::timeout(policy.call_timeout, call()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) if !e.is_transient() => return Err(e),
            Ok(Err(e)) => e,
            Err(_) => on_timeout(format!(
                "{} timed out after {:.1}s",
                operation,
                policy.call_timeout.as_secs_f64()
            )),
        };

        if attempt >= max_attempts {
            tracing::error!(
                "{} failed after {} attempt(s): {}",
                operation,
                attempt,
                error
            );
            return Err(error);
        }

        let backoff = policy.backoff_for(attempt);
        tracing::warn!(
            "{} failed (attempt {}/{}), retrying in {}ms: {}",
            operation,
            attempt,
            max_attempts,
            backoff.as_millis(),
            error
        );
        tokio::time::sleep(backoff).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(4),
            call_timeout: Duration::from_millis(200),
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(350),
            ..RetryPolicy::default()
        };
        assert_eq!(policy.backoff_for(1), Duration::from_millis(100));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(200));
        assert_eq!(policy.backoff_for(3), Duration::from_millis(350));
        assert_eq!(policy.backoff_for(40), Duration::from_millis(350));
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = retry_transient(
            &fast_policy(3),
            "embed",
            AppError::RetrievalUnavailable,
            || async {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(AppError::RetrievalUnavailable("connection refused".into()))
                } else {
                    Ok(n)
                }
            },
        )
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_returns_last_error() {
        let calls = AtomicU32::new(0);
        let result: AppResult<()> = retry_transient(
            &fast_policy(3),
            "complete",
            AppError::GenerationUnavailable,
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(AppError::GenerationUnavailable("503".into()))
            },
        )
        .await;

        assert!(matches!(result, Err(AppError::GenerationUnavailable(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: AppResult<()> = retry_transient(
            &fast_policy(5),
            "search",
            AppError::RetrievalUnavailable,
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(AppError::CollectionNotFound("document_chunks".into()))
            },
        )
        .await;

        assert!(matches!(result, Err(AppError::CollectionNotFound(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_timeout_counts_as_transient() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy {
            call_timeout: Duration::from_millis(10),
            ..fast_policy(2)
        };
        let result: AppResult<()> = retry_transient(
            &policy,
            "complete",
            AppError::GenerationUnavailable,
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok(())
            },
        )
        .await;

        match result {
            Err(AppError::GenerationUnavailable(msg)) => assert!(msg.contains("timed out")),
            other => panic!("expected timeout error, got {:?}", other),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
