//! Engine error taxonomy and the retry wrapper around transient
//! failures. See spec.md §4.1 and §7.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

/// The two engine failure modes plus the special-cased 404, as defined
/// in spec.md §7's error table. `NotFound` is deliberately distinct
/// from `Permanent` because callers treat it as success (the container
/// is already gone) rather than logging a warning.
#[derive(Error, Debug, Clone)]
pub enum EngineError {
    #[error("transient engine error: {0}")]
    Transient(String),
    #[error("permanent engine error: {0}")]
    Permanent(String),
    #[error("not found: {0}")]
    NotFound(String),
}

impl EngineError {
    pub fn is_transient(&self) -> bool {
        matches!(self, EngineError::Transient(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, EngineError::NotFound(_))
    }
}

impl From<bollard::errors::Error> for EngineError {
    fn from(err: bollard::errors::Error) -> Self {
        classify(err)
    }
}

/// Classify a raw bollard error into the three buckets the rest of the
/// agent reasons about: engine 5xx/network/timeout is `Transient`,
/// engine 4xx other than 404 is `Permanent`, 404 is `NotFound`.
fn classify(err: bollard::errors::Error) -> EngineError {
    match err {
        bollard::errors::Error::DockerResponseServerError {
            status_code: 404,
            message,
        } => EngineError::NotFound(message),
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } if (500..600).contains(&status_code) => {
            EngineError::Transient(format!("engine {status_code}: {message}"))
        }
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } => EngineError::Permanent(format!("engine {status_code}: {message}")),
        other => EngineError::Transient(other.to_string()),
    }
}

/// Retry policy: up to `tries` attempts total. The first `tries - 1`
/// attempts are protected — a `Transient` failure sleeps
/// `base_delay * 2^attempt` and retries; any other error (or a
/// `Transient` on the final protected attempt) is *not* what ends the
/// loop early for non-transient errors, which are surfaced
/// immediately. After the protected attempts are exhausted, one final
/// unprotected call is made and its result — success or failure —
/// propagates as-is.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub tries: u32,
    pub base_delay: Duration,
    pub backoff: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            tries: 5,
            base_delay: Duration::from_secs(3),
            backoff: 2,
        }
    }
}

pub async fn with_retry<T, F, Fut>(
    op_name: &str,
    policy: RetryPolicy,
    mut f: F,
) -> Result<T, EngineError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, EngineError>>,
{
    let mut delay = policy.base_delay;
    for attempt in 0..policy.tries.saturating_sub(1) {
        match f().await {
            Ok(value) => return Ok(value),
            Err(EngineError::Transient(msg)) => {
                tracing::warn!(
                    op = op_name,
                    attempt,
                    delay_s = delay.as_secs(),
                    error = %msg,
                    "transient engine error, retrying"
                );
                tokio::time::sleep(delay).await;
                delay *= policy.backoff;
            }
            Err(other) => return Err(other),
        }
    }
    f().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_transient_then_succeeds() {
        let attempts = AtomicU32::new(0);
        let policy = RetryPolicy {
            tries: 5,
            base_delay: Duration::from_millis(1),
            backoff: 2,
        };
        let result = with_retry("test_op", policy, || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(EngineError::Transient("not yet".to_string()))
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn surfaces_permanent_error_immediately() {
        let attempts = AtomicU32::new(0);
        let policy = RetryPolicy {
            tries: 5,
            base_delay: Duration::from_millis(1),
            backoff: 2,
        };
        let result: Result<(), EngineError> = with_retry("test_op", policy, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(EngineError::Permanent("bad request".to_string())) }
        })
        .await;
        assert!(matches!(result, Err(EngineError::Permanent(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausts_retries_then_propagates_final_attempt() {
        let attempts = AtomicU32::new(0);
        let policy = RetryPolicy {
            tries: 3,
            base_delay: Duration::from_millis(1),
            backoff: 2,
        };
        let result: Result<(), EngineError> = with_retry("test_op", policy, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(EngineError::Transient("still down".to_string())) }
        })
        .await;
        assert!(result.is_err());
        // 2 protected attempts + 1 final unprotected attempt.
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn classify_maps_404_to_not_found() {
        let err = bollard::errors::Error::DockerResponseServerError {
            status_code: 404,
            message: "no such container".to_string(),
        };
        assert!(matches!(classify(err), EngineError::NotFound(_)));
    }

    #[test]
    fn classify_maps_5xx_to_transient() {
        let err = bollard::errors::Error::DockerResponseServerError {
            status_code: 503,
            message: "overloaded".to_string(),
        };
        assert!(matches!(classify(err), EngineError::Transient(_)));
    }

    #[test]
    fn classify_maps_other_4xx_to_permanent() {
        let err = bollard::errors::Error::DockerResponseServerError {
            status_code: 400,
            message: "bad request".to_string(),
        };
        assert!(matches!(classify(err), EngineError::Permanent(_)));
    }
}
