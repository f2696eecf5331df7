//! Bounded retry around a model call
//!
//! Transient backend failures (timeouts, connection errors, rate limits) are
//! retried with a short linear backoff. Whatever is left after the last
//! attempt is mapped onto the engine's typed errors so callers can branch on
//! "offline" versus "timeout" and show the matching hint.

use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use sdk::errors::EngineError;

use super::{LLMError, LLMProvider, LLMResponse, Message};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,

    /// Wait before attempt `n + 1` is `backoff * n`
    pub backoff: Duration,

    /// Wait after a rate-limit response
    pub rate_limit_wait: Duration,

    /// Deadline for a single attempt, on top of the HTTP client's own timeout
    pub attempt_timeout: Option<Duration>,
}

impl RetryPolicy {
    /// Commander calls: three attempts, long pause on rate limits
    pub fn commander() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_secs(2),
            rate_limit_wait: Duration::from_secs(30),
            attempt_timeout: None,
        }
    }

    /// Worker calls: one retry, bounded per attempt
    pub fn worker(attempt_timeout: Duration) -> Self {
        Self {
            max_attempts: 2,
            backoff: Duration::from_millis(250),
            rate_limit_wait: Duration::from_secs(1),
            attempt_timeout: Some(attempt_timeout),
        }
    }

    fn delay_after(&self, attempt: u32, err: &LLMError) -> Duration {
        match err {
            LLMError::RateLimitExceeded => self.rate_limit_wait,
            _ => self.backoff * attempt,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::commander()
    }
}

impl From<LLMError> for EngineError {
    fn from(err: LLMError) -> Self {
        match err {
            LLMError::Timeout => EngineError::BackendTimeout { attempts: 1 },
            LLMError::ProviderUnavailable(msg) | LLMError::NetworkError(msg) => {
                EngineError::ServiceOffline(msg)
            }
            LLMError::RateLimitExceeded => EngineError::BackendRateLimited,
            other => EngineError::LLMProvider(other.to_string()),
        }
    }
}

/// Call `provider`, retrying transient failures per `policy`
pub async fn generate_with_retry(
    provider: &dyn LLMProvider,
    messages: &[Message],
    policy: &RetryPolicy,
) -> Result<LLMResponse, EngineError> {
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        let result = match policy.attempt_timeout {
            Some(limit) => timeout(limit, provider.generate(messages))
                .await
                .unwrap_or(Err(LLMError::Timeout)),
            None => provider.generate(messages).await,
        };

        let err = match result {
            Ok(response) => {
                if attempt > 1 {
                    debug!("{} succeeded on attempt {}", provider.name(), attempt);
                }
                return Ok(response);
            }
            Err(err) => err,
        };

        if !err.is_transient() || attempt >= attempts {
            warn!(
                "{} call failed after {} attempt(s): {}",
                provider.name(),
                attempt,
                err
            );
            return Err(match err {
                LLMError::Timeout => EngineError::BackendTimeout { attempts: attempt },
                other => other.into(),
            });
        }

        let delay = policy.delay_after(attempt, &err);
        warn!(
            "{} attempt {}/{} failed ({}), retrying in {:?}",
            provider.name(),
            attempt,
            attempts,
            err,
            delay
        );
        sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::FinalAnswer;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Replays a scripted sequence of results
    struct Scripted {
        script: Mutex<Vec<crate::llm::Result<LLMResponse>>>,
        calls: AtomicU32,
    }

    impl Scripted {
        fn new(mut script: Vec<crate::llm::Result<LLMResponse>>) -> Self {
            script.reverse();
            Self {
                script: Mutex::new(script),
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl LLMProvider for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }
        fn is_local(&self) -> bool {
            true
        }
        fn estimated_cost(&self, _tokens: usize) -> f64 {
            0.0
        }
        async fn generate(&self, _messages: &[Message]) -> crate::llm::Result<LLMResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.script
                .lock()
                .unwrap()
                .pop()
                .unwrap_or(Err(LLMError::Timeout))
        }
    }

    fn fast(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            backoff: Duration::from_millis(1),
            rate_limit_wait: Duration::from_millis(1),
            attempt_timeout: None,
        }
    }

    fn answer(text: &str) -> crate::llm::Result<LLMResponse> {
        Ok(LLMResponse::FinalAnswer(FinalAnswer::new(text)))
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failure() {
        let provider = Scripted::new(vec![Err(LLMError::Timeout), answer("ok")]);
        let response = generate_with_retry(&provider, &[], &fast(3)).await.unwrap();
        assert_eq!(response.into_text(), "ok");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_timeout_reports_attempt_count() {
        let provider = Scripted::new(vec![]);
        let err = generate_with_retry(&provider, &[], &fast(2)).await.unwrap_err();
        assert!(matches!(err, EngineError::BackendTimeout { attempts: 2 }));
    }

    #[tokio::test]
    async fn test_offline_maps_to_service_offline() {
        let provider = Scripted::new(vec![
            Err(LLMError::ProviderUnavailable("down".into())),
            Err(LLMError::ProviderUnavailable("down".into())),
        ]);
        let err = generate_with_retry(&provider, &[], &fast(2)).await.unwrap_err();
        assert!(matches!(err, EngineError::ServiceOffline(_)));
    }

    #[tokio::test]
    async fn test_permanent_errors_are_not_retried() {
        let provider = Scripted::new(vec![Err(LLMError::AuthenticationFailed("no".into()))]);
        let err = generate_with_retry(&provider, &[], &fast(3)).await.unwrap_err();
        assert!(matches!(err, EngineError::LLMProvider(_)));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }
}
