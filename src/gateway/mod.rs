//! Model gateway: one call signature over every provider.
//!
//! [`ModelGateway::call`] never lets a transient provider failure escape.
//! It retries with linear backoff and, once attempts run out, degrades to an
//! error-sentinel [`ReviewerResult`]. Only configuration problems that a
//! retry cannot fix come back as `Err`.

pub mod http;
pub mod parse;

pub use http::{HttpProvider, ProviderKind};
pub use parse::{ParsedVerdict, parse_verdict};

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use screenwise_common::{FailureKind, ReviewerResult};

use crate::errors::{ConfigError, ProviderError};

/// A backend that turns a prompt into completion text.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    fn name(&self) -> &str;

    /// `Err` when the provider cannot be called at all (e.g. no API key).
    fn check_credentials(&self) -> Result<(), ConfigError>;

    async fn complete(&self, prompt: &str, model: &str) -> Result<String, ProviderError>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Delay before the attempt after `attempt` (1-based): `attempt × base_delay`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(2))
    }
}

#[derive(Clone)]
pub struct ModelGateway {
    provider: Arc<dyn CompletionProvider>,
    retry: RetryPolicy,
}

impl ModelGateway {
    pub fn new(provider: Arc<dyn CompletionProvider>, retry: RetryPolicy) -> Self {
        Self { provider, retry }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Reviewer label for a model served by this gateway.
    pub fn label(&self, model: &str) -> String {
        format!("{} via {}", model, self.provider.name())
    }

    /// Call `model` with `prompt` and return a validated verdict or a sentinel.
    pub async fn call(&self, prompt: &str, model: &str) -> Result<ReviewerResult, ConfigError> {
        let provider = self.provider.name();
        let label = self.label(model);
        self.provider.check_credentials()?;

        let mut failure = (FailureKind::ProviderError, String::new());

        for attempt in 1..=self.retry.max_attempts {
            debug!(provider, model, attempt, "Calling model");

            match self.provider.complete(prompt, model).await {
                Ok(text) => match parse_verdict(&text) {
                    Ok(verdict) => return Ok(verdict.into_result(&label)),
                    Err(e) => {
                        warn!(provider, model, attempt, error = %e, "Unusable model response");
                        failure = (
                            FailureKind::InvalidResponse,
                            format!("Model response could not be parsed: {}", e),
                        );
                    }
                },
                Err(ProviderError::Http { status: 400, body, .. }) => {
                    return Err(ConfigError::SchemaRejected {
                        provider: provider.to_string(),
                        message: body,
                    });
                }
                Err(ProviderError::Http {
                    status: status @ (401 | 403),
                    ..
                }) => {
                    return Err(ConfigError::Unauthorized {
                        provider: provider.to_string(),
                        status,
                    });
                }
                Err(e) if e.is_rate_limited() => {
                    warn!(provider, model, attempt, "Rate limited");
                    failure = (
                        FailureKind::RateLimited,
                        format!("Rate limit or quota exceeded at {} (HTTP 429)", provider),
                    );
                }
                Err(e) => {
                    warn!(provider, model, attempt, error = %e, "Provider call failed");
                    failure = (FailureKind::ProviderError, e.to_string());
                }
            }

            if attempt < self.retry.max_attempts {
                tokio::time::sleep(self.retry.delay_after(attempt)).await;
            }
        }

        let (kind, reason) = failure;
        warn!(
            provider,
            model,
            attempts = self.retry.max_attempts,
            failure = kind.as_str(),
            "Model call exhausted retries"
        );
        Ok(ReviewerResult::error_sentinel(
            &label,
            &format!(
                "Screening failed after {} attempts: {}",
                self.retry.max_attempts, reason
            ),
            kind,
        ))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted providers shared by gateway, fallback and coordinator tests.

    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub fn verdict_json(decision: &str, confidence: f64) -> String {
        format!(
            r#"{{"recommendation": "{}", "confidence": {}, "reasoning": "scripted"}}"#,
            decision, confidence
        )
    }

    /// Plays back a script of responses, then repeats the fallback response.
    pub struct ScriptedProvider {
        name: String,
        credentials: bool,
        script: Mutex<VecDeque<Result<String, ProviderError>>>,
        repeat: Box<dyn Fn(&str) -> Result<String, ProviderError> + Send + Sync>,
        calls: AtomicUsize,
    }

    impl ScriptedProvider {
        pub fn always<F>(name: &str, respond: F) -> Self
        where
            F: Fn(&str) -> Result<String, ProviderError> + Send + Sync + 'static,
        {
            Self {
                name: name.to_string(),
                credentials: true,
                script: Mutex::new(VecDeque::new()),
                repeat: Box::new(respond),
                calls: AtomicUsize::new(0),
            }
        }

        /// Always answers with a valid verdict.
        pub fn answering(name: &str, decision: &str, confidence: f64) -> Self {
            let body = verdict_json(decision, confidence);
            Self::always(name, move |_| Ok(body.clone()))
        }

        /// Always fails with HTTP 500.
        pub fn failing(name: &str) -> Self {
            let provider = name.to_string();
            Self::always(name, move |_| {
                Err(ProviderError::Http {
                    provider: provider.clone(),
                    status: 500,
                    body: "internal error".into(),
                })
            })
        }

        /// Always answers 429.
        pub fn rate_limited(name: &str) -> Self {
            let provider = name.to_string();
            Self::always(name, move |_| {
                Err(ProviderError::RateLimited {
                    provider: provider.clone(),
                })
            })
        }

        pub fn without_credentials(mut self) -> Self {
            self.credentials = false;
            self
        }

        pub fn then(self, response: Result<String, ProviderError>) -> Self {
            self.script
                .lock()
                .expect("script lock")
                .push_back(response);
            self
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CompletionProvider for ScriptedProvider {
        fn name(&self) -> &str {
            &self.name
        }

        fn check_credentials(&self) -> Result<(), ConfigError> {
            if self.credentials {
                Ok(())
            } else {
                Err(ConfigError::MissingCredentials {
                    provider: self.name.clone(),
                    env_var: format!("{}_API_KEY", self.name.to_uppercase()),
                })
            }
        }

        async fn complete(&self, prompt: &str, _model: &str) -> Result<String, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let scripted = self.script.lock().expect("script lock").pop_front();
            match scripted {
                Some(response) => response,
                None => (self.repeat)(prompt),
            }
        }
    }

    pub fn no_delay(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use screenwise_common::Decision;

    fn gateway(provider: Arc<ScriptedProvider>, attempts: u32) -> ModelGateway {
        ModelGateway::new(provider, no_delay(attempts))
    }

    #[test]
    fn test_retry_delay_is_linear() {
        let policy = RetryPolicy::new(3, Duration::from_millis(100));
        assert_eq!(policy.delay_after(1), Duration::from_millis(100));
        assert_eq!(policy.delay_after(2), Duration::from_millis(200));
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
    }

    #[tokio::test]
    async fn test_successful_call_returns_labelled_verdict() {
        let provider = Arc::new(ScriptedProvider::answering("openrouter", "include", 0.8));
        let result = gateway(provider.clone(), 3)
            .call("p", "gpt-4o")
            .await
            .unwrap();
        assert_eq!(result.decision, Decision::Include);
        assert_eq!(result.confidence, 0.8);
        assert_eq!(result.reviewer, "gpt-4o via openrouter");
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_transient_failure_then_success() {
        let provider = Arc::new(
            ScriptedProvider::answering("openai", "exclude", 0.7)
                .then(Err(ProviderError::Timeout {
                    provider: "openai".into(),
                    timeout_secs: 60,
                }))
                .then(Ok("not json at all".into())),
        );
        let result = gateway(provider.clone(), 3).call("p", "m").await.unwrap();
        assert!(result.is_valid());
        assert_eq!(result.decision, Decision::Exclude);
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_yield_sentinel() {
        let provider = Arc::new(ScriptedProvider::failing("openai"));
        let result = gateway(provider.clone(), 3).call("p", "m").await.unwrap();
        assert!(result.is_error_sentinel());
        assert_eq!(result.decision, Decision::Exclude);
        assert_eq!(result.confidence, 0.0);
        assert!(result.reviewer.ends_with("(Error)"));
        assert_eq!(result.failure, Some(FailureKind::ProviderError));
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test]
    async fn test_rate_limit_sentinel_mentions_quota() {
        let provider = Arc::new(ScriptedProvider::rate_limited("gemini"));
        let result = gateway(provider, 2).call("p", "m").await.unwrap();
        assert!(result.is_rate_limited());
        assert!(result.reasoning.to_lowercase().contains("quota"));
    }

    #[tokio::test]
    async fn test_unparseable_output_sentinel() {
        let provider = Arc::new(ScriptedProvider::always("openai", |_| {
            Ok("I would include this.".into())
        }));
        let result = gateway(provider, 2).call("p", "m").await.unwrap();
        assert_eq!(result.failure, Some(FailureKind::InvalidResponse));
        assert!(result.reasoning.contains("no JSON"));
    }

    #[tokio::test]
    async fn test_missing_credentials_propagate() {
        let provider =
            Arc::new(ScriptedProvider::answering("gemini", "include", 0.9).without_credentials());
        let err = gateway(provider.clone(), 3).call("p", "m").await.unwrap_err();
        assert!(matches!(err, ConfigError::MissingCredentials { .. }));
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_schema_rejection_and_auth_are_not_retried() {
        let provider = Arc::new(ScriptedProvider::always("openai", |_| {
            Err(ProviderError::Http {
                provider: "openai".into(),
                status: 400,
                body: "response_format unsupported".into(),
            })
        }));
        let err = gateway(provider.clone(), 3).call("p", "m").await.unwrap_err();
        assert!(matches!(err, ConfigError::SchemaRejected { .. }));
        assert_eq!(provider.calls(), 1);

        let provider = Arc::new(ScriptedProvider::always("openai", |_| {
            Err(ProviderError::Http {
                provider: "openai".into(),
                status: 401,
                body: String::new(),
            })
        }));
        let err = gateway(provider, 3).call("p", "m").await.unwrap_err();
        assert_eq!(
            err,
            ConfigError::Unauthorized {
                provider: "openai".into(),
                status: 401
            }
        );
    }
}
