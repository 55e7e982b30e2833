//! HTTP text-completion providers.
//!
//! One [`HttpProvider`] per configured provider entry. The wire format is
//! chosen by [`ProviderKind`]; everything after "give me the completion text"
//! is provider-agnostic and lives in the gateway.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::errors::{ConfigError, ProviderError};
use crate::gateway::CompletionProvider;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_OUTPUT_TOKENS: u32 = 2048;
const TEMPERATURE: f64 = 0.1;

/// Wire protocol spoken by a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// OpenAI-compatible chat completions (OpenAI, OpenRouter).
    OpenAi,
    /// Anthropic messages API.
    Anthropic,
    /// Google Gemini `generateContent`.
    Gemini,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Gemini => "gemini",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" | "openrouter" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            "gemini" | "google" => Ok(Self::Gemini),
            _ => Err(format!(
                "Invalid provider kind '{}'. Valid values: openai, anthropic, gemini",
                s
            )),
        }
    }
}

/// A provider reached over HTTP with an API key read from the environment.
pub struct HttpProvider {
    name: String,
    kind: ProviderKind,
    base_url: String,
    api_key_env: String,
    api_key: Option<String>,
    timeout: Duration,
    client: reqwest::Client,
}

impl HttpProvider {
    /// Create a provider, resolving the API key from `api_key_env` now.
    pub fn new(name: &str, kind: ProviderKind, base_url: &str, api_key_env: &str) -> Self {
        let api_key = std::env::var(api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty());
        Self {
            name: name.to_string(),
            kind,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key_env: api_key_env.to_string(),
            api_key,
            timeout: Duration::from_secs(60),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override the key resolved from the environment.
    pub fn with_api_key(mut self, api_key: &str) -> Self {
        self.api_key = Some(api_key.to_string());
        self
    }

    fn endpoint(&self, model: &str) -> String {
        match self.kind {
            ProviderKind::OpenAi => format!("{}/chat/completions", self.base_url),
            ProviderKind::Anthropic => format!("{}/messages", self.base_url),
            ProviderKind::Gemini => format!("{}/models/{}:generateContent", self.base_url, model),
        }
    }

    fn request_body(&self, prompt: &str, model: &str) -> Value {
        match self.kind {
            ProviderKind::OpenAi => json!({
                "model": model,
                "messages": [{ "role": "user", "content": prompt }],
                "temperature": TEMPERATURE,
            }),
            ProviderKind::Anthropic => json!({
                "model": model,
                "max_tokens": MAX_OUTPUT_TOKENS,
                "temperature": TEMPERATURE,
                "messages": [{ "role": "user", "content": prompt }],
            }),
            ProviderKind::Gemini => json!({
                "contents": [{ "parts": [{ "text": prompt }] }],
                "generationConfig": {
                    "temperature": TEMPERATURE,
                    "maxOutputTokens": MAX_OUTPUT_TOKENS,
                },
            }),
        }
    }

    fn map_transport_error(&self, err: reqwest::Error) -> ProviderError {
        if err.is_timeout() {
            ProviderError::Timeout {
                provider: self.name.clone(),
                timeout_secs: self.timeout.as_secs(),
            }
        } else {
            ProviderError::Transport {
                provider: self.name.clone(),
                message: err.to_string(),
            }
        }
    }

    fn map_http_error(&self, status: reqwest::StatusCode, body: &str) -> ProviderError {
        match status.as_u16() {
            429 => ProviderError::RateLimited {
                provider: self.name.clone(),
            },
            code => ProviderError::Http {
                provider: self.name.clone(),
                status: code,
                body: truncate(body, 500),
            },
        }
    }
}

#[async_trait]
impl CompletionProvider for HttpProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn check_credentials(&self) -> Result<(), ConfigError> {
        match self.api_key {
            Some(_) => Ok(()),
            None => Err(ConfigError::MissingCredentials {
                provider: self.name.clone(),
                env_var: self.api_key_env.clone(),
            }),
        }
    }

    async fn complete(&self, prompt: &str, model: &str) -> Result<String, ProviderError> {
        let api_key = self.api_key.as_deref().unwrap_or_default();
        let request = self
            .client
            .post(self.endpoint(model))
            .timeout(self.timeout)
            .json(&self.request_body(prompt, model));

        let request = match self.kind {
            ProviderKind::OpenAi => request.bearer_auth(api_key),
            ProviderKind::Anthropic => request
                .header("x-api-key", api_key)
                .header("anthropic-version", ANTHROPIC_VERSION),
            ProviderKind::Gemini => request.header("x-goog-api-key", api_key),
        };

        let response = request
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        if !status.is_success() {
            return Err(self.map_http_error(status, &body));
        }

        let json: Value = serde_json::from_str(&body).map_err(|e| ProviderError::Transport {
            provider: self.name.clone(),
            message: format!("response envelope is not JSON: {}", e),
        })?;

        extract_completion_text(self.kind, &json)
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| ProviderError::EmptyResponse {
                provider: self.name.clone(),
            })
    }
}

/// Pull the completion text out of a provider's response envelope.
pub fn extract_completion_text(kind: ProviderKind, json: &Value) -> Option<String> {
    let text = match kind {
        ProviderKind::OpenAi => json["choices"][0]["message"]["content"].as_str(),
        ProviderKind::Anthropic => json["content"][0]["text"].as_str(),
        ProviderKind::Gemini => json["candidates"][0]["content"]["parts"][0]["text"].as_str(),
    };
    text.map(str::to_string)
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer, kind: ProviderKind) -> HttpProvider {
        HttpProvider::new("test", kind, &server.uri(), "SCREENWISE_TEST_UNSET_KEY")
            .with_api_key("sk-test")
            .with_timeout(Duration::from_secs(5))
    }

    #[test]
    fn test_provider_kind_from_str() {
        assert_eq!("openrouter".parse::<ProviderKind>().unwrap(), ProviderKind::OpenAi);
        assert_eq!("Anthropic".parse::<ProviderKind>().unwrap(), ProviderKind::Anthropic);
        assert_eq!("gemini".parse::<ProviderKind>().unwrap(), ProviderKind::Gemini);
        assert!("cohere".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn test_missing_key_is_config_error() {
        let provider = HttpProvider::new(
            "gemini",
            ProviderKind::Gemini,
            "http://localhost",
            "SCREENWISE_TEST_UNSET_KEY",
        );
        match provider.check_credentials() {
            Err(ConfigError::MissingCredentials { env_var, .. }) => {
                assert_eq!(env_var, "SCREENWISE_TEST_UNSET_KEY")
            }
            other => panic!("Expected MissingCredentials, got {:?}", other),
        }
    }

    #[test]
    fn test_extract_completion_text_per_kind() {
        let openai = json!({"choices": [{"message": {"content": "a"}}]});
        let anthropic = json!({"content": [{"type": "text", "text": "b"}]});
        let gemini = json!({"candidates": [{"content": {"parts": [{"text": "c"}]}}]});
        assert_eq!(extract_completion_text(ProviderKind::OpenAi, &openai).as_deref(), Some("a"));
        assert_eq!(
            extract_completion_text(ProviderKind::Anthropic, &anthropic).as_deref(),
            Some("b")
        );
        assert_eq!(extract_completion_text(ProviderKind::Gemini, &gemini).as_deref(), Some("c"));
        assert!(extract_completion_text(ProviderKind::Gemini, &openai).is_none());
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé...");
        assert_eq!(truncate("hi", 5), "hi");
    }

    #[tokio::test]
    async fn test_openai_completion() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "{\"ok\":true}"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let text = provider(&server, ProviderKind::OpenAi)
            .complete("prompt", "gpt-4o")
            .await
            .unwrap();
        assert_eq!(text, "{\"ok\":true}");
    }

    #[tokio::test]
    async fn test_anthropic_sends_version_header() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .and(header("x-api-key", "sk-test"))
            .and(header("anthropic-version", ANTHROPIC_VERSION))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "content": [{"type": "text", "text": "hello"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let text = provider(&server, ProviderKind::Anthropic)
            .complete("prompt", "claude-sonnet-4")
            .await
            .unwrap();
        assert_eq!(text, "hello");
    }

    #[tokio::test]
    async fn test_gemini_uses_model_in_path() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-2.0-flash:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{"content": {"parts": [{"text": "g"}]}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let text = provider(&server, ProviderKind::Gemini)
            .complete("prompt", "gemini-2.0-flash")
            .await
            .unwrap();
        assert_eq!(text, "g");
    }

    #[tokio::test]
    async fn test_429_maps_to_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let err = provider(&server, ProviderKind::OpenAi)
            .complete("prompt", "m")
            .await
            .unwrap_err();
        assert!(err.is_rate_limited());
    }

    #[tokio::test]
    async fn test_5xx_maps_to_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let err = provider(&server, ProviderKind::OpenAi)
            .complete("prompt", "m")
            .await
            .unwrap_err();
        match err {
            ProviderError::Http { status, body, .. } => {
                assert_eq!(status, 503);
                assert_eq!(body, "overloaded");
            }
            other => panic!("Expected Http error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_content_is_empty_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"choices": [{"message": {"content": "  "}}]})),
            )
            .mount(&server)
            .await;

        let err = provider(&server, ProviderKind::OpenAi)
            .complete("prompt", "m")
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::EmptyResponse { .. }));
    }
}
