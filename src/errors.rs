//! Typed error hierarchy for the screening orchestrator.
//!
//! Four enums cover the layers a failure can originate from:
//! - `ProviderError`: one HTTP call to a model provider (recoverable)
//! - `ParseError`: provider text that is not a usable verdict (recoverable)
//! - `ConfigError`: credentials or schema problems that retrying cannot fix
//! - `ScreeningError`: failures that abort a whole screening run

use thiserror::Error;

/// Failure of a single provider call.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("HTTP {status} from {provider}: {body}")]
    Http {
        provider: String,
        status: u16,
        body: String,
    },

    #[error("Rate limited by {provider} (HTTP 429, quota exceeded)")]
    RateLimited { provider: String },

    #[error("Request to {provider} timed out after {timeout_secs}s")]
    Timeout { provider: String, timeout_secs: u64 },

    #[error("Request to {provider} failed: {message}")]
    Transport { provider: String, message: String },

    #[error("{provider} returned no completion text")]
    EmptyResponse { provider: String },
}

impl ProviderError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }
}

/// Provider text that could not be turned into a verdict.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("response contains no JSON object")]
    NoJson,

    #[error("response JSON is invalid: {0}")]
    InvalidJson(String),

    #[error("response is missing required field '{0}'")]
    MissingField(&'static str),

    #[error("field '{field}' has the wrong type: {message}")]
    InvalidField {
        field: &'static str,
        message: String,
    },
}

/// Non-retryable problems with how a provider or tier is set up.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Missing credentials for provider '{provider}' (set {env_var})")]
    MissingCredentials { provider: String, env_var: String },

    #[error("Provider '{provider}' rejected the request schema (HTTP 400): {message}")]
    SchemaRejected { provider: String, message: String },

    #[error("Provider '{provider}' refused the credentials (HTTP {status})")]
    Unauthorized { provider: String, status: u16 },

    #[error("Tier '{tier}' references unknown provider '{provider}'")]
    UnknownProvider { tier: String, provider: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Errors that abort a screening run. Per-reference failures never surface here.
#[derive(Debug, Error)]
pub enum ScreeningError {
    #[error("Failed to initialize screening run {session_id}: {source}")]
    RunInit {
        session_id: String,
        #[source]
        source: anyhow::Error,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_rate_limited_is_distinguishable() {
        let err = ProviderError::RateLimited {
            provider: "openrouter".into(),
        };
        assert!(err.is_rate_limited());
        assert!(err.to_string().contains("quota"));

        let err = ProviderError::Http {
            provider: "openrouter".into(),
            status: 503,
            body: "unavailable".into(),
        };
        assert!(!err.is_rate_limited());
        assert!(err.to_string().contains("503"));
    }

    #[test]
    fn config_error_missing_credentials_names_env_var() {
        let err = ConfigError::MissingCredentials {
            provider: "gemini".into(),
            env_var: "GEMINI_API_KEY".into(),
        };
        assert!(err.to_string().contains("GEMINI_API_KEY"));
    }

    #[test]
    fn screening_error_converts_from_config_error() {
        let inner = ConfigError::Invalid("no tiers".into());
        let err: ScreeningError = inner.into();
        match &err {
            ScreeningError::Config(ConfigError::Invalid(msg)) => assert_eq!(msg, "no tiers"),
            _ => panic!("Expected ScreeningError::Config(Invalid(...))"),
        }
    }

    #[test]
    fn run_init_error_carries_session_and_source() {
        let err = ScreeningError::RunInit {
            session_id: "abc".into(),
            source: anyhow::anyhow!("database is locked"),
        };
        let msg = err.to_string();
        assert!(msg.contains("abc"));
        assert!(msg.contains("database is locked"));
    }

    #[test]
    fn all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&ParseError::NoJson);
        assert_std_error(&ConfigError::Invalid("x".into()));
        assert_std_error(&ProviderError::EmptyResponse {
            provider: "x".into(),
        });
        assert_std_error(&ScreeningError::Other(anyhow::anyhow!("x")));
    }
}
