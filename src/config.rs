//! Configuration for screenwise, read from `screenwise.toml`.
//!
//! Layering is file → environment → CLI flags. Every field has a default, so
//! an empty or missing file yields the standard three-tier provider policy.
//!
//! ```toml
//! [screening]
//! pacing_ms = 500
//! stage = "title_abstract"
//! db_path = "screenwise.db"
//!
//! [retry]
//! max_attempts = 3
//! base_delay_ms = 2000
//! request_timeout_secs = 60
//!
//! [[providers]]
//! name = "openrouter"
//! kind = "openai"
//! base_url = "https://openrouter.ai/api/v1"
//! api_key_env = "OPENROUTER_API_KEY"
//!
//! [[tiers]]
//! name = "primary"
//! conservative = { provider = "openrouter", model = "anthropic/claude-sonnet-4" }
//! comprehensive = { provider = "openrouter", model = "openai/gpt-4o" }
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::coordinator::DEFAULT_STAGE;
use crate::errors::ConfigError;
use crate::gateway::{ProviderKind, RetryPolicy};

pub const CONFIG_FILE: &str = "screenwise.toml";
pub const PACING_ENV: &str = "SCREENWISE_PACING_MS";
pub const DB_ENV: &str = "SCREENWISE_DB";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreeningSection {
    /// Pause between references, in milliseconds.
    #[serde(default = "default_pacing_ms")]
    pub pacing_ms: u64,
    /// Screening stage recorded with every decision.
    #[serde(default = "default_stage")]
    pub stage: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_path: Option<PathBuf>,
}

impl Default for ScreeningSection {
    fn default() -> Self {
        Self {
            pacing_ms: default_pacing_ms(),
            stage: default_stage(),
            db_path: None,
        }
    }
}

fn default_pacing_ms() -> u64 {
    500
}

fn default_stage() -> String {
    DEFAULT_STAGE.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrySection {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Linear backoff unit: attempt n waits `n × base_delay_ms`.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl RetrySection {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_millis(self.base_delay_ms))
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    2000
}

fn default_request_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    pub kind: ProviderKind,
    pub base_url: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
}

impl ProviderConfig {
    fn new(name: &str, kind: ProviderKind, base_url: &str, api_key_env: &str) -> Self {
        Self {
            name: name.to_string(),
            kind,
            base_url: base_url.to_string(),
            api_key_env: api_key_env.to_string(),
        }
    }

    pub fn has_credentials(&self) -> bool {
        std::env::var(&self.api_key_env)
            .map(|v| !v.trim().is_empty())
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetConfig {
    pub provider: String,
    pub model: String,
}

impl TargetConfig {
    fn new(provider: &str, model: &str) -> Self {
        Self {
            provider: provider.to_string(),
            model: model.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierConfig {
    pub name: String,
    pub conservative: TargetConfig,
    pub comprehensive: TargetConfig,
}

fn default_providers() -> Vec<ProviderConfig> {
    vec![
        ProviderConfig::new(
            "openrouter",
            ProviderKind::OpenAi,
            "https://openrouter.ai/api/v1",
            "OPENROUTER_API_KEY",
        ),
        ProviderConfig::new(
            "openai",
            ProviderKind::OpenAi,
            "https://api.openai.com/v1",
            "OPENAI_API_KEY",
        ),
        ProviderConfig::new(
            "anthropic",
            ProviderKind::Anthropic,
            "https://api.anthropic.com/v1",
            "ANTHROPIC_API_KEY",
        ),
        ProviderConfig::new(
            "gemini",
            ProviderKind::Gemini,
            "https://generativelanguage.googleapis.com/v1beta",
            "GEMINI_API_KEY",
        ),
    ]
}

/// Primary: two top-tier models through one aggregator.
/// Secondary: aggregator plus an independent provider.
/// Tertiary: one provider, both stances.
fn default_tiers() -> Vec<TierConfig> {
    vec![
        TierConfig {
            name: "primary".into(),
            conservative: TargetConfig::new("openrouter", "anthropic/claude-sonnet-4"),
            comprehensive: TargetConfig::new("openrouter", "openai/gpt-4o"),
        },
        TierConfig {
            name: "secondary".into(),
            conservative: TargetConfig::new("openrouter", "google/gemini-2.0-flash-001"),
            comprehensive: TargetConfig::new("openai", "gpt-4o-mini"),
        },
        TierConfig {
            name: "tertiary".into(),
            conservative: TargetConfig::new("gemini", "gemini-2.0-flash"),
            comprehensive: TargetConfig::new("gemini", "gemini-2.0-flash"),
        },
    ]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenwiseConfig {
    #[serde(default)]
    pub screening: ScreeningSection,
    #[serde(default)]
    pub retry: RetrySection,
    #[serde(default = "default_providers")]
    pub providers: Vec<ProviderConfig>,
    #[serde(default = "default_tiers")]
    pub tiers: Vec<TierConfig>,
}

impl Default for ScreenwiseConfig {
    fn default() -> Self {
        Self {
            screening: ScreeningSection::default(),
            retry: RetrySection::default(),
            providers: default_providers(),
            tiers: default_tiers(),
        }
    }
}

impl ScreenwiseConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse screenwise.toml")
    }

    /// Load `path` if it exists, otherwise defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load from file, then apply environment overrides.
    pub fn resolve(path: &Path) -> Result<Self> {
        let mut config = Self::load_or_default(path)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize screenwise.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(raw) = std::env::var(PACING_ENV) {
            self.screening.pacing_ms = raw
                .trim()
                .parse()
                .with_context(|| {
                    format!(
                        "{} must be a number of milliseconds, got '{}'",
                        PACING_ENV, raw
                    )
                })?;
        }
        if let Ok(path) = std::env::var(DB_ENV) {
            if !path.trim().is_empty() {
                self.screening.db_path = Some(PathBuf::from(path));
            }
        }
        Ok(())
    }

    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.screening.pacing_ms)
    }

    /// Configured database path, or `<data dir>/screenwise/screenwise.db`.
    pub fn db_path(&self) -> PathBuf {
        self.screening.db_path.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .map(|d| d.join("screenwise"))
                .unwrap_or_else(|| PathBuf::from(".screenwise"))
                .join("screenwise.db")
        })
    }

    pub fn provider(&self, name: &str) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.name == name)
    }

    /// Structural problems that make the configuration unusable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tiers.is_empty() {
            return Err(ConfigError::Invalid("at least one [[tiers]] entry is required".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid("retry.max_attempts must be at least 1".into()));
        }

        let mut names = HashSet::new();
        for provider in &self.providers {
            if !names.insert(provider.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "provider '{}' is defined more than once",
                    provider.name
                )));
            }
        }

        for tier in &self.tiers {
            for target in [&tier.conservative, &tier.comprehensive] {
                if !names.contains(target.provider.as_str()) {
                    return Err(ConfigError::UnknownProvider {
                        tier: tier.name.clone(),
                        provider: target.provider.clone(),
                    });
                }
                if target.model.trim().is_empty() {
                    return Err(ConfigError::Invalid(format!(
                        "tier '{}' has an empty model name",
                        tier.name
                    )));
                }
            }
        }
        Ok(())
    }

    /// Non-fatal findings, e.g. tiers whose providers have no API key set.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        for tier in &self.tiers {
            let usable = [&tier.conservative, &tier.comprehensive]
                .iter()
                .filter(|t| self.provider(&t.provider).is_some_and(|p| p.has_credentials()))
                .count();
            if usable == 0 {
                warnings.push(format!(
                    "tier '{}' has no provider with credentials and will be skipped",
                    tier.name
                ));
            }
        }
        if self.screening.pacing_ms == 0 {
            warnings.push("screening.pacing_ms is 0; providers may rate-limit".into());
        }
        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::tempdir;

    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    #[test]
    fn test_defaults_encode_three_tiers() {
        let config = ScreenwiseConfig::default();
        let names: Vec<_> = config.tiers.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["primary", "secondary", "tertiary"]);
        assert_eq!(config.tiers[0].conservative.provider, "openrouter");
        assert_ne!(config.tiers[0].conservative.model, config.tiers[0].comprehensive.model);
        assert_eq!(config.tiers[1].comprehensive.provider, "openai");
        assert_eq!(config.tiers[2].conservative, config.tiers[2].comprehensive);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = ScreenwiseConfig::parse("").unwrap();
        assert_eq!(config, ScreenwiseConfig::default());
        assert_eq!(config.pacing(), Duration::from_millis(500));
        assert_eq!(config.retry.policy().max_attempts, 3);
    }

    #[test]
    fn test_parse_partial_sections() {
        let content = r#"
[screening]
pacing_ms = 0
db_path = "/tmp/screen.db"

[retry]
max_attempts = 5

[[providers]]
name = "local"
kind = "openai"
base_url = "http://localhost:8080/v1"
api_key_env = "LOCAL_KEY"

[[tiers]]
name = "only"
conservative = { provider = "local", model = "a" }
comprehensive = { provider = "local", model = "b" }
"#;
        let config = ScreenwiseConfig::parse(content).unwrap();
        assert_eq!(config.screening.pacing_ms, 0);
        assert_eq!(config.screening.stage, "title_abstract");
        assert_eq!(config.db_path(), PathBuf::from("/tmp/screen.db"));
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.base_delay_ms, 2000);
        assert_eq!(config.providers.len(), 1);
        assert_eq!(config.tiers.len(), 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_kind_is_rejected() {
        let content = r#"
[[providers]]
name = "x"
kind = "cohere"
base_url = "http://x"
api_key_env = "X"
"#;
        assert!(ScreenwiseConfig::parse(content).is_err());
    }

    #[test]
    fn test_validate_rejects_unknown_provider() {
        let mut config = ScreenwiseConfig::default();
        config.tiers[1].comprehensive.provider = "mystery".into();
        assert_eq!(
            config.validate(),
            Err(ConfigError::UnknownProvider {
                tier: "secondary".into(),
                provider: "mystery".into()
            })
        );
    }

    #[test]
    fn test_validate_rejects_empty_tiers_and_duplicates() {
        let mut config = ScreenwiseConfig::default();
        config.tiers.clear();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = ScreenwiseConfig::default();
        let dup = config.providers[0].clone();
        config.providers.push(dup);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid(msg)) if msg.contains("more than once")
        ));
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        let mut config = ScreenwiseConfig::default();
        config.screening.pacing_ms = 42;
        config.save(&path).unwrap();

        let loaded = ScreenwiseConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_or_default_without_file() {
        let dir = tempdir().unwrap();
        let config = ScreenwiseConfig::load_or_default(&dir.path().join("missing.toml")).unwrap();
        assert_eq!(config, ScreenwiseConfig::default());
    }

    #[test]
    fn test_env_overrides() {
        let _guard = ENV_MUTEX.lock().unwrap();
        let saved = (std::env::var(PACING_ENV).ok(), std::env::var(DB_ENV).ok());

        unsafe {
            std::env::set_var(PACING_ENV, "25");
            std::env::set_var(DB_ENV, "/tmp/override.db");
        }
        let mut config = ScreenwiseConfig::default();
        config.apply_env_overrides().unwrap();
        assert_eq!(config.screening.pacing_ms, 25);
        assert_eq!(config.db_path(), PathBuf::from("/tmp/override.db"));

        unsafe { std::env::set_var(PACING_ENV, "soon") };
        assert!(config.apply_env_overrides().is_err());

        unsafe {
            match saved.0 {
                Some(v) => std::env::set_var(PACING_ENV, v),
                None => std::env::remove_var(PACING_ENV),
            }
            match saved.1 {
                Some(v) => std::env::set_var(DB_ENV, v),
                None => std::env::remove_var(DB_ENV),
            }
        }
    }

    #[test]
    fn test_warnings_flag_tiers_without_credentials() {
        let mut config = ScreenwiseConfig::default();
        for provider in &mut config.providers {
            provider.api_key_env = "SCREENWISE_TEST_UNSET_KEY".into();
        }
        config.screening.pacing_ms = 0;
        let warnings = config.warnings();
        assert_eq!(warnings.len(), 4);
        assert!(warnings[0].contains("primary"));
    }
}
