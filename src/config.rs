//! Per-task configuration
//!
//! A `TaskConfig` is assembled once by the worker (CLI flags, optional TOML
//! file, environment credentials) and then only ever borrowed.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Missing credential {0} for live generation")]
    MissingCredential(&'static str),

    #[error("Invalid setting: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// How card content is produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Deterministic offline placeholders
    #[default]
    Stub,
    /// External generation providers
    Live,
}

/// Image generation backend for the live strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ImageBackend {
    #[default]
    Fal,
    Replicate,
}

/// API keys for the live providers
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default, skip_serializing)]
    pub openai_key: Option<String>,
    #[serde(default, skip_serializing)]
    pub fal_key: Option<String>,
    #[serde(default, skip_serializing)]
    pub replicate_token: Option<String>,
}

impl Credentials {
    /// Read credentials from `OPENAI_API_KEY`, `FAL_KEY` and `REPLICATE_API_TOKEN`
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        Self {
            openai_key: var("OPENAI_API_KEY"),
            fal_key: var("FAL_KEY"),
            replicate_token: var("REPLICATE_API_TOKEN"),
        }
    }

    /// Fill unset keys from another set
    pub fn or(self, fallback: Credentials) -> Self {
        Self {
            openai_key: self.openai_key.or(fallback.openai_key),
            fal_key: self.fal_key.or(fallback.fal_key),
            replicate_token: self.replicate_token.or(fallback.replicate_token),
        }
    }
}

/// Provider endpoints and models
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    #[serde(default = "default_openai_base_url")]
    pub openai_base_url: String,
    #[serde(default = "default_text_model")]
    pub text_model: String,
    #[serde(default)]
    pub image_backend: ImageBackend,
    #[serde(default = "default_fal_base_url")]
    pub fal_base_url: String,
    #[serde(default = "default_fal_image_model")]
    pub fal_image_model: String,
    #[serde(default = "default_fal_audio_model")]
    pub fal_audio_model: String,
    #[serde(default = "default_replicate_base_url")]
    pub replicate_base_url: String,
    #[serde(default = "default_replicate_model")]
    pub replicate_model: String,
    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_text_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_fal_base_url() -> String {
    "https://fal.run".to_string()
}

fn default_fal_image_model() -> String {
    "fal-ai/flux-2/flash".to_string()
}

fn default_fal_audio_model() -> String {
    "fal-ai/minimax/speech-2.6-turbo".to_string()
}

fn default_replicate_base_url() -> String {
    "https://api.replicate.com/v1".to_string()
}

fn default_replicate_model() -> String {
    "black-forest-labs/flux-schnell".to_string()
}

fn default_request_timeout() -> u64 {
    120
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            openai_base_url: default_openai_base_url(),
            text_model: default_text_model(),
            image_backend: ImageBackend::default(),
            fal_base_url: default_fal_base_url(),
            fal_image_model: default_fal_image_model(),
            fal_audio_model: default_fal_audio_model(),
            replicate_base_url: default_replicate_base_url(),
            replicate_model: default_replicate_model(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Everything a single task needs to know
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    #[serde(default = "default_deck_name")]
    pub deck_name: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default)]
    pub strategy: Strategy,
    /// Generate pronunciation audio in live mode
    #[serde(default)]
    pub with_audio: bool,
    /// Attempts per record before the task fails
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    /// Prefix the URL-encoded word is appended to
    #[serde(default = "default_dictionary_base_url")]
    pub dictionary_base_url: String,
    #[serde(default)]
    pub providers: ProviderSettings,
    #[serde(default)]
    pub credentials: Credentials,
}

fn default_deck_name() -> String {
    "Generated Deck".to_string()
}

fn default_language() -> String {
    "english".to_string()
}

fn default_level() -> String {
    "B2".to_string()
}

fn default_max_attempts() -> u32 {
    2
}

fn default_retry_backoff_ms() -> u64 {
    500
}

fn default_dictionary_base_url() -> String {
    "https://dictionary.cambridge.org/dictionary/english/".to_string()
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            deck_name: default_deck_name(),
            language: default_language(),
            level: default_level(),
            strategy: Strategy::default(),
            with_audio: false,
            max_attempts: default_max_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
            dictionary_base_url: default_dictionary_base_url(),
            providers: ProviderSettings::default(),
            credentials: Credentials::default(),
        }
    }
}

impl TaskConfig {
    /// Load a config file, falling back to defaults for absent keys
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: TaskConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Dictionary link for a word
    pub fn dictionary_url(&self, word: &str) -> String {
        format!(
            "{}{}",
            self.dictionary_base_url,
            urlencoding::encode(&word.to_lowercase())
        )
    }

    /// Check the config before any generation call is made
    pub fn validate(&self) -> Result<()> {
        if self.deck_name.trim().is_empty() {
            return Err(ConfigError::Invalid("deck name is empty".to_string()));
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid("max_attempts must be at least 1".to_string()));
        }

        if self.strategy == Strategy::Live {
            if self.credentials.openai_key.is_none() {
                return Err(ConfigError::MissingCredential("OPENAI_API_KEY"));
            }
            match self.providers.image_backend {
                ImageBackend::Fal if self.credentials.fal_key.is_none() => {
                    return Err(ConfigError::MissingCredential("FAL_KEY"));
                }
                ImageBackend::Replicate if self.credentials.replicate_token.is_none() => {
                    return Err(ConfigError::MissingCredential("REPLICATE_API_TOKEN"));
                }
                _ => {}
            }
            if self.with_audio && self.credentials.fal_key.is_none() {
                return Err(ConfigError::MissingCredential("FAL_KEY"));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn live_config() -> TaskConfig {
        TaskConfig {
            strategy: Strategy::Live,
            credentials: Credentials {
                openai_key: Some("sk-test".to_string()),
                fal_key: Some("fal-test".to_string()),
                replicate_token: None,
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_stub_needs_no_credentials() {
        assert!(TaskConfig::default().validate().is_ok());
    }

    #[test]
    fn test_live_requires_openai_key() {
        let mut config = live_config();
        assert!(config.validate().is_ok());

        config.credentials.openai_key = None;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingCredential("OPENAI_API_KEY"))
        ));
    }

    #[test]
    fn test_live_replicate_requires_token() {
        let mut config = live_config();
        config.providers.image_backend = ImageBackend::Replicate;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingCredential("REPLICATE_API_TOKEN"))
        ));
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let config = TaskConfig {
            max_attempts: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_from_file_applies_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("deckgen.toml");
        fs::write(
            &path,
            "language = \"german\"\nwith_audio = true\n\n[providers]\nimage_backend = \"replicate\"\n",
        )
        .unwrap();

        let config = TaskConfig::from_file(&path).unwrap();
        assert_eq!(config.language, "german");
        assert_eq!(config.level, "B2");
        assert!(config.with_audio);
        assert_eq!(config.providers.image_backend, ImageBackend::Replicate);
        assert_eq!(config.providers.text_model, "gpt-4o-mini");
        assert_eq!(config.strategy, Strategy::Stub);
    }

    #[test]
    fn test_dictionary_url() {
        let config = TaskConfig {
            dictionary_base_url: "http://example.com/dict/".to_string(),
            ..Default::default()
        };
        assert_eq!(config.dictionary_url("Ice Cream"), "http://example.com/dict/ice%20cream");
    }
}
