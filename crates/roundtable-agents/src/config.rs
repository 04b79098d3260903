use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use coordination::{DebateConfig, RetryPolicy, SessionConfig};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1";
const DEFAULT_GEMINI_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Model provider behind a participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// OpenAI-compatible chat completions endpoint.
    OpenAi,
    /// Google Gemini `generateContent`.
    Gemini,
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OpenAi => write!(f, "openai"),
            Self::Gemini => write!(f, "gemini"),
        }
    }
}

/// One `[[participants]]` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantConfig {
    /// Display name; defaults to the model id.
    #[serde(default)]
    pub name: Option<String>,
    pub provider: Provider,
    pub model: String,
}

impl ParticipantConfig {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.model)
    }
}

/// The `[debate]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebateSection {
    /// Maximum backend calls in flight within one phase.
    pub concurrency_limit: usize,
    /// Per-call timeout in seconds; unset waits indefinitely.
    pub call_timeout_secs: Option<u64>,
    pub retry: RetryPolicy,
}

impl Default for DebateSection {
    fn default() -> Self {
        Self {
            concurrency_limit: DebateConfig::default().concurrency_limit,
            call_timeout_secs: None,
            retry: RetryPolicy::default(),
        }
    }
}

impl DebateSection {
    pub fn debate_config(&self) -> DebateConfig {
        DebateConfig {
            concurrency_limit: self.concurrency_limit,
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            retry: self.retry.clone(),
            call_timeout_secs: self.call_timeout_secs,
        }
    }
}

/// Top-level `roundtable.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundtableConfig {
    #[serde(default)]
    pub debate: DebateSection,
    #[serde(default)]
    pub participants: Vec<ParticipantConfig>,
}

/// A configuration the debate cannot run with.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("at least one participant is required")]
    NoParticipants,
    #[error("concurrency_limit must be at least 1")]
    ZeroConcurrency,
    #[error("retry jitter must be within [0, 1], got {0}")]
    JitterOutOfRange(f64),
    #[error("retry multiplier must be a finite number >= 1.0, got {0}")]
    InvalidMultiplier(f64),
    #[error("participant {0} has an empty model id")]
    EmptyModel(usize),
    #[error("participant name {0:?} is used more than once")]
    DuplicateName(String),
}

impl RoundtableConfig {
    /// Load and validate a TOML config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: RoundtableConfig =
            toml::from_str(content).context("Failed to parse roundtable TOML")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.participants.is_empty() {
            return Err(ConfigError::NoParticipants);
        }
        if self.debate.concurrency_limit == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        let jitter = self.debate.retry.jitter;
        if !(0.0..=1.0).contains(&jitter) {
            return Err(ConfigError::JitterOutOfRange(jitter));
        }
        let multiplier = self.debate.retry.multiplier;
        if !multiplier.is_finite() || multiplier < 1.0 {
            return Err(ConfigError::InvalidMultiplier(multiplier));
        }
        let mut names = std::collections::HashSet::new();
        for (index, p) in self.participants.iter().enumerate() {
            if p.model.trim().is_empty() {
                return Err(ConfigError::EmptyModel(index));
            }
            if !names.insert(p.display_name()) {
                return Err(ConfigError::DuplicateName(p.display_name().to_string()));
            }
        }
        Ok(())
    }

    /// Providers used by at least one participant, in first-use order.
    pub fn providers(&self) -> Vec<Provider> {
        let mut providers = Vec::new();
        for p in &self.participants {
            if !providers.contains(&p.provider) {
                providers.push(p.provider);
            }
        }
        providers
    }
}

/// Provider credentials and endpoints, taken from the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderEnv {
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub gemini_api_key: Option<String>,
    pub gemini_base_url: String,
}

impl Default for ProviderEnv {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            openai_base_url: DEFAULT_OPENAI_URL.to_string(),
            gemini_api_key: None,
            gemini_base_url: DEFAULT_GEMINI_URL.to_string(),
        }
    }
}

impl ProviderEnv {
    pub fn from_env() -> Self {
        Self {
            openai_api_key: std::env::var("OPENAI_API_KEY").ok(),
            openai_base_url: std::env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_OPENAI_URL.into()),
            gemini_api_key: std::env::var("GEMINI_API_KEY").ok(),
            gemini_base_url: std::env::var("GEMINI_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_GEMINI_URL.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
[debate]
concurrency_limit = 2
call_timeout_secs = 90

[debate.retry]
max_retries = 3
base_delay_ms = 500

[[participants]]
provider = "openai"
model = "gpt-4o"

[[participants]]
name = "flash"
provider = "gemini"
model = "gemini-2.0-flash"

[[participants]]
provider = "openai"
model = "gpt-4o-mini"
"#;

    #[test]
    fn test_parse_sample() {
        let config = RoundtableConfig::from_toml(SAMPLE).unwrap();
        assert_eq!(config.debate.concurrency_limit, 2);
        assert_eq!(config.debate.retry.max_retries, 3);
        assert_eq!(config.debate.retry.max_delay_ms, 30_000);
        assert_eq!(config.participants.len(), 3);
        assert_eq!(config.participants[0].display_name(), "gpt-4o");
        assert_eq!(config.participants[1].display_name(), "flash");
        assert_eq!(config.providers(), vec![Provider::OpenAi, Provider::Gemini]);

        let session = config.debate.session_config();
        assert_eq!(session.call_timeout_secs, Some(90));
        assert_eq!(config.debate.debate_config().concurrency_limit, 2);
    }

    #[test]
    fn test_debate_table_is_optional() {
        let config = RoundtableConfig::from_toml(
            "[[participants]]\nprovider = \"gemini\"\nmodel = \"gemini-2.5-pro\"\n",
        )
        .unwrap();
        assert_eq!(config.debate, DebateSection::default());
    }

    #[test]
    fn test_rejects_invalid_configs() {
        let err = RoundtableConfig::from_toml("").unwrap_err();
        assert!(format!("{err:#}").contains("at least one participant"));

        let mut config = RoundtableConfig::from_toml(SAMPLE).unwrap();
        config.debate.concurrency_limit = 0;
        assert_eq!(config.validate(), Err(ConfigError::ZeroConcurrency));

        let mut config = RoundtableConfig::from_toml(SAMPLE).unwrap();
        config.debate.retry.jitter = 1.5;
        assert_eq!(config.validate(), Err(ConfigError::JitterOutOfRange(1.5)));

        for bad in [0.5, 0.0, -2.0, f64::NAN, f64::INFINITY] {
            let mut config = RoundtableConfig::from_toml(SAMPLE).unwrap();
            config.debate.retry.multiplier = bad;
            assert!(
                matches!(config.validate(), Err(ConfigError::InvalidMultiplier(_))),
                "{bad}"
            );
        }
        let mut config = RoundtableConfig::from_toml(SAMPLE).unwrap();
        config.debate.retry.multiplier = 1.0;
        assert_eq!(config.validate(), Ok(()));

        let mut config = RoundtableConfig::from_toml(SAMPLE).unwrap();
        config.participants[2].model = "gpt-4o".into();
        assert_eq!(
            config.validate(),
            Err(ConfigError::DuplicateName("gpt-4o".into()))
        );

        let mut config = RoundtableConfig::from_toml(SAMPLE).unwrap();
        config.participants[1].model = " ".into();
        assert_eq!(config.validate(), Err(ConfigError::EmptyModel(1)));
    }

    #[test]
    fn test_unknown_provider_fails_to_parse() {
        let err = RoundtableConfig::from_toml(
            "[[participants]]\nprovider = \"anthropic\"\nmodel = \"claude\"\n",
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("parse"));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let config = RoundtableConfig::from_file(file.path()).unwrap();
        assert_eq!(config.participants.len(), 3);

        let missing = RoundtableConfig::from_file(Path::new("/nonexistent/roundtable.toml"));
        assert!(format!("{:#}", missing.unwrap_err()).contains("Failed to read"));
    }
}
