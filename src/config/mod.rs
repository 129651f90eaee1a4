use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::agent::{DEFAULT_GREETING, DEFAULT_INSTRUCTIONS};
use crate::models::openai_realtime::{DEFAULT_ENDPOINT, DEFAULT_MODEL};
use crate::store::DayZone;

/// A reference to a secret value.
///
/// Supports these YAML forms:
///   - Env reference:  `api_key: $OPENAI_API_KEY`
///   - At-prefixed:    `api_key: "@OPENAI_API_KEY"`
///   - Literal:        `api_key: sk-...`
///   - Pointer object: `api_key: { key: "OPENAI_API_KEY", source: "env" }`
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum SecretRef {
    /// Literal value or env-var / at-prefixed reference.
    Plain(String),
    /// Structured pointer: key + source (only "env" is supported).
    Pointer { key: String, source: String },
}

impl SecretRef {
    /// Resolve to the secret value.  `None` when the referenced variable
    /// is unset or empty.
    pub fn resolve(&self) -> anyhow::Result<Option<String>> {
        let value = match self {
            SecretRef::Plain(s) => match s.strip_prefix('$').or_else(|| s.strip_prefix('@')) {
                Some(var) if !var.is_empty() => std::env::var(var).ok(),
                _ => Some(s.clone()),
            },
            SecretRef::Pointer { key, source } => match source.as_str() {
                "env" => std::env::var(key).ok(),
                other => anyhow::bail!("unsupported secret source '{other}'"),
            },
        };
        Ok(value.filter(|v| !v.is_empty()))
    }
}

/// Top-level configuration loaded from `config.yaml`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct Config {
    /// Prompting for the assistant.
    pub assistant: AssistantConfig,
    /// Realtime model connection.
    pub model: ModelConfig,
    /// Consumption store.
    pub store: StoreConfig,
    /// What "today" means for daily totals.
    pub day_boundary: DayBoundaryConfig,
    /// Local room transport.
    pub room: RoomConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct AssistantConfig {
    /// System instructions sent when the session starts.
    pub instructions: String,
    /// Synthetic assistant message that opens the conversation.
    pub greeting: String,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            instructions: DEFAULT_INSTRUCTIONS.to_string(),
            greeting: DEFAULT_GREETING.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct ModelConfig {
    /// API key (plain text or env-var reference like `$OPENAI_API_KEY`).
    pub api_key: SecretRef,
    /// Realtime WebSocket endpoint.
    pub endpoint: String,
    /// Model name to request.
    pub model: String,
    /// Output voice; the server default when absent.
    pub voice: Option<String>,
    /// Response modalities.
    pub modalities: Vec<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            api_key: SecretRef::Plain("$OPENAI_API_KEY".to_string()),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            voice: None,
            modalities: vec!["text".to_string(), "audio".to_string()],
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct StoreConfig {
    /// SQLite database file.  Relative paths resolve against the nutri
    /// home; absent means `<nutri_home>/food.db`.
    pub path: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct DayBoundaryConfig {
    /// IANA zone name, e.g. `Europe/Berlin`.  Absent means the server's
    /// local zone.
    pub timezone: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct RoomConfig {
    /// Identity reported by the local room.
    pub participant: String,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            participant: "local-user".to_string(),
        }
    }
}

impl Config {
    /// Read and parse a YAML configuration file.  A missing file yields
    /// the defaults.
    pub async fn load(path: &Path) -> anyhow::Result<Config> {
        let mut config = match tokio::fs::read_to_string(path).await {
            Ok(contents) => {
                serde_yaml::from_str::<Config>(&contents).context("failed to parse config YAML")?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "config file not found, using defaults");
                Config::default()
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("failed to read config file: {}", path.display()));
            }
        };
        config.validate()?;

        // Resolve a relative store path against nutri_home.
        if let Some(ref p) = config.store.path {
            let p = Path::new(p);
            if p.is_relative() {
                config.store.path = Some(crate::nutri_home().join(p).to_string_lossy().to_string());
            }
        }

        tracing::debug!(
            store = %config.store_path().display(),
            timezone = config.day_boundary.timezone.as_deref().unwrap_or("local"),
            "configuration loaded"
        );

        Ok(config)
    }

    /// Validate semantic constraints that serde cannot enforce.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.assistant.instructions.trim().is_empty() {
            anyhow::bail!("config: assistant.instructions must not be empty");
        }
        if self.assistant.greeting.trim().is_empty() {
            anyhow::bail!("config: assistant.greeting must not be empty");
        }
        if self.room.participant.trim().is_empty() {
            anyhow::bail!("config: room.participant must not be empty");
        }
        if self.model.modalities.is_empty() {
            anyhow::bail!("config: model.modalities must list at least one modality");
        }
        self.day_zone().context("config: invalid day_boundary.timezone")?;
        Ok(())
    }

    /// Zone used for the daily window.
    pub fn day_zone(&self) -> anyhow::Result<DayZone> {
        DayZone::from_name(self.day_boundary.timezone.as_deref())
    }

    /// Absolute path of the SQLite database.
    pub fn store_path(&self) -> PathBuf {
        match self.store.path {
            Some(ref p) => PathBuf::from(p),
            None => crate::nutri_home().join("food.db"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_ref_forms() {
        std::env::set_var("NUTRI_TEST_SECRET_KEY", "sk-test");
        assert_eq!(
            SecretRef::Plain("$NUTRI_TEST_SECRET_KEY".into()).resolve().unwrap(),
            Some("sk-test".to_string())
        );
        assert_eq!(
            SecretRef::Plain("@NUTRI_TEST_SECRET_KEY".into()).resolve().unwrap(),
            Some("sk-test".to_string())
        );
        assert_eq!(
            SecretRef::Plain("literal".into()).resolve().unwrap(),
            Some("literal".to_string())
        );
        assert_eq!(
            SecretRef::Plain("$NUTRI_TEST_SECRET_UNSET".into()).resolve().unwrap(),
            None
        );
        let ptr = SecretRef::Pointer {
            key: "NUTRI_TEST_SECRET_KEY".into(),
            source: "env".into(),
        };
        assert_eq!(ptr.resolve().unwrap(), Some("sk-test".to_string()));
        let bad = SecretRef::Pointer {
            key: "X".into(),
            source: "vault".into(),
        };
        assert!(bad.resolve().is_err());
    }

    #[test]
    fn defaults_validate() {
        let cfg = Config::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.day_zone().unwrap(), DayZone::Local);
        assert_eq!(cfg.model.endpoint, DEFAULT_ENDPOINT);
        assert!(cfg.store_path().ends_with("food.db"));
    }

    #[test]
    fn rejects_bad_timezone_and_blank_greeting() {
        let mut cfg = Config::default();
        cfg.day_boundary.timezone = Some("Mars/Olympus".into());
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.assistant.greeting = "  ".into();
        assert!(cfg.validate().is_err());
    }
}
