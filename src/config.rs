//! Orchestrator configuration: defaults, optional JSON file, command-line overrides.
//! Timing values are per surface, never per call.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Error, Result};

/// Per-surface behaviour. The full voice assistant waits longer for silence
/// than the chat surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SurfaceConfig {
    #[serde(with = "duration_ms")]
    pub silence_commit: Duration,
    /// Stop-class interruptions land in Dormant instead of Listening.
    pub require_reactivation: bool,
}

impl SurfaceConfig {
    pub fn voice_assistant() -> Self {
        Self {
            silence_commit: Duration::from_millis(3000),
            require_reactivation: false,
        }
    }

    pub fn chat() -> Self {
        Self {
            silence_commit: Duration::from_millis(1500),
            require_reactivation: false,
        }
    }
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self::voice_assistant()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponderConfig {
    /// Chat endpoint accepting `ResponderRequest` JSON. None disables the remote responder.
    pub endpoint: Option<String>,
    #[serde(with = "duration_ms")]
    pub timeout: Duration,
    pub api_key: Option<String>,
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout: Duration::from_secs(30),
            api_key: None,
        }
    }
}

/// Values taken from the command line or its `FOCUSFLOW_*` environment
/// fallbacks. Set fields win over the file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub responder_url: Option<String>,
    pub responder_key: Option<String>,
    pub user_id: Option<String>,
    pub surface: Option<SurfaceConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub user_id: String,
    pub surface: SurfaceConfig,
    pub responder: ResponderConfig,
    #[serde(with = "duration_ms")]
    pub idle_timeout: Duration,
    #[serde(with = "duration_ms")]
    pub word_reveal_interval: Duration,
    #[serde(with = "duration_ms")]
    pub rearm_delay: Duration,
    #[serde(with = "duration_ms")]
    pub supersede_grace: Duration,
    /// Barge-in fragments must be longer than this (trimmed chars) to supersede.
    pub supersede_min_chars: usize,
    pub wake_phrases: Vec<String>,
    pub wake_max_words: usize,
    /// Turns of history forwarded to the responder.
    pub history_window: usize,
    pub log_capacity: usize,
    pub persisted_log_capacity: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            user_id: "local".to_string(),
            surface: SurfaceConfig::default(),
            responder: ResponderConfig::default(),
            idle_timeout: Duration::from_secs(10),
            word_reveal_interval: Duration::from_millis(30),
            rearm_delay: Duration::from_millis(1000),
            supersede_grace: Duration::from_millis(300),
            supersede_min_chars: 5,
            wake_phrases: ["hello", "hey", "focusflow", "wake up", "assistant"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            wake_max_words: 4,
            history_window: 10,
            log_capacity: 50,
            persisted_log_capacity: 100,
        }
    }
}

impl OrchestratorConfig {
    /// Load from a JSON file. Missing fields take their defaults.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults, then the optional file, then `overrides`.
    /// A broken file is logged and ignored.
    pub fn load(path: Option<&Path>, overrides: &ConfigOverrides) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::load_from_file(p).unwrap_or_else(|e| {
                warn!(path = %p.display(), error = %e, "config load failed, using defaults");
                Self::default()
            }),
            None => Self::default(),
        };
        config.apply_overrides(overrides);
        config.validate()?;
        info!(
            user_id = %config.user_id,
            silence_ms = config.surface.silence_commit.as_millis() as u64,
            responder = config.responder.endpoint.is_some(),
            "config_loaded"
        );
        Ok(config)
    }

    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(url) = &overrides.responder_url {
            self.responder.endpoint = Some(url.clone());
        }
        if let Some(key) = &overrides.responder_key {
            self.responder.api_key = Some(key.clone());
        }
        if let Some(user) = &overrides.user_id {
            self.user_id = user.clone();
        }
        if let Some(surface) = &overrides.surface {
            self.surface = surface.clone();
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.log_capacity == 0 {
            return Err(Error::Config("log_capacity must be > 0".into()));
        }
        if self.wake_max_words == 0 {
            return Err(Error::Config("wake_max_words must be > 0".into()));
        }
        if self.user_id.trim().is_empty() {
            return Err(Error::Config("user_id must not be empty".into()));
        }
        if self.word_reveal_interval.is_zero() {
            return Err(Error::Config("word_reveal_interval must be > 0".into()));
        }
        Ok(())
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_voice_surface() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.surface.silence_commit, Duration::from_secs(3));
        assert_eq!(config.idle_timeout, Duration::from_secs(10));
        assert_eq!(config.word_reveal_interval, Duration::from_millis(30));
        assert_eq!(config.rearm_delay, Duration::from_millis(1000));
        assert_eq!(config.supersede_grace, Duration::from_millis(300));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn overrides_win_over_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"user_id":"alice","responder":{{"timeout":5000}}}}"#).unwrap();
        let overrides = ConfigOverrides {
            responder_url: Some("http://localhost:9000/chat".into()),
            user_id: Some("u-42".into()),
            surface: Some(SurfaceConfig::chat()),
            ..ConfigOverrides::default()
        };
        let config = OrchestratorConfig::load(Some(file.path()), &overrides).unwrap();
        assert_eq!(config.surface.silence_commit, Duration::from_millis(1500));
        assert_eq!(config.user_id, "u-42");
        assert_eq!(
            config.responder.endpoint.as_deref(),
            Some("http://localhost:9000/chat")
        );
        assert_eq!(config.responder.timeout, Duration::from_secs(5));
        assert!(config.responder.api_key.is_none());
    }

    #[test]
    fn broken_file_falls_back_to_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        let config =
            OrchestratorConfig::load(Some(file.path()), &ConfigOverrides::default()).unwrap();
        assert_eq!(config.user_id, "local");
    }

    #[test]
    fn file_fields_are_milliseconds_and_partial() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"user_id":"alice","idle_timeout":5000,"surface":{{"silence_commit":1500}}}}"#
        )
        .unwrap();
        let config = OrchestratorConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.user_id, "alice");
        assert_eq!(config.idle_timeout, Duration::from_secs(5));
        assert_eq!(config.surface.silence_commit, Duration::from_millis(1500));
        assert_eq!(config.wake_max_words, 4);
    }

    #[test]
    fn zero_capacity_rejected() {
        let config = OrchestratorConfig {
            log_capacity: 0,
            ..OrchestratorConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }
}
