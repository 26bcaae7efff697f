use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{ParleyError, Result};

/// Language the engine falls back to when the configured one is rejected.
pub const DEFAULT_LANGUAGE: &str = "en-US";

/// Top-level configuration for the Parley application.
///
/// Loaded from `~/.parley/config.toml` by default. Missing sections fall back
/// to their defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParleyConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub voice: VoiceConfig,
}

impl ParleyConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read, parsed, or fails validation.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ParleyConfig = toml::from_str(&content)?;
        config.voice.validate()?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| ParleyError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
    /// User agent reported to the controller when the host does not supply one.
    pub user_agent: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            user_agent: "Mozilla/5.0 (X11; Linux x86_64) Parley".to_string(),
        }
    }
}

/// Voice input configuration.
///
/// All durations are in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    /// BCP-47 language tag passed to the engine.
    pub language: String,
    /// Number of alternative transcriptions requested per result.
    pub max_alternatives: u32,
    /// Keep the engine listening across pauses (forced off on mobile).
    pub continuous: bool,
    /// Deliver interim (non-final) results.
    pub interim_results: bool,
    /// Watchdog deadline after which an active session is stopped.
    pub max_duration_ms: u64,
    /// Delay between stopping a running session and starting the next one.
    pub restart_delay_ms: u64,
    /// How long the field stays highlighted after final text lands.
    pub highlight_ms: u64,
    /// Delay before the platform-specific permission alert on mobile.
    pub alert_delay_ms: u64,
    /// Lifetime of the on-screen error notice on mobile.
    pub notice_ttl_ms: u64,
    /// Restart the engine when it ends on its own while the user still
    /// wants to record.
    pub auto_restart_on_unexpected_end: bool,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            language: DEFAULT_LANGUAGE.to_string(),
            max_alternatives: 3,
            continuous: true,
            interim_results: true,
            max_duration_ms: 30_000,
            restart_delay_ms: 200,
            highlight_ms: 500,
            alert_delay_ms: 1_000,
            notice_ttl_ms: 5_000,
            auto_restart_on_unexpected_end: false,
        }
    }
}

impl VoiceConfig {
    /// Reject settings the controller cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.language.trim().is_empty() {
            return Err(ParleyError::Config("voice.language must not be empty".into()));
        }
        if self.max_alternatives == 0 {
            return Err(ParleyError::Config(
                "voice.max_alternatives must be at least 1".into(),
            ));
        }
        if self.max_duration_ms == 0 {
            return Err(ParleyError::Config(
                "voice.max_duration_ms must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    pub fn max_duration(&self) -> Duration {
        Duration::from_millis(self.max_duration_ms)
    }

    pub fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms)
    }

    pub fn highlight(&self) -> Duration {
        Duration::from_millis(self.highlight_ms)
    }

    pub fn alert_delay(&self) -> Duration {
        Duration::from_millis(self.alert_delay_ms)
    }

    pub fn notice_ttl(&self) -> Duration {
        Duration::from_millis(self.notice_ttl_ms)
    }
}
