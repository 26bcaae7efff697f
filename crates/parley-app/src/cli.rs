//! CLI argument definitions for the Parley binary.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Parley - voice-driven message input.
#[derive(Parser, Debug)]
#[command(name = "parley", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level", global = true)]
    pub log_level: Option<String>,

    /// User agent used for platform detection.
    #[arg(long = "user-agent", global = true)]
    pub user_agent: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Replay a scripted dictation session against console collaborators.
    Replay {
        /// JSON script describing the session.
        script: PathBuf,

        /// Which recognizer variant the simulated host exposes.
        #[arg(long, value_enum, default_value_t = CapabilityChoice::Standard)]
        capability: CapabilityChoice,

        /// Refuse microphone access.
        #[arg(long = "deny-microphone")]
        deny_microphone: bool,

        /// Print controller events as JSON lines.
        #[arg(long)]
        json: bool,
    },
    /// Validate the configuration file and print the effective settings.
    CheckConfig,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum CapabilityChoice {
    Standard,
    Prefixed,
    None,
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > PARLEY_CONFIG env var > platform default (~/.parley/config.toml).
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("PARLEY_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Resolve the log level.
    ///
    /// Priority: --log-level flag > config file value.
    pub fn resolve_log_level(&self, config_level: &str) -> String {
        self.log_level
            .clone()
            .unwrap_or_else(|| config_level.to_string())
    }

    /// Resolve the user agent.
    ///
    /// Priority: --user-agent flag > script value > config file value.
    pub fn resolve_user_agent(&self, script: Option<&str>, config: &str) -> String {
        self.user_agent
            .as_deref()
            .or(script)
            .unwrap_or(config)
            .to_string()
    }
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".parley").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".parley").join("config.toml");
    }
    PathBuf::from("config.toml")
}
