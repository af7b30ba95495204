//! Engine configuration
//!
//! All tunable parameters in one place. Loaded from TOML at startup,
//! falls back to defaults if no config file exists.

use neuralbreach_core::{Error, NLevel, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Scheduler delays.
    pub timing: TimingConfig,
    /// Session defaults.
    pub session: SessionConfig,
    /// Audio collaborator behaviour.
    pub audio: AudioConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Pause between block setup and the first stimulus.
    pub settle_ms: u64,
    /// How long the player has to answer a stimulus.
    pub response_window_ms: u64,
    /// Feedback pause between an answer and the next stimulus.
    pub feedback_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// N level of the first block.
    pub starting_level: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Extra playback attempts after a failure.
    pub max_retries: u32,
}

// ============================================================
// Defaults
// ============================================================

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            settle_ms: 1_000,
            response_window_ms: 2_500,
            feedback_ms: 500,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { starting_level: 2 }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self { max_retries: 2 }
    }
}

impl TimingConfig {
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn response_window(&self) -> Duration {
        Duration::from_millis(self.response_window_ms)
    }

    pub fn feedback(&self) -> Duration {
        Duration::from_millis(self.feedback_ms)
    }
}

// ============================================================
// Loading
// ============================================================

impl EngineConfig {
    /// Read and parse a TOML config file.
    ///
    /// A missing or unreadable file is `IoError`; bad TOML is `ConfigError`.
    pub fn try_load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| Error::config(format!("{}: {}", path.display(), e)))
    }

    /// Load config from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match Self::try_load(path) {
            Ok(config) => {
                tracing::info!("Loaded config from {}", path.display());
                config
            }
            Err(Error::IoError(_)) => {
                tracing::info!("No config at {}, using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                tracing::warn!("Failed to parse {}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Write the current config as TOML (for generating a default config file).
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }

    /// Starting level as a checked `NLevel`; out of range is `InvalidLevel`, never clamped.
    pub fn starting_level(&self) -> Result<NLevel> {
        NLevel::new(self.session.starting_level)
    }

    pub fn validate(&self) -> Result<()> {
        self.starting_level()?;
        if self.timing.response_window_ms == 0 {
            return Err(Error::config("response_window_ms must be positive"));
        }
        Ok(())
    }
}
