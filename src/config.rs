//! Session configuration, optionally loaded from a JSON file

use crate::audio::{AudioConfig, SignalMode};
use crate::session::SessionOptions;
use crate::store::{ControllerOptions, WrapPolicy};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Everything a listening session needs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Capture and reduction settings (`mode`, `interval_secs`, `spectrum_bins`)
    #[serde(flatten)]
    pub audio: AudioConfig,

    /// Capture source ID (`input:<name>`, `output:<name>`); default input if unset
    pub source_id: Option<String>,

    /// Points kept in the plot; 80 for intensity, 40 for spectra if unset
    pub points: Option<usize>,

    /// Auto-stop length for streaks
    pub max_streak_len: Option<usize>,

    pub wrap_policy: WrapPolicy,

    /// Keep raw streak samples so exports hold every value
    pub retain_samples: bool,

    /// Save each streak as CSV when it stops
    pub export_on_stop: bool,

    /// Where exports and plot captures go
    pub output_dir: PathBuf,

    /// Plot refresh period in milliseconds
    pub refresh_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            audio: AudioConfig::default(),
            source_id: None,
            points: None,
            max_streak_len: None,
            wrap_policy: WrapPolicy::Accumulate,
            retain_samples: true,
            export_on_stop: true,
            output_dir: PathBuf::from("."),
            refresh_ms: 100,
        }
    }
}

impl SessionConfig {
    /// Load and validate a JSON config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json(&text)?;
        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity() == 0 {
            return Err(ConfigError::Invalid("points must be greater than zero".into()));
        }
        if !(self.audio.interval_secs > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "interval_secs must be positive, got {}",
                self.audio.interval_secs
            )));
        }
        if self.audio.mode == SignalMode::Spectrum && self.audio.spectrum_bins == 0 {
            return Err(ConfigError::Invalid("spectrum_bins must be greater than zero".into()));
        }
        if self.refresh_ms == 0 {
            return Err(ConfigError::Invalid("refresh_ms must be greater than zero".into()));
        }
        Ok(())
    }

    /// Points kept per channel
    pub fn capacity(&self) -> usize {
        self.points.unwrap_or(match self.audio.mode {
            SignalMode::Intensity => 80,
            SignalMode::Spectrum => 40,
        })
    }

    pub fn controller_options(&self) -> ControllerOptions {
        ControllerOptions {
            capacity: self.capacity(),
            channels: self.audio.width(),
            max_streak_len: self.max_streak_len,
            wrap_policy: self.wrap_policy,
            retain_samples: self.retain_samples,
        }
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            refresh: Duration::from_millis(self.refresh_ms),
            export_on_stop: self.export_on_stop,
        }
    }
}
