//! Audio source enumeration

use cpal::traits::{DeviceTrait, HostTrait};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Audio source information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioSource {
    /// Value for `source_id` in the config, `None` for the default input
    pub id: Option<String>,

    /// Display name
    pub name: String,

    pub source_type: SourceType,
}

/// Type of audio source
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    /// Microphone or line in
    InputDevice,

    /// Output device captured as loopback
    Loopback,
}

/// Audio source errors
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Failed to enumerate devices: {0}")]
    EnumerationError(String),
}

/// List available audio sources, default input first
pub fn list_sources() -> Result<Vec<AudioSource>, SourceError> {
    let mut sources = Vec::new();
    let host = cpal::default_host();

    let default_input = host.default_input_device().and_then(|d| d.name().ok());
    if let Some(name) = &default_input {
        sources.push(AudioSource {
            id: None,
            name: format!("Default input ({})", name),
            source_type: SourceType::InputDevice,
        });
    }

    let inputs = host
        .input_devices()
        .map_err(|e| SourceError::EnumerationError(e.to_string()))?;
    for device in inputs {
        if let Ok(name) = device.name() {
            sources.push(AudioSource {
                id: Some(format!("input:{}", name)),
                name: format!("Input: {}", name),
                source_type: SourceType::InputDevice,
            });
        }
    }

    // Loopback is not supported by every host; a failure here is not fatal
    match host.output_devices() {
        Ok(devices) => {
            for device in devices {
                if let Ok(name) = device.name() {
                    sources.push(AudioSource {
                        id: Some(format!("output:{}", name)),
                        name: format!("Loopback: {}", name),
                        source_type: SourceType::Loopback,
                    });
                }
            }
        }
        Err(e) => log::warn!("Failed to enumerate output devices: {}", e),
    }

    Ok(sources)
}
