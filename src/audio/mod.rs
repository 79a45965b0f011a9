//! Audio capture and reduction to plot points

#[cfg(feature = "capture")]
mod capture;
mod fft;
#[cfg(feature = "capture")]
mod sources;

#[cfg(feature = "capture")]
pub use capture::{AudioCaptureHandle, CaptureError, PointAccumulator};
pub use fft::{intensity, PointReducer, SpectrumAnalyzer};
#[cfg(feature = "capture")]
pub use sources::{list_sources, AudioSource, SourceError, SourceType};

use serde::{Deserialize, Serialize};

/// What one plot point measures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalMode {
    /// Sound intensity: one value per interval
    #[default]
    Intensity,

    /// Magnitude spectrum: one value per frequency bin per interval
    Spectrum,
}

/// Audio processing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Intensity or spectrum
    pub mode: SignalMode,

    /// Seconds of audio reduced into one point
    pub interval_secs: f64,

    /// Frequency bins kept per point in spectrum mode
    pub spectrum_bins: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            mode: SignalMode::Intensity,
            interval_secs: 0.3,
            spectrum_bins: 1000,
        }
    }
}

impl AudioConfig {
    /// Mono frames per point at the given device rate
    pub fn frames_per_point(&self, sample_rate: u32) -> usize {
        ((sample_rate as f64 * self.interval_secs).round() as usize).max(1)
    }

    /// Values produced per point
    pub fn width(&self) -> usize {
        match self.mode {
            SignalMode::Intensity => 1,
            SignalMode::Spectrum => self.spectrum_bins,
        }
    }

    pub fn reducer(&self) -> PointReducer {
        match self.mode {
            SignalMode::Intensity => PointReducer::Intensity,
            SignalMode::Spectrum => PointReducer::Spectrum(SpectrumAnalyzer::new(self.spectrum_bins)),
        }
    }
}
