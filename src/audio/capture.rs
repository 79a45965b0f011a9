//! Audio capture on a dedicated thread
//!
//! The cpal callback only downmixes and appends to a [`PointAccumulator`];
//! the capture thread takes whole intervals out of it, reduces them to a
//! point and feeds the session [`Producer`].

use super::AudioConfig;
use crate::session::Producer;
use crate::store::StoreError;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, StreamConfig};
use parking_lot::Mutex;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;

/// Audio capture errors
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("No input device found")]
    NoInputDevice,

    #[error("Failed to get device config: {0}")]
    ConfigError(String),

    #[error("Failed to build audio stream: {0}")]
    StreamError(String),

    #[error("Failed to start stream: {0}")]
    PlayError(String),

    #[error("Source not found: {0}")]
    SourceNotFound(String),

    #[error("Thread error: {0}")]
    ThreadError(String),
}

/// Commands sent to the audio thread
enum AudioCommand {
    Stop,
}

/// Audio capture handle
///
/// Owns the capture thread, which in turn owns the cpal stream and the
/// producer. Dropping the handle stops the thread.
pub struct AudioCaptureHandle {
    command_tx: mpsc::Sender<AudioCommand>,
    thread_handle: Option<JoinHandle<()>>,
}

impl AudioCaptureHandle {
    /// Start capturing from `source_id` (`input:<name>`, `output:<name>`,
    /// or the default input when `None`)
    pub fn new(
        source_id: Option<String>,
        config: AudioConfig,
        producer: Producer,
    ) -> Result<Self, CaptureError> {
        let (command_tx, command_rx) = mpsc::channel();

        let thread_handle = thread::Builder::new()
            .name("audio-capture".to_string())
            .spawn(move || {
                if let Err(e) = run_audio_thread(source_id, config, command_rx, &producer) {
                    log::error!("Audio thread error: {}", e);
                }
                producer.halt();
            })
            .map_err(|e| CaptureError::ThreadError(e.to_string()))?;

        Ok(Self {
            command_tx,
            thread_handle: Some(thread_handle),
        })
    }

    /// Stop the audio capture and wait for the thread
    pub fn stop(&mut self) {
        let _ = self.command_tx.send(AudioCommand::Stop);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
            log::info!("Audio capture stopped");
        }
    }
}

impl Drop for AudioCaptureHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Mono samples waiting to be reduced into points
#[derive(Debug)]
pub struct PointAccumulator {
    pending: Vec<f32>,
    frames_per_point: usize,
    max_pending: usize,
}

impl PointAccumulator {
    /// Keeps at most `backlog` intervals; older audio is dropped if the
    /// reducer falls behind
    pub fn new(frames_per_point: usize, backlog: usize) -> Self {
        let frames_per_point = frames_per_point.max(1);
        Self {
            pending: Vec::with_capacity(frames_per_point * 2),
            frames_per_point,
            max_pending: frames_per_point * backlog.max(1),
        }
    }

    pub fn push(&mut self, mono: &[f32]) {
        self.pending.extend_from_slice(mono);
        if self.pending.len() > self.max_pending {
            let excess = self.pending.len() - self.max_pending;
            self.pending.drain(..excess);
        }
    }

    /// One full interval, oldest first
    pub fn take_point(&mut self) -> Option<Vec<f32>> {
        if self.pending.len() < self.frames_per_point {
            return None;
        }
        Some(self.pending.drain(..self.frames_per_point).collect())
    }

    pub fn frames_per_point(&self) -> usize {
        self.frames_per_point
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

fn find_device(
    devices: Result<impl Iterator<Item = Device>, cpal::DevicesError>,
    name: &str,
) -> Result<Device, CaptureError> {
    devices
        .map_err(|e| CaptureError::ConfigError(e.to_string()))?
        .find(|d| d.name().map(|n| n == name).unwrap_or(false))
        .ok_or_else(|| CaptureError::SourceNotFound(name.to_string()))
}

/// Run the audio capture in a dedicated thread
fn run_audio_thread(
    source_id: Option<String>,
    audio: AudioConfig,
    command_rx: mpsc::Receiver<AudioCommand>,
    producer: &Producer,
) -> Result<(), CaptureError> {
    let host = cpal::default_host();

    // Output devices are captured as loopback
    let (device, is_loopback) = match source_id.as_deref() {
        Some(id) if id.starts_with("output:") => {
            let name = id.trim_start_matches("output:");
            log::info!("Using output device for loopback: {}", name);
            (find_device(host.output_devices(), name)?, true)
        }
        Some(id) if id.starts_with("input:") => {
            let name = id.trim_start_matches("input:");
            log::info!("Using input device: {}", name);
            (find_device(host.input_devices(), name)?, false)
        }
        Some(id) => return Err(CaptureError::SourceNotFound(id.to_string())),
        None => {
            log::info!("Using default input device");
            (
                host.default_input_device()
                    .ok_or(CaptureError::NoInputDevice)?,
                false,
            )
        }
    };

    let config = if is_loopback {
        device
            .default_output_config()
            .map_err(|e| CaptureError::ConfigError(format!("Loopback config: {}", e)))?
    } else {
        device
            .default_input_config()
            .map_err(|e| CaptureError::ConfigError(e.to_string()))?
    };

    let sample_rate = config.sample_rate().0;
    let channels = config.channels() as usize;
    let frames_per_point = audio.frames_per_point(sample_rate);

    log::info!(
        "Audio capture: {} Hz, {} channels, {} frames per point",
        sample_rate,
        channels,
        frames_per_point
    );

    let accumulator = Arc::new(Mutex::new(PointAccumulator::new(frames_per_point, 4)));
    let mut reducer = audio.reducer();

    let stream = match config.sample_format() {
        SampleFormat::F32 => {
            build_stream::<f32>(&device, &config.into(), accumulator.clone(), channels)
        }
        SampleFormat::I16 => {
            build_stream::<i16>(&device, &config.into(), accumulator.clone(), channels)
        }
        SampleFormat::U16 => {
            build_stream::<u16>(&device, &config.into(), accumulator.clone(), channels)
        }
        _ => {
            return Err(CaptureError::ConfigError(
                "Unsupported sample format".to_string(),
            ))
        }
    }
    .map_err(|e| CaptureError::StreamError(e.to_string()))?;

    stream
        .play()
        .map_err(|e| CaptureError::PlayError(e.to_string()))?;

    log::info!("Audio capture started");

    loop {
        match command_rx.try_recv() {
            Ok(AudioCommand::Stop) => {
                log::info!("Audio capture stopping");
                break;
            }
            Err(mpsc::TryRecvError::Disconnected) => {
                log::info!("Audio capture channel disconnected");
                break;
            }
            Err(mpsc::TryRecvError::Empty) => {}
        }

        if producer.is_halted() {
            log::info!("Producer halted, audio capture stopping");
            break;
        }

        // Take the interval under the lock, reduce after releasing it
        let samples = accumulator.lock().take_point();
        let Some(samples) = samples else {
            thread::sleep(Duration::from_millis(10));
            continue;
        };

        let point = reducer.reduce(&samples);
        match producer.feed(&point) {
            Ok(_) => {}
            Err(StoreError::ResourceUnavailable(reason)) => {
                log::info!("Audio capture stopping: {}", reason);
                break;
            }
            Err(e) => log::warn!("Dropped point: {}", e),
        }
    }

    Ok(())
}

/// Build audio stream for given sample type
fn build_stream<T: cpal::Sample + cpal::SizedSample>(
    device: &Device,
    config: &StreamConfig,
    accumulator: Arc<Mutex<PointAccumulator>>,
    channels: usize,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    f32: cpal::FromSample<T>,
{
    device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            let mono: Vec<f32> = data
                .chunks(channels.max(1))
                .map(|frame| {
                    let sum: f32 = frame
                        .iter()
                        .map(|&s| <f32 as cpal::Sample>::from_sample(s))
                        .sum();
                    sum / frame.len() as f32
                })
                .collect();

            accumulator.lock().push(&mono);
        },
        |err| {
            log::error!("Audio stream error: {}", err);
        },
        None,
    )
}

#[cfg(test)]
mod tests {
    use super::PointAccumulator;

    #[test]
    fn take_point_waits_for_a_full_interval() {
        let mut acc = PointAccumulator::new(4, 4);
        acc.push(&[1.0, 2.0, 3.0]);
        assert!(acc.take_point().is_none());

        acc.push(&[4.0, 5.0]);
        assert_eq!(acc.take_point(), Some(vec![1.0, 2.0, 3.0, 4.0]));
        assert_eq!(acc.pending(), 1);
        assert!(acc.take_point().is_none());
    }

    #[test]
    fn backlog_drops_oldest_audio() {
        let mut acc = PointAccumulator::new(2, 2);
        acc.push(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);

        assert_eq!(acc.pending(), 4);
        assert_eq!(acc.take_point(), Some(vec![3.0, 4.0]));
        assert_eq!(acc.take_point(), Some(vec![5.0, 6.0]));
        assert!(acc.take_point().is_none());
    }

    #[test]
    fn zero_interval_is_clamped_to_one_frame() {
        let mut acc = PointAccumulator::new(0, 0);
        assert_eq!(acc.frames_per_point(), 1);

        acc.push(&[0.5]);
        assert_eq!(acc.take_point(), Some(vec![0.5]));
    }
}
