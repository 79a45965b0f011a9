//! Shared sampling state between the producer and the UI
//!
//! Every operation here is one critical section on a single non-reentrant
//! mutex. Nothing in this file calls another locking method while holding
//! the guard, and nothing does I/O under it.

use super::buffer::CircularBuffer;
use super::ledger::{LedgerState, StreakLedger};
use super::streak::{Streak, StreakSummary, WrapPolicy};
use super::StoreError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Controller construction options
#[derive(Debug, Clone)]
pub struct ControllerOptions {
    /// Points kept per channel
    pub capacity: usize,

    /// Values per sample: 1 for intensity, one per frequency bin for spectra
    pub channels: usize,

    /// Auto-stop length for streaks
    pub max_streak_len: Option<usize>,

    /// Streak behavior once it spans the whole buffer
    pub wrap_policy: WrapPolicy,

    /// Keep raw streak samples for export
    pub retain_samples: bool,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            capacity: 80,
            channels: 1,
            max_streak_len: None,
            wrap_policy: WrapPolicy::Accumulate,
            retain_samples: true,
        }
    }
}

/// Result of feeding one sample
#[derive(Debug, Clone)]
pub struct Written {
    /// Buffer position the sample landed on
    pub position: usize,

    /// Streaks closed by auto-stop on this sample (one per channel)
    pub closed: Vec<Arc<Streak>>,
}

/// Copy of one channel's buffer and ledger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelSnapshot {
    pub samples: Vec<f64>,
    pub history: Vec<StreakSummary>,
    pub active: Option<StreakSummary>,
}

/// Consistent copy of the whole store, taken under the lock
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub write_pos: usize,
    pub total_writes: u64,
    pub recording: bool,
    pub max_streak_len: Option<usize>,
    pub channels: Vec<ChannelSnapshot>,
}

impl Snapshot {
    /// Buffer contents of the first (or only) channel
    pub fn buffer(&self) -> &[f64] {
        self.channels
            .first()
            .map(|c| c.samples.as_slice())
            .unwrap_or(&[])
    }

    /// Most recent value of the first channel
    pub fn latest(&self) -> f64 {
        self.buffer().get(self.write_pos).copied().unwrap_or(0.0)
    }

    /// The streak the status line reports: active, else the last closed one
    pub fn last_streak(&self) -> Option<&StreakSummary> {
        let channel = self.channels.first()?;
        channel.active.as_ref().or_else(|| channel.history.last())
    }
}

struct Channel {
    buffer: CircularBuffer,
    ledger: StreakLedger,
}

struct ControllerState {
    channels: Vec<Channel>,
    total_writes: u64,
}

impl ControllerState {
    fn ledger_state(&self) -> LedgerState {
        self.channels
            .first()
            .map(|c| c.ledger.state())
            .unwrap_or(LedgerState::Idle)
    }
}

/// Owner of the sample buffers and streak ledgers.
///
/// Shared as `Arc<SamplingController>` between the capture thread, which
/// calls [`on_sample`](Self::on_sample), and the session, which renders
/// snapshots and applies user commands. All channels start and stop
/// recording together, so the recording state of channel 0 is the state
/// of the controller.
pub struct SamplingController {
    state: Mutex<ControllerState>,
    capacity: usize,
    width: usize,
}

impl SamplingController {
    pub fn new(options: ControllerOptions) -> Result<Self, StoreError> {
        if options.channels == 0 {
            return Err(StoreError::FrameWidth {
                expected: 1,
                actual: 0,
            });
        }

        let channels = (0..options.channels)
            .map(|_| {
                let buffer = CircularBuffer::new(options.capacity)?;
                let mut ledger = StreakLedger::new(
                    options.capacity,
                    options.wrap_policy,
                    options.retain_samples,
                );
                ledger.set_max_streak_len(options.max_streak_len);
                Ok::<_, StoreError>(Channel { buffer, ledger })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            state: Mutex::new(ControllerState {
                channels,
                total_writes: 0,
            }),
            capacity: options.capacity,
            width: options.channels,
        })
    }

    /// Points kept per channel
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Values expected per frame
    pub fn width(&self) -> usize {
        self.width
    }

    /// Store one scalar sample (single-channel controllers)
    pub fn on_sample(&self, value: f64) -> Result<Written, StoreError> {
        self.on_frame(&[value])
    }

    /// Store one value per channel and feed the active streaks.
    ///
    /// Buffer write and streak update happen in the same critical section,
    /// so no snapshot ever sees one without the other.
    pub fn on_frame(&self, frame: &[f64]) -> Result<Written, StoreError> {
        if frame.len() != self.width {
            return Err(StoreError::FrameWidth {
                expected: self.width,
                actual: frame.len(),
            });
        }

        let mut state = self.state.lock();
        state.total_writes += 1;

        let mut position = 0;
        let mut closed = Vec::new();
        for (channel, &value) in state.channels.iter_mut().zip(frame) {
            position = channel.buffer.write(value);
            if let Some(streak) = channel.ledger.feed(position, value) {
                closed.push(streak);
            }
        }

        Ok(Written { position, closed })
    }

    pub fn snapshot(&self) -> Snapshot {
        let state = self.state.lock();
        let write_pos = state
            .channels
            .first()
            .map(|c| c.buffer.write_pos())
            .unwrap_or(0);

        Snapshot {
            write_pos,
            total_writes: state.total_writes,
            recording: state.ledger_state() == LedgerState::Recording,
            max_streak_len: state
                .channels
                .first()
                .and_then(|c| c.ledger.max_streak_len()),
            channels: state
                .channels
                .iter()
                .map(|c| ChannelSnapshot {
                    samples: c.buffer.as_slice().to_vec(),
                    history: c.ledger.history().iter().map(|s| s.summary()).collect(),
                    active: c.ledger.active().map(Streak::summary),
                })
                .collect(),
        }
    }

    pub fn start_recording(&self) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        if state.ledger_state() == LedgerState::Recording {
            return Err(StoreError::InvalidTransition {
                from: LedgerState::Recording,
                action: "start a streak",
            });
        }
        for channel in state.channels.iter_mut() {
            channel.ledger.start()?;
        }
        Ok(())
    }

    /// Close the active streaks, one per channel
    pub fn stop_recording(&self) -> Result<Vec<Arc<Streak>>, StoreError> {
        let mut state = self.state.lock();
        if state.ledger_state() == LedgerState::Idle {
            return Err(StoreError::InvalidTransition {
                from: LedgerState::Idle,
                action: "stop a streak",
            });
        }
        state
            .channels
            .iter_mut()
            .map(|channel| channel.ledger.stop())
            .collect()
    }

    /// Zero the buffers and rewind them to slot 0.
    ///
    /// Rejected while recording: the active streak's extent is expressed
    /// in buffer positions and would no longer match the plot.
    pub fn clear_points(&self) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        if state.ledger_state() == LedgerState::Recording {
            return Err(StoreError::InvalidTransition {
                from: LedgerState::Recording,
                action: "clear points",
            });
        }
        for channel in state.channels.iter_mut() {
            channel.buffer.clear();
        }
        Ok(())
    }

    pub fn clear_streaks(&self) {
        let mut state = self.state.lock();
        for channel in state.channels.iter_mut() {
            channel.ledger.clear();
        }
    }

    pub fn set_max_streak_len(&self, limit: Option<usize>) {
        let mut state = self.state.lock();
        for channel in state.channels.iter_mut() {
            channel.ledger.set_max_streak_len(limit);
        }
    }

    pub fn is_recording(&self) -> bool {
        self.state.lock().ledger_state() == LedgerState::Recording
    }

    /// Sample at a physical position of one channel
    pub fn read_at(&self, channel: usize, position: usize) -> Result<f64, StoreError> {
        let state = self.state.lock();
        let channel = state
            .channels
            .get(channel)
            .ok_or(StoreError::IndexOutOfRange {
                position: channel,
                capacity: self.width,
            })?;
        channel.buffer.read_at(position)
    }
}
