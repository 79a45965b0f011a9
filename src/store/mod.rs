//! Sliding-window sample store
//!
//! A fixed-capacity circular buffer of the most recent samples, streaks
//! accumulated over contiguous runs of it, and the controller that keeps
//! both consistent between the sampling thread and the UI.

mod buffer;
mod controller;
mod ledger;
mod streak;

pub use buffer::CircularBuffer;
pub use controller::{
    ChannelSnapshot, ControllerOptions, SamplingController, Snapshot, Written,
};
pub use ledger::{LedgerState, StreakLedger};
pub use streak::{Extent, Span, Streak, StreakSummary, WrapPolicy};

use thiserror::Error;

/// Sample store errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Cannot {action} while {from}")]
    InvalidTransition {
        from: LedgerState,
        action: &'static str,
    },

    #[error("Position {position} out of range for capacity {capacity}")]
    IndexOutOfRange { position: usize, capacity: usize },

    #[error("Resource unavailable: {0}")]
    ResourceUnavailable(String),

    #[error("Expected a frame of {expected} values, got {actual}")]
    FrameWidth { expected: usize, actual: usize },

    #[error("Capacity must be greater than zero")]
    InvalidCapacity,
}
