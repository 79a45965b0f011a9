//! Session status shown next to the plot

use crate::store::StreakSummary;
use serde::{Deserialize, Serialize};

/// What the UI shows besides the plot itself
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStatus {
    pub recording: bool,
    pub export_on_stop: bool,
    pub max_streak_len: Option<usize>,
    pub samples_seen: u64,
    pub last_streak: Option<StreakSummary>,
    /// Outcome of the last command, e.g. a rejected start
    pub message: Option<String>,
}

impl Default for SessionStatus {
    fn default() -> Self {
        Self {
            recording: false,
            export_on_stop: true,
            max_streak_len: None,
            samples_seen: 0,
            last_streak: None,
            message: None,
        }
    }
}

impl SessionStatus {
    /// Status line for the last streak
    pub fn streak_text(&self) -> String {
        match &self.last_streak {
            Some(s) => format!("Last streak = {:.2} ± {:.2}", s.mean, s.standard_error),
            None => "No data yet".to_string(),
        }
    }
}
