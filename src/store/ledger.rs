//! Streak lifecycle: one active streak at a time, closed ones kept in order

use super::streak::{Streak, WrapPolicy};
use super::StoreError;
use std::fmt;
use std::sync::Arc;

/// Recording state of a ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerState {
    Idle,
    Recording,
}

impl fmt::Display for LedgerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerState::Idle => f.write_str("idle"),
            LedgerState::Recording => f.write_str("recording"),
        }
    }
}

/// Closed streaks plus the one being recorded.
///
/// Closed streaks are shared as `Arc<Streak>` and never handed out mutably,
/// so an exporter can hold one while sampling carries on.
#[derive(Debug, Clone)]
pub struct StreakLedger {
    history: Vec<Arc<Streak>>,
    active: Option<Streak>,
    capacity: usize,
    policy: WrapPolicy,
    retain_samples: bool,
    max_streak_len: Option<usize>,
}

impl StreakLedger {
    /// Create an idle ledger for streaks over a buffer of `capacity` slots
    pub fn new(capacity: usize, policy: WrapPolicy, retain_samples: bool) -> Self {
        Self {
            history: Vec::new(),
            active: None,
            capacity,
            policy,
            retain_samples,
            max_streak_len: None,
        }
    }

    /// Auto-stop length; `None` or `Some(0)` disables it
    pub fn set_max_streak_len(&mut self, limit: Option<usize>) {
        self.max_streak_len = limit.filter(|&n| n > 0);
    }

    pub fn max_streak_len(&self) -> Option<usize> {
        self.max_streak_len
    }

    pub fn start(&mut self) -> Result<(), StoreError> {
        if self.active.is_some() {
            return Err(StoreError::InvalidTransition {
                from: LedgerState::Recording,
                action: "start a streak",
            });
        }
        self.active = Some(Streak::new(
            self.capacity,
            self.policy,
            self.retain_samples,
        ));
        Ok(())
    }

    /// Extend the active streak, if any.
    ///
    /// Returns the streak closed by auto-stop when this sample brought it
    /// to the configured length. The limit counts samples fed, so it also
    /// fires under [`WrapPolicy::Evict`] when it exceeds the capacity.
    pub fn feed(&mut self, position: usize, value: f64) -> Option<Arc<Streak>> {
        let active = self.active.as_mut()?;
        active.extend(position, value);

        let limit = self.max_streak_len?;
        if active.fed() >= limit {
            return self.stop().ok();
        }
        None
    }

    /// Close the active streak and move it to history
    pub fn stop(&mut self) -> Result<Arc<Streak>, StoreError> {
        let streak = self.active.take().ok_or(StoreError::InvalidTransition {
            from: LedgerState::Idle,
            action: "stop a streak",
        })?;
        let closed = Arc::new(streak);
        self.history.push(Arc::clone(&closed));
        Ok(closed)
    }

    /// Drop history and discard (not close) the active streak
    pub fn clear(&mut self) {
        self.history.clear();
        self.active = None;
    }

    pub fn state(&self) -> LedgerState {
        if self.active.is_some() {
            LedgerState::Recording
        } else {
            LedgerState::Idle
        }
    }

    pub fn is_recording(&self) -> bool {
        self.active.is_some()
    }

    pub fn history(&self) -> &[Arc<Streak>] {
        &self.history
    }

    pub fn active(&self) -> Option<&Streak> {
        self.active.as_ref()
    }

    /// The streak shown in the status line: the active one, else the last closed
    pub fn last(&self) -> Option<&Streak> {
        self.active
            .as_ref()
            .or_else(|| self.history.last().map(|s| s.as_ref()))
    }
}
