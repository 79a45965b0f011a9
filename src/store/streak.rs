//! Incremental statistics over a contiguous run of buffer positions

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// What a streak does once it covers every slot of the buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WrapPolicy {
    /// Stop moving the end index, keep adding every sample to the statistics
    #[default]
    Accumulate,

    /// Slide over the buffer: the oldest member leaves the statistics and
    /// both indices advance, so the streak never holds more than one buffer
    Evict,
}

/// Inclusive range of buffer positions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

/// Where a streak lies on the circular axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Extent {
    /// The streak covers the whole buffer
    Full(Span),

    /// A single contiguous segment
    Simple(Span),

    /// Crosses the zero boundary: drawn as `[0, end]` and `[start, capacity - 1]`
    Wrapped { head: Span, tail: Span },
}

impl Extent {
    /// Segments in drawing order
    pub fn segments(&self) -> Vec<Span> {
        match *self {
            Extent::Full(span) | Extent::Simple(span) => vec![span],
            Extent::Wrapped { head, tail } => vec![head, tail],
        }
    }
}

/// Statistics and geometry of a streak, without its raw samples
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreakSummary {
    pub count: usize,
    pub mean: f64,
    pub standard_error: f64,
    pub extent: Option<Extent>,
}

/// Running mean and standard error over a contiguous run of samples.
///
/// Both statistics come from the running sums, so every update and every
/// query is O(1). Raw values are kept only when retention is enabled (or
/// the policy needs them to evict).
#[derive(Debug, Clone)]
pub struct Streak {
    start_index: Option<usize>,
    end_index: Option<usize>,
    count: usize,
    /// Samples ever fed; unlike `count`, eviction never lowers it
    fed: usize,
    running_sum: f64,
    running_sum_of_squares: f64,
    capacity: usize,
    policy: WrapPolicy,
    samples: Option<VecDeque<f64>>,
}

impl Streak {
    /// Create an empty streak bound to a buffer of `capacity` slots
    pub fn new(capacity: usize, policy: WrapPolicy, retain_samples: bool) -> Self {
        debug_assert!(capacity > 0, "streak bound to an empty buffer");
        let samples = (retain_samples || policy == WrapPolicy::Evict).then(VecDeque::new);
        Self {
            start_index: None,
            end_index: None,
            count: 0,
            fed: 0,
            running_sum: 0.0,
            running_sum_of_squares: 0.0,
            capacity,
            policy,
            samples,
        }
    }

    /// Add the sample just written at `position`
    pub fn extend(&mut self, position: usize, value: f64) {
        self.fed += 1;
        let end = match self.end_index {
            None => {
                self.start_index = Some(position);
                self.end_index = Some(position);
                self.count = 1;
                self.running_sum = value;
                self.running_sum_of_squares = value * value;
                self.retain(value);
                return;
            }
            Some(end) => end,
        };

        if self.count < self.capacity {
            self.end_index = Some((end + 1) % self.capacity);
        } else if self.policy == WrapPolicy::Evict {
            if let Some(oldest) = self.samples.as_mut().and_then(|s| s.pop_front()) {
                self.running_sum -= oldest;
                self.running_sum_of_squares -= oldest * oldest;
                self.count -= 1;
            }
            self.start_index = self.start_index.map(|s| (s + 1) % self.capacity);
            self.end_index = Some((end + 1) % self.capacity);
        }

        self.count += 1;
        self.running_sum += value;
        self.running_sum_of_squares += value * value;
        self.retain(value);
    }

    fn retain(&mut self, value: f64) {
        if let Some(samples) = self.samples.as_mut() {
            samples.push_back(value);
        }
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.running_sum / self.count as f64
    }

    /// Standard error of the mean (Bessel-corrected deviation over `sqrt(n)`)
    pub fn standard_error(&self) -> f64 {
        if self.count < 2 {
            return 0.0;
        }
        let n = self.count as f64;
        // Cancellation can push this slightly below zero
        let variance =
            ((self.running_sum_of_squares - self.running_sum * self.running_sum / n) / (n - 1.0))
                .max(0.0);
        variance.sqrt() / n.sqrt()
    }

    /// Geometry of the streak over the buffer, `None` while empty
    pub fn extent(&self) -> Option<Extent> {
        let (start, end) = (self.start_index?, self.end_index?);
        let last = self.capacity - 1;
        let extent = if self.count >= self.capacity {
            Extent::Full(Span::new(0, last))
        } else if end >= start {
            Extent::Simple(Span::new(start, end))
        } else {
            Extent::Wrapped {
                head: Span::new(0, end),
                tail: Span::new(start, last),
            }
        };
        Some(extent)
    }

    pub fn summary(&self) -> StreakSummary {
        StreakSummary {
            count: self.count,
            mean: self.mean(),
            standard_error: self.standard_error(),
            extent: self.extent(),
        }
    }

    pub fn len(&self) -> usize {
        self.count
    }

    /// Samples fed since the streak started, evicted ones included
    pub fn fed(&self) -> usize {
        self.fed
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn start_index(&self) -> Option<usize> {
        self.start_index
    }

    pub fn end_index(&self) -> Option<usize> {
        self.end_index
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn policy(&self) -> WrapPolicy {
        self.policy
    }

    /// Retained raw values, oldest first
    pub fn samples(&self) -> Option<&VecDeque<f64>> {
        self.samples.as_ref()
    }
}
