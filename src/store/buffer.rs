//! Fixed-capacity circular sample buffer

use super::StoreError;

/// Circular buffer of the most recent samples.
///
/// `data[write_pos]` always holds the newest sample. The first write into a
/// new or cleared buffer lands on slot 0; every later one advances first.
/// Positions are
/// physical slots, which is also the coordinate system streaks use to
/// describe where on the plot they lie.
#[derive(Debug, Clone)]
pub struct CircularBuffer {
    data: Vec<f64>,
    write_pos: usize,
    capacity: usize,
    empty: bool,
}

impl CircularBuffer {
    pub fn new(capacity: usize) -> Result<Self, StoreError> {
        if capacity == 0 {
            return Err(StoreError::InvalidCapacity);
        }
        Ok(Self {
            data: vec![0.0; capacity],
            write_pos: 0,
            capacity,
            empty: true,
        })
    }

    /// Advance the write position and store `sample` there.
    ///
    /// Returns the position written. Overwrites the oldest slot once full.
    pub fn write(&mut self, sample: f64) -> usize {
        if self.empty {
            self.empty = false;
        } else {
            self.write_pos = (self.write_pos + 1) % self.capacity;
        }
        self.data[self.write_pos] = sample;
        self.write_pos
    }

    /// Sample stored at a physical position
    pub fn read_at(&self, position: usize) -> Result<f64, StoreError> {
        self.data
            .get(position)
            .copied()
            .ok_or(StoreError::IndexOutOfRange {
                position,
                capacity: self.capacity,
            })
    }

    /// Sample written `age` writes ago (0 is the newest).
    pub fn ago(&self, age: usize) -> f64 {
        let age = age % self.capacity;
        let idx = (self.write_pos + self.capacity - age) % self.capacity;
        self.data[idx]
    }

    /// Zero every slot and rewind the write position.
    pub fn clear(&mut self) {
        self.data.iter_mut().for_each(|s| *s = 0.0);
        self.write_pos = 0;
        self.empty = true;
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// No sample written since construction or the last clear
    pub fn is_empty(&self) -> bool {
        self.empty
    }

    pub fn write_pos(&self) -> usize {
        self.write_pos
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
