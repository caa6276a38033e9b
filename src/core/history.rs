//! Fixed-capacity sample histories used to smooth noisy per-tick signals.

use statrs::statistics::Statistics;
use std::collections::VecDeque;

/// Capacity of the motion-level history (about two seconds at 30 fps).
pub const MOTION_HISTORY_SIZE: usize = 60;

/// Capacity of the volume history.
pub const VOLUME_HISTORY_SIZE: usize = 60;

/// Capacity of the breathing band-power history.
pub const BREATHING_HISTORY_SIZE: usize = 30;

/// Ring buffer of the last `capacity` samples; oldest evicted first.
#[derive(Debug, Clone)]
pub struct History {
    samples: VecDeque<f64>,
    capacity: usize,
}

impl History {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, value: f64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Running mean, or 0 when empty.
    pub fn mean(&self) -> f64 {
        if self.samples.is_empty() {
            0.0
        } else {
            self.samples.iter().mean()
        }
    }

    /// Population standard deviation, or 0 when empty.
    pub fn std_dev(&self) -> f64 {
        if self.samples.is_empty() {
            0.0
        } else {
            self.samples.iter().population_std_dev()
        }
    }

    /// Samples in insertion order, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        self.samples.iter().copied()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}
