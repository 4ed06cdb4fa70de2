// THEORY:
// The `SampleBuffer` is the short-term memory of a detection session. It holds the
// most recent observations for the current subject and decides when enough
// evidence has been gathered to justify a persistence call.
//
// Key architectural principles:
// 1.  **Bounded Window**: Like the history windows of the vision layers, it is a
//     fixed-capacity FIFO. Inserting into a full buffer evicts the oldest reading,
//     so the buffer always describes the *latest* behaviour of the subject.
// 2.  **Threshold Signal**: `add` reports when the buffer has reached capacity. The
//     controller uses that signal to hand the batch to the store and then clears.
// 3.  **No Aliasing**: `snapshot` hands out a copy. Nothing outside the buffer can
//     mutate its contents.

use crate::core_modules::observation::Observation;
use std::collections::VecDeque;

/// Number of observations that make up one persisted batch.
pub const REQUIRED_SAMPLES: usize = 5;

/// Fixed-capacity rolling buffer of recent observations for the current subject.
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    samples: VecDeque<Observation>,
    capacity: usize,
}

impl Default for SampleBuffer {
    fn default() -> Self {
        Self::new(REQUIRED_SAMPLES)
    }
}

impl SampleBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Appends an observation, evicting the oldest one when over capacity.
    /// Returns true when the buffer is full after the insertion.
    pub fn add(&mut self, observation: Observation) -> bool {
        self.samples.push_back(observation);
        if self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
        self.samples.len() >= self.capacity
    }

    /// A copy of the buffered observations, oldest first.
    pub fn snapshot(&self) -> Vec<Observation> {
        self.samples.iter().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
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
}
