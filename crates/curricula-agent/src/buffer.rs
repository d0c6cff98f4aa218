//! Experience replay buffer

use rand::seq::index;
use rand::Rng;
use std::collections::VecDeque;

/// Bounded FIFO replay memory
///
/// Once `capacity` is reached every push evicts the oldest record.
#[derive(Debug, Clone)]
pub struct ReplayBuffer<T> {
    /// Buffer storage
    buffer: VecDeque<T>,
    /// Maximum capacity
    capacity: usize,
}

impl<T> ReplayBuffer<T> {
    /// Create a new replay buffer
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buffer: VecDeque::with_capacity(capacity.min(4096)),
            capacity,
        }
    }

    /// Add a record, evicting the oldest one when full
    pub fn push(&mut self, item: T) {
        if self.buffer.len() >= self.capacity {
            self.buffer.pop_front();
        }
        self.buffer.push_back(item);
    }

    /// Draw `batch_size` distinct records uniformly at random
    ///
    /// Returns `None` until the buffer holds at least one full batch.
    pub fn sample<R: Rng + ?Sized>(&self, batch_size: usize, rng: &mut R) -> Option<Vec<&T>> {
        if batch_size == 0 || self.buffer.len() < batch_size {
            return None;
        }
        let picked = index::sample(rng, self.buffer.len(), batch_size);
        Some(picked.into_iter().map(|i| &self.buffer[i]).collect())
    }

    /// Records oldest first
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.buffer.iter()
    }

    /// Get the current size of the buffer
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if buffer is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Maximum number of records kept
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Clear the buffer
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}
