//! Experience records

use serde::{Deserialize, Serialize};

use crate::Observation;

/// One environment transition as seen by a learner
///
/// Records are immutable once built; learners keep them by value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experience {
    /// State the action was taken in
    pub state: Observation,
    /// Action index
    pub action: usize,
    /// Reward received
    pub reward: f64,
    /// State after the transition
    pub next_state: Observation,
    /// Whether the transition ended the episode in a terminal state
    pub done: bool,
}

impl Experience {
    /// Build a record
    #[must_use]
    pub fn new(state: Observation, action: usize, reward: f64, next_state: Observation, done: bool) -> Self {
        Self {
            state,
            action,
            reward,
            next_state,
            done,
        }
    }
}
