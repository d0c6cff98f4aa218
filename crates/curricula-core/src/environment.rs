//! Environment contract consumed by learning tasks

use async_trait::async_trait;
use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// Observation handed to agents
pub type Observation = Array1<f32>;

/// Result of a single environment step
#[derive(Debug, Clone)]
pub struct Step {
    /// Observation after the transition
    pub observation: Observation,
    /// Reward signal
    pub reward: f64,
    /// Whether the episode reached a terminal state
    pub terminated: bool,
    /// Whether the episode was cut short (e.g., time limit)
    pub truncated: bool,
    /// Additional info from the environment
    pub info: StepInfo,
}

impl Step {
    /// Whether the episode is over for any reason
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.terminated || self.truncated
    }
}

/// Additional information from a step
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepInfo {
    /// Custom fields
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

/// Core environment trait
///
/// Environments own their dynamics and randomness. Actions are indices into
/// a discrete action space of size [`Environment::n_actions`].
#[async_trait]
pub trait Environment: Send {
    /// Size of the discrete action space
    fn n_actions(&self) -> usize;

    /// Binary mask of the actions legal in the current state, if the
    /// environment restricts them
    fn legal_mask(&self) -> Option<Array1<f32>> {
        None
    }

    /// Reset the environment and return the first observation
    async fn reset(&mut self) -> crate::Result<Observation>;

    /// Take a step in the environment
    async fn step(&mut self, action: usize) -> crate::Result<Step>;

    /// Close the environment
    async fn close(&mut self) -> crate::Result<()> {
        Ok(())
    }
}

#[async_trait]
impl<E> Environment for Box<E>
where
    E: Environment + ?Sized,
{
    fn n_actions(&self) -> usize {
        (**self).n_actions()
    }

    fn legal_mask(&self) -> Option<Array1<f32>> {
        (**self).legal_mask()
    }

    async fn reset(&mut self) -> crate::Result<Observation> {
        (**self).reset().await
    }

    async fn step(&mut self, action: usize) -> crate::Result<Step> {
        (**self).step(action).await
    }

    async fn close(&mut self) -> crate::Result<()> {
        (**self).close().await
    }
}
