//! Environment wrappers for common transformations

use async_trait::async_trait;
use ndarray::Array1;

use curricula_core::{Environment, Observation, Result, Step};

/// Time limit wrapper
///
/// Marks the step that reaches `max_steps` as truncated unless the inner
/// environment already terminated on it.
pub struct TimeLimit<E> {
    /// Inner environment
    pub env: E,
    /// Maximum steps
    pub max_steps: usize,
    /// Current step count
    pub steps: usize,
}

impl<E> TimeLimit<E> {
    /// Create a new time limit wrapper
    pub fn new(env: E, max_steps: usize) -> Self {
        Self {
            env,
            max_steps,
            steps: 0,
        }
    }
}

#[async_trait]
impl<E> Environment for TimeLimit<E>
where
    E: Environment,
{
    fn n_actions(&self) -> usize {
        self.env.n_actions()
    }

    fn legal_mask(&self) -> Option<Array1<f32>> {
        self.env.legal_mask()
    }

    async fn reset(&mut self) -> Result<Observation> {
        self.steps = 0;
        self.env.reset().await
    }

    async fn step(&mut self, action: usize) -> Result<Step> {
        self.steps += 1;
        let mut step = self.env.step(action).await?;

        if self.steps >= self.max_steps && !step.terminated {
            step.truncated = true;
        }

        Ok(step)
    }

    async fn close(&mut self) -> Result<()> {
        self.env.close().await
    }
}
