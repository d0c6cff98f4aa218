//! Learning tasks and curricula
//!
//! A [`LearningTask`] trains an agent in one environment until a stop
//! condition triggers; a [`Curriculum`] chains tasks so that what the agent
//! learned in easier stages carries into harder ones.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod curriculum;
pub mod stats;
pub mod task;

pub use curriculum::Curriculum;
pub use stats::{moving_average, Evaluation, TaskStats};
pub use task::{LearningTask, StopConditions, StopReason, TaskState};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{Curriculum, LearningTask, StopConditions, TaskStats};
    pub use curricula_core::prelude::*;
}
