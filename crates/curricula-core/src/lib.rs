//! Core reinforcement learning traits and types for curriculum training
//!
//! This crate provides the foundational abstractions shared by the agent,
//! environment, task and experiment crates: the error taxonomy, the
//! dual-clock stopwatch, the environment contract, experience records and
//! the common agent base record.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod agent;
pub mod environment;
pub mod error;
pub mod interrupt;
pub mod policy;
pub mod rng;
pub mod stopwatch;
pub mod trajectory;

// Re-export core traits and types
pub use agent::{Agent, AgentBase, AgentFamily, ExplorationConfig};
pub use environment::{Environment, Observation, Step, StepInfo};
pub use error::{RLError, Result};
pub use interrupt::Interrupt;
pub use policy::{argmax, mask_values, EpsilonGreedy};
pub use rng::AgentRng;
pub use stopwatch::{Clock, Elapsed, ProcessClock, Stopwatch, SubStopwatch, WallClock};
pub use trajectory::Experience;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        Agent, AgentBase, AgentFamily, Environment, Experience, Interrupt, Observation, Result,
        RLError, Step, Stopwatch,
    };
}
