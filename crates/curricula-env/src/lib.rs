//! Reinforcement learning environments for curriculum training
//!
//! This crate provides:
//! - A grid walk whose difficulty adds lava walls (legal-action masks)
//! - CartPole whose difficulty shortens the pole and adds actuator noise
//! - A global registry that builds environments from serializable specs

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod cartpole;
pub mod grid;
pub mod registry;
pub mod wrappers;

// Re-export environments
pub use cartpole::{CartPoleConfig, CartPoleEnv};
pub use grid::{GridWalkConfig, GridWalkEnv};
pub use registry::{list_envs, make_env, register_env, EnvArgs, EnvRegistry, EnvSpec};
pub use wrappers::TimeLimit;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{make_env, CartPoleEnv, EnvSpec, GridWalkEnv, TimeLimit};
    pub use curricula_core::prelude::*;
}
