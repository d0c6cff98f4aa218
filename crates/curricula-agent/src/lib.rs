//! Reinforcement learning agents for curriculum training
//!
//! This crate provides the learner implementations:
//! - Tabular Q-learning
//! - Deep Q-Networks (DQN) with experience replay and a soft-updated target
//! - Episodic advantage actor-critic
//!
//! Every agent saves itself into a single checkpoint archive; [`load_agent`]
//! restores any of them by the family recorded inside.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod actor_critic;
pub mod buffer;
pub mod checkpoint;
pub mod dqn;
pub mod network;
pub mod optim;
pub mod q_learning;
pub mod utils;

use std::path::Path;

use serde::{Deserialize, Serialize};

use curricula_core::{Agent, AgentFamily, Result};

// Re-export agents
pub use actor_critic::{ActorCriticAgent, ActorCriticConfig};
pub use dqn::{DqnAgent, DqnConfig};
pub use q_learning::{QLearningAgent, QLearningConfig};

// Re-export building blocks
pub use buffer::ReplayBuffer;
pub use checkpoint::AgentArchive;
pub use network::{Activation, Mlp, MlpConfig, MlpParams};
pub use optim::Adam;

/// Hyperparameters of any agent, tagged by family
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum AgentSpec {
    /// Tabular Q-learning
    QLearning(QLearningConfig),
    /// Deep Q-network
    Dqn(DqnConfig),
    /// Actor-critic
    ActorCritic(ActorCriticConfig),
}

impl AgentSpec {
    /// Family of the configured agent
    #[must_use]
    pub fn family(&self) -> AgentFamily {
        match self {
            Self::QLearning(_) => AgentFamily::QLearning,
            Self::Dqn(_) => AgentFamily::Dqn,
            Self::ActorCritic(_) => AgentFamily::ActorCritic,
        }
    }

    /// Default hyperparameters for `family`
    #[must_use]
    pub fn default_for(family: AgentFamily) -> Self {
        match family {
            AgentFamily::QLearning => Self::QLearning(QLearningConfig::default()),
            AgentFamily::Dqn => Self::Dqn(DqnConfig::default()),
            AgentFamily::ActorCritic => Self::ActorCritic(ActorCriticConfig::default()),
        }
    }

    /// Build a fresh agent seeded with `seed`
    pub fn build(&self, seed: Option<u64>) -> Result<Box<dyn Agent>> {
        Ok(match self {
            Self::QLearning(config) => Box::new(QLearningAgent::new(config.clone(), seed)?),
            Self::Dqn(config) => Box::new(DqnAgent::new(config.clone(), seed)?),
            Self::ActorCritic(config) => Box::new(ActorCriticAgent::new(config.clone(), seed)?),
        })
    }
}

/// Load any agent saved with [`Agent::save`]
pub async fn load_agent(path: &Path) -> Result<Box<dyn Agent>> {
    let archive = AgentArchive::read(path).await?;
    let agent: Box<dyn Agent> = match archive.family()? {
        AgentFamily::QLearning => Box::new(QLearningAgent::from_archive(&archive)?),
        AgentFamily::Dqn => Box::new(DqnAgent::from_archive(&archive)?),
        AgentFamily::ActorCritic => Box::new(ActorCriticAgent::from_archive(&archive)?),
    };
    tracing::debug!(family = %agent.family(), path = %path.display(), "loaded agent");
    Ok(agent)
}

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        load_agent, ActorCriticAgent, ActorCriticConfig, AgentSpec, DqnAgent, DqnConfig, QLearningAgent,
        QLearningConfig, ReplayBuffer,
    };
    pub use curricula_core::prelude::*;
}
