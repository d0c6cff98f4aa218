//! Agent traits and the shared agent base record

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use async_trait::async_trait;
use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::{AgentRng, Experience, Observation, RLError};

/// Learner families known to the workspace
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentFamily {
    /// Tabular Q-learning
    QLearning,
    /// Deep Q-network with replay and a soft-updated target network
    Dqn,
    /// Episodic advantage actor-critic
    ActorCritic,
}

impl AgentFamily {
    /// Stable lowercase identifier used in file names and records
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::QLearning => "q_learning",
            Self::Dqn => "dqn",
            Self::ActorCritic => "actor_critic",
        }
    }
}

impl fmt::Display for AgentFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentFamily {
    type Err = RLError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "q_learning" | "qlearning" | "ql" => Ok(Self::QLearning),
            "dqn" => Ok(Self::Dqn),
            "actor_critic" | "actorcritic" | "ac" | "ppo" => Ok(Self::ActorCritic),
            _ => Err(RLError::UnknownAgentFamily(s.to_string())),
        }
    }
}

/// Epsilon schedule shared by every learner
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplorationConfig {
    /// Initial exploration rate
    pub epsilon: f64,
    /// Multiplicative decay applied after each training episode
    pub epsilon_decay: f64,
    /// Floor the decay never goes below
    pub min_epsilon: f64,
}

impl Default for ExplorationConfig {
    fn default() -> Self {
        Self {
            epsilon: 1.0,
            epsilon_decay: 0.995,
            min_epsilon: 0.01,
        }
    }
}

/// State composed into every agent variant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentBase {
    /// Size of the discrete action space
    pub n_actions: usize,
    /// Discount factor
    pub gamma: f64,
    /// Current epsilon and its schedule
    pub exploration: ExplorationConfig,
    /// Agent random stream
    pub rng: AgentRng,
}

impl AgentBase {
    /// Validate hyperparameters and build the record
    pub fn new(
        n_actions: usize,
        gamma: f64,
        exploration: ExplorationConfig,
        seed: Option<u64>,
    ) -> crate::Result<Self> {
        if n_actions == 0 {
            return Err(RLError::InvalidConfig("n_actions must be positive".into()));
        }
        if !(gamma > 0.0 && gamma <= 1.0) {
            return Err(RLError::InvalidConfig(format!("gamma must be in (0, 1], got {gamma}")));
        }
        for (name, value) in [
            ("epsilon", exploration.epsilon),
            ("epsilon_decay", exploration.epsilon_decay),
            ("min_epsilon", exploration.min_epsilon),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(RLError::InvalidConfig(format!("{name} must be in [0, 1], got {value}")));
            }
        }
        Ok(Self {
            n_actions,
            gamma,
            exploration,
            rng: AgentRng::new(seed),
        })
    }

    /// Current exploration rate
    #[must_use]
    pub fn epsilon(&self) -> f64 {
        self.exploration.epsilon
    }

    /// Apply one step of the decay schedule
    pub fn decay_epsilon(&mut self) {
        let e = &mut self.exploration;
        e.epsilon = (e.epsilon * e.epsilon_decay).max(e.min_epsilon);
    }

    /// Reinstate the exploration rate, e.g. at the start of a task
    pub fn reset_exploration(&mut self, epsilon: f64) {
        self.exploration.epsilon = epsilon.clamp(0.0, 1.0);
    }

    /// Check that an action index fits the action space
    pub fn check_action(&self, action: usize) -> crate::Result<()> {
        if action < self.n_actions {
            Ok(())
        } else {
            Err(RLError::InvalidAction {
                action,
                n_actions: self.n_actions,
            })
        }
    }
}

/// Capability interface every learner implements
#[async_trait]
pub trait Agent: Send + Sync {
    /// Which family this learner belongs to
    fn family(&self) -> AgentFamily;

    /// Shared base record
    fn base(&self) -> &AgentBase;

    /// Mutable shared base record
    fn base_mut(&mut self) -> &mut AgentBase;

    /// Choose an action for `state`
    ///
    /// `legal_mask` restricts both exploitation and exploration to legal
    /// actions; `greedy` disables exploration.
    fn select_action(
        &mut self,
        state: &Observation,
        legal_mask: Option<&Array1<f32>>,
        greedy: bool,
    ) -> crate::Result<usize>;

    /// Learn from one environment transition
    fn update(&mut self, experience: Experience) -> crate::Result<()>;

    /// Hook called by the training loop after every training episode
    fn end_episode(&mut self) -> crate::Result<()> {
        Ok(())
    }

    /// Persist the agent; returns the path actually written
    async fn save(&self, path: &Path) -> crate::Result<PathBuf>;

    /// Current exploration rate
    fn epsilon(&self) -> f64 {
        self.base().epsilon()
    }

    /// Apply one step of the epsilon decay schedule
    fn decay_epsilon(&mut self) {
        self.base_mut().decay_epsilon();
    }

    /// Reinstate the exploration rate
    fn reset_exploration(&mut self, epsilon: f64) {
        self.base_mut().reset_exploration(epsilon);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epsilon_decays_to_floor() {
        let mut base = AgentBase::new(
            2,
            0.9,
            ExplorationConfig {
                epsilon: 1.0,
                epsilon_decay: 0.5,
                min_epsilon: 0.1,
            },
            Some(0),
        )
        .unwrap();
        base.decay_epsilon();
        assert!((base.epsilon() - 0.5).abs() < 1e-12);
        for _ in 0..10 {
            base.decay_epsilon();
        }
        assert!((base.epsilon() - 0.1).abs() < 1e-12);
        base.reset_exploration(0.3);
        assert!((base.epsilon() - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_rejects_bad_hyperparameters() {
        assert!(AgentBase::new(0, 0.9, ExplorationConfig::default(), None).is_err());
        assert!(AgentBase::new(2, 0.0, ExplorationConfig::default(), None).is_err());
        assert!(AgentBase::new(2, 1.5, ExplorationConfig::default(), None).is_err());
    }

    #[test]
    fn test_family_parsing() {
        assert_eq!("dqn".parse::<AgentFamily>().unwrap(), AgentFamily::Dqn);
        assert_eq!("actor_critic".parse::<AgentFamily>().unwrap(), AgentFamily::ActorCritic);
        assert!(matches!(
            "sarsa".parse::<AgentFamily>(),
            Err(RLError::UnknownAgentFamily(name)) if name == "sarsa"
        ));
        assert_eq!(AgentFamily::QLearning.to_string(), "q_learning");
    }
}
