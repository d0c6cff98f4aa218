//! Tabular Q-learning agent

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use ndarray::Array1;
use serde::{Deserialize, Serialize};

use curricula_core::{
    Agent, AgentBase, AgentFamily, AgentRng, EpsilonGreedy, Experience, ExplorationConfig, Observation,
    RLError, Result,
};

use crate::checkpoint::{AgentArchive, PARAMETERS_MEMBER, STATE_MEMBER};

/// Q-learning configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QLearningConfig {
    /// Number of discrete actions
    pub n_actions: usize,
    /// Discount factor
    pub gamma: f64,
    /// Learning rate
    pub alpha: f64,
    /// Exploration schedule
    #[serde(flatten)]
    pub exploration: ExplorationConfig,
}

impl Default for QLearningConfig {
    fn default() -> Self {
        Self {
            n_actions: 4,
            gamma: 0.99,
            alpha: 0.1,
            exploration: ExplorationConfig::default(),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct QLearningState {
    family: AgentFamily,
    config: QLearningConfig,
    random_state: AgentRng,
}

/// Canonical table key for an observation
#[must_use]
pub fn state_key(state: &Observation) -> String {
    let parts: Vec<String> = state.iter().map(ToString::to_string).collect();
    parts.join(",")
}

/// Lazily initialised Q-table learner
#[derive(Debug, Clone)]
pub struct QLearningAgent {
    base: AgentBase,
    alpha: f64,
    q_table: HashMap<String, Vec<f64>>,
}

impl QLearningAgent {
    /// Create a new agent
    pub fn new(config: QLearningConfig, seed: Option<u64>) -> Result<Self> {
        if !(config.alpha > 0.0 && config.alpha <= 1.0) {
            return Err(RLError::InvalidConfig(format!(
                "alpha must be in (0, 1], got {}",
                config.alpha
            )));
        }
        Ok(Self {
            base: AgentBase::new(config.n_actions, config.gamma, config.exploration, seed)?,
            alpha: config.alpha,
            q_table: HashMap::new(),
        })
    }

    /// Values for `state`, inserting zeros on first visit
    pub fn q_values(&mut self, state: &Observation) -> &[f64] {
        let n_actions = self.base.n_actions;
        self.q_table
            .entry(state_key(state))
            .or_insert_with(|| vec![0.0; n_actions])
    }

    /// Overwrite the values of `state`
    pub fn set_q_values(&mut self, state: &Observation, values: Vec<f64>) -> Result<()> {
        if values.len() != self.base.n_actions {
            return Err(RLError::DimensionMismatch {
                expected: self.base.n_actions,
                actual: values.len(),
            });
        }
        self.q_table.insert(state_key(state), values);
        Ok(())
    }

    /// Number of visited states
    #[must_use]
    pub fn table_len(&self) -> usize {
        self.q_table.len()
    }

    fn config(&self) -> QLearningConfig {
        QLearningConfig {
            n_actions: self.base.n_actions,
            gamma: self.base.gamma,
            alpha: self.alpha,
            exploration: self.base.exploration,
        }
    }

    /// Rebuild an agent from an archive
    pub fn from_archive(archive: &AgentArchive) -> Result<Self> {
        let state: QLearningState = archive.json(STATE_MEMBER)?;
        let mut agent = Self::new(state.config, None)?;
        agent.base.rng = state.random_state;
        agent.q_table = archive.bincode(PARAMETERS_MEMBER)?;
        Ok(agent)
    }

    /// Load an agent saved with [`Agent::save`]
    pub async fn load(path: &Path) -> Result<Self> {
        Self::from_archive(&AgentArchive::read(path).await?)
    }
}

#[async_trait]
impl Agent for QLearningAgent {
    fn family(&self) -> AgentFamily {
        AgentFamily::QLearning
    }

    fn base(&self) -> &AgentBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut AgentBase {
        &mut self.base
    }

    fn select_action(
        &mut self,
        state: &Observation,
        legal_mask: Option<&Array1<f32>>,
        greedy: bool,
    ) -> Result<usize> {
        let values = self.q_values(state).to_vec();
        let policy = EpsilonGreedy {
            epsilon: self.base.epsilon(),
            greedy,
            legal_mask,
        };
        policy.select(&values, &mut self.base.rng)
    }

    fn update(&mut self, experience: Experience) -> Result<()> {
        self.base.check_action(experience.action)?;
        let target = if experience.done {
            experience.reward
        } else {
            let next_best = self
                .q_values(&experience.next_state)
                .iter()
                .copied()
                .fold(f64::NEG_INFINITY, f64::max);
            experience.reward + self.base.gamma * next_best
        };
        let alpha = self.alpha;
        let n_actions = self.base.n_actions;
        let values = self
            .q_table
            .entry(state_key(&experience.state))
            .or_insert_with(|| vec![0.0; n_actions]);
        let q = &mut values[experience.action];
        *q = (1.0 - alpha) * *q + alpha * target;
        Ok(())
    }

    async fn save(&self, path: &Path) -> Result<PathBuf> {
        let mut archive = AgentArchive::new();
        archive.insert_bincode(PARAMETERS_MEMBER, &self.q_table)?;
        archive.insert_json(
            STATE_MEMBER,
            &QLearningState {
                family: self.family(),
                config: self.config(),
                random_state: self.base.rng.clone(),
            },
        )?;
        archive.write(path).await
    }
}
