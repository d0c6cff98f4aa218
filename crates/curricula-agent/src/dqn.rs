//! Deep Q-Network (DQN) agent implementation
//!
//! Experience replay plus a target network that follows the primary network
//! through Polyak averaging. Learning happens on every `update_every`-th
//! transition once the replay memory holds at least one batch.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

use curricula_core::{
    Agent, AgentBase, AgentFamily, AgentRng, EpsilonGreedy, Experience, ExplorationConfig, Observation,
    RLError, Result,
};

use crate::buffer::ReplayBuffer;
use crate::checkpoint::{AgentArchive, PARAMETERS_MEMBER, STATE_MEMBER};
use crate::network::{Mlp, MlpConfig, MlpParams};
use crate::optim::Adam;

/// DQN-specific configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DqnConfig {
    /// Number of discrete actions
    pub n_actions: usize,
    /// Discount factor
    pub gamma: f64,
    /// Exploration schedule
    #[serde(flatten)]
    pub exploration: ExplorationConfig,
    /// Mini-batch size
    pub batch_size: usize,
    /// Maximum replay memory size
    pub replay_capacity: usize,
    /// Adam learning rate
    pub learning_rate: f32,
    /// Target network interpolation parameter
    pub tau: f32,
    /// Learn on every n-th transition
    pub update_every: usize,
    /// Q-network architecture
    pub network: MlpConfig,
}

impl Default for DqnConfig {
    fn default() -> Self {
        Self {
            n_actions: 2,
            gamma: 0.99,
            exploration: ExplorationConfig::default(),
            batch_size: 64,
            replay_capacity: 100_000,
            learning_rate: 5e-4,
            tau: 0.001,
            update_every: 3,
            network: MlpConfig::default(),
        }
    }
}

impl DqnConfig {
    fn validate(&self) -> Result<()> {
        if self.network.output_dim != self.n_actions {
            return Err(RLError::InvalidConfig(format!(
                "network output_dim {} does not match n_actions {}",
                self.network.output_dim, self.n_actions
            )));
        }
        if self.batch_size == 0 || self.update_every == 0 {
            return Err(RLError::InvalidConfig(
                "batch_size and update_every must be positive".into(),
            ));
        }
        if self.replay_capacity < self.batch_size {
            return Err(RLError::InvalidConfig(format!(
                "replay_capacity {} is smaller than batch_size {}",
                self.replay_capacity, self.batch_size
            )));
        }
        if !(self.tau > 0.0 && self.tau <= 1.0) {
            return Err(RLError::InvalidConfig(format!("tau must be in (0, 1], got {}", self.tau)));
        }
        if self.learning_rate <= 0.0 {
            return Err(RLError::InvalidConfig("learning_rate must be positive".into()));
        }
        Ok(())
    }
}

#[derive(Serialize, Deserialize)]
struct DqnState {
    family: AgentFamily,
    config: DqnConfig,
    #[serde(default)]
    train_step: usize,
    random_state: AgentRng,
}

/// DQN agent
#[derive(Debug, Clone)]
pub struct DqnAgent {
    base: AgentBase,
    config: DqnConfig,
    memory: ReplayBuffer<Experience>,
    network: Mlp,
    target_network: Mlp,
    optimizer: Adam,
    train_step: usize,
}

impl DqnAgent {
    /// Create a new DQN agent
    ///
    /// The target network starts as an exact copy of the primary network.
    pub fn new(config: DqnConfig, seed: Option<u64>) -> Result<Self> {
        config.validate()?;
        let mut base = AgentBase::new(config.n_actions, config.gamma, config.exploration, seed)?;
        let network = Mlp::new(config.network.clone(), &mut base.rng)?;
        Ok(Self {
            base,
            memory: ReplayBuffer::new(config.replay_capacity),
            target_network: network.clone(),
            network,
            optimizer: Adam::new(config.learning_rate),
            train_step: 0,
            config,
        })
    }

    /// Agent configuration
    #[must_use]
    pub fn config(&self) -> &DqnConfig {
        &self.config
    }

    /// Primary Q-network
    #[must_use]
    pub fn network(&self) -> &Mlp {
        &self.network
    }

    /// Target Q-network
    #[must_use]
    pub fn target_network(&self) -> &Mlp {
        &self.target_network
    }

    /// Replay memory
    #[must_use]
    pub fn memory(&self) -> &ReplayBuffer<Experience> {
        &self.memory
    }

    /// Q-values of the primary network for one state
    pub fn q_values(&self, state: &Observation) -> Result<Vec<f64>> {
        let q = self.network.forward_one(state.view())?;
        Ok(q.iter().map(|&v| f64::from(v)).collect())
    }

    fn check_state(&self, state: &Observation) -> Result<()> {
        if state.len() == self.config.network.input_dim {
            Ok(())
        } else {
            Err(RLError::DimensionMismatch {
                expected: self.config.network.input_dim,
                actual: state.len(),
            })
        }
    }

    /// One gradient step on a sampled mini-batch followed by a soft target update
    fn learn(&mut self) -> Result<Option<f32>> {
        let input_dim = self.config.network.input_dim;
        let gamma = self.base.gamma as f32;

        let (states, next_states, actions, rewards, dones) = {
            let Some(batch) = self.memory.sample(self.config.batch_size, &mut self.base.rng) else {
                return Ok(None);
            };
            let n = batch.len();
            let mut states = Array2::<f32>::zeros((n, input_dim));
            let mut next_states = Array2::<f32>::zeros((n, input_dim));
            let mut actions = Vec::with_capacity(n);
            let mut rewards = Vec::with_capacity(n);
            let mut dones = Vec::with_capacity(n);
            for (i, e) in batch.into_iter().enumerate() {
                states.row_mut(i).assign(&e.state);
                next_states.row_mut(i).assign(&e.next_state);
                actions.push(e.action);
                rewards.push(e.reward as f32);
                dones.push(if e.done { 1.0f32 } else { 0.0 });
            }
            (states, next_states, actions, rewards, dones)
        };
        let n = actions.len();

        let next_max = self.bootstrap_values(&next_states)?;
        let targets = td_targets(&rewards, &next_max, &dones, gamma);

        let cache = self.network.forward_cached(states.view())?;
        let mut grad = Array2::<f32>::zeros(cache.output.raw_dim());
        let mut loss = 0.0f32;
        for (i, &target) in targets.iter().enumerate() {
            let diff = cache.output[[i, actions[i]]] - target;
            loss += diff * diff;
            grad[[i, actions[i]]] = 2.0 * diff / n as f32;
        }
        let grads: MlpParams = self.network.backward(&cache, &grad)?;
        self.optimizer.step(&mut self.network, &grads)?;
        self.target_network.soft_update_from(&self.network, self.config.tau)?;
        Ok(Some(loss / n as f32))
    }

    /// Highest target-network Q-value of every next state
    fn bootstrap_values(&self, next_states: &Array2<f32>) -> Result<Vec<f32>> {
        let next_q = self.target_network.forward(next_states.view())?;
        Ok(next_q
            .map_axis(Axis(1), |row| row.iter().copied().fold(f32::NEG_INFINITY, f32::max))
            .to_vec())
    }

    /// Rebuild an agent from an archive
    pub fn from_archive(archive: &AgentArchive) -> Result<Self> {
        let state: DqnState = archive.json(STATE_MEMBER)?;
        let params: MlpParams = archive.bincode(PARAMETERS_MEMBER)?;
        let mut agent = Self::new(state.config, None)?;
        agent.base.rng = state.random_state;
        agent.train_step = state.train_step;
        agent.network.set_params(params.clone())?;
        agent.target_network.set_params(params)?;
        Ok(agent)
    }

    /// Load an agent saved with [`Agent::save`]
    pub async fn load(path: &Path) -> Result<Self> {
        Self::from_archive(&AgentArchive::read(path).await?)
    }
}

#[async_trait]
impl Agent for DqnAgent {
    fn family(&self) -> AgentFamily {
        AgentFamily::Dqn
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
        let values = self.q_values(state)?;
        let policy = EpsilonGreedy {
            epsilon: self.base.epsilon(),
            greedy,
            legal_mask,
        };
        policy.select(&values, &mut self.base.rng)
    }

    fn update(&mut self, experience: Experience) -> Result<()> {
        self.base.check_action(experience.action)?;
        self.check_state(&experience.state)?;
        self.check_state(&experience.next_state)?;
        self.memory.push(experience);

        self.train_step = (self.train_step + 1) % self.config.update_every;
        if self.train_step == 0 && self.memory.len() >= self.config.batch_size {
            if let Some(loss) = self.learn()? {
                tracing::trace!(loss, "dqn learning step");
            }
        }
        Ok(())
    }

    async fn save(&self, path: &Path) -> Result<PathBuf> {
        let mut config = self.config.clone();
        config.exploration = self.base.exploration;
        let mut archive = AgentArchive::new();
        archive.insert_bincode(PARAMETERS_MEMBER, self.network.params())?;
        archive.insert_json(
            STATE_MEMBER,
            &DqnState {
                family: self.family(),
                config,
                train_step: self.train_step,
                random_state: self.base.rng.clone(),
            },
        )?;
        archive.write(path).await
    }
}

/// Bellman targets `r + γ·max Q'(s')·(1 − done)`
fn td_targets(rewards: &[f32], next_max: &[f32], dones: &[f32], gamma: f32) -> Vec<f32> {
    rewards
        .iter()
        .zip(next_max)
        .zip(dones)
        .map(|((&r, &q), &done)| r + gamma * q * (1.0 - done))
        .collect()
}
