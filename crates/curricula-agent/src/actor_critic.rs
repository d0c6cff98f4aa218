//! Episodic advantage actor-critic agent
//!
//! Transitions are buffered per episode. Once `n_episodes` episodes have been
//! closed through [`Agent::end_episode`], the critic regresses onto the
//! discounted returns and the actor follows the normalised advantages with an
//! entropy bonus. Exploration comes from sampling the softmax policy; the
//! shared epsilon schedule is tracked but not consulted.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use ndarray::{Array1, Array2};
use rand::distributions::{Distribution, WeightedIndex};
use serde::{Deserialize, Serialize};

use curricula_core::{
    argmax, Agent, AgentBase, AgentFamily, AgentRng, Experience, ExplorationConfig, Observation,
    RLError, Result,
};

use crate::checkpoint::{AgentArchive, PARAMETERS_MEMBER, STATE_MEMBER};
use crate::network::{Activation, Mlp, MlpConfig, MlpParams};
use crate::optim::Adam;
use crate::utils::{discounted_returns, masked_softmax, normalize};

/// Actor-critic configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActorCriticConfig {
    /// Number of discrete actions
    pub n_actions: usize,
    /// Discount factor
    pub gamma: f64,
    /// Exploration schedule
    #[serde(flatten)]
    pub exploration: ExplorationConfig,
    /// Policy network; output dimension equals `n_actions`
    pub actor: MlpConfig,
    /// Value network; output dimension 1
    pub critic: MlpConfig,
    /// Adam learning rate of the actor
    pub actor_learning_rate: f32,
    /// Adam learning rate of the critic
    pub critic_learning_rate: f32,
    /// Episodes collected per update
    pub n_episodes: usize,
    /// Weight of the entropy bonus
    pub entropy_coef: f32,
}

impl Default for ActorCriticConfig {
    fn default() -> Self {
        Self {
            n_actions: 2,
            gamma: 0.99,
            exploration: ExplorationConfig::default(),
            actor: MlpConfig {
                input_dim: 4,
                hidden_dims: vec![64, 64],
                output_dim: 2,
                activation: Activation::Tanh,
            },
            critic: MlpConfig {
                input_dim: 4,
                hidden_dims: vec![64, 64],
                output_dim: 1,
                activation: Activation::Tanh,
            },
            actor_learning_rate: 3e-4,
            critic_learning_rate: 1e-3,
            n_episodes: 10,
            entropy_coef: 0.01,
        }
    }
}

impl ActorCriticConfig {
    fn validate(&self) -> Result<()> {
        if self.actor.output_dim != self.n_actions {
            return Err(RLError::InvalidConfig(format!(
                "actor output_dim {} does not match n_actions {}",
                self.actor.output_dim, self.n_actions
            )));
        }
        if self.critic.output_dim != 1 {
            return Err(RLError::InvalidConfig("critic output_dim must be 1".into()));
        }
        if self.actor.input_dim != self.critic.input_dim {
            return Err(RLError::InvalidConfig(format!(
                "actor input_dim {} differs from critic input_dim {}",
                self.actor.input_dim, self.critic.input_dim
            )));
        }
        if self.n_episodes == 0 {
            return Err(RLError::InvalidConfig("n_episodes must be positive".into()));
        }
        if self.actor_learning_rate <= 0.0 || self.critic_learning_rate <= 0.0 {
            return Err(RLError::InvalidConfig("learning rates must be positive".into()));
        }
        Ok(())
    }
}

#[derive(Serialize, Deserialize)]
struct ActorCriticParams {
    actor: MlpParams,
    critic: MlpParams,
}

#[derive(Serialize, Deserialize)]
struct ActorCriticState {
    family: AgentFamily,
    config: ActorCriticConfig,
    random_state: AgentRng,
}

#[derive(Debug, Clone)]
struct Transition {
    state: Observation,
    action: usize,
    reward: f64,
    mask: Option<Vec<f32>>,
}

#[derive(Debug, Clone)]
struct Episode {
    transitions: Vec<Transition>,
    terminal: bool,
    last_state: Observation,
}

/// Actor-critic agent
#[derive(Debug, Clone)]
pub struct ActorCriticAgent {
    base: AgentBase,
    config: ActorCriticConfig,
    actor: Mlp,
    critic: Mlp,
    actor_optimizer: Adam,
    critic_optimizer: Adam,
    last_mask: Option<Vec<f32>>,
    current: Vec<Transition>,
    current_end: Option<(Observation, bool)>,
    episodes: Vec<Episode>,
}

impl ActorCriticAgent {
    /// Create a new actor-critic agent
    pub fn new(config: ActorCriticConfig, seed: Option<u64>) -> Result<Self> {
        config.validate()?;
        let mut base = AgentBase::new(config.n_actions, config.gamma, config.exploration, seed)?;
        let actor = Mlp::new(config.actor.clone(), &mut base.rng)?;
        let critic = Mlp::new(config.critic.clone(), &mut base.rng)?;
        Ok(Self {
            base,
            actor,
            critic,
            actor_optimizer: Adam::new(config.actor_learning_rate),
            critic_optimizer: Adam::new(config.critic_learning_rate),
            last_mask: None,
            current: Vec::new(),
            current_end: None,
            episodes: Vec::new(),
            config,
        })
    }

    /// Agent configuration
    #[must_use]
    pub fn config(&self) -> &ActorCriticConfig {
        &self.config
    }

    /// Policy network
    #[must_use]
    pub fn actor(&self) -> &Mlp {
        &self.actor
    }

    /// Value network
    #[must_use]
    pub fn critic(&self) -> &Mlp {
        &self.critic
    }

    /// Closed episodes waiting for the next update
    #[must_use]
    pub fn pending_episodes(&self) -> usize {
        self.episodes.len()
    }

    /// Action probabilities for `state`, restricted to legal actions
    pub fn action_probabilities(&self, state: &Observation, legal_mask: Option<&Array1<f32>>) -> Result<Vec<f64>> {
        let mask = self.check_mask(legal_mask)?;
        let logits = self.actor.forward_one(state.view())?;
        let logits: Vec<f64> = logits.iter().map(|&l| f64::from(l)).collect();
        Ok(masked_softmax(&logits, mask.as_deref()))
    }

    /// Critic estimate of the state value
    pub fn value(&self, state: &Observation) -> Result<f64> {
        let v = self.critic.forward_one(state.view())?;
        Ok(f64::from(v[0]))
    }

    fn check_mask(&self, legal_mask: Option<&Array1<f32>>) -> Result<Option<Vec<f32>>> {
        let Some(mask) = legal_mask else {
            return Ok(None);
        };
        if mask.len() != self.base.n_actions {
            return Err(RLError::DimensionMismatch {
                expected: self.base.n_actions,
                actual: mask.len(),
            });
        }
        if !mask.iter().any(|&m| m > 0.0) {
            return Err(RLError::Agent("legal mask allows no action".into()));
        }
        Ok(Some(mask.to_vec()))
    }

    fn learn(&mut self) -> Result<()> {
        let episodes = std::mem::take(&mut self.episodes);
        let mut transitions = Vec::new();
        let mut returns = Vec::new();
        for episode in episodes {
            let bootstrap = if episode.terminal { 0.0 } else { self.value(&episode.last_state)? };
            let rewards: Vec<f64> = episode.transitions.iter().map(|t| t.reward).collect();
            returns.extend(discounted_returns(&rewards, self.base.gamma, episode.terminal, bootstrap));
            transitions.extend(episode.transitions);
        }
        let n = transitions.len();
        if n == 0 {
            return Ok(());
        }
        let mut states = Array2::<f32>::zeros((n, self.config.actor.input_dim));
        for (i, t) in transitions.iter().enumerate() {
            states.row_mut(i).assign(&t.state);
        }
        let scale = 1.0 / n as f32;

        // Critic: MSE towards the returns
        let critic_cache = self.critic.forward_cached(states.view())?;
        let mut critic_grad = Array2::<f32>::zeros((n, 1));
        let mut advantages = Vec::with_capacity(n);
        let mut value_loss = 0.0f64;
        for i in 0..n {
            let v = f64::from(critic_cache.output[[i, 0]]);
            let diff = v - returns[i];
            value_loss += diff * diff;
            critic_grad[[i, 0]] = 2.0 * diff as f32 * scale;
            advantages.push(returns[i] - v);
        }
        normalize(&mut advantages);

        // Actor: -A log pi(a|s) - beta H(pi(.|s))
        let actor_cache = self.actor.forward_cached(states.view())?;
        let mut actor_grad = Array2::<f32>::zeros(actor_cache.output.raw_dim());
        let beta = f64::from(self.config.entropy_coef);
        let mut entropy_sum = 0.0f64;
        for (i, t) in transitions.iter().enumerate() {
            let logits: Vec<f64> = actor_cache.output.row(i).iter().map(|&l| f64::from(l)).collect();
            let probs = masked_softmax(&logits, t.mask.as_deref());
            let entropy: f64 = probs.iter().filter(|&&p| p > 0.0).map(|&p| -p * p.ln()).sum();
            entropy_sum += entropy;
            for (j, &p) in probs.iter().enumerate() {
                if p <= 0.0 {
                    continue;
                }
                let indicator = if j == t.action { 1.0 } else { 0.0 };
                let g = advantages[i] * (p - indicator) + beta * p * (p.ln() + entropy);
                actor_grad[[i, j]] = g as f32 * scale;
            }
        }

        let critic_grads = self.critic.backward(&critic_cache, &critic_grad)?;
        self.critic_optimizer.step(&mut self.critic, &critic_grads)?;
        let actor_grads = self.actor.backward(&actor_cache, &actor_grad)?;
        self.actor_optimizer.step(&mut self.actor, &actor_grads)?;

        tracing::debug!(
            transitions = n,
            value_loss = value_loss / n as f64,
            entropy = entropy_sum / n as f64,
            "actor-critic update"
        );
        Ok(())
    }

    /// Rebuild an agent from an archive
    pub fn from_archive(archive: &AgentArchive) -> Result<Self> {
        let state: ActorCriticState = archive.json(STATE_MEMBER)?;
        let params: ActorCriticParams = archive.bincode(PARAMETERS_MEMBER)?;
        let mut agent = Self::new(state.config, None)?;
        agent.base.rng = state.random_state;
        agent.actor.set_params(params.actor)?;
        agent.critic.set_params(params.critic)?;
        Ok(agent)
    }

    /// Load an agent saved with [`Agent::save`]
    pub async fn load(path: &Path) -> Result<Self> {
        Self::from_archive(&AgentArchive::read(path).await?)
    }
}

#[async_trait]
impl Agent for ActorCriticAgent {
    fn family(&self) -> AgentFamily {
        AgentFamily::ActorCritic
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
        let probs = self.action_probabilities(state, legal_mask)?;
        self.last_mask = legal_mask.map(|m| m.to_vec());
        if greedy {
            return Ok(argmax(&probs));
        }
        let dist = WeightedIndex::new(&probs).map_err(|e| RLError::Agent(e.to_string()))?;
        Ok(dist.sample(&mut self.base.rng))
    }

    fn update(&mut self, experience: Experience) -> Result<()> {
        self.base.check_action(experience.action)?;
        if experience.state.len() != self.config.actor.input_dim {
            return Err(RLError::DimensionMismatch {
                expected: self.config.actor.input_dim,
                actual: experience.state.len(),
            });
        }
        self.current.push(Transition {
            state: experience.state,
            action: experience.action,
            reward: experience.reward,
            mask: self.last_mask.take(),
        });
        self.current_end = Some((experience.next_state, experience.done));
        Ok(())
    }

    fn end_episode(&mut self) -> Result<()> {
        let Some((last_state, terminal)) = self.current_end.take() else {
            return Ok(());
        };
        self.episodes.push(Episode {
            transitions: std::mem::take(&mut self.current),
            terminal,
            last_state,
        });
        if self.episodes.len() >= self.config.n_episodes {
            self.learn()?;
        }
        Ok(())
    }

    async fn save(&self, path: &Path) -> Result<PathBuf> {
        let mut config = self.config.clone();
        config.exploration = self.base.exploration;
        let mut archive = AgentArchive::new();
        archive.insert_bincode(
            PARAMETERS_MEMBER,
            &ActorCriticParams {
                actor: self.actor.params().clone(),
                critic: self.critic.params().clone(),
            },
        )?;
        archive.insert_json(
            STATE_MEMBER,
            &ActorCriticState {
                family: self.family(),
                config,
                random_state: self.base.rng.clone(),
            },
        )?;
        archive.write(path).await
    }
}
