//! Learning tasks
//!
//! A [`LearningTask`] is pure configuration until it runs: an environment
//! spec, stop conditions and an evaluation protocol. Running it trains an
//! agent episode by episode, evaluates it every `evaluation_interval`
//! episodes and stops at the first active stop condition, checked in the
//! order evaluation score, step budget, episode budget.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use curricula_core::{Agent, Environment, Experience, Interrupt, RLError, Result, Stopwatch};
use curricula_env::EnvSpec;

use crate::stats::{Evaluation, TaskStats};

/// Default episodes between evaluations
pub const DEFAULT_EVALUATION_INTERVAL: usize = 100;
/// Default evaluation episodes per evaluation
pub const DEFAULT_EVALUATION_COUNT: usize = 25;

/// Conditions ending a task; any subset may be active
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StopConditions {
    /// Stop once an evaluation scores at least this much
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_evaluation_score: Option<f64>,
    /// Stop once this many training steps have been taken
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_steps: Option<u64>,
    /// Stop once this many training episodes have been played
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_episodes: Option<usize>,
}

impl StopConditions {
    /// Whether no condition is active
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.min_evaluation_score.is_none() && self.max_steps.is_none() && self.max_episodes.is_none()
    }
}

/// Which stop condition ended a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Evaluation score reached the threshold
    MinEvaluationScore,
    /// Training step budget exhausted
    MaxSteps,
    /// Training episode budget exhausted
    MaxEpisodes,
}

/// Lifecycle of a task
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TaskState {
    /// Not run yet
    #[default]
    Configured,
    /// Training in progress
    Running,
    /// A stop condition triggered
    Completed,
    /// Interrupted or failed before any stop condition triggered
    TerminatedEarly,
}

fn default_evaluation_interval() -> usize {
    DEFAULT_EVALUATION_INTERVAL
}

fn default_evaluation_count() -> usize {
    DEFAULT_EVALUATION_COUNT
}

fn default_true() -> bool {
    true
}

/// A single training stage
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LearningTask {
    /// Display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Environment to train in
    pub env: EnvSpec,
    /// Stop conditions
    #[serde(default)]
    pub stop_conditions: StopConditions,
    /// Training episodes between evaluations
    #[serde(default = "default_evaluation_interval")]
    pub evaluation_interval: usize,
    /// Episodes per evaluation
    #[serde(default = "default_evaluation_count")]
    pub evaluation_count: usize,
    /// Whether evaluation disables exploration
    #[serde(default = "default_true")]
    pub greedy_evaluation: bool,
    /// Epsilon reinstated when the task starts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exploration_reset_value: Option<f64>,
    /// Where to save the trained agent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_save_path: Option<PathBuf>,
    /// Where to save the statistics
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats_save_path: Option<PathBuf>,
    #[serde(skip)]
    stats: TaskStats,
    #[serde(skip)]
    state: TaskState,
}

impl LearningTask {
    /// Create a task with the default evaluation protocol
    pub fn new(env: EnvSpec, stop_conditions: StopConditions) -> Result<Self> {
        let task = Self {
            name: None,
            env,
            stop_conditions,
            evaluation_interval: DEFAULT_EVALUATION_INTERVAL,
            evaluation_count: DEFAULT_EVALUATION_COUNT,
            greedy_evaluation: true,
            exploration_reset_value: None,
            agent_save_path: None,
            stats_save_path: None,
            stats: TaskStats::default(),
            state: TaskState::Configured,
        };
        task.validate()?;
        Ok(task)
    }

    /// Check the configuration
    pub fn validate(&self) -> Result<()> {
        if self.stop_conditions.is_empty() {
            return Err(RLError::InvalidConfig(
                "a learning task needs at least one stop condition".into(),
            ));
        }
        if self.evaluation_interval == 0 || self.evaluation_count == 0 {
            return Err(RLError::InvalidConfig(
                "evaluation_interval and evaluation_count must be positive".into(),
            ));
        }
        if let Some(eps) = self.exploration_reset_value {
            if !(0.0..=1.0).contains(&eps) {
                return Err(RLError::InvalidConfig(format!(
                    "exploration_reset_value must be in [0, 1], got {eps}"
                )));
            }
        }
        Ok(())
    }

    /// Statistics of the last run
    #[must_use]
    pub fn stats(&self) -> &TaskStats {
        &self.stats
    }

    /// Lifecycle state
    #[must_use]
    pub fn state(&self) -> TaskState {
        self.state
    }

    /// Name, or `fallback` for unnamed tasks
    #[must_use]
    pub fn display_name<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.name.as_deref().unwrap_or(fallback)
    }

    /// Train `agent` until a stop condition triggers
    ///
    /// The interrupt flag is observed between episodes. On success the agent
    /// and statistics are written to the configured paths.
    pub async fn run(&mut self, agent: &mut dyn Agent, interrupt: &Interrupt) -> Result<&TaskStats> {
        self.validate()?;
        self.stats = TaskStats::default();
        self.state = TaskState::Running;
        match self.train(agent, interrupt).await {
            Ok(reason) => {
                self.stats.stop_reason = Some(reason);
                self.state = TaskState::Completed;
            }
            Err(e) => {
                self.state = TaskState::TerminatedEarly;
                return Err(e);
            }
        }

        if let Some(path) = &self.agent_save_path {
            let written = agent.save(path).await?;
            tracing::debug!(path = %written.display(), "saved agent");
        }
        if let Some(path) = &self.stats_save_path {
            let written = self.stats.save(path).await?;
            tracing::debug!(path = %written.display(), "saved task statistics");
        }
        Ok(&self.stats)
    }

    async fn train(&mut self, agent: &mut dyn Agent, interrupt: &Interrupt) -> Result<StopReason> {
        if let Some(eps) = self.exploration_reset_value {
            agent.reset_exploration(eps);
        }
        let mut env = self.env.make()?;
        let mut eval_env = self.env.make()?;
        let stop = self.stop_conditions.clone();
        let mut stopwatch = Stopwatch::new(false);

        let result = loop {
            interrupt.check()?;
            if stop.max_steps.is_some_and(|max| self.stats.total_steps() >= max) {
                break StopReason::MaxSteps;
            }
            stopwatch.start();
            let budget = stop.max_steps.map(|max| max.saturating_sub(self.stats.total_steps()));
            let (reward, steps) = run_episode(agent, &mut env, budget).await?;
            agent.end_episode()?;
            agent.decay_epsilon();
            let elapsed = stopwatch.stop(false)?;
            self.stats.record_episode(reward, steps, elapsed);

            let episode = self.stats.n_episodes();
            tracing::debug!(episode, reward, steps, epsilon = agent.epsilon(), "training episode finished");

            let mut score = None;
            if episode % self.evaluation_interval == 0 {
                let value = self.evaluate(agent, &mut eval_env).await?;
                self.stats.evaluations.push(Evaluation { episode, score: value });
                tracing::info!(
                    task = self.display_name(""),
                    episode,
                    score = value,
                    "evaluation finished"
                );
                score = Some(value);
            }

            if let (Some(threshold), Some(value)) = (stop.min_evaluation_score, score) {
                if value >= threshold {
                    break StopReason::MinEvaluationScore;
                }
            }
            if stop.max_steps.is_some_and(|max| self.stats.total_steps() >= max) {
                break StopReason::MaxSteps;
            }
            if stop.max_episodes.is_some_and(|max| episode >= max) {
                break StopReason::MaxEpisodes;
            }
        };
        env.close().await?;
        eval_env.close().await?;
        Ok(result)
    }

    /// Mean reward of `evaluation_count` episodes without learning
    pub async fn evaluate(&self, agent: &mut dyn Agent, env: &mut dyn Environment) -> Result<f64> {
        let mut total = 0.0;
        for _ in 0..self.evaluation_count {
            let mut obs = env.reset().await?;
            loop {
                let mask = env.legal_mask();
                let action = agent.select_action(&obs, mask.as_ref(), self.greedy_evaluation)?;
                let step = env.step(action).await?;
                total += step.reward;
                if step.is_done() {
                    break;
                }
                obs = step.observation;
            }
        }
        Ok(total / self.evaluation_count as f64)
    }

    /// Serialize to YAML
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Parse and validate a YAML task
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let task: Self = serde_yaml::from_str(yaml)?;
        task.validate()?;
        Ok(task)
    }

    /// Save as YAML; `.task.yml` is appended unless the path has a YAML extension
    pub async fn save(&self, path: &Path) -> Result<PathBuf> {
        let path = with_yaml_extension(path, "task");
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, self.to_yaml()?).await?;
        Ok(path)
    }

    /// Load a task saved with [`LearningTask::save`]
    pub async fn load(path: &Path) -> Result<Self> {
        let yaml = tokio::fs::read_to_string(path).await?;
        Self::from_yaml(&yaml)
    }
}

/// Play one training episode; returns its reward and step count
///
/// `budget` caps the number of steps, cutting the episode short.
async fn run_episode(
    agent: &mut dyn Agent,
    env: &mut Box<dyn Environment>,
    budget: Option<u64>,
) -> Result<(f64, u64)> {
    let mut obs = env.reset().await?;
    let mut reward = 0.0;
    let mut steps = 0u64;
    loop {
        let mask = env.legal_mask();
        let action = agent.select_action(&obs, mask.as_ref(), false)?;
        let step = env.step(action).await?;
        reward += step.reward;
        steps += 1;
        let done = step.is_done();
        // Truncated transitions keep their bootstrap term.
        agent.update(Experience::new(obs, action, step.reward, step.observation.clone(), step.terminated))?;
        obs = step.observation;
        if done || budget.is_some_and(|b| steps >= b) {
            return Ok((reward, steps));
        }
    }
}

/// Append `.<kind>.yml` unless `path` already ends in `.yml` or `.yaml`
pub(crate) fn with_yaml_extension(path: &Path, kind: &str) -> PathBuf {
    if path
        .extension()
        .is_some_and(|ext| ext == "yml" || ext == "yaml")
    {
        path.to_path_buf()
    } else {
        let mut name = path.as_os_str().to_os_string();
        name.push(format!(".{kind}.yml"));
        PathBuf::from(name)
    }
}
