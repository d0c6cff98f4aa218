//! Experiment configuration
//!
//! Loaded from YAML or JSON depending on the file extension; every field has
//! a default, so an empty file (or no file) describes the CartPole campaign.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use curricula_agent::{ActorCriticConfig, AgentSpec, DqnConfig};
use curricula_core::{AgentFamily, ExplorationConfig, RLError, Result};
use curricula_env::EnvSpec;
use curricula_train::{Curriculum, LearningTask, StopConditions};

use crate::scheduler::{RunKind, ScheduledRun};

/// One training stage: an environment and the score that ends it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StageConfig {
    /// Environment of the stage
    pub env: EnvSpec,
    /// Evaluation score that completes the stage
    pub min_evaluation_score: f64,
    /// Optional cap on training episodes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_episodes: Option<usize>,
}

impl StageConfig {
    fn cart_pole(difficulty: usize) -> Self {
        Self {
            env: EnvSpec::new("cart_pole")
                .with_arg("difficulty", difficulty)
                .with_arg("seed", 42),
            min_evaluation_score: 400.0,
            max_episodes: None,
        }
    }
}

/// How tasks evaluate the agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EvaluationConfig {
    /// Training episodes between evaluations
    pub interval: usize,
    /// Episodes per evaluation
    pub count: usize,
    /// Whether evaluation disables exploration
    pub greedy: bool,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            interval: curricula_train::task::DEFAULT_EVALUATION_INTERVAL,
            count: curricula_train::task::DEFAULT_EVALUATION_COUNT,
            greedy: true,
        }
    }
}

/// Campaign settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExperimentConfig {
    /// Meta-state file
    pub meta_path: PathBuf,
    /// Directory receiving per-run task and curriculum files
    pub configs_dir: PathBuf,
    /// Directory receiving trained agents and statistics
    pub outputs_dir: PathBuf,
    /// Runs per arm written into a fresh meta-state
    pub n_runs: usize,
    /// Actor-critic hyperparameters
    pub actor_critic: ActorCriticConfig,
    /// Deep Q-network hyperparameters
    pub dqn: DqnConfig,
    /// Curriculum stages in order
    pub curriculum: Vec<StageConfig>,
    /// Task trained directly by no-curriculum runs
    pub target: StageConfig,
    /// Evaluation protocol of every task
    pub evaluation: EvaluationConfig,
    /// Epsilon reinstated at the start of every task
    pub exploration_reset_value: Option<f64>,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            meta_path: PathBuf::from("meta.json"),
            configs_dir: PathBuf::from("configs"),
            outputs_dir: PathBuf::from("outputs"),
            n_runs: 10,
            actor_critic: ActorCriticConfig::default(),
            dqn: DqnConfig {
                exploration: ExplorationConfig {
                    epsilon_decay: 0.9995,
                    ..ExplorationConfig::default()
                },
                ..DqnConfig::default()
            },
            curriculum: (0..=2).map(StageConfig::cart_pole).collect(),
            target: StageConfig::cart_pole(2),
            evaluation: EvaluationConfig::default(),
            exploration_reset_value: Some(0.3),
        }
    }
}

impl ExperimentConfig {
    /// Load a `.yml`/`.yaml` or `.json` configuration
    pub async fn load(path: &Path) -> Result<Self> {
        let text = tokio::fs::read_to_string(path).await?;
        let config: Self = match path.extension().and_then(|e| e.to_str()) {
            Some("yml" | "yaml") => serde_yaml::from_str(&text)?,
            Some("json") => serde_json::from_str(&text)?,
            _ => {
                return Err(RLError::InvalidConfig(format!(
                    "{} is neither YAML nor JSON",
                    path.display()
                )))
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration
    pub fn validate(&self) -> Result<()> {
        if self.n_runs == 0 {
            return Err(RLError::InvalidConfig("n_runs must be positive".into()));
        }
        if self.curriculum.is_empty() {
            return Err(RLError::InvalidConfig("the curriculum needs at least one stage".into()));
        }
        if self.evaluation.interval == 0 || self.evaluation.count == 0 {
            return Err(RLError::InvalidConfig(
                "evaluation interval and count must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Hyperparameters of `family`
    pub fn agent_spec(&self, family: AgentFamily) -> Result<AgentSpec> {
        match family {
            AgentFamily::ActorCritic => Ok(AgentSpec::ActorCritic(self.actor_critic.clone())),
            AgentFamily::Dqn => Ok(AgentSpec::Dqn(self.dqn.clone())),
            AgentFamily::QLearning => Err(RLError::InvalidConfig(format!(
                "{family} is not scheduled by experiment campaigns"
            ))),
        }
    }

    /// Where the run's configuration is written before it executes
    #[must_use]
    pub fn run_config_path(&self, run: &ScheduledRun) -> PathBuf {
        self.configs_dir
            .join(format!("{}_{}_{}", run.family, run.kind, run.index))
    }

    /// Directory receiving the run's agents and statistics
    #[must_use]
    pub fn run_output_dir(&self, run: &ScheduledRun) -> PathBuf {
        let dir = match run.kind {
            RunKind::Curriculum => format!("curriculum_{}", run.index),
            RunKind::NoCurriculum => format!("nocurriculum_{}", run.index),
        };
        self.outputs_dir.join(run.family.as_str()).join(dir)
    }

    /// Task for `stage`, optionally bounded by a step budget
    pub fn stage_task(&self, stage: &StageConfig, max_steps: Option<u64>) -> Result<LearningTask> {
        let mut task = LearningTask::new(
            stage.env.clone(),
            StopConditions {
                min_evaluation_score: Some(stage.min_evaluation_score),
                max_steps,
                max_episodes: stage.max_episodes,
            },
        )?;
        task.evaluation_interval = self.evaluation.interval;
        task.evaluation_count = self.evaluation.count;
        task.greedy_evaluation = self.evaluation.greedy;
        task.exploration_reset_value = self.exploration_reset_value;
        task.validate()?;
        Ok(task)
    }

    /// Curriculum over every stage, saving into `output_dir`
    pub fn curriculum(&self, output_dir: PathBuf) -> Result<Curriculum> {
        let tasks = self
            .curriculum
            .iter()
            .map(|stage| self.stage_task(stage, None))
            .collect::<Result<Vec<_>>>()?;
        Ok(Curriculum::new(tasks)?.with_output_dir(output_dir))
    }

    /// Target task with a step budget, saving under `output_dir/nocurr`
    pub fn target_task(&self, max_steps: u64, output_dir: &Path) -> Result<LearningTask> {
        let mut task = self.stage_task(&self.target, Some(max_steps))?;
        let save_path = output_dir.join("nocurr");
        task.agent_save_path = Some(save_path.clone());
        task.stats_save_path = Some(save_path);
        Ok(task)
    }
}
