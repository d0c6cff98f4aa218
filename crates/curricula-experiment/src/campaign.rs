//! The campaign loop
//!
//! Runs execute one at a time. Before each run the loop checks the run
//! limit, the wall-time limit, the interrupt flag and arm exhaustion, in
//! that order. The run's configuration is written before it trains, and
//! the meta-state is persisted once the run returns.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use curricula_core::{Agent, Interrupt, RLError, Result, Stopwatch};
use curricula_train::{Curriculum, LearningTask};

use crate::config::ExperimentConfig;
use crate::meta::MetaState;
use crate::scheduler::{determine_next_run, nocurriculum_step_budget, ArmFilter, RunKind, ScheduledRun};

/// What a scheduled run trains
#[derive(Debug, Clone)]
pub enum Runnable {
    /// A single task
    Task(Box<LearningTask>),
    /// A curriculum of tasks
    Curriculum(Curriculum),
}

impl Runnable {
    /// Save the configuration; the file extension follows the variant
    pub async fn save(&self, path: &Path) -> Result<PathBuf> {
        match self {
            Self::Task(task) => task.save(path).await,
            Self::Curriculum(curriculum) => curriculum.save(path).await,
        }
    }

    /// Train `agent`; returns the number of training steps taken
    pub async fn run(&mut self, agent: &mut dyn Agent, interrupt: &Interrupt) -> Result<u64> {
        match self {
            Self::Task(task) => Ok(task.run(agent, interrupt).await?.total_steps()),
            Self::Curriculum(curriculum) => {
                curriculum.run(agent, interrupt).await?;
                Ok(curriculum.total_steps())
            }
        }
    }
}

/// Bounds on a campaign invocation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CampaignLimits {
    /// Maximum runs started by this invocation
    pub max_runs: Option<usize>,
    /// Wall time after which no new run starts
    pub wall_time: Option<Duration>,
}

/// Why a campaign invocation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStop {
    /// The run limit was reached
    RunLimit,
    /// The wall-time limit was reached
    WallTime,
    /// Every admitted arm finished its runs
    Exhausted,
    /// The interrupt flag was raised
    Interrupted,
}

/// Outcome of a campaign invocation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CampaignSummary {
    /// Runs completed by this invocation
    pub runs_executed: usize,
    /// Why the invocation ended
    pub stop_reason: CampaignStop,
    /// When the invocation started
    pub started_at: DateTime<Utc>,
    /// When the invocation ended
    pub finished_at: DateTime<Utc>,
}

/// A resumable series of scheduled runs
#[derive(Debug, Clone)]
pub struct Campaign {
    config: ExperimentConfig,
    filter: ArmFilter,
    limits: CampaignLimits,
    interrupt: Interrupt,
}

impl Campaign {
    /// Create a campaign with no filters or limits
    pub fn new(config: ExperimentConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            filter: ArmFilter::default(),
            limits: CampaignLimits::default(),
            interrupt: Interrupt::new(),
        })
    }

    /// Restrict which arms may run
    #[must_use]
    pub fn with_filter(mut self, filter: ArmFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Bound the invocation
    #[must_use]
    pub fn with_limits(mut self, limits: CampaignLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Observe `interrupt` instead of a private flag
    #[must_use]
    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    /// Configuration of the campaign
    #[must_use]
    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    /// Build the runnable for `run`
    pub fn runnable(&self, run: &ScheduledRun, meta: &MetaState) -> Result<Runnable> {
        let output_dir = self.config.run_output_dir(run);
        Ok(match run.kind {
            RunKind::Curriculum => Runnable::Curriculum(self.config.curriculum(output_dir)?),
            RunKind::NoCurriculum => {
                let budget = nocurriculum_step_budget(meta, run.family);
                Runnable::Task(Box::new(self.config.target_task(budget, &output_dir)?))
            }
        })
    }

    /// Execute runs until a limit, exhaustion or an interrupt
    ///
    /// Interrupted runs are not recorded; they restart from scratch on the
    /// next invocation.
    pub async fn run(&self) -> Result<CampaignSummary> {
        let started_at = Utc::now();
        let stopwatch = Stopwatch::new(true);
        let mut meta = MetaState::load(&self.config.meta_path, self.config.n_runs).await?;
        let mut runs_executed = 0;

        let stop_reason = loop {
            if self.limits.max_runs.is_some_and(|max| runs_executed >= max) {
                tracing::info!(runs = runs_executed, "reached the run limit");
                break CampaignStop::RunLimit;
            }
            if let Some(limit) = self.limits.wall_time {
                if stopwatch.peek_time()?.wall >= limit {
                    tracing::info!(runs = runs_executed, "reached the wall-time limit");
                    break CampaignStop::WallTime;
                }
            }
            if self.interrupt.is_triggered() {
                break CampaignStop::Interrupted;
            }
            let Some(run) = determine_next_run(&meta, &self.filter) else {
                tracing::info!(runs = runs_executed, "no admitted arm has runs left");
                break CampaignStop::Exhausted;
            };

            match self.execute(&run, &meta).await {
                Ok(steps) => {
                    meta.record_run(run.family, run.kind, steps);
                    meta.save(&self.config.meta_path).await?;
                    runs_executed += 1;
                }
                Err(RLError::Interrupted) => {
                    tracing::warn!(family = %run.family, kind = %run.kind, index = run.index, "run interrupted, not recorded");
                    break CampaignStop::Interrupted;
                }
                Err(err) => {
                    meta.save(&self.config.meta_path).await?;
                    return Err(err);
                }
            }
        };

        meta.save(&self.config.meta_path).await?;
        let summary = CampaignSummary {
            runs_executed,
            stop_reason,
            started_at,
            finished_at: Utc::now(),
        };
        tracing::info!(runs = summary.runs_executed, reason = ?summary.stop_reason, "campaign stopped");
        Ok(summary)
    }

    async fn execute(&self, run: &ScheduledRun, meta: &MetaState) -> Result<u64> {
        let mut agent = self.config.agent_spec(run.family)?.build(Some(run.seed))?;
        let mut runnable = self.runnable(run, meta)?;
        let config_path = runnable.save(&self.config.run_config_path(run)).await?;

        tracing::info!(
            family = %run.family,
            kind = %run.kind,
            index = run.index,
            seed = run.seed,
            config = %config_path.display(),
            "starting run {}",
            run.index + 1
        );
        let mut stopwatch = Stopwatch::new(true);
        let steps = runnable.run(agent.as_mut(), &self.interrupt).await?;
        let elapsed = stopwatch.stop(false)?;
        tracing::info!(
            family = %run.family,
            kind = %run.kind,
            index = run.index,
            steps,
            "finished run {} ({elapsed})",
            run.index + 1
        );
        Ok(steps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use curricula_core::AgentFamily;

    #[test]
    fn test_runnable_variants() {
        let campaign = Campaign::new(ExperimentConfig::default()).unwrap();
        let mut meta = MetaState::new(10);
        meta.record_run(AgentFamily::Dqn, RunKind::Curriculum, 1000);

        let curr = ScheduledRun {
            family: AgentFamily::Dqn,
            kind: RunKind::Curriculum,
            index: 1,
            seed: 21,
        };
        match campaign.runnable(&curr, &meta).unwrap() {
            Runnable::Curriculum(c) => {
                assert_eq!(c.tasks().len(), 3);
                assert_eq!(c.output_dir, Some(PathBuf::from("outputs/dqn/curriculum_1")));
                assert!(c.tasks().iter().all(|t| t.stop_conditions.max_steps.is_none()));
            }
            Runnable::Task(_) => panic!("expected a curriculum"),
        }

        let nocurr = ScheduledRun {
            kind: RunKind::NoCurriculum,
            index: 0,
            seed: 30,
            ..curr
        };
        match campaign.runnable(&nocurr, &meta).unwrap() {
            Runnable::Task(task) => assert_eq!(task.stop_conditions.max_steps, Some(300)),
            Runnable::Curriculum(_) => panic!("expected a task"),
        }
    }
}
