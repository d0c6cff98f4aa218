//! Campaign tests on the grid walk

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use ndarray::Array1;

use curricula_agent::{Activation, ActorCriticConfig, DqnConfig, MlpConfig};
use curricula_core::{AgentFamily, Environment, Interrupt, Observation, Step};
use curricula_env::{register_env, EnvSpec, GridWalkConfig, GridWalkEnv};
use curricula_experiment::{
    nocurriculum_step_budget, ArmFilter, Campaign, CampaignLimits, CampaignStop, EvaluationConfig,
    ExperimentConfig, MetaState, StageConfig,
};
use curricula_train::TaskStats;

fn stage(difficulty: usize, max_episodes: Option<usize>) -> StageConfig {
    StageConfig {
        env: EnvSpec::new("grid_walk")
            .with_arg("difficulty", difficulty)
            .with_arg("seed", 42),
        // Unreachable, so stages end on their episode or step budgets.
        min_evaluation_score: 5.0,
        max_episodes,
    }
}

fn mlp(output_dim: usize, activation: Activation) -> MlpConfig {
    MlpConfig {
        input_dim: 6,
        hidden_dims: vec![16],
        output_dim,
        activation,
    }
}

fn config(root: &Path) -> ExperimentConfig {
    ExperimentConfig {
        meta_path: root.join("meta.json"),
        configs_dir: root.join("configs"),
        outputs_dir: root.join("outputs"),
        n_runs: 2,
        actor_critic: ActorCriticConfig {
            n_actions: 4,
            actor: mlp(4, Activation::Tanh),
            critic: mlp(1, Activation::Tanh),
            n_episodes: 2,
            ..ActorCriticConfig::default()
        },
        dqn: DqnConfig {
            n_actions: 4,
            batch_size: 8,
            replay_capacity: 500,
            network: mlp(4, Activation::Relu),
            ..DqnConfig::default()
        },
        curriculum: vec![stage(0, Some(3)), stage(1, Some(3))],
        target: stage(1, None),
        evaluation: EvaluationConfig {
            interval: 2,
            count: 1,
            greedy: true,
        },
        exploration_reset_value: Some(0.3),
    }
}

#[tokio::test]
async fn test_full_campaign_exhausts_every_arm() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let summary = Campaign::new(config.clone()).unwrap().run().await.unwrap();
    assert_eq!(summary.stop_reason, CampaignStop::Exhausted);
    assert_eq!(summary.runs_executed, 8);

    let meta = MetaState::load(&config.meta_path, 99).await.unwrap();
    assert_eq!(meta.n_runs, 2);
    for family in [AgentFamily::ActorCritic, AgentFamily::Dqn] {
        let counters = meta.counters(family);
        assert_eq!((counters.curr_runs, counters.nocurr_runs), (2, 2));
        assert!(counters.curr_steps_sum >= 12);

        let budget = nocurriculum_step_budget(&meta, family);
        let stats = TaskStats::load(
            &config
                .outputs_dir
                .join(format!("{family}/nocurriculum_1/nocurr.stats.json")),
        )
        .await
        .unwrap();
        assert_eq!(stats.total_steps(), budget);
    }

    let configs = &config.configs_dir;
    assert!(configs.join("actor_critic_curr_0.curriculum.yml").exists());
    assert!(configs.join("actor_critic_nocurr_1.task.yml").exists());
    assert!(configs.join("dqn_curr_1.curriculum.yml").exists());
    assert!(configs.join("dqn_nocurr_0.task.yml").exists());
    assert!(config.outputs_dir.join("dqn/curriculum_0/1.agent").exists());
    assert!(config.outputs_dir.join("actor_critic/nocurriculum_0/nocurr.agent").exists());

    let again = Campaign::new(config).unwrap().run().await.unwrap();
    assert_eq!(again.stop_reason, CampaignStop::Exhausted);
    assert_eq!(again.runs_executed, 0);
}

#[tokio::test]
async fn test_resumes_after_run_limit() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let limits = CampaignLimits {
        max_runs: Some(3),
        wall_time: None,
    };
    let first = Campaign::new(config.clone()).unwrap().with_limits(limits).run().await.unwrap();
    assert_eq!(first.stop_reason, CampaignStop::RunLimit);
    assert_eq!(first.runs_executed, 3);

    let meta = MetaState::load(&config.meta_path, 2).await.unwrap();
    let ac = meta.counters(AgentFamily::ActorCritic);
    assert_eq!((ac.curr_runs, ac.nocurr_runs), (2, 1));
    assert_eq!(meta.counters(AgentFamily::Dqn).curr_runs, 0);

    let second = Campaign::new(config).unwrap().run().await.unwrap();
    assert_eq!(second.stop_reason, CampaignStop::Exhausted);
    assert_eq!(second.runs_executed, 5);
}

#[tokio::test]
async fn test_forced_family_without_baseline() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let filter = ArmFilter {
        allow_nocurriculum: false,
        ..ArmFilter::default()
    }
    .with_family(AgentFamily::Dqn)
    .unwrap();
    let summary = Campaign::new(config.clone()).unwrap().with_filter(filter).run().await.unwrap();
    assert_eq!(summary.runs_executed, 2);

    let meta = MetaState::load(&config.meta_path, 2).await.unwrap();
    assert_eq!(meta.counters(AgentFamily::Dqn).curr_runs, 2);
    assert_eq!(meta.counters(AgentFamily::Dqn).nocurr_runs, 0);
    assert_eq!(meta.counters(AgentFamily::ActorCritic).curr_runs, 0);
}

#[tokio::test]
async fn test_interrupt_persists_untouched_meta() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let interrupt = Interrupt::new();
    interrupt.trigger();
    let summary = Campaign::new(config.clone())
        .unwrap()
        .with_interrupt(interrupt)
        .run()
        .await
        .unwrap();
    assert_eq!(summary.stop_reason, CampaignStop::Interrupted);
    assert_eq!(summary.runs_executed, 0);
    assert_eq!(MetaState::load(&config.meta_path, 9).await.unwrap(), MetaState::new(2));
}

/// Grid walk that raises an interrupt once it has taken `after` steps
struct InterruptingGrid {
    inner: GridWalkEnv,
    interrupt: Interrupt,
    after: usize,
    steps: usize,
}

#[async_trait]
impl Environment for InterruptingGrid {
    fn n_actions(&self) -> usize {
        self.inner.n_actions()
    }

    fn legal_mask(&self) -> Option<Array1<f32>> {
        self.inner.legal_mask()
    }

    async fn reset(&mut self) -> curricula_core::Result<Observation> {
        self.inner.reset().await
    }

    async fn step(&mut self, action: usize) -> curricula_core::Result<Step> {
        self.steps += 1;
        if self.steps >= self.after {
            self.interrupt.trigger();
        }
        self.inner.step(action).await
    }
}

#[tokio::test]
async fn test_interrupt_mid_run_is_not_recorded() {
    let dir = tempfile::tempdir().unwrap();
    let interrupt = Interrupt::new();
    let handle = interrupt.clone();
    register_env("interrupting_grid_walk", move |_args| {
        let inner = GridWalkEnv::new(GridWalkConfig {
            seed: Some(42),
            ..GridWalkConfig::default()
        })?;
        Ok(Box::new(InterruptingGrid {
            inner,
            interrupt: handle.clone(),
            after: 1,
            steps: 0,
        }))
    })
    .unwrap();

    let mut config = config(dir.path());
    config.curriculum = vec![StageConfig {
        env: EnvSpec::new("interrupting_grid_walk"),
        min_evaluation_score: 5.0,
        max_episodes: Some(3),
    }];

    let summary = Campaign::new(config.clone())
        .unwrap()
        .with_interrupt(interrupt.clone())
        .run()
        .await
        .unwrap();
    assert!(interrupt.is_triggered());
    assert_eq!(summary.stop_reason, CampaignStop::Interrupted);
    assert_eq!(summary.runs_executed, 0);

    // The run started: its configuration was written before training.
    assert!(config.configs_dir.join("actor_critic_curr_0.curriculum.yml").exists());
    assert!(!config.outputs_dir.join("actor_critic/curriculum_0/0.agent").exists());
    assert_eq!(MetaState::load(&config.meta_path, 9).await.unwrap(), MetaState::new(2));
}

#[tokio::test]
async fn test_zero_wall_time_starts_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let limits = CampaignLimits {
        max_runs: None,
        wall_time: Some(Duration::ZERO),
    };
    let summary = Campaign::new(config(dir.path()))
        .unwrap()
        .with_limits(limits)
        .run()
        .await
        .unwrap();
    assert_eq!(summary.stop_reason, CampaignStop::WallTime);
    assert_eq!(summary.runs_executed, 0);
}
