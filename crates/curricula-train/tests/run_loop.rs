//! Training loop tests against the grid walk

use curricula_agent::{QLearningAgent, QLearningConfig};
use curricula_core::{Agent, ExplorationConfig, Interrupt, RLError};
use curricula_env::EnvSpec;
use curricula_train::{Curriculum, LearningTask, StopConditions, StopReason, TaskState};

fn agent(seed: u64) -> QLearningAgent {
    QLearningAgent::new(
        QLearningConfig {
            n_actions: 4,
            gamma: 0.99,
            alpha: 0.1,
            exploration: ExplorationConfig::default(),
        },
        Some(seed),
    )
    .unwrap()
}

fn grid(difficulty: usize) -> EnvSpec {
    EnvSpec::new("grid_walk")
        .with_arg("difficulty", difficulty)
        .with_arg("seed", 0)
}

fn task(difficulty: usize, stop: StopConditions) -> LearningTask {
    let mut task = LearningTask::new(grid(difficulty), stop).unwrap();
    task.evaluation_interval = 10;
    task.evaluation_count = 1;
    task
}

#[tokio::test]
async fn test_episode_budget() {
    let mut agent = agent(0);
    let mut task = task(
        0,
        StopConditions {
            max_episodes: Some(7),
            ..StopConditions::default()
        },
    );
    let stats = task.run(&mut agent, &Interrupt::new()).await.unwrap();
    assert_eq!(stats.n_episodes(), 7);
    assert_eq!(stats.stop_reason, Some(StopReason::MaxEpisodes));
    assert_eq!(stats.episode_wall_times.len(), 7);
    assert_eq!(task.state(), TaskState::Completed);
    assert!(agent.epsilon() < 1.0);
}

#[tokio::test]
async fn test_step_budget_cuts_episode_short() {
    let mut agent = agent(1);
    let mut task = task(
        2,
        StopConditions {
            max_steps: Some(25),
            ..StopConditions::default()
        },
    );
    let stats = task.run(&mut agent, &Interrupt::new()).await.unwrap();
    assert_eq!(stats.total_steps(), 25);
    assert_eq!(stats.stop_reason, Some(StopReason::MaxSteps));
}

#[tokio::test]
async fn test_zero_step_budget_takes_no_step() {
    let dir = tempfile::tempdir().unwrap();
    let mut agent = agent(7);
    let mut task = task(
        1,
        StopConditions {
            max_steps: Some(0),
            ..StopConditions::default()
        },
    );
    task.stats_save_path = Some(dir.path().join("nocurr"));
    let stats = task.run(&mut agent, &Interrupt::new()).await.unwrap();
    assert_eq!(stats.total_steps(), 0);
    assert_eq!(stats.n_episodes(), 0);
    assert_eq!(stats.stop_reason, Some(StopReason::MaxSteps));
    assert_eq!(task.state(), TaskState::Completed);
    assert!(dir.path().join("nocurr.stats.json").exists());
    assert_eq!(agent.epsilon(), 1.0);
}

#[tokio::test]
async fn test_score_takes_precedence() {
    let mut agent = agent(2);
    let mut task = task(
        0,
        StopConditions {
            min_evaluation_score: Some(-5.0),
            max_episodes: Some(1),
            max_steps: Some(1),
        },
    );
    task.evaluation_interval = 1;
    let stats = task.run(&mut agent, &Interrupt::new()).await.unwrap();
    assert_eq!(stats.stop_reason, Some(StopReason::MinEvaluationScore));
    assert_eq!(stats.evaluations.len(), 1);
}

#[tokio::test]
async fn test_exploration_reset_at_start() {
    let mut agent = agent(3);
    let mut task = task(
        0,
        StopConditions {
            max_episodes: Some(1),
            ..StopConditions::default()
        },
    );
    task.exploration_reset_value = Some(0.3);
    task.run(&mut agent, &Interrupt::new()).await.unwrap();
    // One decay step after the single episode.
    assert!((agent.epsilon() - 0.3 * 0.995).abs() < 1e-12);
}

#[tokio::test]
async fn test_learns_to_reach_goal() {
    let mut agent = agent(4);
    let mut task = task(
        0,
        StopConditions {
            min_evaluation_score: Some(0.8),
            max_episodes: Some(3000),
            ..StopConditions::default()
        },
    );
    let stats = task.run(&mut agent, &Interrupt::new()).await.unwrap();
    assert_eq!(stats.stop_reason, Some(StopReason::MinEvaluationScore));
    assert!(stats.last_evaluation().unwrap().score >= 0.8);
}

#[tokio::test]
async fn test_interrupt_terminates_early() {
    let mut agent = agent(5);
    let mut task = task(
        0,
        StopConditions {
            max_episodes: Some(10),
            ..StopConditions::default()
        },
    );
    let interrupt = Interrupt::new();
    interrupt.trigger();
    let err = task.run(&mut agent, &interrupt).await.err();
    assert!(matches!(err, Some(RLError::Interrupted)));
    assert_eq!(task.state(), TaskState::TerminatedEarly);
}

#[tokio::test]
async fn test_curriculum_carries_agent_and_writes_outputs() {
    let dir = tempfile::tempdir().unwrap();
    let stop = |episodes| StopConditions {
        max_episodes: Some(episodes),
        ..StopConditions::default()
    };
    let mut curriculum = Curriculum::new(vec![task(0, stop(3)), task(1, stop(4)), task(2, stop(5))])
        .unwrap()
        .with_output_dir(dir.path().join("curriculum_0"));

    let mut agent = agent(6);
    curriculum.run(&mut agent, &Interrupt::new()).await.unwrap();

    let stats = curriculum.stats();
    assert_eq!(stats.len(), 3);
    assert_eq!(stats["1"].n_episodes(), 4);
    assert_eq!(curriculum.total_episodes(), 12);
    let summed: u64 = stats.values().map(|s| s.total_steps()).sum();
    assert_eq!(curriculum.total_steps(), summed);
    // Epsilon decayed once per episode across all tasks.
    assert!((agent.epsilon() - 0.995f64.powi(12)).abs() < 1e-9);

    for id in ["0", "1", "2"] {
        assert!(dir.path().join(format!("curriculum_0/{id}.agent")).exists());
        assert!(dir.path().join(format!("curriculum_0/{id}.stats.json")).exists());
    }
    let restored = curricula_agent::load_agent(&dir.path().join("curriculum_0/2")).await.unwrap();
    assert_eq!(restored.family(), curricula_core::AgentFamily::QLearning);
}
