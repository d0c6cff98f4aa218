//! Per-task training statistics

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use curricula_core::{Elapsed, Result};

use crate::task::StopReason;

/// Window of the moving averages written alongside the raw series
pub const MOVING_AVERAGE_WINDOW: usize = 5;

/// Score of one evaluation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    /// Training episodes completed when the evaluation ran
    pub episode: usize,
    /// Mean evaluation reward
    pub score: f64,
}

/// Statistics accumulated while a task runs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskStats {
    /// Total reward per training episode
    pub episode_rewards: Vec<f64>,
    /// Steps per training episode
    pub step_counts: Vec<u64>,
    /// Wall-clock seconds per training episode
    pub episode_wall_times: Vec<f64>,
    /// Processor seconds per training episode
    pub episode_cpu_times: Vec<f64>,
    /// Evaluations in the order they ran
    pub evaluations: Vec<Evaluation>,
    /// Condition that ended the task
    #[serde(default)]
    pub stop_reason: Option<StopReason>,
}

#[derive(Serialize)]
struct StatsRecord<'a> {
    #[serde(flatten)]
    stats: &'a TaskStats,
    episode_rewards_moving_avg: Vec<f64>,
    step_counts_moving_avg: Vec<f64>,
}

impl TaskStats {
    pub(crate) fn record_episode(&mut self, reward: f64, steps: u64, elapsed: Elapsed) {
        self.episode_rewards.push(reward);
        self.step_counts.push(steps);
        self.episode_wall_times.push(elapsed.wall.as_secs_f64());
        self.episode_cpu_times.push(elapsed.cpu.as_secs_f64());
    }

    /// Number of training episodes
    #[must_use]
    pub fn n_episodes(&self) -> usize {
        self.episode_rewards.len()
    }

    /// Training steps over all episodes
    #[must_use]
    pub fn total_steps(&self) -> u64 {
        self.step_counts.iter().sum()
    }

    /// Latest evaluation, if any
    #[must_use]
    pub fn last_evaluation(&self) -> Option<&Evaluation> {
        self.evaluations.last()
    }

    /// Save as pretty JSON with moving averages; `.stats.json` is appended
    /// unless the path already ends in `.json`
    pub async fn save(&self, path: &Path) -> Result<PathBuf> {
        let path = if path.extension().is_some_and(|ext| ext == "json") {
            path.to_path_buf()
        } else {
            let mut name = path.as_os_str().to_os_string();
            name.push(".stats.json");
            PathBuf::from(name)
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let steps: Vec<f64> = self.step_counts.iter().map(|&s| s as f64).collect();
        let record = StatsRecord {
            stats: self,
            episode_rewards_moving_avg: moving_average(&self.episode_rewards, MOVING_AVERAGE_WINDOW),
            step_counts_moving_avg: moving_average(&steps, MOVING_AVERAGE_WINDOW),
        };
        tokio::fs::write(&path, serde_json::to_vec_pretty(&record)?).await?;
        Ok(path)
    }

    /// Load statistics saved with [`TaskStats::save`]
    pub async fn load(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Trailing mean over at most `window` values
#[must_use]
pub fn moving_average(values: &[f64], window: usize) -> Vec<f64> {
    let window = window.max(1);
    (0..values.len())
        .map(|i| {
            let start = (i + 1).saturating_sub(window);
            let slice = &values[start..=i];
            slice.iter().sum::<f64>() / slice.len() as f64
        })
        .collect()
}
