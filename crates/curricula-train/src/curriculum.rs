//! Ordered sequences of learning tasks
//!
//! Curriculum files list task ids in `order` and map each id in `tasks` to
//! either an inline task body or `{ path: ... }`, a task file resolved
//! relative to the curriculum file's directory.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use curricula_core::{Agent, Interrupt, RLError, Result, Stopwatch};

use crate::stats::TaskStats;
use crate::task::{with_yaml_extension, LearningTask};

/// Task id as written in curriculum files; YAML allows integers or strings
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
enum TaskKey {
    Index(u64),
    Name(String),
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(i) => write!(f, "{i}"),
            Self::Name(name) => f.write_str(name),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct TaskReference {
    path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum TaskEntry {
    Reference(TaskReference),
    Inline(Box<LearningTask>),
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct CurriculumFile {
    order: Vec<TaskKey>,
    tasks: BTreeMap<TaskKey, TaskEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    output_dir: Option<PathBuf>,
}

/// Tasks run in order against one agent
#[derive(Debug, Clone)]
pub struct Curriculum {
    ids: Vec<String>,
    tasks: Vec<LearningTask>,
    /// Default save location for tasks without their own paths
    pub output_dir: Option<PathBuf>,
}

impl Curriculum {
    /// Curriculum with ids `0..n`
    pub fn new(tasks: Vec<LearningTask>) -> Result<Self> {
        if tasks.is_empty() {
            return Err(RLError::InvalidConfig("a curriculum needs at least one task".into()));
        }
        Ok(Self {
            ids: (0..tasks.len()).map(|i| i.to_string()).collect(),
            tasks,
            output_dir: None,
        })
    }

    /// Set the default output directory
    #[must_use]
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    /// Tasks in execution order
    #[must_use]
    pub fn tasks(&self) -> &[LearningTask] {
        &self.tasks
    }

    /// Task ids in execution order
    #[must_use]
    pub fn task_ids(&self) -> &[String] {
        &self.ids
    }

    /// Statistics of every task keyed by task id
    #[must_use]
    pub fn stats(&self) -> BTreeMap<&str, &TaskStats> {
        self.ids
            .iter()
            .map(String::as_str)
            .zip(self.tasks.iter().map(LearningTask::stats))
            .collect()
    }

    /// Training steps over all tasks
    #[must_use]
    pub fn total_steps(&self) -> u64 {
        self.tasks.iter().map(|t| t.stats().total_steps()).sum()
    }

    /// Training episodes over all tasks
    #[must_use]
    pub fn total_episodes(&self) -> usize {
        self.tasks.iter().map(|t| t.stats().n_episodes()).sum()
    }

    /// Run every task in order against the same agent
    pub async fn run(&mut self, agent: &mut dyn Agent, interrupt: &Interrupt) -> Result<()> {
        let mut stopwatch = Stopwatch::new(true);
        let n_tasks = self.tasks.len();
        for (i, (id, task)) in self.ids.iter().zip(self.tasks.iter_mut()).enumerate() {
            if let Some(dir) = &self.output_dir {
                let default_path = dir.join(id);
                task.agent_save_path.get_or_insert_with(|| default_path.clone());
                task.stats_save_path.get_or_insert(default_path);
            }
            let name = task.display_name(id).to_string();
            tracing::info!(task = %name, "running task {}/{}", i + 1, n_tasks);

            task.run(agent, interrupt).await?;

            let lap = stopwatch.lap()?;
            let stats = task.stats();
            tracing::info!(
                task = %name,
                episodes = stats.n_episodes(),
                steps = stats.total_steps(),
                score = stats.last_evaluation().map(|e| e.score),
                reason = ?stats.stop_reason,
                "task finished ({lap})"
            );
        }
        let total = stopwatch.stop(false)?;
        tracing::info!(
            episodes = self.total_episodes(),
            steps = self.total_steps(),
            "curriculum finished ({total})"
        );
        Ok(())
    }

    /// Serialize to YAML with every task inline
    pub fn to_yaml(&self) -> Result<String> {
        let file = CurriculumFile {
            order: self.ids.iter().cloned().map(TaskKey::Name).collect(),
            tasks: self
                .ids
                .iter()
                .cloned()
                .map(TaskKey::Name)
                .zip(self.tasks.iter().cloned().map(|t| TaskEntry::Inline(Box::new(t))))
                .collect(),
            output_dir: self.output_dir.clone(),
        };
        Ok(serde_yaml::to_string(&file)?)
    }

    /// Save as YAML; `.curriculum.yml` is appended unless the path has a YAML extension
    pub async fn save(&self, path: &Path) -> Result<PathBuf> {
        let path = with_yaml_extension(path, "curriculum");
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, self.to_yaml()?).await?;
        Ok(path)
    }

    /// Load a curriculum, resolving referenced task files against its directory
    pub async fn load(path: &Path) -> Result<Self> {
        let yaml = tokio::fs::read_to_string(path).await?;
        let mut file: CurriculumFile = serde_yaml::from_str(&yaml)?;
        let directory = path.parent().unwrap_or_else(|| Path::new(""));

        let mut ids = Vec::with_capacity(file.order.len());
        let mut tasks = Vec::with_capacity(file.order.len());
        for key in &file.order {
            let entry = file
                .tasks
                .remove(key)
                .ok_or_else(|| RLError::InvalidConfig(format!("curriculum order names unknown task {key}")))?;
            let task = match entry {
                TaskEntry::Reference(reference) => LearningTask::load(&directory.join(reference.path)).await?,
                TaskEntry::Inline(task) => {
                    task.validate()?;
                    *task
                }
            };
            ids.push(key.to_string());
            tasks.push(task);
        }
        let mut curriculum = Self::new(tasks)?;
        curriculum.ids = ids;
        curriculum.output_dir = file.output_dir;
        Ok(curriculum)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::StopConditions;
    use curricula_env::EnvSpec;

    fn task(difficulty: usize, episodes: usize) -> LearningTask {
        let mut task = LearningTask::new(
            EnvSpec::new("grid_walk").with_arg("difficulty", difficulty),
            StopConditions {
                max_episodes: Some(episodes),
                ..StopConditions::default()
            },
        )
        .unwrap();
        task.name = Some(format!("level {difficulty}"));
        task
    }

    #[tokio::test]
    async fn test_save_load_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let curriculum = Curriculum::new(vec![task(2, 1), task(0, 2), task(1, 3)]).unwrap();
        let path = curriculum.save(&dir.path().join("curr")).await.unwrap();
        assert!(path.ends_with("curr.curriculum.yml"));

        let loaded = Curriculum::load(&path).await.unwrap();
        let names: Vec<_> = loaded.tasks().iter().map(|t| t.name.clone().unwrap()).collect();
        assert_eq!(names, ["level 2", "level 0", "level 1"]);
        assert_eq!(loaded.task_ids(), ["0", "1", "2"]);
    }

    #[tokio::test]
    async fn test_references_resolve_relative_to_file() {
        let dir = tempfile::tempdir().unwrap();
        task(1, 4).save(&dir.path().join("tasks/second.yml")).await.unwrap();
        let yaml = "\
order: [warmup, 7]
tasks:
  7:
    path: tasks/second.yml
  warmup:
    env:
      name: grid_walk
    stop_conditions:
      max_episodes: 2
";
        let path = dir.path().join("mixed.yml");
        std::fs::write(&path, yaml).unwrap();

        let loaded = Curriculum::load(&path).await.unwrap();
        assert_eq!(loaded.task_ids(), ["warmup", "7"]);
        assert_eq!(loaded.tasks()[1].stop_conditions.max_episodes, Some(4));
        assert_eq!(loaded.tasks()[0].stop_conditions.max_episodes, Some(2));
    }

    #[tokio::test]
    async fn test_missing_task_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.yml");
        std::fs::write(&path, "order: [a]\ntasks: {}\n").unwrap();
        assert!(matches!(Curriculum::load(&path).await, Err(RLError::InvalidConfig(_))));
    }

    #[test]
    fn test_empty_curriculum_rejected() {
        assert!(Curriculum::new(Vec::new()).is_err());
    }
}
