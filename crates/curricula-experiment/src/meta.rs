//! Persistent campaign progress
//!
//! The meta-state is the only durable record of a campaign. It is read at
//! start-up and rewritten after every completed run, so a killed process
//! resumes exactly where it stopped.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use curricula_core::{AgentFamily, Result};

use crate::scheduler::{RunKind, FAMILIES};

/// Run counters of one agent family
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FamilyCounters {
    /// Completed curriculum runs
    pub curr_runs: usize,
    /// Training steps consumed by all completed curriculum runs
    pub curr_steps_sum: u64,
    /// Completed no-curriculum runs
    pub nocurr_runs: usize,
}

impl FamilyCounters {
    /// Completed runs of `kind`
    #[must_use]
    pub fn runs(&self, kind: RunKind) -> usize {
        match kind {
            RunKind::Curriculum => self.curr_runs,
            RunKind::NoCurriculum => self.nocurr_runs,
        }
    }
}

/// Campaign progress, stored as `{ "n_runs": .., "<family>": { .. } }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaState {
    /// Runs per arm
    pub n_runs: usize,
    #[serde(flatten)]
    families: BTreeMap<AgentFamily, FamilyCounters>,
}

impl MetaState {
    /// Fresh progress with zeroed counters for every scheduled family
    #[must_use]
    pub fn new(n_runs: usize) -> Self {
        Self {
            n_runs,
            families: FAMILIES.iter().map(|&f| (f, FamilyCounters::default())).collect(),
        }
    }

    /// Counters of `family`; zero when the family has no entry yet
    #[must_use]
    pub fn counters(&self, family: AgentFamily) -> FamilyCounters {
        self.families.get(&family).copied().unwrap_or_default()
    }

    /// Record one completed run
    ///
    /// Curriculum runs also add their step count to the family's sum.
    pub fn record_run(&mut self, family: AgentFamily, kind: RunKind, steps: u64) {
        let counters = self.families.entry(family).or_default();
        match kind {
            RunKind::Curriculum => {
                counters.curr_runs += 1;
                counters.curr_steps_sum += steps;
            }
            RunKind::NoCurriculum => counters.nocurr_runs += 1,
        }
    }

    /// Read progress from `path`, or start fresh when the file is missing
    pub async fn load(path: &Path, default_n_runs: usize) -> Result<Self> {
        if !tokio::fs::try_exists(path).await? {
            tracing::info!(path = %path.display(), n_runs = default_n_runs, "no meta-state found, starting fresh");
            return Ok(Self::new(default_n_runs));
        }
        let bytes = tokio::fs::read(path).await?;
        let mut meta: Self = serde_json::from_slice(&bytes)?;
        for family in FAMILIES {
            meta.families.entry(family).or_default();
        }
        tracing::info!(path = %path.display(), n_runs = meta.n_runs, "resuming from meta-state");
        Ok(meta)
    }

    /// Write progress as pretty JSON through a temporary file
    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut tmp = path.as_os_str().to_os_string();
        tmp.push(".tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(self)?).await?;
        tokio::fs::rename(&tmp, path).await?;
        tracing::debug!(path = %path.display(), "meta-state saved");
        Ok(())
    }
}
