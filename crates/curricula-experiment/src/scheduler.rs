//! Arm selection for curriculum versus baseline campaigns
//!
//! Four arms are served in a fixed priority order:
//!
//! | stride | family         | kind     |
//! |--------|----------------|----------|
//! | 0      | `actor_critic` | `curr`   |
//! | 1      | `actor_critic` | `nocurr` |
//! | 2      | `dqn`          | `curr`   |
//! | 3      | `dqn`          | `nocurr` |
//!
//! A run's seed is `index + stride * n_runs`, so seeds are unique across the
//! whole campaign.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use curricula_core::{AgentFamily, RLError, Result};

use crate::meta::MetaState;

/// Families the campaign compares, in priority order
pub const FAMILIES: [AgentFamily; 2] = [AgentFamily::ActorCritic, AgentFamily::Dqn];

/// Whether a run trains through the curriculum or on the target task alone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunKind {
    /// Every curriculum stage in order
    #[serde(rename = "curr")]
    Curriculum,
    /// The target task with an adaptive step budget
    #[serde(rename = "nocurr")]
    NoCurriculum,
}

impl RunKind {
    /// Identifier used in file names
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Curriculum => "curr",
            Self::NoCurriculum => "nocurr",
        }
    }
}

impl fmt::Display for RunKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunKind {
    type Err = RLError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "curr" => Ok(Self::Curriculum),
            "nocurr" => Ok(Self::NoCurriculum),
            _ => Err(RLError::InvalidConfig(format!("unknown run kind {s:?}"))),
        }
    }
}

/// One family/kind pairing served by the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arm {
    /// Agent family
    pub family: AgentFamily,
    /// Run kind
    pub kind: RunKind,
    /// Seed offset multiplier
    pub stride: u64,
}

/// Arms in priority order
pub const ARMS: [Arm; 4] = [
    Arm {
        family: AgentFamily::ActorCritic,
        kind: RunKind::Curriculum,
        stride: 0,
    },
    Arm {
        family: AgentFamily::ActorCritic,
        kind: RunKind::NoCurriculum,
        stride: 1,
    },
    Arm {
        family: AgentFamily::Dqn,
        kind: RunKind::Curriculum,
        stride: 2,
    },
    Arm {
        family: AgentFamily::Dqn,
        kind: RunKind::NoCurriculum,
        stride: 3,
    },
];

/// Filters applied to arm selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArmFilter {
    /// Only schedule this family
    pub family: Option<AgentFamily>,
    /// Whether curriculum arms may run
    pub allow_curriculum: bool,
    /// Whether no-curriculum arms may run
    pub allow_nocurriculum: bool,
}

impl Default for ArmFilter {
    fn default() -> Self {
        Self {
            family: None,
            allow_curriculum: true,
            allow_nocurriculum: true,
        }
    }
}

impl ArmFilter {
    /// Restrict to `family`, failing for families the campaign does not compare
    pub fn with_family(mut self, family: AgentFamily) -> Result<Self> {
        if !FAMILIES.contains(&family) {
            return Err(RLError::InvalidConfig(format!(
                "{family} is not scheduled by experiment campaigns"
            )));
        }
        self.family = Some(family);
        Ok(self)
    }

    fn admits(&self, arm: &Arm) -> bool {
        let kind_allowed = match arm.kind {
            RunKind::Curriculum => self.allow_curriculum,
            RunKind::NoCurriculum => self.allow_nocurriculum,
        };
        kind_allowed && self.family.map_or(true, |f| f == arm.family)
    }
}

/// The run the scheduler picked next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledRun {
    /// Agent family
    pub family: AgentFamily,
    /// Run kind
    pub kind: RunKind,
    /// Zero-based index of the run within its arm
    pub index: usize,
    /// Agent seed
    pub seed: u64,
}

/// Pick the first eligible arm in priority order; `None` once all are exhausted
///
/// A no-curriculum arm only becomes eligible after its family finished all
/// of its curriculum runs.
#[must_use]
pub fn determine_next_run(meta: &MetaState, filter: &ArmFilter) -> Option<ScheduledRun> {
    let n_runs = meta.n_runs;
    ARMS.iter().filter(|arm| filter.admits(arm)).find_map(|arm| {
        let counters = meta.counters(arm.family);
        let index = counters.runs(arm.kind);
        let eligible = index < n_runs
            && match arm.kind {
                RunKind::Curriculum => true,
                RunKind::NoCurriculum => counters.curr_runs == n_runs,
            };
        eligible.then(|| ScheduledRun {
            family: arm.family,
            kind: arm.kind,
            index,
            seed: index as u64 + arm.stride * n_runs as u64,
        })
    })
}

/// Step budget of a no-curriculum run: three times the family's mean
/// curriculum-run step count
#[must_use]
pub fn nocurriculum_step_budget(meta: &MetaState, family: AgentFamily) -> u64 {
    if meta.n_runs == 0 {
        return 0;
    }
    3 * meta.counters(family).curr_steps_sum / meta.n_runs as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn complete(meta: &mut MetaState, run: ScheduledRun, steps: u64) {
        meta.record_run(run.family, run.kind, steps);
    }

    #[test]
    fn test_round_robin_order_and_seeds() {
        let mut meta = MetaState::new(2);
        let mut plan = Vec::new();
        while let Some(run) = determine_next_run(&meta, &ArmFilter::default()) {
            plan.push((run.family, run.kind, run.index, run.seed));
            complete(&mut meta, run, 10);
        }
        use AgentFamily::{ActorCritic as Ac, Dqn};
        use RunKind::{Curriculum as C, NoCurriculum as N};
        assert_eq!(
            plan,
            [
                (Ac, C, 0, 0),
                (Ac, C, 1, 1),
                (Ac, N, 0, 2),
                (Ac, N, 1, 3),
                (Dqn, C, 0, 4),
                (Dqn, C, 1, 5),
                (Dqn, N, 0, 6),
                (Dqn, N, 1, 7),
            ]
        );
    }

    #[test]
    fn test_nocurriculum_waits_for_full_curriculum_budget() {
        let mut meta = MetaState::new(3);
        meta.record_run(AgentFamily::Dqn, RunKind::Curriculum, 5);
        let filter = ArmFilter {
            allow_curriculum: false,
            ..ArmFilter::default()
        }
        .with_family(AgentFamily::Dqn)
        .unwrap();
        assert_eq!(determine_next_run(&meta, &filter), None);

        meta.record_run(AgentFamily::Dqn, RunKind::Curriculum, 5);
        meta.record_run(AgentFamily::Dqn, RunKind::Curriculum, 5);
        let run = determine_next_run(&meta, &filter).unwrap();
        assert_eq!(run.kind, RunKind::NoCurriculum);
        assert_eq!(run.seed, 9);
    }

    #[test]
    fn test_forced_family_skips_other_arms() {
        let meta = MetaState::new(5);
        let filter = ArmFilter::default().with_family(AgentFamily::Dqn).unwrap();
        let run = determine_next_run(&meta, &filter).unwrap();
        assert_eq!((run.family, run.kind, run.seed), (AgentFamily::Dqn, RunKind::Curriculum, 10));
        assert!(ArmFilter::default().with_family(AgentFamily::QLearning).is_err());
    }

    #[test]
    fn test_everything_disabled_is_exhausted() {
        let filter = ArmFilter {
            family: None,
            allow_curriculum: false,
            allow_nocurriculum: false,
        };
        assert_eq!(determine_next_run(&MetaState::new(1), &filter), None);
    }

    #[test]
    fn test_step_budget() {
        let mut meta = MetaState::new(10);
        meta.record_run(AgentFamily::ActorCritic, RunKind::Curriculum, 100);
        assert_eq!(nocurriculum_step_budget(&meta, AgentFamily::ActorCritic), 30);
        assert_eq!(nocurriculum_step_budget(&meta, AgentFamily::Dqn), 0);
    }

    #[test]
    fn test_run_kind_parsing() {
        assert_eq!("curr".parse::<RunKind>().unwrap(), RunKind::Curriculum);
        assert_eq!("nocurr".parse::<RunKind>().unwrap(), RunKind::NoCurriculum);
        assert!(matches!("baseline".parse::<RunKind>(), Err(RLError::InvalidConfig(_))));
        assert!(matches!(
            "sarsa".parse::<AgentFamily>(),
            Err(RLError::UnknownAgentFamily(_))
        ));
    }

    proptest! {
        #[test]
        fn prop_seeds_never_collide(n_runs in 1usize..12) {
            let mut meta = MetaState::new(n_runs);
            let mut seeds = std::collections::HashSet::new();
            while let Some(run) = determine_next_run(&meta, &ArmFilter::default()) {
                prop_assert!(seeds.insert(run.seed));
                complete(&mut meta, run, 1);
            }
            prop_assert_eq!(seeds.len(), 4 * n_runs);
        }
    }
}
