//! Curriculum versus baseline experiment campaigns
//!
//! A campaign compares training through a curriculum against training on
//! the target task alone, for two agent families. Progress lives in a
//! meta-state file so that a campaign can be stopped and resumed at any
//! run boundary.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod campaign;
pub mod config;
pub mod meta;
pub mod scheduler;

pub use campaign::{Campaign, CampaignLimits, CampaignStop, CampaignSummary, Runnable};
pub use config::{EvaluationConfig, ExperimentConfig, StageConfig};
pub use meta::{FamilyCounters, MetaState};
pub use scheduler::{
    determine_next_run, nocurriculum_step_budget, Arm, ArmFilter, RunKind, ScheduledRun, ARMS, FAMILIES,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{ArmFilter, Campaign, CampaignLimits, ExperimentConfig, MetaState};
    pub use curricula_core::prelude::*;
}
