//! Experiment tracking collaborator and its adapters.
//!
//! The pipeline only talks to [`ExperimentTracker`]. `file:` URIs select
//! [`FsTracker`], `memory:` selects [`MemoryTracker`].

pub mod domain;
pub mod memory;
pub mod repo_fs;

pub use domain::{
    ColumnSpec, ExperimentTracker, ModelSignature, ModelVersion, RunHandle, RunStatus,
    TrackingResult,
};
pub use memory::MemoryTracker;
pub use repo_fs::FsTracker;

use crate::common::config::TrackingTarget;

/// Open the tracker a configuration points at.
pub fn open(target: &TrackingTarget) -> TrackingResult<Box<dyn ExperimentTracker>> {
    match target {
        TrackingTarget::Directory(root) => Ok(Box::new(FsTracker::new(root.clone())?)),
        TrackingTarget::Memory => Ok(Box::new(MemoryTracker::new())),
    }
}
