//! Domain types shared by the estimator, the trainer and the run orchestrator.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::common::error::FitError;

/// Random-forest hyperparameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RandomForestParams {
    pub n_estimators: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub random_state: Option<u64>,
    /// `-1` uses every core, `1` fits sequentially.
    pub n_jobs: i32,
}

impl Default for RandomForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: Some(64),
            min_samples_split: 4,
            random_state: Some(42),
            n_jobs: -1,
        }
    }
}

impl RandomForestParams {
    pub fn validate(&self) -> Result<(), FitError> {
        if self.n_estimators == 0 {
            return Err(FitError::InvalidParam {
                param: "n_estimators",
                reason: "must be at least 1".into(),
            });
        }
        if self.max_depth == Some(0) {
            return Err(FitError::InvalidParam {
                param: "max_depth",
                reason: "must be at least 1 when set".into(),
            });
        }
        if self.min_samples_split < 2 {
            return Err(FitError::InvalidParam {
                param: "min_samples_split",
                reason: format!("must be at least 2, got {}", self.min_samples_split),
            });
        }
        if self.n_jobs == 0 || self.n_jobs < -1 {
            return Err(FitError::InvalidParam {
                param: "n_jobs",
                reason: format!("must be -1 or positive, got {}", self.n_jobs),
            });
        }
        Ok(())
    }

    /// Parameters in tracker form; unset options render as `None`.
    pub fn as_params(&self) -> Vec<(String, String)> {
        vec![
            ("n_estimators".into(), self.n_estimators.to_string()),
            ("max_depth".into(), render_opt(self.max_depth)),
            ("min_samples_split".into(), self.min_samples_split.to_string()),
            ("random_state".into(), render_opt(self.random_state)),
            ("n_jobs".into(), self.n_jobs.to_string()),
        ]
    }
}

fn render_opt<T: fmt::Display>(value: Option<T>) -> String {
    value.map_or_else(|| "None".to_string(), |v| v.to_string())
}

/// Lifecycle of a [`Trainer`](super::trainer::Trainer).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TrainerState {
    Initialized,
    Split,
    Fit,
    Evaluated,
    Done,
}

impl TrainerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrainerState::Initialized => "initialized",
            TrainerState::Split => "split",
            TrainerState::Fit => "fit",
            TrainerState::Evaluated => "evaluated",
            TrainerState::Done => "done",
        }
    }
}
