//! Binary classification metrics over held-out predictions.

pub mod domain;
pub mod service;

pub use domain::{ConfusionMatrix, EvalScores, RunMetrics};
pub use service::{accuracy_score, evaluate, f1_score};
