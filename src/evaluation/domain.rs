//! Metric containers produced at evaluation time.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Counts of a binary confusion matrix; class 1 is the positive class.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub tp: usize,
    pub fp: usize,
    pub tn: usize,
    pub fn_count: usize,
}

impl ConfusionMatrix {
    pub fn total(&self) -> usize {
        self.tp + self.fp + self.tn + self.fn_count
    }

    pub fn predicted_positive(&self) -> usize {
        self.tp + self.fp
    }
}

/// Scores derived from a [`ConfusionMatrix`]. Undefined ratios are 0.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EvalScores {
    pub confusion: ConfusionMatrix,
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

impl fmt::Display for EvalScores {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = &self.confusion;
        write!(
            f,
            "acc={:.4} prec={:.4} rec={:.4} f1={:.4} (tp={} fp={} tn={} fn={})",
            self.accuracy, self.precision, self.recall, self.f1, c.tp, c.fp, c.tn, c.fn_count
        )
    }
}

/// Immutable summary of one run, handed to the tracker once.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunMetrics {
    pub accuracy: f64,
    pub f1: f64,
    pub test_size: f64,
    pub hyperparameters: Vec<(String, String)>,
}
