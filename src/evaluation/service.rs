//! Classification scores over held-out predictions.

use crate::features::domain::Label;

use super::domain::{ConfusionMatrix, EvalScores};

/// Score `y_pred` against `y_true`. Pairs past the shorter slice are ignored.
pub fn evaluate(y_true: &[Label], y_pred: &[Label]) -> EvalScores {
    let mut confusion = ConfusionMatrix::default();
    for (&truth, &pred) in y_true.iter().zip(y_pred) {
        match (pred == 1, truth == 1) {
            (true, true) => confusion.tp += 1,
            (true, false) => confusion.fp += 1,
            (false, false) => confusion.tn += 1,
            (false, true) => confusion.fn_count += 1,
        }
    }

    let ratio = |num: usize, den: usize| if den > 0 { num as f64 / den as f64 } else { 0.0 };
    let accuracy = ratio(confusion.tp + confusion.tn, confusion.total());
    let precision = ratio(confusion.tp, confusion.predicted_positive());
    let recall = ratio(confusion.tp, confusion.tp + confusion.fn_count);
    let f1 = if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    };

    EvalScores {
        confusion,
        accuracy,
        precision,
        recall,
        f1,
    }
}

pub fn accuracy_score(y_true: &[Label], y_pred: &[Label]) -> f64 {
    evaluate(y_true, y_pred).accuracy
}

/// F1 of the positive class; 0 when it is never predicted nor present.
pub fn f1_score(y_true: &[Label], y_pred: &[Label]) -> f64 {
    evaluate(y_true, y_pred).f1
}
