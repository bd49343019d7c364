//! Split, fit and evaluate one pipeline as a forward-only state machine.

use std::time::Instant;

use log::info;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::common::error::{DataError, NoShowResult, StateError};
use crate::common::time::elapsed_ms;
use crate::evaluation::{self, EvalScores};
use crate::features::domain::{FeatureTable, Label};

use super::domain::TrainerState;
use super::pipeline::{FittedPipeline, PipelineSpec};

/// Disjoint train/test row indices covering every row once.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DataSplit {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

impl DataSplit {
    /// Permute `0..n_rows` with `seed`; the first `ceil(test_size * n_rows)`
    /// rows become the test partition.
    pub fn new(n_rows: usize, test_size: f64, seed: u64) -> Result<Self, DataError> {
        if !(test_size > 0.0 && test_size < 1.0) {
            return Err(DataError::InvalidSplitFraction(test_size));
        }
        let n_test = (test_size * n_rows as f64).ceil() as usize;
        if n_test == 0 || n_test >= n_rows {
            return Err(DataError::EmptyPartition {
                rows: n_rows,
                test_size,
            });
        }
        let mut rows: Vec<usize> = (0..n_rows).collect();
        rows.shuffle(&mut ChaCha8Rng::seed_from_u64(seed));
        let train = rows.split_off(n_test);
        Ok(Self { train, test: rows })
    }

    pub fn test_fraction(&self) -> f64 {
        self.test.len() as f64 / (self.train.len() + self.test.len()) as f64
    }
}

struct Partitions {
    x_train: FeatureTable,
    y_train: Vec<Label>,
    x_test: FeatureTable,
    y_test: Vec<Label>,
}

/// Owns the pipeline configuration, the partitions and the fitted pipeline
/// for a single run.
pub struct Trainer {
    spec: PipelineSpec,
    test_size: f64,
    seed: u64,
    state: TrainerState,
    split: Option<DataSplit>,
    data: Option<Partitions>,
    fitted: Option<FittedPipeline>,
    predictions: Vec<Label>,
    scores: Option<EvalScores>,
}

impl Trainer {
    pub fn new(spec: PipelineSpec, test_size: f64, seed: u64) -> Self {
        Self {
            spec,
            test_size,
            seed,
            state: TrainerState::Initialized,
            split: None,
            data: None,
            fitted: None,
            predictions: Vec::new(),
            scores: None,
        }
    }

    pub fn state(&self) -> TrainerState {
        self.state
    }

    pub fn spec(&self) -> &PipelineSpec {
        &self.spec
    }

    pub fn test_size(&self) -> f64 {
        self.test_size
    }

    fn expect_state(
        &self,
        operation: &'static str,
        expected: TrainerState,
    ) -> Result<(), StateError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(StateError::invalid(operation, self.state.as_str()))
        }
    }

    /// Partition `x` and `y` into train and test sets.
    pub fn split(&mut self, x: FeatureTable, y: Vec<Label>) -> NoShowResult<&DataSplit> {
        self.expect_state("split", TrainerState::Initialized)?;
        if x.n_rows() != y.len() {
            return Err(DataError::LabelCount {
                features: x.n_rows(),
                labels: y.len(),
            }
            .into());
        }
        let split = DataSplit::new(x.n_rows(), self.test_size, self.seed)?;
        let pick = |rows: &[usize]| rows.iter().map(|&i| y[i]).collect::<Vec<_>>();
        self.data = Some(Partitions {
            x_train: x.take(&split.train),
            y_train: pick(&split.train),
            x_test: x.take(&split.test),
            y_test: pick(&split.test),
        });
        info!(
            "split {} rows: {} train, {} test (seed {})",
            x.n_rows(),
            split.train.len(),
            split.test.len(),
            self.seed
        );
        self.state = TrainerState::Split;
        Ok(self.split.insert(split))
    }

    /// Fit the pipeline on the training partition only.
    pub fn fit(&mut self) -> NoShowResult<()> {
        self.expect_state("fit", TrainerState::Split)?;
        let data = self
            .data
            .as_ref()
            .ok_or_else(|| StateError::invalid("fit", self.state.as_str()))?;
        let started = Instant::now();
        let fitted = self.spec.fit(&data.x_train, &data.y_train)?;
        info!(
            "pipeline fitted on {} rows in {} ms",
            data.x_train.n_rows(),
            elapsed_ms(started)
        );
        self.fitted = Some(fitted);
        self.state = TrainerState::Fit;
        Ok(())
    }

    /// Predict the test partition and score it.
    pub fn evaluate(&mut self) -> NoShowResult<&EvalScores> {
        self.expect_state("evaluate", TrainerState::Fit)?;
        let (Some(data), Some(fitted)) = (self.data.as_ref(), self.fitted.as_ref()) else {
            return Err(StateError::invalid("evaluate", self.state.as_str()).into());
        };
        let predictions = fitted.predict(&data.x_test)?;
        let scores = evaluation::evaluate(&data.y_test, &predictions);
        info!(
            "evaluated {} test rows: accuracy {:.4}, f1 {:.4}",
            predictions.len(),
            scores.accuracy,
            scores.f1
        );
        self.predictions = predictions;
        self.state = TrainerState::Evaluated;
        Ok(self.scores.insert(scores))
    }

    fn expect_evaluated(&self, operation: &'static str) -> Result<(), StateError> {
        self.expect_state(operation, TrainerState::Evaluated)
    }

    /// Test-partition predictions, in test-row order.
    pub fn predictions(&self) -> NoShowResult<&[Label]> {
        self.expect_evaluated("read predictions")?;
        Ok(self.predictions.as_slice())
    }

    pub fn scores(&self) -> NoShowResult<&EvalScores> {
        self.expect_evaluated("read scores")?;
        self.scores
            .as_ref()
            .ok_or_else(|| StateError::invalid("read scores", self.state.as_str()).into())
    }

    pub fn test_features(&self) -> NoShowResult<&FeatureTable> {
        self.expect_evaluated("read test features")?;
        self.data
            .as_ref()
            .map(|d| &d.x_test)
            .ok_or_else(|| StateError::invalid("read test features", self.state.as_str()).into())
    }

    /// Predict arbitrary rows with the fitted pipeline.
    pub fn predict(&self, x: &FeatureTable) -> NoShowResult<Vec<Label>> {
        self.expect_evaluated("predict")?;
        match &self.fitted {
            Some(fitted) => fitted.predict(x),
            None => Err(StateError::invalid("predict", self.state.as_str()).into()),
        }
    }

    /// Hand the fitted pipeline over and close the trainer.
    pub fn finish(&mut self) -> NoShowResult<FittedPipeline> {
        self.expect_evaluated("finish")?;
        let fitted = self
            .fitted
            .take()
            .ok_or_else(|| StateError::invalid("finish", self.state.as_str()))?;
        self.data = None;
        self.state = TrainerState::Done;
        Ok(fitted)
    }
}
