//! Contract of the experiment tracking collaborator.

use serde::{Deserialize, Serialize};

use crate::common::error::{DataError, NoShowResult, TrackingError};
use crate::common::ids::{ExperimentId, RunId};
use crate::features::domain::{Cell, ColumnData, FeatureTable, Label};
use crate::training::pipeline::FittedPipeline;

pub type TrackingResult<T> = Result<T, TrackingError>;

/// An open run inside an experiment.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct RunHandle {
    pub run_id: RunId,
    pub experiment_id: ExperimentId,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Running,
    Finished,
    Failed,
}

/// Name and type of one signature column.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub dtype: String,
}

/// Input/output schema sample attached to a logged model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelSignature {
    pub inputs: Vec<ColumnSpec>,
    pub outputs: Vec<ColumnSpec>,
    pub input_example: Vec<Cell>,
    pub output_example: Label,
}

impl ModelSignature {
    /// Build from the first row of `example` and the first of `predictions`.
    pub fn infer(example: &FeatureTable, predictions: &[Label]) -> NoShowResult<Self> {
        let (Some(row), Some(&prediction)) = (example.row(0), predictions.first()) else {
            return Err(DataError::InsufficientData {
                requested: 1,
                available: example.n_rows().min(predictions.len()),
            }
            .into());
        };
        let inputs = example
            .columns()
            .iter()
            .map(|c| ColumnSpec {
                name: c.name.clone(),
                dtype: match c.data {
                    ColumnData::Numeric(_) => "double",
                    ColumnData::Categorical(_) => "string",
                }
                .to_string(),
            })
            .collect();
        Ok(Self {
            inputs,
            outputs: vec![ColumnSpec {
                name: "prediction".into(),
                dtype: "long".into(),
            }],
            input_example: row,
            output_example: prediction,
        })
    }
}

/// A registered model version.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelVersion {
    pub registry_name: String,
    pub version: u32,
    pub run_id: RunId,
    pub artifact_path: String,
    /// FNV-1a of the serialized pipeline.
    pub checksum: String,
}

/// Receives parameters, metrics and the final model of a run.
///
/// Explicit `log_param` calls are additive to what autolog records.
pub trait ExperimentTracker {
    fn get_or_create_experiment(&mut self, name: &str) -> TrackingResult<ExperimentId>;

    /// When enabled, `log_model` also records every pipeline stage parameter.
    fn set_autolog(&mut self, enabled: bool);

    fn begin_run(&mut self, experiment: &ExperimentId) -> TrackingResult<RunHandle>;

    fn log_param(&mut self, run: &RunHandle, name: &str, value: &str) -> TrackingResult<()>;

    fn log_metric(&mut self, run: &RunHandle, name: &str, value: f64) -> TrackingResult<()>;

    fn log_model(
        &mut self,
        run: &RunHandle,
        model: FittedPipeline,
        artifact_name: &str,
        registry_name: &str,
        signature: &ModelSignature,
    ) -> TrackingResult<ModelVersion>;

    fn end_run(&mut self, run: &RunHandle, status: RunStatus) -> TrackingResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::domain::Column;

    #[test]
    fn signature_types_follow_columns() {
        let x = FeatureTable::new(vec![
            Column::categorical("Gender", vec!["F".into(), "M".into()]),
            Column::numeric("Age", vec![62.0, 8.0]),
        ])
        .unwrap();
        let sig = ModelSignature::infer(&x, &[1, 0]).unwrap();
        assert_eq!(sig.inputs[0].dtype, "string");
        assert_eq!(sig.inputs[1].dtype, "double");
        assert_eq!(sig.outputs[0].dtype, "long");
        assert_eq!(
            sig.input_example,
            vec![Cell::Text("F".into()), Cell::Number(62.0)]
        );
        assert_eq!(sig.output_example, 1);
    }

    #[test]
    fn signature_needs_a_row() {
        let x = FeatureTable::new(vec![Column::numeric("Age", vec![])]).unwrap();
        assert!(ModelSignature::infer(&x, &[]).is_err());
    }

    #[test]
    fn signature_serializes_with_type_keys() {
        let x = FeatureTable::new(vec![Column::numeric("Age", vec![3.0])]).unwrap();
        let json = serde_json::to_value(ModelSignature::infer(&x, &[0]).unwrap()).unwrap();
        assert_eq!(json["inputs"][0]["type"], "double");
        assert_eq!(json["input_example"][0], 3.0);
    }
}
