//! Immutable pipeline composition.
//!
//! A [`PipelineSpec`] is an ordered list of unfit transform stages followed by
//! one estimator stage. It is assembled once through [`PipelineBuilder`] and
//! never mutated; [`PipelineSpec::fit`] chains every stage's `fit` then
//! `apply` over the training table and returns a separate [`FittedPipeline`].

use serde::{Deserialize, Serialize};

use crate::common::error::NoShowResult;
use crate::features::domain::{FeatureTable, Label};
use crate::preprocessing::{ColumnTransformer, FittedColumnTransformer};

use super::domain::RandomForestParams;
use super::forest::RandomForestClassifier;

pub const PREPROCESSING_STAGE: &str = "Preprocessing";
pub const CLASSIFIER_STAGE: &str = "Classifier";

/// Unfit transform stage.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransformSpec {
    Columns(ColumnTransformer),
}

impl TransformSpec {
    pub fn fit(&self, x: &FeatureTable) -> NoShowResult<FittedTransform> {
        match self {
            TransformSpec::Columns(spec) => Ok(FittedTransform::Columns(spec.fit(x)?)),
        }
    }

    pub fn params(&self) -> Vec<(String, String)> {
        match self {
            TransformSpec::Columns(spec) => spec.params(),
        }
    }
}

/// Transform stage with learned parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FittedTransform {
    Columns(FittedColumnTransformer),
}

impl FittedTransform {
    pub fn apply(&self, x: &FeatureTable) -> NoShowResult<FeatureTable> {
        match self {
            FittedTransform::Columns(fitted) => fitted.apply(x),
        }
    }
}

/// Unfit final estimator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EstimatorSpec {
    RandomForest(RandomForestParams),
}

impl EstimatorSpec {
    pub fn fit(&self, x: &FeatureTable, y: &[Label]) -> NoShowResult<FittedEstimator> {
        let matrix = x.to_matrix()?;
        match self {
            EstimatorSpec::RandomForest(params) => Ok(FittedEstimator::RandomForest(
                RandomForestClassifier::fit(params, &matrix, y)?,
            )),
        }
    }

    pub fn params(&self) -> Vec<(String, String)> {
        match self {
            EstimatorSpec::RandomForest(params) => params.as_params(),
        }
    }
}

/// Fitted final estimator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FittedEstimator {
    RandomForest(RandomForestClassifier),
}

impl FittedEstimator {
    pub fn predict(&self, x: &FeatureTable) -> NoShowResult<Vec<Label>> {
        let matrix = x.to_matrix()?;
        match self {
            FittedEstimator::RandomForest(forest) => Ok(forest.predict(&matrix)?),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Stage<T> {
    pub name: String,
    pub step: T,
}

/// Ordered stage descriptors. Built once, read-only afterwards.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PipelineSpec {
    transforms: Vec<Stage<TransformSpec>>,
    estimator: Stage<EstimatorSpec>,
}

impl PipelineSpec {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    pub fn transforms(&self) -> &[Stage<TransformSpec>] {
        &self.transforms
    }

    pub fn estimator(&self) -> &Stage<EstimatorSpec> {
        &self.estimator
    }

    /// Every stage parameter keyed as `<stage>__<param>`.
    pub fn params(&self) -> Vec<(String, String)> {
        let transforms = self
            .transforms
            .iter()
            .flat_map(|stage| prefixed(&stage.name, stage.step.params()));
        let estimator = prefixed(&self.estimator.name, self.estimator.step.params());
        transforms.chain(estimator).collect()
    }

    /// Fit every stage in order on `x`; each transform sees the previous output.
    pub fn fit(&self, x: &FeatureTable, y: &[Label]) -> NoShowResult<FittedPipeline> {
        let mut current = x.clone();
        let mut transforms = Vec::with_capacity(self.transforms.len());
        for stage in &self.transforms {
            let fitted = stage.step.fit(&current)?;
            current = fitted.apply(&current)?;
            transforms.push(Stage {
                name: stage.name.clone(),
                step: fitted,
            });
        }
        let estimator = Stage {
            name: self.estimator.name.clone(),
            step: self.estimator.step.fit(&current, y)?,
        };
        Ok(FittedPipeline {
            spec: self.clone(),
            transforms,
            estimator,
        })
    }
}

fn prefixed(
    stage: &str,
    params: Vec<(String, String)>,
) -> impl Iterator<Item = (String, String)> + '_ {
    params
        .into_iter()
        .map(move |(key, value)| (format!("{stage}__{key}"), value))
}

/// Collects transform stages; [`PipelineBuilder::estimator`] closes the pipeline.
#[derive(Debug, Default)]
pub struct PipelineBuilder {
    transforms: Vec<Stage<TransformSpec>>,
}

impl PipelineBuilder {
    pub fn transform(mut self, name: impl Into<String>, step: TransformSpec) -> Self {
        self.transforms.push(Stage {
            name: name.into(),
            step,
        });
        self
    }

    pub fn estimator(self, name: impl Into<String>, step: EstimatorSpec) -> PipelineSpec {
        PipelineSpec {
            transforms: self.transforms,
            estimator: Stage {
                name: name.into(),
                step,
            },
        }
    }
}

/// A pipeline whose stages all carry learned parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FittedPipeline {
    spec: PipelineSpec,
    transforms: Vec<Stage<FittedTransform>>,
    estimator: Stage<FittedEstimator>,
}

impl FittedPipeline {
    /// Configuration the pipeline was fit from.
    pub fn spec(&self) -> &PipelineSpec {
        &self.spec
    }

    pub fn params(&self) -> Vec<(String, String)> {
        self.spec.params()
    }

    pub fn transforms(&self) -> &[Stage<FittedTransform>] {
        &self.transforms
    }

    pub fn estimator(&self) -> &Stage<FittedEstimator> {
        &self.estimator
    }

    /// Run `x` through every transform and the estimator.
    pub fn predict(&self, x: &FeatureTable) -> NoShowResult<Vec<Label>> {
        let mut current = x.clone();
        for stage in &self.transforms {
            current = stage.step.apply(&current)?;
        }
        self.estimator.step.predict(&current)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::error::{FitError, NoShowError};
    use crate::features::domain::Column;
    use crate::preprocessing::Preprocessor;

    fn table() -> (FeatureTable, Vec<Label>) {
        let n = 60;
        let x = FeatureTable::new(vec![
            Column::numeric("Age", (0..n).map(|i| (i % 12) as f64 * 5.0).collect()),
            Column::categorical(
                "Gender",
                (0..n)
                    .map(|i| if i % 2 == 0 { "F" } else { "M" }.to_string())
                    .collect(),
            ),
        ])
        .unwrap();
        let y = (0..n).map(|i| Label::from(i % 12 >= 6)).collect();
        (x, y)
    }

    fn forest() -> RandomForestParams {
        RandomForestParams {
            n_estimators: 10,
            max_depth: Some(6),
            min_samples_split: 2,
            random_state: Some(3),
            n_jobs: 1,
        }
    }

    fn spec(x: &FeatureTable) -> PipelineSpec {
        let pre = Preprocessor::infer(x).configure(x).unwrap();
        PipelineSpec::builder()
            .transform(PREPROCESSING_STAGE, pre)
            .estimator(CLASSIFIER_STAGE, EstimatorSpec::RandomForest(forest()))
    }

    #[test]
    fn params_are_stage_prefixed() {
        let (x, _) = table();
        let params = spec(&x).params();
        assert!(params.contains(&("Preprocessing__num".into(), "Age".into())));
        assert!(params.contains(&("Preprocessing__cat".into(), "Gender".into())));
        assert!(params.contains(&("Classifier__n_estimators".into(), "10".into())));
        assert!(params.contains(&("Classifier__max_depth".into(), "6".into())));
    }

    #[test]
    fn fit_leaves_the_spec_untouched() {
        let (x, y) = table();
        let spec = spec(&x);
        let before = spec.clone();
        let fitted = spec.fit(&x, &y).unwrap();
        assert_eq!(spec, before);
        assert_eq!(fitted.spec(), &before);
        assert_eq!(fitted.transforms()[0].name, PREPROCESSING_STAGE);
    }

    #[test]
    fn fitted_pipeline_predicts_raw_features() {
        let (x, y) = table();
        let fitted = spec(&x).fit(&x, &y).unwrap();
        let predictions = fitted.predict(&x).unwrap();
        assert_eq!(predictions.len(), x.n_rows());
        let correct = predictions.iter().zip(&y).filter(|(p, t)| p == t).count();
        assert!(correct as f64 / y.len() as f64 > 0.9);
    }

    #[test]
    fn json_round_trip_keeps_predictions() {
        let (x, y) = table();
        let fitted = spec(&x).fit(&x, &y).unwrap();
        let restored = FittedPipeline::from_json(&fitted.to_json().unwrap()).unwrap();
        assert_eq!(restored.predict(&x).unwrap(), fitted.predict(&x).unwrap());
    }

    #[test]
    fn estimator_without_transforms_needs_numeric_input() {
        let (x, y) = table();
        let bare = PipelineSpec::builder()
            .estimator(CLASSIFIER_STAGE, EstimatorSpec::RandomForest(forest()));
        let err = bare.fit(&x, &y).unwrap_err();
        assert!(matches!(err, NoShowError::Fit(FitError::NonNumeric(c)) if c == "Gender"));
    }

    #[test]
    fn nan_features_fail_the_fit() {
        let x = FeatureTable::new(vec![Column::numeric("Age", vec![1.0, f64::NAN, 3.0])]).unwrap();
        let spec = PipelineSpec::builder()
            .transform(
                PREPROCESSING_STAGE,
                Preprocessor::infer(&x).configure(&x).unwrap(),
            )
            .estimator(CLASSIFIER_STAGE, EstimatorSpec::RandomForest(forest()));
        let err = spec.fit(&x, &[0, 1, 0]).unwrap_err();
        assert!(matches!(err, NoShowError::Fit(FitError::NonFinite { .. })));
    }
}
