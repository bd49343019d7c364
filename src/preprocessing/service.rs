//! Column treatment declarations turned into an unfit transform stage.

use log::debug;

use crate::common::error::{DataError, NoShowResult};
use crate::features::domain::{ColumnData, FeatureTable};
use crate::training::pipeline::TransformSpec;

use super::domain::{ColumnTransformer, Treatment};

/// Declares per-column treatment and turns it into an unfit transform stage.
#[derive(Clone, Debug, Default)]
pub struct Preprocessor {
    columns: Vec<(String, Treatment)>,
}

impl Preprocessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn numeric(mut self, column: impl Into<String>) -> Self {
        self.columns.push((column.into(), Treatment::Scale));
        self
    }

    pub fn categorical(mut self, column: impl Into<String>) -> Self {
        self.columns.push((column.into(), Treatment::OneHot));
        self
    }

    /// Scale every numeric column and one-hot encode every categorical one.
    pub fn infer(features: &FeatureTable) -> Self {
        features
            .columns()
            .iter()
            .fold(Self::new(), |pre, column| match column.data {
                ColumnData::Numeric(_) => pre.numeric(column.name.clone()),
                ColumnData::Categorical(_) => pre.categorical(column.name.clone()),
            })
    }

    pub fn columns(&self) -> &[(String, Treatment)] {
        &self.columns
    }

    /// Check the declarations against `features` and return the unfit stage.
    ///
    /// No statistics are computed here.
    pub fn configure(&self, features: &FeatureTable) -> NoShowResult<TransformSpec> {
        for (name, treatment) in &self.columns {
            let column = features
                .column(name)
                .ok_or_else(|| DataError::UnknownColumn(name.clone()))?;
            if column.data.kind() != treatment.expected_kind() {
                return Err(DataError::ColumnKind {
                    column: name.clone(),
                    expected: treatment.expected_kind(),
                    actual: column.data.kind(),
                }
                .into());
            }
        }
        debug!(
            "preprocessor configured: {} of {} columns declared",
            self.columns.len(),
            features.n_cols()
        );
        Ok(TransformSpec::Columns(ColumnTransformer::new(
            self.columns.clone(),
        )))
    }
}
