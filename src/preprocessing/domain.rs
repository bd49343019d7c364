//! Unfit and fitted column transformers.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::common::error::{DataError, NoShowError, NoShowResult};
use crate::features::domain::{Column, ColumnData, FeatureTable};

/// How one feature column is turned into model inputs.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Treatment {
    /// Center to zero mean and scale to unit variance.
    Scale,
    /// One indicator column per category seen during fit.
    OneHot,
}

impl Treatment {
    pub fn expected_kind(&self) -> &'static str {
        match self {
            Treatment::Scale => "numeric",
            Treatment::OneHot => "categorical",
        }
    }

    fn prefix(&self) -> &'static str {
        match self {
            Treatment::Scale => "num",
            Treatment::OneHot => "cat",
        }
    }
}

/// Declared but not yet fitted column transformation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ColumnTransformer {
    columns: Vec<(String, Treatment)>,
}

impl ColumnTransformer {
    pub(crate) fn new(columns: Vec<(String, Treatment)>) -> Self {
        Self { columns }
    }

    pub fn columns(&self) -> &[(String, Treatment)] {
        &self.columns
    }

    /// Stage parameters as reported to the tracker.
    pub fn params(&self) -> Vec<(String, String)> {
        [Treatment::Scale, Treatment::OneHot]
            .into_iter()
            .map(|treatment| {
                let names: Vec<&str> = self
                    .columns
                    .iter()
                    .filter(|(_, t)| *t == treatment)
                    .map(|(name, _)| name.as_str())
                    .collect();
                (treatment.prefix().to_string(), names.join(","))
            })
            .chain([("handle_unknown".to_string(), "ignore".to_string())])
            .collect()
    }

    /// Learn scaling statistics and category vocabularies from `x`.
    pub fn fit(&self, x: &FeatureTable) -> NoShowResult<FittedColumnTransformer> {
        let mut fitted = Vec::with_capacity(self.columns.len());
        for (name, treatment) in &self.columns {
            let column = lookup(x, name, *treatment)?;
            let params = match (&column.data, treatment) {
                (ColumnData::Numeric(values), Treatment::Scale) => {
                    let (mean, scale) = mean_and_scale(values);
                    FittedColumn::Scale {
                        name: name.clone(),
                        mean,
                        scale,
                    }
                }
                (ColumnData::Categorical(values), Treatment::OneHot) => {
                    let categories: BTreeSet<&str> = values.iter().map(String::as_str).collect();
                    FittedColumn::OneHot {
                        name: name.clone(),
                        categories: categories.into_iter().map(String::from).collect(),
                    }
                }
                (data, treatment) => return Err(kind_mismatch(name, *treatment, data)),
            };
            fitted.push(params);
        }
        Ok(FittedColumnTransformer { columns: fitted })
    }
}

/// Learned parameters for one input column.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FittedColumn {
    Scale {
        name: String,
        mean: f64,
        scale: f64,
    },
    OneHot {
        name: String,
        categories: Vec<String>,
    },
}

impl FittedColumn {
    pub fn name(&self) -> &str {
        match self {
            FittedColumn::Scale { name, .. } | FittedColumn::OneHot { name, .. } => name,
        }
    }

    fn treatment(&self) -> Treatment {
        match self {
            FittedColumn::Scale { .. } => Treatment::Scale,
            FittedColumn::OneHot { .. } => Treatment::OneHot,
        }
    }

    fn output_width(&self) -> usize {
        match self {
            FittedColumn::Scale { .. } => 1,
            FittedColumn::OneHot { categories, .. } => categories.len(),
        }
    }
}

/// Column transformer with learned parameters; applies identically to any table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FittedColumnTransformer {
    columns: Vec<FittedColumn>,
}

impl FittedColumnTransformer {
    pub fn columns(&self) -> &[FittedColumn] {
        &self.columns
    }

    /// Number of numeric columns produced by [`FittedColumnTransformer::apply`].
    pub fn output_width(&self) -> usize {
        self.columns.iter().map(FittedColumn::output_width).sum()
    }

    /// Transform `x` into an all-numeric table; undeclared columns are dropped.
    pub fn apply(&self, x: &FeatureTable) -> NoShowResult<FeatureTable> {
        let mut out = Vec::with_capacity(self.output_width());
        for fitted in &self.columns {
            let column = lookup(x, fitted.name(), fitted.treatment())?;
            match (fitted, &column.data) {
                (FittedColumn::Scale { name, mean, scale }, ColumnData::Numeric(values)) => {
                    out.push(Column::numeric(
                        format!("num__{name}"),
                        values.iter().map(|v| (v - mean) / scale).collect(),
                    ));
                }
                (FittedColumn::OneHot { name, categories }, ColumnData::Categorical(values)) => {
                    for category in categories {
                        out.push(Column::numeric(
                            format!("cat__{name}_{category}"),
                            values
                                .iter()
                                .map(|v| if v == category { 1.0 } else { 0.0 })
                                .collect(),
                        ));
                    }
                }
                (fitted, data) => {
                    return Err(kind_mismatch(fitted.name(), fitted.treatment(), data))
                }
            }
        }
        FeatureTable::new(out)
    }
}

fn lookup<'a>(x: &'a FeatureTable, name: &str, treatment: Treatment) -> NoShowResult<&'a Column> {
    let column = x
        .column(name)
        .ok_or_else(|| DataError::UnknownColumn(name.to_string()))?;
    if column.data.kind() != treatment.expected_kind() {
        return Err(kind_mismatch(name, treatment, &column.data));
    }
    Ok(column)
}

fn kind_mismatch(name: &str, treatment: Treatment, data: &ColumnData) -> NoShowError {
    DataError::ColumnKind {
        column: name.to_string(),
        expected: treatment.expected_kind(),
        actual: data.kind(),
    }
    .into()
}

/// Mean and population standard deviation; a constant column scales by 1.
fn mean_and_scale(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 1.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let std = var.sqrt();
    let scale = if std > f64::EPSILON { std } else { 1.0 };
    (mean, scale)
}
