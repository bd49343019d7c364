//! Model-ready feature tables.

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::common::error::{DataError, FitError, NoShowResult};

/// Binary target: 1 for a no-show, 0 otherwise.
pub type Label = u8;

pub const DIFF_APPOINTMENT_SCHEDULED: &str = "diff_appointment_scheduled";
pub const APPOINTMENT_DAY_OF_WEEK: &str = "AppointmentDay_DayOfWeek";
pub const APPOINTMENT_MONTH: &str = "AppointmentDay_Month";

/// Cell storage of one column.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ColumnData {
    Numeric(Vec<f64>),
    Categorical(Vec<String>),
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Numeric(v) => v.len(),
            ColumnData::Categorical(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ColumnData::Numeric(_) => "numeric",
            ColumnData::Categorical(_) => "categorical",
        }
    }

    fn take(&self, rows: &[usize]) -> Self {
        match self {
            ColumnData::Numeric(v) => ColumnData::Numeric(rows.iter().map(|&i| v[i]).collect()),
            ColumnData::Categorical(v) => {
                ColumnData::Categorical(rows.iter().map(|&i| v[i].clone()).collect())
            }
        }
    }
}

/// A named feature column.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
}

impl Column {
    pub fn numeric(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            data: ColumnData::Numeric(values),
        }
    }

    pub fn categorical(name: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            name: name.into(),
            data: ColumnData::Categorical(values),
        }
    }
}

/// Single cell value, used for signature examples.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    Number(f64),
    Text(String),
}

/// Columnar feature set: every column has `n_rows` cells.
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureTable {
    columns: Vec<Column>,
    n_rows: usize,
}

impl FeatureTable {
    pub fn new(columns: Vec<Column>) -> NoShowResult<Self> {
        let n_rows = columns.first().map(|c| c.data.len()).unwrap_or(0);
        if let Some(bad) = columns.iter().find(|c| c.data.len() != n_rows) {
            return Err(DataError::RaggedColumn {
                column: bad.name.clone(),
                expected: n_rows,
                actual: bad.data.len(),
            }
            .into());
        }
        Ok(Self { columns, n_rows })
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Rows at `rows`, in that order.
    pub fn take(&self, rows: &[usize]) -> Self {
        Self {
            columns: self
                .columns
                .iter()
                .map(|c| Column {
                    name: c.name.clone(),
                    data: c.data.take(rows),
                })
                .collect(),
            n_rows: rows.len(),
        }
    }

    /// Cells of one row in column order.
    pub fn row(&self, idx: usize) -> Option<Vec<Cell>> {
        if idx >= self.n_rows {
            return None;
        }
        Some(
            self.columns
                .iter()
                .map(|c| match &c.data {
                    ColumnData::Numeric(v) => Cell::Number(v[idx]),
                    ColumnData::Categorical(v) => Cell::Text(v[idx].clone()),
                })
                .collect(),
        )
    }

    /// Dense row-major matrix; every column must be numeric and finite.
    pub fn to_matrix(&self) -> Result<Array2<f64>, FitError> {
        let mut matrix = Array2::<f64>::zeros((self.n_rows, self.columns.len()));
        for (j, column) in self.columns.iter().enumerate() {
            let ColumnData::Numeric(values) = &column.data else {
                return Err(FitError::NonNumeric(column.name.clone()));
            };
            for (i, &value) in values.iter().enumerate() {
                if !value.is_finite() {
                    return Err(FitError::NonFinite {
                        column: column.name.clone(),
                        row: i,
                    });
                }
                matrix[[i, j]] = value;
            }
        }
        Ok(matrix)
    }
}
