//! Raw appointment records and the schema that describes them.

use std::collections::HashMap;

use crate::common::error::{DataError, NoShowResult};

/// What a raw column is used for.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ColumnRole {
    /// Dropped before feature construction.
    Identifier,
    /// When the appointment was booked.
    ScheduledTimestamp,
    /// When the appointment takes place.
    AppointmentTimestamp,
    Numeric,
    Categorical,
    /// `"No"` when the patient attended.
    Label,
}

/// One typed column declaration of the raw schema.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ColumnDecl {
    pub name: String,
    pub role: ColumnRole,
}

impl ColumnDecl {
    pub fn new(name: impl Into<String>, role: ColumnRole) -> Self {
        Self {
            name: name.into(),
            role,
        }
    }
}

/// Ordered list of column declarations the feature builder relies on.
///
/// Columns present in a file but absent from the schema are ignored.
#[derive(Clone, Debug)]
pub struct RawSchema {
    columns: Vec<ColumnDecl>,
}

impl RawSchema {
    pub fn new(columns: Vec<ColumnDecl>) -> Self {
        Self { columns }
    }

    /// Schema of the medical appointment no-show export.
    pub fn appointments() -> Self {
        use ColumnRole::*;
        Self::new(vec![
            ColumnDecl::new("PatientId", Identifier),
            ColumnDecl::new("AppointmentID", Identifier),
            ColumnDecl::new("Gender", Categorical),
            ColumnDecl::new("ScheduledDay", ScheduledTimestamp),
            ColumnDecl::new("AppointmentDay", AppointmentTimestamp),
            ColumnDecl::new("Age", Numeric),
            ColumnDecl::new("Neighbourhood", Categorical),
            ColumnDecl::new("Scholarship", Numeric),
            ColumnDecl::new("Hipertension", Numeric),
            ColumnDecl::new("Diabetes", Numeric),
            ColumnDecl::new("Alcoholism", Numeric),
            ColumnDecl::new("Handcap", Numeric),
            ColumnDecl::new("SMS_received", Numeric),
            ColumnDecl::new("No-show", Label),
        ])
    }

    pub fn columns(&self) -> &[ColumnDecl] {
        &self.columns
    }

    /// Declarations with the given role, in schema order.
    pub fn with_role(&self, role: ColumnRole) -> impl Iterator<Item = &ColumnDecl> {
        self.columns.iter().filter(move |c| c.role == role)
    }
}

/// One row of the source table, cells kept as text.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RawRecord(Vec<String>);

impl RawRecord {
    pub fn new(cells: Vec<String>) -> Self {
        Self(cells)
    }

    pub fn get(&self, idx: usize) -> Option<&str> {
        self.0.get(idx).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Immutable in-memory copy of the source table.
#[derive(Clone, Debug)]
pub struct RawTable {
    header: Vec<String>,
    index: HashMap<String, usize>,
    rows: Vec<RawRecord>,
}

impl RawTable {
    /// Build a table, rejecting rows whose width differs from the header.
    pub fn new(header: Vec<String>, rows: Vec<RawRecord>) -> NoShowResult<Self> {
        if let Some(bad) = rows.iter().find(|r| r.len() != header.len()) {
            return Err(DataError::RaggedColumn {
                column: "<record>".to_string(),
                expected: header.len(),
                actual: bad.len(),
            }
            .into());
        }
        let index = header
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        Ok(Self {
            header,
            index,
            rows,
        })
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn rows(&self) -> &[RawRecord] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// New table holding the rows at `indices`, in that order.
    pub fn select(&self, indices: &[usize]) -> Self {
        Self {
            header: self.header.clone(),
            index: self.index.clone(),
            rows: indices.iter().map(|&i| self.rows[i].clone()).collect(),
        }
    }
}

/// Source of raw appointment tables.
pub trait RecordSource {
    fn load(&self) -> NoShowResult<RawTable>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(cells: &[&str]) -> RawRecord {
        RawRecord::new(cells.iter().map(|c| c.to_string()).collect())
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let header = vec!["a".to_string(), "b".to_string()];
        let err = RawTable::new(header, vec![record(&["1"])]).unwrap_err();
        assert!(err.to_string().contains("expected 2"));
    }

    #[test]
    fn select_keeps_header_and_order() {
        let header = vec!["a".to_string()];
        let table = RawTable::new(header, vec![record(&["x"]), record(&["y"]), record(&["z"])])
            .unwrap();
        let picked = table.select(&[2, 0]);
        assert_eq!(picked.len(), 2);
        assert_eq!(picked.rows()[0].get(0), Some("z"));
        assert_eq!(picked.column_index("a"), Some(0));
    }

    #[test]
    fn appointment_schema_has_one_label() {
        let schema = RawSchema::appointments();
        assert_eq!(schema.with_role(ColumnRole::Label).count(), 1);
        assert_eq!(schema.with_role(ColumnRole::Identifier).count(), 2);
    }
}
