//! Error handling primitives shared across the pipeline.
//!
//! Every failure of a run is one of five families. Each family maps to a
//! stable [`ErrorCode`] that the binary uses as its exit status.

use thiserror::Error;

/// Stable error codes surfaced as the process exit status.
#[repr(u32)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ErrorCode {
    /// Success code used as a sentinel.
    Ok = 0,
    /// Input data could not be read, sampled or transformed.
    Data = 2,
    /// The estimator rejected the feature matrix.
    Fit = 3,
    /// A trainer operation was invoked out of sequence.
    State = 4,
    /// Startup configuration is missing or invalid.
    Config = 5,
    /// The experiment tracker failed to persist the run.
    Tracking = 6,
}

/// Failures while loading or reshaping tabular data.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("insufficient data: requested {requested} rows but only {available} available")]
    InsufficientData { requested: usize, available: usize },
    #[error("malformed timestamp in column {column} at row {row}: {value:?}")]
    MalformedTimestamp {
        column: String,
        row: usize,
        value: String,
    },
    #[error("unknown column: {0}")]
    UnknownColumn(String),
    #[error("column {column} is {actual}, expected {expected}")]
    ColumnKind {
        column: String,
        expected: &'static str,
        actual: &'static str,
    },
    #[error("test fraction must lie strictly between 0 and 1, got {0}")]
    InvalidSplitFraction(f64),
    #[error("cannot split {rows} rows with test fraction {test_size}")]
    EmptyPartition { rows: usize, test_size: f64 },
    #[error("row count mismatch: {features} feature rows but {labels} labels")]
    LabelCount { features: usize, labels: usize },
    #[error("column {column} has {actual} rows, expected {expected}")]
    RaggedColumn {
        column: String,
        expected: usize,
        actual: usize,
    },
    #[error("failed to read {path}: {message}")]
    Read { path: String, message: String },
}

/// Failures raised by the estimator or a fitted stage.
#[derive(Debug, Error)]
pub enum FitError {
    #[error("cannot fit on an empty feature matrix")]
    Empty,
    #[error("column {0} is not numeric")]
    NonNumeric(String),
    #[error("non-finite value in column {column} at row {row}")]
    NonFinite { column: String, row: usize },
    #[error("feature count mismatch: fitted on {expected} columns, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },
    #[error("label count mismatch: {rows} rows but {labels} labels")]
    LabelMismatch { rows: usize, labels: usize },
    #[error("invalid hyperparameter {param}: {reason}")]
    InvalidParam { param: &'static str, reason: String },
    #[error("worker pool: {0}")]
    WorkerPool(String),
}

/// An operation was invoked in a state that does not allow it.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("cannot {operation} while trainer is {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },
}

/// Fatal startup configuration problems.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("tracking URI is not set (APP_URI)")]
    MissingTrackingUri,
    #[error("experiment name must not be empty")]
    MissingExperimentName,
    #[error("unsupported tracking URI: {0}")]
    UnsupportedTrackingUri(String),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Failures of the experiment tracking collaborator.
#[derive(Debug, Error)]
pub enum TrackingError {
    #[error("unknown run: {0}")]
    UnknownRun(String),
    #[error("run {0} is no longer active")]
    RunClosed(String),
    #[error("tracking store io: {0}")]
    Io(#[from] std::io::Error),
    #[error("tracking store serialization: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Canonical error type for the crate.
#[derive(Debug, Error)]
pub enum NoShowError {
    #[error("data error: {0}")]
    Data(#[from] DataError),
    #[error("fit error: {0}")]
    Fit(#[from] FitError),
    #[error("state error: {0}")]
    State(#[from] StateError),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("tracking error: {0}")]
    Tracking(#[from] TrackingError),
}

/// Result alias used throughout the crate.
pub type NoShowResult<T> = Result<T, NoShowError>;

impl NoShowError {
    /// Machine readable code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            NoShowError::Data(_) => ErrorCode::Data,
            NoShowError::Fit(_) => ErrorCode::Fit,
            NoShowError::State(_) => ErrorCode::State,
            NoShowError::Config(_) => ErrorCode::Config,
            NoShowError::Tracking(_) => ErrorCode::Tracking,
        }
    }
}

impl DataError {
    pub fn read(path: impl Into<String>, message: impl ToString) -> Self {
        DataError::Read {
            path: path.into(),
            message: message.to_string(),
        }
    }
}

impl StateError {
    pub fn invalid(operation: &'static str, state: &'static str) -> Self {
        StateError::InvalidState { operation, state }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(ErrorCode::Ok as u32, 0);
        assert_eq!(ErrorCode::Data as u32, 2);
        assert_eq!(ErrorCode::Fit as u32, 3);
        assert_eq!(ErrorCode::State as u32, 4);
        assert_eq!(ErrorCode::Config as u32, 5);
        assert_eq!(ErrorCode::Tracking as u32, 6);
    }

    #[test]
    fn family_maps_to_code() {
        let err: NoShowError = DataError::UnknownColumn("Age".into()).into();
        assert_eq!(err.code(), ErrorCode::Data);
        let err: NoShowError = StateError::invalid("fit", "Done").into();
        assert_eq!(err.code(), ErrorCode::State);
        assert_eq!(err.to_string(), "state error: cannot fit while trainer is Done");
        let err: NoShowError = ConfigError::MissingTrackingUri.into();
        assert_eq!(err.code(), ErrorCode::Config);
    }
}
