//! Column-wise preprocessing: standard scaling and one-hot encoding.
//!
//! [`Preprocessor`] only declares treatments. The learned parameters live in
//! [`FittedColumnTransformer`], produced when the composed pipeline is fit on
//! the training partition.

pub mod domain;
pub mod service;

pub use domain::{ColumnTransformer, FittedColumn, FittedColumnTransformer, Treatment};
pub use service::Preprocessor;
