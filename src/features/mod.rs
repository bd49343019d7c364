//! Feature engineering: raw appointment rows to model features and labels.

pub mod domain;
pub mod service;

pub use domain::{Cell, Column, ColumnData, FeatureTable, Label};
pub use service::FeatureBuilder;
