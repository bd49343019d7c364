//! Data domain: loading and sampling of raw appointment records.

pub mod domain;
pub mod repo_fs;
pub mod service;

pub use domain::{ColumnDecl, ColumnRole, RawRecord, RawSchema, RawTable, RecordSource};
pub use repo_fs::FsRecordSource;
pub use service::RecordSampler;
