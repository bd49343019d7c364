// lib.rs - appointment no-show training pipeline
pub mod common;
pub mod data;
pub mod evaluation;
pub mod features;
pub mod preprocessing;
pub mod tracking;
pub mod training;

pub use common::error::{ErrorCode, NoShowError, NoShowResult};
pub use training::{run, RunReport};
