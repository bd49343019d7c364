//! Model training: estimator, pipeline composition, trainer and run orchestration.

pub mod domain;
pub mod forest;
pub mod pipeline;
pub mod service;
pub mod trainer;

pub use domain::{RandomForestParams, TrainerState};
pub use forest::RandomForestClassifier;
pub use pipeline::{
    EstimatorSpec, FittedPipeline, PipelineBuilder, PipelineSpec, TransformSpec,
    CLASSIFIER_STAGE, PREPROCESSING_STAGE,
};
pub use service::{publish, run, train, RunReport, TrainedModel, REGISTRY_NAME};
pub use trainer::{DataSplit, Trainer};
