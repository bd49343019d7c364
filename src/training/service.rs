//! Run orchestration: train everything first, then publish to the tracker.
//!
//! Nothing reaches the tracker until the model is fitted, evaluated and its
//! signature built, so a failing pipeline leaves no run behind.

use std::time::Instant;

use log::{error, info};

use crate::common::config::AppCfg;
use crate::common::error::NoShowResult;
use crate::common::time::elapsed_ms;
use crate::data::domain::{RawSchema, RecordSource};
use crate::data::service::RecordSampler;
use crate::evaluation::{EvalScores, RunMetrics};
use crate::features::domain::Label;
use crate::features::service::FeatureBuilder;
use crate::preprocessing::Preprocessor;
use crate::tracking::{
    ExperimentTracker, ModelSignature, ModelVersion, RunHandle, RunStatus, TrackingResult,
};

use super::pipeline::{
    EstimatorSpec, FittedPipeline, PipelineSpec, CLASSIFIER_STAGE, PREPROCESSING_STAGE,
};
use super::trainer::Trainer;

/// Registry name the fitted pipeline is versioned under.
pub const REGISTRY_NAME: &str = "RandomForestClassifier";

/// Output of the compute phase, not yet published.
#[derive(Debug)]
pub struct TrainedModel {
    pub pipeline: FittedPipeline,
    pub scores: EvalScores,
    pub metrics: RunMetrics,
    pub signature: ModelSignature,
    pub first_prediction: Label,
}

/// What a completed run published.
#[derive(Clone, Debug)]
pub struct RunReport {
    pub run: RunHandle,
    pub scores: EvalScores,
    pub metrics: RunMetrics,
    pub signature: ModelSignature,
    pub model_version: ModelVersion,
    pub first_prediction: Label,
}

/// Train, evaluate and publish one model.
pub fn run(
    cfg: &AppCfg,
    source: &dyn RecordSource,
    tracker: &mut dyn ExperimentTracker,
) -> NoShowResult<RunReport> {
    let trained = train(cfg, source)?;
    publish(cfg, trained, tracker)
}

/// Load, sample, featurize, fit and evaluate without touching the tracker.
pub fn train(cfg: &AppCfg, source: &dyn RecordSource) -> NoShowResult<TrainedModel> {
    let started = Instant::now();
    let raw = source.load()?;
    let sample = RecordSampler::new(cfg.sample_size, cfg.sample_seed).sample(&raw)?;
    drop(raw);

    let builder = FeatureBuilder::for_table(RawSchema::appointments(), &sample)?;
    let (x, y) = builder.build(&sample)?;
    let preprocessing = Preprocessor::infer(&x).configure(&x)?;
    let spec = PipelineSpec::builder()
        .transform(PREPROCESSING_STAGE, preprocessing)
        .estimator(
            CLASSIFIER_STAGE,
            EstimatorSpec::RandomForest(cfg.forest.clone()),
        );

    let mut trainer = Trainer::new(spec, cfg.test_size, cfg.split_seed);
    trainer.split(x, y)?;
    trainer.fit()?;
    let scores = trainer.evaluate()?.clone();

    let example = trainer.test_features()?.take(&[0]);
    let example_prediction = trainer.predict(&example)?;
    let signature = ModelSignature::infer(&example, &example_prediction)?;
    let first_prediction = signature.output_example;
    let pipeline = trainer.finish()?;

    info!(
        "trained on {} sampled rows in {} ms: {}",
        cfg.sample_size,
        elapsed_ms(started),
        scores
    );
    Ok(TrainedModel {
        pipeline,
        metrics: RunMetrics {
            accuracy: scores.accuracy,
            f1: scores.f1,
            test_size: cfg.test_size,
            hyperparameters: cfg.forest.as_params(),
        },
        scores,
        signature,
        first_prediction,
    })
}

/// Record a trained model as one tracker run; a failure after the run
/// starts closes it as failed.
pub fn publish(
    cfg: &AppCfg,
    trained: TrainedModel,
    tracker: &mut dyn ExperimentTracker,
) -> NoShowResult<RunReport> {
    let TrainedModel {
        pipeline,
        scores,
        metrics,
        signature,
        first_prediction,
    } = trained;
    let experiment = tracker.get_or_create_experiment(&cfg.experiment_name)?;
    tracker.set_autolog(true);
    let run = tracker.begin_run(&experiment)?;

    match log_run(tracker, &run, pipeline, &metrics, &signature, &cfg.experiment_name) {
        Ok(model_version) => {
            tracker.end_run(&run, RunStatus::Finished)?;
            info!(
                "run {} finished: {} version {}",
                run.run_id, model_version.registry_name, model_version.version
            );
            Ok(RunReport {
                run,
                scores,
                metrics,
                signature,
                model_version,
                first_prediction,
            })
        }
        Err(err) => {
            error!("run {} failed: {err}", run.run_id);
            if let Err(end_err) = tracker.end_run(&run, RunStatus::Failed) {
                error!("could not close run {}: {end_err}", run.run_id);
            }
            Err(err.into())
        }
    }
}

fn log_run(
    tracker: &mut dyn ExperimentTracker,
    run: &RunHandle,
    pipeline: FittedPipeline,
    metrics: &RunMetrics,
    signature: &ModelSignature,
    artifact_name: &str,
) -> TrackingResult<ModelVersion> {
    for (name, value) in &metrics.hyperparameters {
        tracker.log_param(run, name, value)?;
    }
    tracker.log_metric(run, "test_accuracy_score", metrics.accuracy)?;
    tracker.log_metric(run, "test_f1_score", metrics.f1)?;
    tracker.log_param(run, "test_size", &metrics.test_size.to_string())?;
    tracker.log_model(run, pipeline, artifact_name, REGISTRY_NAME, signature)
}
