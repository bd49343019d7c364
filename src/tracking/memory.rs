//! Process-local tracker for tests and dry runs.

use std::collections::BTreeMap;

use log::debug;

use crate::common::error::TrackingError;
use crate::common::ids::{ExperimentId, Fingerprint, RunId};
use crate::training::pipeline::FittedPipeline;

use super::domain::{
    ExperimentTracker, ModelSignature, ModelVersion, RunHandle, RunStatus, TrackingResult,
};

#[derive(Clone, Debug)]
pub struct LoggedModel {
    pub artifact_name: String,
    pub pipeline: FittedPipeline,
    pub signature: ModelSignature,
    pub version: ModelVersion,
}

#[derive(Clone, Debug)]
pub struct RunRecord {
    pub experiment_id: ExperimentId,
    pub status: RunStatus,
    pub params: Vec<(String, String)>,
    pub metrics: Vec<(String, f64)>,
    pub models: Vec<LoggedModel>,
}

impl RunRecord {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .rev()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.iter().rev().find(|(k, _)| k == name).map(|(_, v)| *v)
    }
}

/// Keeps every experiment, run and registered version in memory.
#[derive(Debug, Default)]
pub struct MemoryTracker {
    experiments: Vec<String>,
    runs: BTreeMap<RunId, RunRecord>,
    registry: BTreeMap<String, Vec<ModelVersion>>,
    autolog: bool,
}

impl MemoryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn experiments(&self) -> &[String] {
        &self.experiments
    }

    pub fn runs(&self) -> impl Iterator<Item = (&RunId, &RunRecord)> {
        self.runs.iter()
    }

    pub fn run(&self, id: &RunId) -> Option<&RunRecord> {
        self.runs.get(id)
    }

    pub fn versions(&self, registry_name: &str) -> &[ModelVersion] {
        self.registry
            .get(registry_name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn autolog(&self) -> bool {
        self.autolog
    }

    fn active(&mut self, run: &RunHandle) -> TrackingResult<&mut RunRecord> {
        let record = self
            .runs
            .get_mut(&run.run_id)
            .ok_or_else(|| TrackingError::UnknownRun(run.run_id.to_string()))?;
        if record.status != RunStatus::Running {
            return Err(TrackingError::RunClosed(run.run_id.to_string()));
        }
        Ok(record)
    }
}

impl ExperimentTracker for MemoryTracker {
    fn get_or_create_experiment(&mut self, name: &str) -> TrackingResult<ExperimentId> {
        let idx = match self.experiments.iter().position(|e| e == name) {
            Some(idx) => idx,
            None => {
                self.experiments.push(name.to_string());
                self.experiments.len() - 1
            }
        };
        Ok(ExperimentId::new(idx.to_string()))
    }

    fn set_autolog(&mut self, enabled: bool) {
        self.autolog = enabled;
    }

    fn begin_run(&mut self, experiment: &ExperimentId) -> TrackingResult<RunHandle> {
        let run_id = RunId::generate();
        self.runs.insert(
            run_id.clone(),
            RunRecord {
                experiment_id: experiment.clone(),
                status: RunStatus::Running,
                params: Vec::new(),
                metrics: Vec::new(),
                models: Vec::new(),
            },
        );
        debug!("memory run {run_id} started in experiment {experiment}");
        Ok(RunHandle {
            run_id,
            experiment_id: experiment.clone(),
        })
    }

    fn log_param(&mut self, run: &RunHandle, name: &str, value: &str) -> TrackingResult<()> {
        self.active(run)?
            .params
            .push((name.to_string(), value.to_string()));
        Ok(())
    }

    fn log_metric(&mut self, run: &RunHandle, name: &str, value: f64) -> TrackingResult<()> {
        self.active(run)?.metrics.push((name.to_string(), value));
        Ok(())
    }

    fn log_model(
        &mut self,
        run: &RunHandle,
        model: FittedPipeline,
        artifact_name: &str,
        registry_name: &str,
        signature: &ModelSignature,
    ) -> TrackingResult<ModelVersion> {
        let checksum = Fingerprint::of(model.to_json()?.as_bytes()).finish_hex();
        let autolog = self.autolog;
        let version = self.versions(registry_name).len() as u32 + 1;
        let record = self.active(run)?;
        if autolog {
            record.params.extend(model.params());
        }
        let version = ModelVersion {
            registry_name: registry_name.to_string(),
            version,
            run_id: run.run_id.clone(),
            artifact_path: artifact_name.to_string(),
            checksum,
        };
        record.models.push(LoggedModel {
            artifact_name: artifact_name.to_string(),
            pipeline: model,
            signature: signature.clone(),
            version: version.clone(),
        });
        self.registry
            .entry(registry_name.to_string())
            .or_default()
            .push(version.clone());
        Ok(version)
    }

    fn end_run(&mut self, run: &RunHandle, status: RunStatus) -> TrackingResult<()> {
        self.active(run)?.status = status;
        debug!("memory run {} ended as {:?}", run.run_id, status);
        Ok(())
    }
}
