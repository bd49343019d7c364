//! Filesystem store for experiments, runs and registered models.
//!
//! Layout under the root:
//!
//! ```text
//! <exp_id>/meta.json
//! <exp_id>/<run_id>/meta.json
//! <exp_id>/<run_id>/params/<name>
//! <exp_id>/<run_id>/metrics/<name>          "<ts_ms> <value> 0" per line
//! <exp_id>/<run_id>/artifacts/<artifact>/model.json
//! <exp_id>/<run_id>/artifacts/<artifact>/signature.json
//! models/<registry>/version-<n>/meta.json
//! ```

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::common::error::TrackingError;
use crate::common::ids::{ExperimentId, Fingerprint, RunId};
use crate::common::time;
use crate::training::pipeline::FittedPipeline;

use super::domain::{
    ExperimentTracker, ModelSignature, ModelVersion, RunHandle, RunStatus, TrackingResult,
};

const META: &str = "meta.json";
const REGISTRY_DIR: &str = "models";

#[derive(Debug, Serialize, Deserialize)]
struct ExperimentMeta {
    experiment_id: ExperimentId,
    name: String,
    created_ms: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RunMeta {
    pub run_id: RunId,
    pub experiment_id: ExperimentId,
    pub status: RunStatus,
    pub start_ms: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_ms: Option<i64>,
}

/// Persist tracking data on the local filesystem.
pub struct FsTracker {
    root: PathBuf,
    autolog: bool,
    active: HashMap<RunId, RunMeta>,
}

impl FsTracker {
    pub fn new(root: impl Into<PathBuf>) -> TrackingResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            autolog: false,
            active: HashMap::new(),
        })
    }

    fn run_dir(&self, run: &RunHandle) -> PathBuf {
        self.root
            .join(run.experiment_id.as_str())
            .join(run.run_id.as_str())
    }

    fn artifact_dir(&self, run: &RunHandle, artifact_name: &str) -> PathBuf {
        self.run_dir(run).join("artifacts").join(artifact_name)
    }

    fn ensure_active(&self, run: &RunHandle) -> TrackingResult<()> {
        if self.active.contains_key(&run.run_id) {
            Ok(())
        } else if self.run_dir(run).join(META).is_file() {
            Err(TrackingError::RunClosed(run.run_id.to_string()))
        } else {
            Err(TrackingError::UnknownRun(run.run_id.to_string()))
        }
    }

    fn write_param(&self, run: &RunHandle, name: &str, value: &str) -> TrackingResult<()> {
        let dir = self.run_dir(run).join("params");
        fs::create_dir_all(&dir)?;
        write_file(&dir.join(name), value.as_bytes())?;
        Ok(())
    }

    /// Write the artifact then its registry entry; the caller removes the
    /// artifact if either step fails.
    fn store_model(
        &self,
        run: &RunHandle,
        artifact_name: &str,
        payload: &str,
        registry_name: &str,
        signature: &ModelSignature,
    ) -> TrackingResult<ModelVersion> {
        let artifact_dir = self.artifact_dir(run, artifact_name);
        fs::create_dir_all(&artifact_dir)?;
        write_file(&artifact_dir.join("model.json"), payload.as_bytes())?;
        write_json(&artifact_dir.join("signature.json"), signature)?;

        let version = self
            .versions(registry_name)?
            .last()
            .map_or(1, |v| v.version + 1);
        let model_version = ModelVersion {
            registry_name: registry_name.to_string(),
            version,
            run_id: run.run_id.clone(),
            artifact_path: format!(
                "{}/{}/artifacts/{}",
                run.experiment_id, run.run_id, artifact_name
            ),
            checksum: Fingerprint::of(payload.as_bytes()).finish_hex(),
        };
        let version_dir = self
            .root
            .join(REGISTRY_DIR)
            .join(registry_name)
            .join(format!("version-{version}"));
        fs::create_dir_all(&version_dir)?;
        write_json(&version_dir.join(META), &model_version)?;
        Ok(model_version)
    }

    /// Load the run metadata as last persisted.
    pub fn read_run(&self, run: &RunHandle) -> TrackingResult<RunMeta> {
        read_json(&self.run_dir(run).join(META))
    }

    /// Load the model artifact logged under `artifact_name`.
    pub fn load_model(
        &self,
        run: &RunHandle,
        artifact_name: &str,
    ) -> TrackingResult<FittedPipeline> {
        let path = self.artifact_dir(run, artifact_name).join("model.json");
        let raw = fs::read_to_string(path)?;
        Ok(FittedPipeline::from_json(&raw)?)
    }

    /// Versions registered under `registry_name`, oldest first.
    pub fn versions(&self, registry_name: &str) -> TrackingResult<Vec<ModelVersion>> {
        let dir = self.root.join(REGISTRY_DIR).join(registry_name);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut versions: Vec<ModelVersion> = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path().join(META);
            if path.is_file() {
                versions.push(read_json(&path)?);
            }
        }
        versions.sort_by_key(|v| v.version);
        Ok(versions)
    }
}

impl ExperimentTracker for FsTracker {
    fn get_or_create_experiment(&mut self, name: &str) -> TrackingResult<ExperimentId> {
        let mut next_id = 0u64;
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let Some(id) = entry.file_name().to_str().and_then(|s| s.parse::<u64>().ok()) else {
                continue;
            };
            let meta_path = entry.path().join(META);
            if !meta_path.is_file() {
                continue;
            }
            let meta: ExperimentMeta = read_json(&meta_path)?;
            if meta.name == name {
                return Ok(meta.experiment_id);
            }
            next_id = next_id.max(id + 1);
        }

        let experiment_id = ExperimentId::new(next_id.to_string());
        let dir = self.root.join(experiment_id.as_str());
        fs::create_dir_all(&dir)?;
        write_json(
            &dir.join(META),
            &ExperimentMeta {
                experiment_id: experiment_id.clone(),
                name: name.to_string(),
                created_ms: time::now_ms(),
            },
        )?;
        info!("created experiment {name} with id {experiment_id}");
        Ok(experiment_id)
    }

    fn set_autolog(&mut self, enabled: bool) {
        self.autolog = enabled;
    }

    fn begin_run(&mut self, experiment: &ExperimentId) -> TrackingResult<RunHandle> {
        let exp_meta = self.root.join(experiment.as_str()).join(META);
        if !exp_meta.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("experiment {experiment} does not exist"),
            )
            .into());
        }
        let run = RunHandle {
            run_id: RunId::generate(),
            experiment_id: experiment.clone(),
        };
        let dir = self.run_dir(&run);
        fs::create_dir_all(dir.join("params"))?;
        fs::create_dir_all(dir.join("metrics"))?;
        let meta = RunMeta {
            run_id: run.run_id.clone(),
            experiment_id: experiment.clone(),
            status: RunStatus::Running,
            start_ms: time::now_ms(),
            end_ms: None,
        };
        write_json(&dir.join(META), &meta)?;
        self.active.insert(run.run_id.clone(), meta);
        info!("started run {} in experiment {}", run.run_id, experiment);
        Ok(run)
    }

    fn log_param(&mut self, run: &RunHandle, name: &str, value: &str) -> TrackingResult<()> {
        self.ensure_active(run)?;
        self.write_param(run, name, value)
    }

    fn log_metric(&mut self, run: &RunHandle, name: &str, value: f64) -> TrackingResult<()> {
        self.ensure_active(run)?;
        let path = self.run_dir(run).join("metrics").join(name);
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{} {} 0", time::now_ms(), value)?;
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
        self.ensure_active(run)?;
        if self.autolog {
            for (name, value) in model.params() {
                self.write_param(run, &name, &value)?;
            }
        }

        let payload = model.to_json()?;
        let stored = self.store_model(run, artifact_name, &payload, registry_name, signature);
        let artifact_dir = self.artifact_dir(run, artifact_name);
        if stored.is_err() && artifact_dir.exists() {
            if let Err(e) = fs::remove_dir_all(&artifact_dir) {
                warn!("could not remove partial artifact {}: {e}", artifact_dir.display());
            }
        }
        let model_version = stored?;
        info!(
            "registered {registry_name} version {} ({} bytes, checksum {})",
            model_version.version,
            payload.len(),
            model_version.checksum
        );
        Ok(model_version)
    }

    fn end_run(&mut self, run: &RunHandle, status: RunStatus) -> TrackingResult<()> {
        self.ensure_active(run)?;
        let Some(mut meta) = self.active.remove(&run.run_id) else {
            return Err(TrackingError::UnknownRun(run.run_id.to_string()));
        };
        meta.status = status;
        meta.end_ms = Some(time::now_ms());
        write_json(&self.run_dir(run).join(META), &meta)?;
        debug!("run {} ended as {:?}", run.run_id, status);
        Ok(())
    }
}

fn write_file(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)?;
    file.write_all(bytes)
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> TrackingResult<()> {
    write_file(path, serde_json::to_string_pretty(value)?.as_bytes())?;
    Ok(())
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> TrackingResult<T> {
    let raw = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}
