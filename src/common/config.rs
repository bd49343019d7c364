//! Runtime configuration loaded from the process environment.
//!
//! Built once at startup and passed by reference into the run orchestrator.
//! A `.env` file, when present, is read into the environment first without
//! overriding variables that are already set. Layers, lowest priority first: built-in defaults, `APP_URI` for the
//! tracking server, then `NOSHOW__`-prefixed variables where `__` separates
//! nested keys (`NOSHOW__FOREST__N_ESTIMATORS=200`).

use std::path::PathBuf;

use figment::providers::{Env, Serialized};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::common::error::ConfigError;
use crate::training::RandomForestParams;

/// Environment variable holding the tracking server URI.
pub const TRACKING_URI_ENV: &str = "APP_URI";

/// Experiment used when none is configured.
pub const DEFAULT_EXPERIMENT_NAME: &str = "doctor-cancellation-detector";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CfgLayer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tracking_uri: Option<String>,
    experiment_name: String,
    data_path: PathBuf,
    sample_size: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sample_seed: Option<u64>,
    test_size: f64,
    split_seed: u64,
    forest: RandomForestParams,
}

impl Default for CfgLayer {
    fn default() -> Self {
        Self {
            tracking_uri: None,
            experiment_name: DEFAULT_EXPERIMENT_NAME.to_string(),
            data_path: PathBuf::from("./data/rawdata.zip"),
            sample_size: 20_000,
            sample_seed: None,
            test_size: 0.2,
            split_seed: 42,
            forest: RandomForestParams::default(),
        }
    }
}

/// Snapshot of configuration values consumed by a run.
#[derive(Clone, Debug)]
pub struct AppCfg {
    pub tracking_uri: String,
    pub experiment_name: String,
    pub data_path: PathBuf,
    pub sample_size: usize,
    /// `None` keeps sampling unseeded.
    pub sample_seed: Option<u64>,
    pub test_size: f64,
    pub split_seed: u64,
    pub forest: RandomForestParams,
}

/// Read `.env` from the working directory or its parents into the process
/// environment. Returns the file read, or `None` when there is none.
pub fn load_dotenv() -> Result<Option<PathBuf>, ConfigError> {
    match dotenvy::dotenv() {
        Ok(path) => Ok(Some(path)),
        Err(e) if e.not_found() => Ok(None),
        Err(e) => Err(ConfigError::Invalid(format!(".env: {e}"))),
    }
}

/// Where the experiment tracker persists runs.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TrackingTarget {
    /// Local directory store (`file:` URIs or bare paths).
    Directory(PathBuf),
    /// Process-local store, discarded on exit.
    Memory,
}

impl AppCfg {
    /// Built-in defaults as a figment layer, the base for [`AppCfg::load`].
    pub fn defaults() -> Figment {
        Figment::from(Serialized::defaults(CfgLayer::default()))
    }

    /// Create a configuration snapshot from the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        let figment = Self::defaults()
            .merge(
                Env::raw()
                    .only(&[TRACKING_URI_ENV])
                    .map(|_| "tracking_uri".into()),
            )
            .merge(Env::prefixed("NOSHOW__").map(|p| p.as_str().replace("__", ".").into()));
        Self::from_figment(figment)
    }

    /// Extract and validate a configuration from an arbitrary figment.
    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let layer: CfgLayer = figment
            .extract()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        let tracking_uri = layer
            .tracking_uri
            .filter(|uri| !uri.trim().is_empty())
            .ok_or(ConfigError::MissingTrackingUri)?;
        if layer.experiment_name.trim().is_empty() {
            return Err(ConfigError::MissingExperimentName);
        }

        Ok(Self {
            tracking_uri,
            experiment_name: layer.experiment_name,
            data_path: layer.data_path,
            sample_size: layer.sample_size,
            sample_seed: layer.sample_seed,
            test_size: layer.test_size,
            split_seed: layer.split_seed,
            forest: layer.forest,
        })
    }

    /// Resolve the tracking URI into a concrete store.
    pub fn tracking_target(&self) -> Result<TrackingTarget, ConfigError> {
        parse_tracking_uri(&self.tracking_uri)
    }
}

fn parse_tracking_uri(uri: &str) -> Result<TrackingTarget, ConfigError> {
    let uri = uri.trim();
    if uri == "memory:" || uri == "memory://" {
        return Ok(TrackingTarget::Memory);
    }
    if let Some(rest) = uri.strip_prefix("file://") {
        return Ok(TrackingTarget::Directory(PathBuf::from(rest)));
    }
    if let Some(rest) = uri.strip_prefix("file:") {
        return Ok(TrackingTarget::Directory(PathBuf::from(rest)));
    }
    match uri.split_once("://") {
        Some(_) => Err(ConfigError::UnsupportedTrackingUri(uri.to_string())),
        None => Ok(TrackingTarget::Directory(PathBuf::from(uri))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn defaults_need_a_tracking_uri() {
        let err = AppCfg::from_figment(AppCfg::defaults()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingTrackingUri));
    }

    #[test]
    fn blank_tracking_uri_is_missing() {
        let figment = AppCfg::defaults().merge(("tracking_uri", "  "));
        let err = AppCfg::from_figment(figment).unwrap_err();
        assert!(matches!(err, ConfigError::MissingTrackingUri));
    }

    #[test]
    fn defaults_follow_the_reference_run() {
        let figment = AppCfg::defaults().merge(("tracking_uri", "memory:"));
        let cfg = AppCfg::from_figment(figment).unwrap();
        assert_eq!(cfg.experiment_name, DEFAULT_EXPERIMENT_NAME);
        assert_eq!(cfg.sample_size, 20_000);
        assert_eq!(cfg.sample_seed, None);
        assert_eq!(cfg.forest.n_estimators, 100);
        assert_eq!(cfg.forest.max_depth, Some(64));
        assert_eq!(cfg.forest.min_samples_split, 4);
        assert_eq!(cfg.forest.random_state, Some(42));
        assert_eq!(cfg.forest.n_jobs, -1);
        assert_eq!(cfg.tracking_target().unwrap(), TrackingTarget::Memory);
    }

    #[test]
    fn nested_overrides_apply() {
        let figment = AppCfg::defaults()
            .merge(("tracking_uri", "file:///tmp/mlruns"))
            .merge(("forest.n_estimators", 7))
            .merge(("sample_seed", 9));
        let cfg = AppCfg::from_figment(figment).unwrap();
        assert_eq!(cfg.forest.n_estimators, 7);
        assert_eq!(cfg.sample_seed, Some(9));
        assert_eq!(
            cfg.tracking_target().unwrap(),
            TrackingTarget::Directory(PathBuf::from("/tmp/mlruns"))
        );
    }

    #[test]
    fn empty_experiment_name_is_rejected() {
        let figment = AppCfg::defaults()
            .merge(("tracking_uri", "memory:"))
            .merge(("experiment_name", ""));
        let err = AppCfg::from_figment(figment).unwrap_err();
        assert!(matches!(err, ConfigError::MissingExperimentName));
    }

    #[test]
    fn tracking_uri_schemes() {
        assert_eq!(
            parse_tracking_uri("file:mlruns").unwrap(),
            TrackingTarget::Directory(PathBuf::from("mlruns"))
        );
        assert_eq!(
            parse_tracking_uri("./mlruns").unwrap(),
            TrackingTarget::Directory(PathBuf::from("./mlruns"))
        );
        assert!(matches!(
            parse_tracking_uri("http://localhost:5000"),
            Err(ConfigError::UnsupportedTrackingUri(_))
        ));
    }

    #[test]
    fn load_reads_app_uri_and_prefixed_variables() {
        Jail::expect_with(|jail| {
            jail.clear_env();
            jail.set_env(TRACKING_URI_ENV, "file:///tmp/noshow-mlruns");
            jail.set_env("NOSHOW__FOREST__N_ESTIMATORS", "7");
            jail.set_env("NOSHOW__FOREST__MIN_SAMPLES_SPLIT", "3");
            jail.set_env("NOSHOW__SAMPLE_SEED", "5");
            jail.set_env("NOSHOW__EXPERIMENT_NAME", "nightly");

            let cfg = AppCfg::load().map_err(|e| e.to_string())?;
            assert_eq!(cfg.tracking_uri, "file:///tmp/noshow-mlruns");
            assert_eq!(cfg.forest.n_estimators, 7);
            assert_eq!(cfg.forest.min_samples_split, 3);
            assert_eq!(cfg.forest.max_depth, Some(64));
            assert_eq!(cfg.sample_seed, Some(5));
            assert_eq!(cfg.experiment_name, "nightly");
            Ok(())
        });
    }

    #[test]
    fn load_without_app_uri_fails() {
        Jail::expect_with(|jail| {
            jail.clear_env();
            let err = AppCfg::load().unwrap_err();
            assert!(matches!(err, ConfigError::MissingTrackingUri));
            Ok(())
        });
    }

    #[test]
    fn dotenv_supplies_app_uri() {
        Jail::expect_with(|jail| {
            jail.clear_env();
            jail.create_file(".env", "APP_URI=memory:\nNOSHOW__SAMPLE_SIZE=500\n")?;
            let loaded = load_dotenv().map_err(|e| e.to_string())?;
            let cfg = AppCfg::load();
            std::env::remove_var(TRACKING_URI_ENV);
            std::env::remove_var("NOSHOW__SAMPLE_SIZE");

            assert!(loaded.is_some_and(|p| p.ends_with(".env")));
            let cfg = cfg.map_err(|e| e.to_string())?;
            assert_eq!(cfg.tracking_target().unwrap(), TrackingTarget::Memory);
            assert_eq!(cfg.sample_size, 500);
            Ok(())
        });
    }

    #[test]
    fn dotenv_does_not_override_the_environment() {
        Jail::expect_with(|jail| {
            jail.clear_env();
            jail.set_env(TRACKING_URI_ENV, "file:mlruns");
            jail.create_file(".env", "APP_URI=memory:\n")?;
            load_dotenv().map_err(|e| e.to_string())?;

            let cfg = AppCfg::load().map_err(|e| e.to_string())?;
            assert_eq!(
                cfg.tracking_target().unwrap(),
                TrackingTarget::Directory(PathBuf::from("mlruns"))
            );
            Ok(())
        });
    }
}
