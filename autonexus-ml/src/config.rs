//! Pipeline configuration.
//!
//! Uses `figment` for layered configuration: defaults -> `autonexus.toml` (or an
//! explicit file) -> `AUTONEXUS_` environment variables. Nested keys in the
//! environment use `__`, e.g. `AUTONEXUS_TRACKING__TRACKING_URI`.

use crate::error::MlError;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default configuration file name, looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "autonexus.toml";

/// Top-level configuration shared by the three pipeline executables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Filesystem locations read and written by the evaluator.
    #[serde(default)]
    pub paths: PathsConfig,
    /// Dataset parsing options.
    #[serde(default)]
    pub data: DataConfig,
    /// Remote tracking server options.
    #[serde(default)]
    pub tracking: TrackingConfig,
    /// Model registration options.
    #[serde(default)]
    pub registry: RegistryConfig,
    /// Alias assignment options.
    #[serde(default)]
    pub stage: StageConfig,
}

/// Filesystem paths used by the evaluator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_model_path")]
    pub model: PathBuf,
    #[serde(default = "default_data_path")]
    pub data: PathBuf,
    #[serde(default = "default_metrics_path")]
    pub metrics: PathBuf,
    #[serde(default = "default_params_path")]
    pub params: PathBuf,
    /// Plain-text log file receiving every debug/error line.
    #[serde(default = "default_log_path")]
    pub log_file: PathBuf,
    /// SQLite database backing the local experiment store.
    #[serde(default = "default_local_store_path")]
    pub local_store: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            model: default_model_path(),
            data: default_data_path(),
            metrics: default_metrics_path(),
            params: default_params_path(),
            log_file: default_log_path(),
            local_store: default_local_store_path(),
        }
    }
}

fn default_model_path() -> PathBuf {
    PathBuf::from("models/model.json")
}

fn default_data_path() -> PathBuf {
    PathBuf::from("data/processed/test_processed.csv")
}

fn default_metrics_path() -> PathBuf {
    PathBuf::from("reports/metrics.json")
}

fn default_params_path() -> PathBuf {
    PathBuf::from("params.yaml")
}

fn default_log_path() -> PathBuf {
    PathBuf::from("reports/errors.log")
}

fn default_local_store_path() -> PathBuf {
    PathBuf::from("reports/experiments.db")
}

/// Dataset parsing options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Name of the column holding the regression target.
    #[serde(default = "default_target_column")]
    pub target_column: String,
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            target_column: default_target_column(),
            delimiter: default_delimiter(),
        }
    }
}

fn default_target_column() -> String {
    "Price".to_string()
}

fn default_delimiter() -> char {
    ','
}

/// Remote tracking server options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// Base URL of the MLflow-compatible tracking server.
    #[serde(default = "default_tracking_uri")]
    pub tracking_uri: String,
    /// Experiment that evaluation runs are logged under (created if missing).
    #[serde(default = "default_experiment_name")]
    pub experiment_name: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            tracking_uri: default_tracking_uri(),
            experiment_name: default_experiment_name(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_tracking_uri() -> String {
    "http://localhost:5000".to_string()
}

fn default_experiment_name() -> String {
    "Default".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

/// Model registration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Registered model name.
    #[serde(default = "default_model_name")]
    pub model_name: String,
    /// Completed training run whose artifact is registered.
    #[serde(default = "default_run_id")]
    pub run_id: String,
    /// Artifact path inside the run, used to build `runs:/<run_id>/<path>`.
    #[serde(default = "default_artifact_path")]
    pub artifact_path: String,
    /// Explicit artifact URI; when set it replaces the `runs:/` form.
    #[serde(default)]
    pub artifact_uri: Option<String>,
    #[serde(default = "default_description")]
    pub description: String,
    #[serde(default = "default_tag_key")]
    pub tag_key: String,
    #[serde(default = "default_tag_value")]
    pub tag_value: String,
    /// How long to wait for a new version to leave `PENDING_REGISTRATION`.
    #[serde(default = "default_await_ready_secs")]
    pub await_ready_secs: u64,
    #[serde(default = "default_ready_poll_interval_ms")]
    pub ready_poll_interval_ms: u64,
}

impl RegistryConfig {
    /// The model source handed to the registry.
    pub fn model_uri(&self) -> String {
        match &self.artifact_uri {
            Some(uri) => uri.clone(),
            None => format!(
                "runs:/{}/{}",
                self.run_id,
                self.artifact_path.trim_start_matches('/')
            ),
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            model_name: default_model_name(),
            run_id: default_run_id(),
            artifact_path: default_artifact_path(),
            artifact_uri: None,
            description: default_description(),
            tag_key: default_tag_key(),
            tag_value: default_tag_value(),
            await_ready_secs: default_await_ready_secs(),
            ready_poll_interval_ms: default_ready_poll_interval_ms(),
        }
    }
}

fn default_model_name() -> String {
    "cars".to_string()
}

fn default_run_id() -> String {
    "cfde94cb78604aa4a6778fcfd1a96d71".to_string()
}

fn default_artifact_path() -> String {
    "best_model".to_string()
}

fn default_description() -> String {
    "a new model version added via code".to_string()
}

fn default_tag_key() -> String {
    "model".to_string()
}

fn default_tag_value() -> String {
    "price prediction model".to_string()
}

fn default_await_ready_secs() -> u64 {
    300
}

fn default_ready_poll_interval_ms() -> u64 {
    1000
}

/// Alias assignment options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageConfig {
    #[serde(default = "default_alias")]
    pub alias: String,
    #[serde(default = "default_stage_version")]
    pub version: u64,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            alias: default_alias(),
            version: default_stage_version(),
        }
    }
}

fn default_alias() -> String {
    "champion".to_string()
}

fn default_stage_version() -> u64 {
    3
}

/// Load the pipeline configuration.
///
/// An explicit `config_file` must exist; otherwise `autonexus.toml` in the
/// current directory is merged when present.
pub fn load_config(config_file: Option<&Path>) -> Result<PipelineConfig, MlError> {
    let mut figment = Figment::from(Serialized::defaults(PipelineConfig::default()));

    match config_file {
        Some(path) => {
            if !path.exists() {
                return Err(MlError::not_found(path.display().to_string()));
            }
            figment = figment.merge(Toml::file(path));
        }
        None => {
            let local = Path::new(CONFIG_FILE_NAME);
            if local.exists() {
                figment = figment.merge(Toml::file(local));
            }
        }
    }

    figment = figment.merge(Env::prefixed("AUTONEXUS_").split("__"));

    figment
        .extract()
        .map_err(|e| MlError::config(e.to_string()))
}
