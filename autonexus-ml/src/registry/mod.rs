//! Model registry contract: versions, annotations and aliases.
//!
//! The registry itself is an external service; this module only defines the
//! requests this pipeline issues against it.

pub mod mlflow;

use crate::error::MlError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One immutable version of a registered model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelVersion {
    pub name: String,
    pub version: u64,
    pub source: String,
    pub run_id: Option<String>,
    pub description: Option<String>,
    pub tags: BTreeMap<String, String>,
    pub aliases: Vec<String>,
    /// Registration status (`READY`, `PENDING_REGISTRATION`,
    /// `FAILED_REGISTRATION`); absent when the server does not report one.
    pub status: Option<String>,
}

/// Status of a version whose artifacts are in place.
pub const STATUS_READY: &str = "READY";
/// Status of a version whose artifact copy failed.
pub const STATUS_FAILED: &str = "FAILED_REGISTRATION";

impl ModelVersion {
    pub fn is_ready(&self) -> bool {
        self.status.as_deref().is_none_or(|s| s == STATUS_READY)
    }

    pub fn is_failed(&self) -> bool {
        self.status.as_deref() == Some(STATUS_FAILED)
    }
}

/// Requests the pipeline issues against a model registry.
#[async_trait]
pub trait ModelRegistry: Send + Sync {
    /// Create the registered model entry. An existing entry is not an error.
    async fn create_registered_model(&self, name: &str) -> Result<(), MlError>;

    /// Create the next version of `name` pointing at `source`.
    async fn create_model_version(
        &self,
        name: &str,
        source: &str,
        run_id: Option<&str>,
    ) -> Result<ModelVersion, MlError>;

    async fn get_model_version(&self, name: &str, version: u64) -> Result<ModelVersion, MlError>;

    async fn update_model_version(
        &self,
        name: &str,
        version: u64,
        description: &str,
    ) -> Result<ModelVersion, MlError>;

    async fn set_model_version_tag(
        &self,
        name: &str,
        version: u64,
        key: &str,
        value: &str,
    ) -> Result<(), MlError>;

    /// Bind `alias` to `version`, replacing any previous binding.
    async fn set_registered_model_alias(
        &self,
        name: &str,
        alias: &str,
        version: u64,
    ) -> Result<(), MlError>;

    async fn get_model_version_by_alias(
        &self,
        name: &str,
        alias: &str,
    ) -> Result<ModelVersion, MlError>;

    /// Artifact root of a tracking run, used to resolve `runs:/` URIs.
    async fn run_artifact_uri(&self, run_id: &str) -> Result<String, MlError>;
}

/// A parsed `runs:/<run_id>/<path>` model URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunsUri<'a> {
    pub run_id: &'a str,
    pub artifact_path: &'a str,
}

/// Parse a `runs:/` URI; other schemes yield `None`.
pub fn parse_runs_uri(uri: &str) -> Option<RunsUri<'_>> {
    let rest = uri.strip_prefix("runs:/")?;
    let rest = rest.trim_start_matches('/');
    let (run_id, artifact_path) = rest.split_once('/').unwrap_or((rest, ""));
    if run_id.is_empty() {
        return None;
    }
    Some(RunsUri {
        run_id,
        artifact_path: artifact_path.trim_matches('/'),
    })
}

/// Turn a model URI into the storage location handed to the registry.
pub async fn resolve_model_source(
    registry: &dyn ModelRegistry,
    model_uri: &str,
) -> Result<String, MlError> {
    let Some(runs) = parse_runs_uri(model_uri) else {
        return Ok(model_uri.to_string());
    };
    let root = registry.run_artifact_uri(runs.run_id).await?;
    let root = root.trim_end_matches('/');
    if runs.artifact_path.is_empty() {
        Ok(root.to_string())
    } else {
        Ok(format!("{root}/{}", runs.artifact_path))
    }
}
