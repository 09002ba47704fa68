//! End-to-end pipeline steps behind the three executables.

use crate::config::{PipelineConfig, RegistryConfig};
use crate::data::{CsvSource, load_data_with};
use crate::error::MlError;
use crate::eval::evaluate;
use crate::model::load_model;
use crate::registry::{ModelRegistry, ModelVersion, resolve_model_source};
use crate::tracking::{
    LocalTracker, RemoteTracker, track_experiment_local, track_experiment_remote,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What a completed evaluation produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationOutcome {
    pub mae: f64,
    pub local_run_id: String,
    pub remote_run_id: String,
}

/// Load model and data, evaluate, then track locally and remotely.
///
/// Steps run strictly in order and the first failure aborts the rest. A
/// remote failure after the local run committed leaves the local run in
/// place; the error says so.
pub async fn run_evaluation(
    config: &PipelineConfig,
    local: &LocalTracker,
    remote: &RemoteTracker,
) -> Result<EvaluationOutcome, MlError> {
    let paths = &config.paths;

    let model = load_model(&paths.model)?;
    let source = CsvSource::new(&paths.data, &config.data.target_column)
        .with_delimiter(config.data.delimiter);
    let dataset = load_data_with(&source)?;
    let mae = evaluate(&dataset.features, &dataset.target, &model, &paths.metrics)?;

    let local_run_id = track_experiment_local(local, &paths.params, mae).await?;
    let remote_run_id = track_experiment_remote(remote, &paths.params, mae)
        .await
        .inspect_err(|_| {
            tracing::error!(
                local_run_id = %local_run_id,
                "remote tracking failed after the local run was committed; stores are out of sync"
            );
        })?;

    tracing::debug!(mae, "evaluation pipeline executed");
    Ok(EvaluationOutcome {
        mae,
        local_run_id,
        remote_run_id,
    })
}

/// Register the configured run artifact as a new model version, wait for it
/// to become `READY`, then annotate it with the configured description and
/// tag.
///
/// Not transactional: if annotation fails the new version stays registered.
pub async fn register_model(
    config: &PipelineConfig,
    registry: &dyn ModelRegistry,
) -> Result<ModelVersion, MlError> {
    let reg = &config.registry;
    let model_uri = reg.model_uri();
    let source = resolve_model_source(registry, &model_uri).await?;

    registry.create_registered_model(&reg.model_name).await?;
    let created = registry
        .create_model_version(&reg.model_name, &source, Some(reg.run_id.as_str()))
        .await?;
    tracing::info!(
        model = %reg.model_name,
        version = created.version,
        source = %source,
        "model version registered"
    );
    let created = await_ready(registry, created, reg).await?;

    let annotated = async {
        let updated = registry
            .update_model_version(&reg.model_name, created.version, &reg.description)
            .await?;
        registry
            .set_model_version_tag(&reg.model_name, created.version, &reg.tag_key, &reg.tag_value)
            .await?;
        Ok::<_, MlError>(updated)
    }
    .await;

    match annotated {
        Ok(mut version) => {
            version
                .tags
                .insert(reg.tag_key.clone(), reg.tag_value.clone());
            Ok(version)
        }
        Err(e) => {
            tracing::error!(
                model = %reg.model_name,
                version = created.version,
                "version registered but annotation failed: {e}"
            );
            Err(e)
        }
    }
}

/// Poll the registry until `version` leaves `PENDING_REGISTRATION`, bounded by
/// `await_ready_secs`.
async fn await_ready(
    registry: &dyn ModelRegistry,
    mut version: ModelVersion,
    reg: &RegistryConfig,
) -> Result<ModelVersion, MlError> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(reg.await_ready_secs);
    let interval = Duration::from_millis(reg.ready_poll_interval_ms);

    loop {
        if version.is_ready() {
            return Ok(version);
        }
        if version.is_failed() {
            return Err(MlError::registry(format!(
                "model '{}' v{} failed registration",
                version.name, version.version
            )));
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(MlError::registry(format!(
                "model '{}' v{} still {} after {}s",
                version.name,
                version.version,
                version.status.as_deref().unwrap_or_default(),
                reg.await_ready_secs
            )));
        }
        tracing::debug!(
            model = %version.name,
            version = version.version,
            status = version.status.as_deref().unwrap_or_default(),
            "waiting for model version to become ready"
        );
        tokio::time::sleep(interval).await;
        version = registry
            .get_model_version(&version.name, version.version)
            .await?;
    }
}

/// Point the configured alias at the configured version.
pub async fn transition_stage(
    config: &PipelineConfig,
    registry: &dyn ModelRegistry,
) -> Result<(), MlError> {
    let stage = &config.stage;
    let name = &config.registry.model_name;
    registry
        .set_registered_model_alias(name, &stage.alias, stage.version)
        .await
        .inspect_err(|e| tracing::error!(model = %name, alias = %stage.alias, "alias update failed: {e}"))?;
    tracing::info!(
        model = %name,
        alias = %stage.alias,
        version = stage.version,
        "alias updated"
    );
    Ok(())
}
