//! Model registry requests over the MLflow REST API.

use super::{ModelRegistry, ModelVersion};
use crate::error::MlError;
use crate::tracking::remote::{ApiError, Empty, MlflowClient};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
struct WireTag {
    key: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct WireModelVersion {
    name: String,
    version: String,
    #[serde(default)]
    source: String,
    #[serde(default)]
    run_id: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    tags: Vec<WireTag>,
    #[serde(default)]
    aliases: Vec<String>,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelVersionEnvelope {
    model_version: WireModelVersion,
}

impl TryFrom<WireModelVersion> for ModelVersion {
    type Error = MlError;

    fn try_from(wire: WireModelVersion) -> Result<Self, Self::Error> {
        let version = wire.version.trim().parse::<u64>().map_err(|_| {
            MlError::registry(format!(
                "server returned non-numeric version '{}' for model '{}'",
                wire.version, wire.name
            ))
        })?;
        Ok(ModelVersion {
            name: wire.name,
            version,
            source: wire.source,
            run_id: wire.run_id.filter(|r| !r.is_empty()),
            description: wire.description.filter(|d| !d.is_empty()),
            tags: wire.tags.into_iter().map(|t| (t.key, t.value)).collect(),
            aliases: wire.aliases,
            status: wire.status.filter(|s| !s.is_empty()),
        })
    }
}

fn registry_error(action: &str, err: ApiError) -> MlError {
    MlError::registry(format!("{action}: {err}"))
}

#[async_trait]
impl ModelRegistry for MlflowClient {
    async fn create_registered_model(&self, name: &str) -> Result<(), MlError> {
        match self
            .post::<serde_json::Value>("registered-models/create", &json!({ "name": name }))
            .await
        {
            Ok(_) => {
                tracing::debug!(model = name, "registered model created");
                Ok(())
            }
            Err(e) if e.is_already_exists() => {
                tracing::debug!(model = name, "registered model already exists");
                Ok(())
            }
            Err(e) => Err(registry_error(&format!("create registered model '{name}'"), e)),
        }
    }

    async fn create_model_version(
        &self,
        name: &str,
        source: &str,
        run_id: Option<&str>,
    ) -> Result<ModelVersion, MlError> {
        let mut body = json!({ "name": name, "source": source });
        if let Some(run_id) = run_id {
            body["run_id"] = json!(run_id);
        }
        let created: ModelVersionEnvelope = self
            .post("model-versions/create", &body)
            .await
            .map_err(|e| registry_error(&format!("create version of '{name}'"), e))?;
        created.model_version.try_into()
    }

    async fn get_model_version(&self, name: &str, version: u64) -> Result<ModelVersion, MlError> {
        let number = version.to_string();
        let found: ModelVersionEnvelope = self
            .get("model-versions/get", &[("name", name), ("version", number.as_str())])
            .await
            .map_err(|e| registry_error(&format!("get '{name}' v{version}"), e))?;
        found.model_version.try_into()
    }

    async fn update_model_version(
        &self,
        name: &str,
        version: u64,
        description: &str,
    ) -> Result<ModelVersion, MlError> {
        let body = json!({
            "name": name,
            "version": version.to_string(),
            "description": description,
        });
        let updated: ModelVersionEnvelope = self
            .patch("model-versions/update", &body)
            .await
            .map_err(|e| registry_error(&format!("update '{name}' v{version}"), e))?;
        updated.model_version.try_into()
    }

    async fn set_model_version_tag(
        &self,
        name: &str,
        version: u64,
        key: &str,
        value: &str,
    ) -> Result<(), MlError> {
        let body = json!({
            "name": name,
            "version": version.to_string(),
            "key": key,
            "value": value,
        });
        self.post::<Empty>("model-versions/set-tag", &body)
            .await
            .map_err(|e| registry_error(&format!("tag '{name}' v{version}"), e))?;
        Ok(())
    }

    async fn set_registered_model_alias(
        &self,
        name: &str,
        alias: &str,
        version: u64,
    ) -> Result<(), MlError> {
        let body = json!({
            "name": name,
            "alias": alias,
            "version": version.to_string(),
        });
        self.post::<Empty>("registered-models/alias", &body)
            .await
            .map_err(|e| registry_error(&format!("set alias '{alias}' on '{name}' v{version}"), e))?;
        Ok(())
    }

    async fn get_model_version_by_alias(
        &self,
        name: &str,
        alias: &str,
    ) -> Result<ModelVersion, MlError> {
        let found: ModelVersionEnvelope = self
            .get("registered-models/alias", &[("name", name), ("alias", alias)])
            .await
            .map_err(|e| registry_error(&format!("resolve alias '{alias}' on '{name}'"), e))?;
        found.model_version.try_into()
    }

    async fn run_artifact_uri(&self, run_id: &str) -> Result<String, MlError> {
        let info = self
            .get_run(run_id)
            .await
            .map_err(|e| registry_error(&format!("look up run {run_id}"), e))?;
        if info.artifact_uri.is_empty() {
            return Err(MlError::registry(format!("run {run_id} has no artifact URI")));
        }
        Ok(info.artifact_uri)
    }
}
