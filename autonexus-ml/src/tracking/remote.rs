//! MLflow-compatible REST client and the remote experiment tracker.

use super::{ExperimentTracker, TrackingRun};
use crate::config::TrackingConfig;
use crate::error::MlError;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::time::Duration;

const API_PREFIX: &str = "api/2.0/mlflow";
const USER_AGENT: &str = concat!("autonexus/", env!("CARGO_PKG_VERSION"));

/// Error reported by the tracking server or the transport underneath it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    /// HTTP status, absent for transport failures.
    pub status: Option<u16>,
    pub error_code: String,
    pub message: String,
}

impl ApiError {
    fn transport(err: reqwest::Error) -> Self {
        Self {
            status: err.status().map(|s| s.as_u16()),
            error_code: "TRANSPORT_ERROR".to_string(),
            message: err.to_string(),
        }
    }

    pub fn is_already_exists(&self) -> bool {
        self.error_code == "RESOURCE_ALREADY_EXISTS"
    }

    pub fn is_not_found(&self) -> bool {
        self.error_code == "RESOURCE_DOES_NOT_EXIST" || self.status == Some(404)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} (HTTP {status}): {}", self.error_code, self.message),
            None => write!(f, "{}: {}", self.error_code, self.message),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    error_code: Option<String>,
    message: Option<String>,
}

/// Run metadata returned by the tracking server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunInfo {
    pub run_id: String,
    #[serde(default)]
    pub experiment_id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub artifact_uri: String,
}

#[derive(Debug, Deserialize)]
struct RunEnvelope {
    run: RunBody,
}

#[derive(Debug, Deserialize)]
struct RunBody {
    info: RunInfo,
}

#[derive(Debug, Deserialize)]
struct ExperimentEnvelope {
    experiment: ExperimentBody,
}

#[derive(Debug, Deserialize)]
struct ExperimentBody {
    experiment_id: String,
}

#[derive(Debug, Deserialize)]
struct CreateExperimentResponse {
    experiment_id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Empty {}

/// HTTP client for an MLflow-compatible tracking and registry server.
#[derive(Debug, Clone)]
pub struct MlflowClient {
    client: reqwest::Client,
    base_url: String,
}

impl MlflowClient {
    pub fn new(tracking_uri: &str, timeout: Duration) -> Result<Self, MlError> {
        if !(tracking_uri.starts_with("http://") || tracking_uri.starts_with("https://")) {
            return Err(MlError::config(format!(
                "tracking_uri must be an http(s) URL, got '{tracking_uri}'"
            )));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| MlError::config(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: tracking_uri.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &TrackingConfig) -> Result<Self, MlError> {
        Self::new(
            &config.tracking_uri,
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{API_PREFIX}/{path}", self.base_url)
    }

    pub(crate) async fn get<R: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<R, ApiError> {
        let url = self.endpoint(path);
        tracing::debug!(%url, "GET");
        self.send(self.client.get(&url).query(query)).await
    }

    pub(crate) async fn post<R: DeserializeOwned>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<R, ApiError> {
        let url = self.endpoint(path);
        tracing::debug!(%url, "POST");
        self.send(self.client.post(&url).json(body)).await
    }

    pub(crate) async fn patch<R: DeserializeOwned>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<R, ApiError> {
        let url = self.endpoint(path);
        tracing::debug!(%url, "PATCH");
        self.send(self.client.patch(&url).json(body)).await
    }

    async fn send<R: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<R, ApiError> {
        let response = request.send().await.map_err(ApiError::transport)?;
        let status = response.status();
        let body = response.text().await.map_err(ApiError::transport)?;

        if !status.is_success() {
            let parsed: ErrorBody = serde_json::from_str(&body).unwrap_or_default();
            return Err(ApiError {
                status: Some(status.as_u16()),
                error_code: parsed.error_code.unwrap_or_else(|| "HTTP_ERROR".to_string()),
                message: parsed.message.unwrap_or(body),
            });
        }

        let body = if body.trim().is_empty() { "{}" } else { body.as_str() };
        serde_json::from_str(body).map_err(|e| ApiError {
            status: Some(status.as_u16()),
            error_code: "INVALID_RESPONSE".to_string(),
            message: e.to_string(),
        })
    }

    // ── Tracking ──────────────────────────────────────────────

    /// Resolve an experiment id by name, creating the experiment if needed.
    pub async fn get_or_create_experiment(&self, name: &str) -> Result<String, MlError> {
        match self
            .get::<ExperimentEnvelope>("experiments/get-by-name", &[("experiment_name", name)])
            .await
        {
            Ok(found) => Ok(found.experiment.experiment_id),
            Err(e) if e.is_not_found() => {
                let created: CreateExperimentResponse = self
                    .post("experiments/create", &json!({ "name": name }))
                    .await
                    .map_err(|e| MlError::tracking(format!("create experiment '{name}': {e}")))?;
                tracing::debug!(experiment = name, id = %created.experiment_id, "experiment created");
                Ok(created.experiment_id)
            }
            Err(e) => Err(MlError::tracking(format!("get experiment '{name}': {e}"))),
        }
    }

    pub async fn create_run(&self, experiment_id: &str) -> Result<RunInfo, MlError> {
        let body = json!({
            "experiment_id": experiment_id,
            "start_time": now_millis(),
        });
        let created: RunEnvelope = self
            .post("runs/create", &body)
            .await
            .map_err(|e| MlError::tracking(format!("create run: {e}")))?;
        Ok(created.run.info)
    }

    pub async fn get_run(&self, run_id: &str) -> Result<RunInfo, ApiError> {
        let found: RunEnvelope = self.get("runs/get", &[("run_id", run_id)]).await?;
        Ok(found.run.info)
    }

    pub async fn log_metric(&self, run_id: &str, key: &str, value: f64, step: i64) -> Result<(), MlError> {
        let body = json!({
            "run_id": run_id,
            "key": key,
            "value": value,
            "timestamp": now_millis(),
            "step": step,
        });
        self.post::<Empty>("runs/log-metric", &body)
            .await
            .map_err(|e| MlError::tracking(format!("log metric '{key}': {e}")))?;
        Ok(())
    }

    pub async fn log_param(&self, run_id: &str, key: &str, value: &str) -> Result<(), MlError> {
        let body = json!({ "run_id": run_id, "key": key, "value": value });
        self.post::<Empty>("runs/log-parameter", &body)
            .await
            .map_err(|e| MlError::tracking(format!("log param '{key}': {e}")))?;
        Ok(())
    }

    /// Mark a run terminated with `status` (`FINISHED` or `FAILED`).
    pub async fn update_run_status(&self, run_id: &str, status: &str) -> Result<(), MlError> {
        let body = json!({
            "run_id": run_id,
            "status": status,
            "end_time": now_millis(),
        });
        self.post::<serde_json::Value>("runs/update", &body)
            .await
            .map_err(|e| MlError::tracking(format!("update run {run_id} to {status}: {e}")))?;
        Ok(())
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Tracker that logs runs to a remote server under one experiment.
#[derive(Debug, Clone)]
pub struct RemoteTracker {
    client: MlflowClient,
    experiment_name: String,
}

impl RemoteTracker {
    pub fn new(client: MlflowClient, experiment_name: &str) -> Self {
        Self {
            client,
            experiment_name: experiment_name.to_string(),
        }
    }

    pub fn from_config(config: &TrackingConfig) -> Result<Self, MlError> {
        Ok(Self::new(
            MlflowClient::from_config(config)?,
            &config.experiment_name,
        ))
    }

    pub fn client(&self) -> &MlflowClient {
        &self.client
    }
}

#[async_trait]
impl ExperimentTracker for RemoteTracker {
    fn name(&self) -> &str {
        "remote"
    }

    async fn start_run(&self) -> Result<Box<dyn TrackingRun>, MlError> {
        let experiment_id = self
            .client
            .get_or_create_experiment(&self.experiment_name)
            .await?;
        let info = self.client.create_run(&experiment_id).await?;
        tracing::debug!(run_id = %info.run_id, experiment_id = %experiment_id, "remote run started");
        Ok(Box::new(RemoteRun {
            client: self.client.clone(),
            run_id: info.run_id,
            steps: Vec::new(),
        }))
    }
}

struct RemoteRun {
    client: MlflowClient,
    run_id: String,
    steps: Vec<String>,
}

#[async_trait]
impl TrackingRun for RemoteRun {
    fn run_id(&self) -> &str {
        &self.run_id
    }

    async fn log_metric(&mut self, key: &str, value: f64) -> Result<(), MlError> {
        let step = self.steps.iter().filter(|k| *k == key).count() as i64;
        self.client.log_metric(&self.run_id, key, value, step).await?;
        self.steps.push(key.to_string());
        Ok(())
    }

    async fn log_param(&mut self, key: &str, value: &str) -> Result<(), MlError> {
        self.client.log_param(&self.run_id, key, value).await
    }

    async fn finish(self: Box<Self>) -> Result<(), MlError> {
        self.client.update_run_status(&self.run_id, "FINISHED").await
    }

    async fn abort(self: Box<Self>, cause: &MlError) {
        if let Err(e) = self.client.update_run_status(&self.run_id, "FAILED").await {
            tracing::warn!(run_id = %self.run_id, "could not mark run failed after '{cause}': {e}");
        }
    }
}
