//! In-process fake of the MLflow tracking + registry REST API.

#![allow(dead_code)]

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Default)]
pub struct FakeRun {
    pub experiment_id: String,
    pub status: String,
    pub artifact_uri: String,
    pub metrics: Vec<(String, f64, i64)>,
    pub params: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default)]
pub struct FakeVersion {
    pub version: u64,
    pub source: String,
    pub run_id: String,
    pub description: String,
    pub tags: BTreeMap<String, String>,
    pub status: String,
    /// `model-versions/get` calls left before a pending version turns ready.
    pub pending_polls: u32,
}

#[derive(Debug, Default)]
pub struct FakeState {
    pub experiments: Vec<String>,
    pub runs: BTreeMap<String, FakeRun>,
    pub models: BTreeMap<String, Vec<FakeVersion>>,
    pub aliases: BTreeMap<(String, String), u64>,
    /// Reject `runs/log-parameter` for this key.
    pub fail_param: Option<String>,
    /// Reject every `model-versions/set-tag` call.
    pub fail_set_tag: bool,
    /// New versions report `PENDING_REGISTRATION` for this many reads.
    pub pending_polls: u32,
    /// New versions report `FAILED_REGISTRATION`.
    pub fail_registration: bool,
    /// Number of `model-versions/get` calls served.
    pub version_gets: u32,
    next_run: u64,
}

impl FakeState {
    pub fn seed_run(&mut self, run_id: &str, artifact_uri: &str) {
        self.runs.insert(
            run_id.to_string(),
            FakeRun {
                experiment_id: "0".into(),
                status: "FINISHED".into(),
                artifact_uri: artifact_uri.into(),
                ..FakeRun::default()
            },
        );
    }

    fn version_json(&self, name: &str, v: &FakeVersion) -> Value {
        let aliases: Vec<&str> = self
            .aliases
            .iter()
            .filter(|((model, _), version)| model == name && **version == v.version)
            .map(|((_, alias), _)| alias.as_str())
            .collect();
        let tags: Vec<Value> = v
            .tags
            .iter()
            .map(|(k, val)| json!({ "key": k, "value": val }))
            .collect();
        json!({
            "name": name,
            "version": v.version.to_string(),
            "source": v.source,
            "run_id": v.run_id,
            "description": v.description,
            "status": v.status,
            "tags": tags,
            "aliases": aliases,
        })
    }
}

pub type Shared = Arc<Mutex<FakeState>>;

type ApiResult = Result<Json<Value>, (StatusCode, Json<Value>)>;

fn api_error(status: StatusCode, code: &str, message: impl Into<String>) -> (StatusCode, Json<Value>) {
    (
        status,
        Json(json!({ "error_code": code, "message": message.into() })),
    )
}

fn not_found(message: impl Into<String>) -> (StatusCode, Json<Value>) {
    api_error(StatusCode::NOT_FOUND, "RESOURCE_DOES_NOT_EXIST", message)
}

fn str_field<'a>(body: &'a Value, key: &str) -> &'a str {
    body.get(key).and_then(Value::as_str).unwrap_or_default()
}

fn version_field(body: &Value) -> u64 {
    str_field(body, "version").parse().unwrap_or(0)
}

/// Start the fake server on an ephemeral port; returns its base URL.
pub async fn spawn() -> (String, Shared) {
    let state: Shared = Arc::new(Mutex::new(FakeState::default()));
    let app = Router::new()
        .route("/api/2.0/mlflow/experiments/get-by-name", get(get_experiment))
        .route("/api/2.0/mlflow/experiments/create", post(create_experiment))
        .route("/api/2.0/mlflow/runs/create", post(create_run))
        .route("/api/2.0/mlflow/runs/get", get(get_run))
        .route("/api/2.0/mlflow/runs/log-metric", post(log_metric))
        .route("/api/2.0/mlflow/runs/log-parameter", post(log_param))
        .route("/api/2.0/mlflow/runs/update", post(update_run))
        .route("/api/2.0/mlflow/registered-models/create", post(create_model))
        .route("/api/2.0/mlflow/model-versions/create", post(create_version))
        .route("/api/2.0/mlflow/model-versions/get", get(get_version))
        .route("/api/2.0/mlflow/model-versions/update", patch(update_version))
        .route("/api/2.0/mlflow/model-versions/set-tag", post(set_tag))
        .route(
            "/api/2.0/mlflow/registered-models/alias",
            post(set_alias).get(get_alias),
        )
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), state)
}

async fn get_experiment(
    State(state): State<Shared>,
    Query(q): Query<HashMap<String, String>>,
) -> ApiResult {
    let s = state.lock().unwrap();
    let name = q.get("experiment_name").cloned().unwrap_or_default();
    match s.experiments.iter().position(|e| *e == name) {
        Some(idx) => Ok(Json(json!({
            "experiment": { "experiment_id": idx.to_string(), "name": name }
        }))),
        None => Err(not_found(format!("Could not find experiment with name '{name}'"))),
    }
}

async fn create_experiment(State(state): State<Shared>, Json(body): Json<Value>) -> ApiResult {
    let mut s = state.lock().unwrap();
    let name = str_field(&body, "name").to_string();
    if s.experiments.contains(&name) {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "RESOURCE_ALREADY_EXISTS",
            format!("Experiment '{name}' already exists."),
        ));
    }
    s.experiments.push(name);
    Ok(Json(json!({ "experiment_id": (s.experiments.len() - 1).to_string() })))
}

async fn create_run(State(state): State<Shared>, Json(body): Json<Value>) -> ApiResult {
    let mut s = state.lock().unwrap();
    s.next_run += 1;
    let run_id = format!("run{:04}", s.next_run);
    let experiment_id = str_field(&body, "experiment_id").to_string();
    let artifact_uri = format!("s3://fake-mlflow/{experiment_id}/{run_id}/artifacts");
    s.runs.insert(
        run_id.clone(),
        FakeRun {
            experiment_id: experiment_id.clone(),
            status: "RUNNING".into(),
            artifact_uri: artifact_uri.clone(),
            ..FakeRun::default()
        },
    );
    Ok(Json(json!({
        "run": {
            "info": {
                "run_id": run_id,
                "experiment_id": experiment_id,
                "status": "RUNNING",
                "artifact_uri": artifact_uri,
            },
            "data": {}
        }
    })))
}

async fn get_run(State(state): State<Shared>, Query(q): Query<HashMap<String, String>>) -> ApiResult {
    let s = state.lock().unwrap();
    let run_id = q.get("run_id").cloned().unwrap_or_default();
    let run = s
        .runs
        .get(&run_id)
        .ok_or_else(|| not_found(format!("Run '{run_id}' not found")))?;
    Ok(Json(json!({
        "run": {
            "info": {
                "run_id": run_id,
                "experiment_id": run.experiment_id,
                "status": run.status,
                "artifact_uri": run.artifact_uri,
            }
        }
    })))
}

async fn log_metric(State(state): State<Shared>, Json(body): Json<Value>) -> ApiResult {
    let mut s = state.lock().unwrap();
    let run_id = str_field(&body, "run_id").to_string();
    let run = s
        .runs
        .get_mut(&run_id)
        .ok_or_else(|| not_found(format!("Run '{run_id}' not found")))?;
    run.metrics.push((
        str_field(&body, "key").to_string(),
        body.get("value").and_then(Value::as_f64).unwrap_or(f64::NAN),
        body.get("step").and_then(Value::as_i64).unwrap_or(0),
    ));
    Ok(Json(json!({})))
}

async fn log_param(State(state): State<Shared>, Json(body): Json<Value>) -> ApiResult {
    let mut s = state.lock().unwrap();
    let key = str_field(&body, "key").to_string();
    if s.fail_param.as_deref() == Some(key.as_str()) {
        return Err(api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_ERROR",
            "param store unavailable",
        ));
    }
    let run_id = str_field(&body, "run_id").to_string();
    let run = s
        .runs
        .get_mut(&run_id)
        .ok_or_else(|| not_found(format!("Run '{run_id}' not found")))?;
    run.params.insert(key, str_field(&body, "value").to_string());
    Ok(Json(json!({})))
}

async fn update_run(State(state): State<Shared>, Json(body): Json<Value>) -> ApiResult {
    let mut s = state.lock().unwrap();
    let run_id = str_field(&body, "run_id").to_string();
    let run = s
        .runs
        .get_mut(&run_id)
        .ok_or_else(|| not_found(format!("Run '{run_id}' not found")))?;
    run.status = str_field(&body, "status").to_string();
    Ok(Json(json!({ "run_info": { "run_id": run_id, "status": run.status } })))
}

async fn create_model(State(state): State<Shared>, Json(body): Json<Value>) -> ApiResult {
    let mut s = state.lock().unwrap();
    let name = str_field(&body, "name").to_string();
    if s.models.contains_key(&name) {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "RESOURCE_ALREADY_EXISTS",
            format!("Registered Model (name={name}) already exists."),
        ));
    }
    s.models.insert(name.clone(), Vec::new());
    Ok(Json(json!({ "registered_model": { "name": name } })))
}

async fn create_version(State(state): State<Shared>, Json(body): Json<Value>) -> ApiResult {
    let mut s = state.lock().unwrap();
    let status = if s.fail_registration {
        "FAILED_REGISTRATION"
    } else if s.pending_polls > 0 {
        "PENDING_REGISTRATION"
    } else {
        "READY"
    };
    let pending_polls = s.pending_polls;
    let name = str_field(&body, "name").to_string();
    let versions = s
        .models
        .get_mut(&name)
        .ok_or_else(|| not_found(format!("Registered Model with name={name} not found")))?;
    let version = FakeVersion {
        version: versions.len() as u64 + 1,
        source: str_field(&body, "source").to_string(),
        run_id: str_field(&body, "run_id").to_string(),
        status: status.to_string(),
        pending_polls,
        ..FakeVersion::default()
    };
    versions.push(version.clone());
    Ok(Json(json!({ "model_version": s.version_json(&name, &version) })))
}

async fn get_version(
    State(state): State<Shared>,
    Query(q): Query<HashMap<String, String>>,
) -> ApiResult {
    let mut s = state.lock().unwrap();
    s.version_gets += 1;
    let name = q.get("name").cloned().unwrap_or_default();
    let number: u64 = q.get("version").and_then(|v| v.parse().ok()).unwrap_or(0);
    let version = s
        .models
        .get_mut(&name)
        .and_then(|vs| vs.iter_mut().find(|v| v.version == number))
        .ok_or_else(|| not_found(format!("Model Version (name={name}, version={number}) not found")))?;
    version.pending_polls = version.pending_polls.saturating_sub(1);
    if version.pending_polls == 0 && version.status == "PENDING_REGISTRATION" {
        version.status = "READY".to_string();
    }
    let version = version.clone();
    Ok(Json(json!({ "model_version": s.version_json(&name, &version) })))
}

async fn update_version(State(state): State<Shared>, Json(body): Json<Value>) -> ApiResult {
    let mut s = state.lock().unwrap();
    let name = str_field(&body, "name").to_string();
    let number = version_field(&body);
    let version = s
        .models
        .get_mut(&name)
        .and_then(|vs| vs.iter_mut().find(|v| v.version == number))
        .ok_or_else(|| not_found(format!("Model Version (name={name}, version={number}) not found")))?;
    version.description = str_field(&body, "description").to_string();
    let version = version.clone();
    Ok(Json(json!({ "model_version": s.version_json(&name, &version) })))
}

async fn set_tag(State(state): State<Shared>, Json(body): Json<Value>) -> ApiResult {
    let mut s = state.lock().unwrap();
    if s.fail_set_tag {
        return Err(api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_ERROR",
            "tag store unavailable",
        ));
    }
    let name = str_field(&body, "name").to_string();
    let number = version_field(&body);
    let version = s
        .models
        .get_mut(&name)
        .and_then(|vs| vs.iter_mut().find(|v| v.version == number))
        .ok_or_else(|| not_found(format!("Model Version (name={name}, version={number}) not found")))?;
    version.tags.insert(
        str_field(&body, "key").to_string(),
        str_field(&body, "value").to_string(),
    );
    Ok(Json(json!({})))
}

async fn set_alias(State(state): State<Shared>, Json(body): Json<Value>) -> ApiResult {
    let mut s = state.lock().unwrap();
    let name = str_field(&body, "name").to_string();
    let number = version_field(&body);
    let exists = s
        .models
        .get(&name)
        .is_some_and(|vs| vs.iter().any(|v| v.version == number));
    if !exists {
        return Err(not_found(format!(
            "Model Version (name={name}, version={number}) not found"
        )));
    }
    let alias = str_field(&body, "alias").to_string();
    s.aliases.insert((name, alias), number);
    Ok(Json(json!({})))
}

async fn get_alias(State(state): State<Shared>, Query(q): Query<HashMap<String, String>>) -> ApiResult {
    let s = state.lock().unwrap();
    let name = q.get("name").cloned().unwrap_or_default();
    let alias = q.get("alias").cloned().unwrap_or_default();
    let number = s
        .aliases
        .get(&(name.clone(), alias.clone()))
        .copied()
        .ok_or_else(|| not_found(format!("Registered model alias {alias} not found.")))?;
    let version = s
        .models
        .get(&name)
        .and_then(|vs| vs.iter().find(|v| v.version == number))
        .cloned()
        .ok_or_else(|| not_found(format!("Model Version (name={name}, version={number}) not found")))?;
    Ok(Json(json!({ "model_version": s.version_json(&name, &version) })))
}
