//! End-to-end evaluator runs against a temp workspace and a fake tracking server.

mod common;

use autonexus_ml::config::{PathsConfig, PipelineConfig, TrackingConfig};
use autonexus_ml::{
    EvaluationReport, LocalTracker, MlError, RemoteTracker, run_evaluation, track_experiment_remote,
};
use std::path::Path;

struct Workspace {
    _dir: tempfile::TempDir,
    config: PipelineConfig,
}

fn workspace(base_url: &str, model_json: &str) -> Workspace {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    std::fs::create_dir_all(root.join("models")).unwrap();
    std::fs::create_dir_all(root.join("data/processed")).unwrap();
    std::fs::write(root.join("models/model.json"), model_json).unwrap();
    std::fs::write(
        root.join("data/processed/test_processed.csv"),
        "Year,Kms_Driven,Price\n2014,27000,8\n2013,43000,10\n2017,6900,15\n",
    )
    .unwrap();
    std::fs::write(
        root.join("params.yaml"),
        "data_ingestion:\n  test_size: 0.2\nmodel_building:\n  n_estimators: 150\n",
    )
    .unwrap();

    let config = PipelineConfig {
        paths: PathsConfig {
            model: root.join("models/model.json"),
            data: root.join("data/processed/test_processed.csv"),
            metrics: root.join("reports/metrics.json"),
            params: root.join("params.yaml"),
            log_file: root.join("reports/errors.log"),
            local_store: root.join("reports/experiments.db"),
        },
        tracking: TrackingConfig {
            tracking_uri: base_url.to_string(),
            request_timeout_secs: 5,
            ..TrackingConfig::default()
        },
        ..PipelineConfig::default()
    };
    Workspace { _dir: dir, config }
}

fn trackers(config: &PipelineConfig) -> (LocalTracker, RemoteTracker) {
    (
        LocalTracker::new(&config.paths.local_store),
        RemoteTracker::from_config(&config.tracking).unwrap(),
    )
}

#[tokio::test]
async fn test_constant_model_end_to_end() {
    let (base_url, state) = common::spawn().await;
    let ws = workspace(&base_url, r#"{"type":"constant","value":10.0}"#);
    let (local, remote) = trackers(&ws.config);

    let outcome = run_evaluation(&ws.config, &local, &remote).await.unwrap();

    assert!((outcome.mae - 7.0 / 3.0).abs() < 1e-12);
    let report = EvaluationReport::load(&ws.config.paths.metrics).unwrap();
    assert_eq!(report.mae.to_bits(), outcome.mae.to_bits());

    let local_run = local.load_run(&outcome.local_run_id).await.unwrap().unwrap();
    assert_eq!(local_run.metrics.get("MAE"), Some(&outcome.mae));
    assert_eq!(
        local_run.params.get("data_ingestion_test_size").map(String::as_str),
        Some("0.2")
    );
    assert_eq!(
        local_run.params.get("model_building_n_estimators").map(String::as_str),
        Some("150")
    );

    let s = state.lock().unwrap();
    let remote_run = &s.runs[&outcome.remote_run_id];
    assert_eq!(remote_run.status, "FINISHED");
    assert_eq!(remote_run.metrics.len(), 1);
    assert_eq!(remote_run.metrics[0].0, "MAE");
    assert_eq!(remote_run.metrics[0].1, outcome.mae);
    assert_eq!(remote_run.params.len(), 2);
    assert_eq!(s.experiments, vec!["Default".to_string()]);
}

#[tokio::test]
async fn test_linear_model_uses_positional_features() {
    let (base_url, _state) = common::spawn().await;
    // Zero weights on both feature columns, so every prediction is the intercept.
    let ws = workspace(
        &base_url,
        r#"{"type":"linear_regression","coefficients":[0.0,0.0],"intercept":11.0}"#,
    );
    let (local, remote) = trackers(&ws.config);

    let outcome = run_evaluation(&ws.config, &local, &remote).await.unwrap();
    // |8-11| + |10-11| + |15-11| = 8
    assert!((outcome.mae - 8.0 / 3.0).abs() < 1e-12);
}

#[tokio::test]
async fn test_remote_failure_after_local_commit() {
    let (base_url, state) = common::spawn().await;
    state.lock().unwrap().fail_param = Some("model_building_n_estimators".into());
    let ws = workspace(&base_url, r#"{"type":"constant","value":10.0}"#);
    let (local, remote) = trackers(&ws.config);

    let err = run_evaluation(&ws.config, &local, &remote).await.unwrap_err();
    assert!(matches!(err, MlError::Tracking(_)), "got {err:?}");

    // The local store already committed its run; the stores disagree.
    assert_eq!(local.list_runs().await.unwrap().len(), 1);
    let s = state.lock().unwrap();
    assert_eq!(s.runs.len(), 1);
    assert!(s.runs.values().all(|r| r.status == "FAILED"));
}

#[tokio::test]
async fn test_missing_model_aborts_before_any_output() {
    let (base_url, state) = common::spawn().await;
    let ws = workspace(&base_url, "{}");
    std::fs::remove_file(&ws.config.paths.model).unwrap();
    let (local, remote) = trackers(&ws.config);

    let err = run_evaluation(&ws.config, &local, &remote).await.unwrap_err();
    assert!(matches!(err, MlError::NotFound(_)), "got {err:?}");
    assert!(!Path::new(&ws.config.paths.metrics).exists());
    assert!(!ws.config.paths.local_store.exists());
    assert!(state.lock().unwrap().runs.is_empty());
}

#[tokio::test]
async fn test_missing_target_column_is_load_error() {
    let (base_url, _state) = common::spawn().await;
    let ws = workspace(&base_url, r#"{"type":"constant","value":1.0}"#);
    std::fs::write(&ws.config.paths.data, "Year,Kms_Driven\n2014,27000\n").unwrap();
    let (local, remote) = trackers(&ws.config);

    let err = run_evaluation(&ws.config, &local, &remote).await.unwrap_err();
    assert!(matches!(err, MlError::Load(_)), "got {err:?}");
}

#[tokio::test]
async fn test_remote_tracking_finishes_run_with_python_style_params() {
    let (base_url, state) = common::spawn().await;
    let ws = workspace(&base_url, r#"{"type":"constant","value":1.0}"#);
    std::fs::write(
        &ws.config.paths.params,
        "model_building:\n  bootstrap: true\n  learning_rate: 0.00001\n  max_depth: null\n",
    )
    .unwrap();
    let (_, remote) = trackers(&ws.config);

    let run_id = track_experiment_remote(&remote, &ws.config.paths.params, 0.5)
        .await
        .unwrap();

    let s = state.lock().unwrap();
    let run = &s.runs[&run_id];
    assert_eq!(run.status, "FINISHED");
    assert_eq!(run.params["model_building_bootstrap"], "True");
    assert_eq!(run.params["model_building_learning_rate"], "1e-05");
    assert_eq!(run.params["model_building_max_depth"], "None");
}
