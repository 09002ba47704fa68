//! Experiment tracking against the local store and the remote server.
//!
//! Both backends share one contract: a run is opened, the `MAE` metric and
//! every flattened parameter are logged into it, and the run is then either
//! finished (committed) or aborted. Nothing logged into an aborted local run
//! becomes visible.

pub mod local;
pub mod params;
pub mod remote;

pub use local::{LocalTracker, RecordedRun};
pub use params::{FlatParam, flatten_params, load_params, param_value_string};
pub use remote::{MlflowClient, RemoteTracker};

use crate::error::MlError;
use async_trait::async_trait;
use std::path::Path;

/// Name under which the evaluation metric is logged.
pub const MAE_METRIC: &str = "MAE";

/// A tracking backend able to open runs.
#[async_trait]
pub trait ExperimentTracker: Send + Sync {
    fn name(&self) -> &str;

    async fn start_run(&self) -> Result<Box<dyn TrackingRun>, MlError>;
}

/// An open run. Consumed by `finish` or `abort`.
#[async_trait]
pub trait TrackingRun: Send {
    fn run_id(&self) -> &str;

    async fn log_metric(&mut self, key: &str, value: f64) -> Result<(), MlError>;

    async fn log_param(&mut self, key: &str, value: &str) -> Result<(), MlError>;

    /// Commit everything logged so far.
    async fn finish(self: Box<Self>) -> Result<(), MlError>;

    /// Close the run after a failure. Errors while aborting are logged only.
    async fn abort(self: Box<Self>, cause: &MlError);
}

/// Log `mae` and the flattened parameters from `params_path` into one run.
/// Returns the run id on success.
pub async fn track_experiment(
    tracker: &dyn ExperimentTracker,
    params_path: &Path,
    mae: f64,
) -> Result<String, MlError> {
    let mut run = tracker.start_run().await.inspect_err(|e| {
        tracing::error!(tracker = tracker.name(), "failed to start run: {e}");
    })?;

    match log_evaluation(run.as_mut(), params_path, mae).await {
        Ok(()) => {
            let run_id = run.run_id().to_string();
            run.finish().await.inspect_err(|e| {
                tracing::error!(tracker = tracker.name(), run_id = %run_id, "failed to finish run: {e}");
            })?;
            tracing::debug!(tracker = tracker.name(), run_id = %run_id, "experiment tracked");
            Ok(run_id)
        }
        Err(e) => {
            tracing::error!(
                tracker = tracker.name(),
                run_id = run.run_id(),
                "experiment tracking failed: {e}"
            );
            run.abort(&e).await;
            Err(e)
        }
    }
}

async fn log_evaluation(
    run: &mut dyn TrackingRun,
    params_path: &Path,
    mae: f64,
) -> Result<(), MlError> {
    run.log_metric(MAE_METRIC, mae).await?;

    let params = load_params(params_path)?;
    for (key, value) in &params {
        run.log_param(key, &param_value_string(value)).await?;
    }
    Ok(())
}

/// Track an evaluation in the local experiment store.
pub async fn track_experiment_local(
    tracker: &LocalTracker,
    params_path: &Path,
    mae: f64,
) -> Result<String, MlError> {
    track_experiment(tracker, params_path, mae).await
}

/// Track an evaluation on the remote tracking server.
pub async fn track_experiment_remote(
    tracker: &RemoteTracker,
    params_path: &Path,
    mae: f64,
) -> Result<String, MlError> {
    track_experiment(tracker, params_path, mae).await
}
