//! Hold-out evaluation of a trained regressor.

use super::metrics::{RegressionMetrics, mean_absolute_error};
use crate::error::MlError;
use crate::model::Regressor;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// The persisted evaluation record, written as `{"MAE": <value>}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    #[serde(rename = "MAE")]
    pub mae: f64,
}

impl EvaluationReport {
    pub fn load(path: &Path) -> Result<Self, MlError> {
        let content = std::fs::read_to_string(path).map_err(|e| MlError::from_read(e, path))?;
        serde_json::from_str(&content)
            .map_err(|e| MlError::load(format!("invalid metrics file {}: {e}", path.display())))
    }

    /// Overwrite `path` with this report, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), MlError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// Score `model` on the given rows, persist `{"MAE": mae}` to `output_path`,
/// and return the MAE.
pub fn evaluate(
    features: &[Vec<f64>],
    target: &[f64],
    model: &dyn Regressor,
    output_path: &Path,
) -> Result<f64, MlError> {
    score_and_save(features, target, model, output_path)
        .inspect(|mae| {
            tracing::debug!(mae, path = %output_path.display(), "evaluation done");
        })
        .inspect_err(|e| {
            tracing::error!(model = model.name(), "evaluate failed: {e}");
        })
}

fn score_and_save(
    features: &[Vec<f64>],
    target: &[f64],
    model: &dyn Regressor,
    output_path: &Path,
) -> Result<f64, MlError> {
    let predictions = model.predict(features).map_err(into_evaluation)?;
    let mae = mean_absolute_error(target, &predictions)?;
    if !mae.is_finite() {
        return Err(MlError::evaluation(format!("MAE is not finite: {mae}")));
    }

    if let Ok(metrics) = RegressionMetrics::compute(target, &predictions) {
        tracing::debug!(
            rmse = metrics.rmse,
            r_squared = metrics.r_squared,
            "secondary regression metrics"
        );
    }

    EvaluationReport { mae }
        .save(output_path)
        .map_err(|e| MlError::evaluation(format!("failed to write {}: {e}", output_path.display())))?;
    Ok(mae)
}

fn into_evaluation(err: MlError) -> MlError {
    match err {
        MlError::Evaluation(_) => err,
        other => MlError::evaluation(other.to_string()),
    }
}
