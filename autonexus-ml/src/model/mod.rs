//! Trained model loading and the positional prediction contract.

pub mod artifact;

pub use artifact::{ModelArtifact, RegressionTree, TreeNode};

use crate::error::MlError;
use std::path::Path;

/// A regression model that predicts from bare feature rows.
///
/// Rows are positional: values appear in dataset column order with the target
/// removed, and column names are never consulted.
pub trait Regressor: Send + Sync {
    fn name(&self) -> &str;

    fn predict_row(&self, row: &[f64]) -> Result<f64, MlError>;

    /// Batch prediction, one output per input row.
    fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>, MlError> {
        rows.iter().map(|row| self.predict_row(row)).collect()
    }
}

/// Deserialize a model artifact from `path`.
pub fn load_model(path: &Path) -> Result<ModelArtifact, MlError> {
    read_artifact(path)
        .inspect(|model| {
            tracing::debug!(path = %path.display(), model = model.name(), "ml model loaded");
        })
        .inspect_err(|e| match e {
            MlError::NotFound(_) => {
                tracing::error!("File not found at given location -> {}", path.display());
            }
            _ => tracing::error!(path = %path.display(), "load_model failed: {e}"),
        })
}

fn read_artifact(path: &Path) -> Result<ModelArtifact, MlError> {
    let bytes = std::fs::read(path).map_err(|e| MlError::from_read(e, path))?;
    let model: ModelArtifact = serde_json::from_slice(&bytes)
        .map_err(|e| MlError::load(format!("invalid model file {}: {e}", path.display())))?;
    model.validate()?;
    Ok(model)
}
