//! Regression error metrics.

use crate::error::MlError;
use serde::{Deserialize, Serialize};

/// Mean absolute error between `actual` and `predicted`.
pub fn mean_absolute_error(actual: &[f64], predicted: &[f64]) -> Result<f64, MlError> {
    check_lengths(actual, predicted)?;
    let total: f64 = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (p - a).abs())
        .sum();
    Ok(total / actual.len() as f64)
}

fn check_lengths(actual: &[f64], predicted: &[f64]) -> Result<(), MlError> {
    if actual.len() != predicted.len() {
        return Err(MlError::evaluation(format!(
            "target has {} values but model produced {} predictions",
            actual.len(),
            predicted.len()
        )));
    }
    if actual.is_empty() {
        return Err(MlError::evaluation("cannot score an empty dataset"));
    }
    Ok(())
}

/// Regression metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionMetrics {
    pub mse: f64,
    pub rmse: f64,
    pub mae: f64,
    pub r_squared: f64,
}

impl RegressionMetrics {
    pub fn compute(actual: &[f64], predicted: &[f64]) -> Result<Self, MlError> {
        let mae = mean_absolute_error(actual, predicted)?;
        let n = actual.len() as f64;
        let mse = actual
            .iter()
            .zip(predicted)
            .map(|(a, p)| (p - a).powi(2))
            .sum::<f64>()
            / n;
        let mean = actual.iter().sum::<f64>() / n;
        let ss_tot: f64 = actual.iter().map(|a| (a - mean).powi(2)).sum();
        // Constant targets leave R² undefined; report 0 like a mean predictor.
        let r_squared = if ss_tot == 0.0 {
            0.0
        } else {
            1.0 - (mse * n) / ss_tot
        };
        Ok(Self {
            mse,
            rmse: mse.sqrt(),
            mae,
            r_squared,
        })
    }
}
