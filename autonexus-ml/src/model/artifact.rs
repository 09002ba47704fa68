//! Serialized regression model artifacts.

use super::Regressor;
use crate::error::MlError;
use serde::{Deserialize, Serialize};

/// A trained regression model as persisted by the training step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ModelArtifact {
    /// Predicts the same value for every row.
    Constant { value: f64 },
    LinearRegression {
        coefficients: Vec<f64>,
        intercept: f64,
    },
    DecisionTree { tree: RegressionTree },
    /// Mean of the member trees' predictions.
    RandomForest { trees: Vec<RegressionTree> },
}

impl ModelArtifact {
    /// Structural checks run once at load time.
    pub fn validate(&self) -> Result<(), MlError> {
        match self {
            Self::Constant { value } => {
                if !value.is_finite() {
                    return Err(MlError::load("constant model value is not finite"));
                }
            }
            Self::LinearRegression { coefficients, .. } => {
                if coefficients.is_empty() {
                    return Err(MlError::load("linear model has no coefficients"));
                }
            }
            Self::DecisionTree { tree } => tree.validate()?,
            Self::RandomForest { trees } => {
                if trees.is_empty() {
                    return Err(MlError::load("random forest has no trees"));
                }
                for tree in trees {
                    tree.validate()?;
                }
            }
        }
        Ok(())
    }
}

impl Regressor for ModelArtifact {
    fn name(&self) -> &str {
        match self {
            Self::Constant { .. } => "constant",
            Self::LinearRegression { .. } => "linear_regression",
            Self::DecisionTree { .. } => "decision_tree",
            Self::RandomForest { .. } => "random_forest",
        }
    }

    fn predict_row(&self, row: &[f64]) -> Result<f64, MlError> {
        match self {
            Self::Constant { value } => Ok(*value),
            Self::LinearRegression {
                coefficients,
                intercept,
            } => {
                if row.len() != coefficients.len() {
                    return Err(MlError::evaluation(format!(
                        "linear model expects {} features, row has {}",
                        coefficients.len(),
                        row.len()
                    )));
                }
                Ok(intercept + coefficients.iter().zip(row).map(|(c, x)| c * x).sum::<f64>())
            }
            Self::DecisionTree { tree } => tree.predict_row(row),
            Self::RandomForest { trees } => {
                let mut sum = 0.0;
                for tree in trees {
                    sum += tree.predict_row(row)?;
                }
                Ok(sum / trees.len() as f64)
            }
        }
    }
}

/// A binary regression tree stored as a flat node array rooted at index 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    pub nodes: Vec<TreeNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TreeNode {
    /// Rows with `row[feature] <= threshold` go left.
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf { value: f64 },
}

impl RegressionTree {
    pub fn validate(&self) -> Result<(), MlError> {
        if self.nodes.is_empty() {
            return Err(MlError::load("regression tree has no nodes"));
        }
        for (idx, node) in self.nodes.iter().enumerate() {
            if let TreeNode::Split { left, right, .. } = node {
                // Children must point forward; this also rules out cycles.
                for child in [*left, *right] {
                    if child <= idx || child >= self.nodes.len() {
                        return Err(MlError::load(format!(
                            "tree node {idx} has invalid child index {child}"
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    pub fn predict_row(&self, row: &[f64]) -> Result<f64, MlError> {
        let mut idx = 0;
        loop {
            match self.nodes.get(idx) {
                Some(TreeNode::Leaf { value }) => return Ok(*value),
                Some(TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }) => {
                    let x = row.get(*feature).ok_or_else(|| {
                        MlError::evaluation(format!(
                            "tree splits on feature {feature}, row has {}",
                            row.len()
                        ))
                    })?;
                    idx = if *x <= *threshold { *left } else { *right };
                }
                None => {
                    return Err(MlError::evaluation(format!("tree node {idx} does not exist")));
                }
            }
        }
    }
}
