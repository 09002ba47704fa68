//! Model evaluation: metrics and the persisted evaluation record.

pub mod evaluator;
pub mod metrics;

pub use evaluator::{EvaluationReport, evaluate};
pub use metrics::{RegressionMetrics, mean_absolute_error};
