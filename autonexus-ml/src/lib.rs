//! # autonexus-ml: evaluation, experiment tracking and model registration
//!
//! Library behind the AutoNexus car-price pipeline executables:
//! 1. **Evaluate**: load a model artifact and the processed hold-out set,
//!    compute MAE, write `reports/metrics.json`, and log the run to the local
//!    experiment store and the remote tracking server.
//! 2. **Register**: publish a finished run's model artifact as a new version
//!    in the model registry and annotate it.
//! 3. **Stage**: point an alias such as `champion` at a registered version.

// Foundation
pub mod config;
pub mod error;

// Inputs
pub mod data;
pub mod model;

// Scoring
pub mod eval;

// External services
pub mod registry;
pub mod tracking;

// Orchestration
pub mod pipeline;

// Re-exports
pub use config::{PipelineConfig, load_config};
pub use data::{Dataset, load_data};
pub use error::MlError;
pub use eval::{EvaluationReport, evaluate, mean_absolute_error};
pub use model::{ModelArtifact, Regressor, load_model};
pub use pipeline::{EvaluationOutcome, register_model, run_evaluation, transition_stage};
pub use registry::{ModelRegistry, ModelVersion};
pub use tracking::{
    ExperimentTracker, LocalTracker, MlflowClient, RemoteTracker, track_experiment_local,
    track_experiment_remote,
};
