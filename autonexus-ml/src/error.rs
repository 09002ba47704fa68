//! Error types for the autonexus-ml crate.

use thiserror::Error;

/// Top-level error type for pipeline operations.
///
/// The first six variants form the pipeline taxonomy; the `#[from]` variants
/// carry lower-level failures that have not yet been classified by a caller.
#[derive(Debug, Error)]
pub enum MlError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Load error: {0}")]
    Load(String),

    #[error("Evaluation error: {0}")]
    Evaluation(String),

    #[error("Tracking error: {0}")]
    Tracking(String),

    #[error("Registry error: {0}")]
    Registry(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl MlError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn load(msg: impl Into<String>) -> Self {
        Self::Load(msg.into())
    }

    pub fn evaluation(msg: impl Into<String>) -> Self {
        Self::Evaluation(msg.into())
    }

    pub fn tracking(msg: impl Into<String>) -> Self {
        Self::Tracking(msg.into())
    }

    pub fn registry(msg: impl Into<String>) -> Self {
        Self::Registry(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Maps a filesystem read failure onto the taxonomy: a missing path is
    /// `NotFound`, anything else is `Load`.
    pub fn from_read(err: std::io::Error, path: &std::path::Path) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            Self::not_found(path.display().to_string())
        } else {
            Self::load(format!("failed to read {}: {err}", path.display()))
        }
    }

    /// Short name of the error kind, used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Load(_) => "load",
            Self::Evaluation(_) => "evaluation",
            Self::Tracking(_) => "tracking",
            Self::Registry(_) => "registry",
            Self::Config(_) => "config",
            Self::Io(_) => "io",
            Self::Serde(_) => "serde",
            Self::Sqlite(_) => "sqlite",
        }
    }
}
