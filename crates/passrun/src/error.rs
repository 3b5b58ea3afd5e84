//! Error types for harness operations

use crate::stage::Stage;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Fatal errors that abort a run before or during discovery.
///
/// Per-test problems are never reported through this type; they are
/// captured as [`StageFailure`] values in the run summary.
#[derive(Error, Debug)]
pub enum HarnessError {
    /// Platform key did not map to a known target
    #[error("Unknown platform '{0}' (expected one of: x86, x64)")]
    UnknownPlatform(String),

    /// Configuration value rejected during build
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Discovery root missing or unreadable
    #[error("Cannot discover tests under {path}: {source}")]
    Discovery {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Naming convention produced an unusable pattern
    #[error("Invalid naming pattern: {0}")]
    InvalidNamingPattern(#[from] regex::Error),

    /// Stage result moved in a direction the pipeline never allows
    #[error("Invalid stage transition: {current} -> {requested}")]
    InvalidTransition { current: String, requested: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for harness operations
pub type HarnessResult<T> = std::result::Result<T, HarnessError>;

/// Non-fatal failure of one test at one stage.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct StageFailure {
    /// Stage that failed.
    pub stage: Stage,

    /// Exit code of the failing process, if it ran to completion.
    pub exit_code: Option<i32>,

    /// Human-readable reason (stderr tail, spawn error, missing artifact).
    pub detail: String,
}

impl StageFailure {
    pub fn new(stage: Stage, exit_code: Option<i32>, detail: impl Into<String>) -> Self {
        Self {
            stage,
            exit_code,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.exit_code {
            Some(code) => write!(f, "{} failed (exit {}): {}", self.stage, code, self.detail),
            None => write!(f, "{} failed: {}", self.stage, self.detail),
        }
    }
}

impl std::error::Error for StageFailure {}
