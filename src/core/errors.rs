//! Fatal worker errors and their protocol representation.

use serde_json::{json, Value};
use thiserror::Error;

/// Errors that end a run before the pipeline is running.
///
/// Each is reported once as an `error` event and exits with status 1.
#[derive(Debug, Clone, Error)]
pub enum WorkerError {
    #[error("Missing required argument: output path")]
    MissingOutputPath,

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing dependency: {0}")]
    MissingDependency(String),

    #[error("Failed to create pipeline: {reason}")]
    Instantiation { reason: String, graph: String },

    #[error("Failed to start pipeline: {0}")]
    Start(String),

    #[error("Unexpected failure: {0}")]
    Internal(String),
}

impl WorkerError {
    /// Stable identifier used in the `details.kind` field
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingOutputPath => "missing_output_path",
            Self::InvalidArguments(_) => "invalid_arguments",
            Self::Config(_) => "config",
            Self::MissingDependency(_) => "missing_dependency",
            Self::Instantiation { .. } => "instantiation",
            Self::Start(_) => "start",
            Self::Internal(_) => "internal",
        }
    }

    /// `details` object of the `error` event
    pub fn details(&self) -> Value {
        let mut details = json!({ "kind": self.kind(), "fatal": true });
        if let Self::Instantiation { graph, .. } = self {
            details["graph"] = Value::String(graph.clone());
        }
        details
    }

    /// Process exit status for this error
    pub fn exit_code(&self) -> i32 {
        1
    }
}
