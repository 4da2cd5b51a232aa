//! Error types for the pipeline.

use thiserror::Error;

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors that can occur while selecting, staging or running observations.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The catalog returned nothing usable or the manifest is malformed.
    #[error("Selection failed: {0}")]
    Selection(String),

    /// A required header, archive or upstream artifact is absent.
    #[error("Lookup failed: {0}")]
    Lookup(String),

    /// An external tool exited non-zero.
    #[error("{tool} exited with {}: {stderr}", .code.map(|c| c.to_string()).unwrap_or_else(|| "signal".to_string()))]
    Subprocess {
        tool: String,
        code: Option<i32>,
        stderr: String,
    },

    /// A stage ran past its time ceiling and was killed.
    #[error("{stage} exceeded its time limit of {limit_secs:.0}s")]
    ResourceExceeded { stage: String, limit_secs: f64 },

    /// A tool ran but its output could not be interpreted.
    #[error("Unexpected output from {tool}: {message}")]
    ToolOutput { tool: String, message: String },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Catalog error: {0}")]
    Catalog(#[from] meerpipe_catalog::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] meerpipe_config::ConfigError),

    /// Failed to initialize the workflow engine.
    #[error("Engine initialization failed: {0}")]
    InitFailed(String),

    #[error("Workflow not found: {0}")]
    WorkflowNotFound(String),

    /// Workflow execution failed inside the engine.
    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Invalid workflow: {0}")]
    InvalidWorkflow(String),

    /// Cloacina runtime error.
    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error("Shutdown error: {0}")]
    ShutdownFailed(String),
}

impl PipelineError {
    /// Whether another attempt with a larger ceiling could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PipelineError::Subprocess { .. } | PipelineError::ResourceExceeded { .. }
        )
    }

    pub(crate) fn io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        PipelineError::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }
}

impl From<cloacina::PipelineError> for PipelineError {
    fn from(err: cloacina::PipelineError) -> Self {
        PipelineError::Runtime(err.to_string())
    }
}
