//! Error types for the gptscript client.

pub mod unified;

pub use unified::{ErrorCategory, WorkspaceConflict};

use thiserror::Error;

/// Primary error type for all client operations.
#[derive(Error, Debug)]
pub enum GptscriptError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Decode error: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error(transparent)]
    Run(#[from] RunError),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Timeout after {0}ms")]
    Timeout(u64),

    #[error("not found: {workspace_id}/{name}")]
    NotFoundInWorkspace { workspace_id: String, name: String },

    #[error(transparent)]
    WorkspaceConflict(#[from] WorkspaceConflict),
}

/// Terminal error recorded on a [`Run`](crate::run::Run).
///
/// Cloneable so that every call to `text()` after resolution can report the
/// same failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RunError {
    /// The request could not be built or sent.
    #[error("failed to make request: {0}")]
    Dispatch(String),

    /// The engine answered 404.
    #[error("{0}")]
    NotFound(String),

    /// The engine answered with a non-success status other than 404.
    #[error("run encountered an error (status {status}): {message}")]
    Status { status: u16, message: String },

    /// A prompt frame arrived on a run that did not allow prompting.
    #[error("prompt event occurred when prompt was not allowed: {0}")]
    PromptNotAllowed(String),

    /// A run-finish frame carried an error string.
    #[error("{0}")]
    Engine(String),

    /// The response body failed mid-stream.
    #[error("failed to read output: {0}")]
    Stream(String),

    /// The caller closed the run before it resolved.
    #[error("run was cancelled")]
    Cancelled,
}

impl RunError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Dispatch(_) | Self::Stream(_) => ErrorCategory::Transport,
            Self::NotFound(_) => ErrorCategory::NotFound,
            Self::Status { .. } => ErrorCategory::Server,
            Self::PromptNotAllowed(_) => ErrorCategory::Protocol,
            Self::Engine(_) => ErrorCategory::Engine,
            Self::Cancelled => ErrorCategory::Cancelled,
        }
    }
}

impl GptscriptError {
    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration(_) => ErrorCategory::Configuration,
            Self::Network(_) | Self::Io(_) => ErrorCategory::Transport,
            Self::Serialization(_) | Self::Decode(_) => ErrorCategory::Serialization,
            Self::Run(err) => err.category(),
            Self::Timeout(_) => ErrorCategory::Timeout,
            Self::NotFoundInWorkspace { .. } => ErrorCategory::NotFound,
            Self::WorkspaceConflict(_) => ErrorCategory::Conflict,
            Self::InvalidState(_) | Self::InvalidArgument(_) | Self::UnsupportedOperation(_) => {
                ErrorCategory::Usage
            }
        }
    }

    /// Whether the engine reported that the requested entity does not exist.
    pub fn is_not_found(&self) -> bool {
        self.category() == ErrorCategory::NotFound
    }

    /// Whether this error came from a deliberate [`Run::close`](crate::run::Run::close).
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Run(RunError::Cancelled))
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, GptscriptError>;
