// ABOUTME: Error types for sandbox lifecycle and execution
// ABOUTME: Wraps Docker, storage and validation failures behind one enum

use polybox_core::CoreError;
use polybox_storage::StorageError;
use thiserror::Error;

/// Main error type for sandbox operations
#[derive(Error, Debug)]
pub enum SandboxError {
    /// Request rejected before any engine call
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error("Image not found: {0}")]
    ImageNotFound(String),

    #[error("Container not found: {0}")]
    ContainerNotFound(String),

    #[error("Execution not found: {0}")]
    ExecutionNotFound(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    /// Container engine could not be reached
    #[error("Container engine unavailable: {0}")]
    EngineUnavailable(String),

    /// Image build failed; `logs` holds whatever the builder produced first
    #[error("Build failed: {message}")]
    BuildFailed { message: String, logs: Vec<String> },

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    /// Engine request exceeded the configured client timeout
    #[error("Engine request timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    #[error("Docker error: {0}")]
    Docker(#[from] bollard::errors::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<CoreError> for SandboxError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::UnsupportedLanguage(language) => SandboxError::UnsupportedLanguage(language),
        }
    }
}

impl SandboxError {
    /// Whether the error names something that does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            SandboxError::ImageNotFound(_)
                | SandboxError::ContainerNotFound(_)
                | SandboxError::ExecutionNotFound(_)
                | SandboxError::FileNotFound(_)
        )
    }

    /// Build logs carried by the error, if any
    pub fn build_logs(&self) -> Vec<String> {
        match self {
            SandboxError::BuildFailed { logs, .. } => logs.clone(),
            _ => Vec::new(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SandboxError>;
