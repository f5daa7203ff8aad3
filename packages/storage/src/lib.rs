// ABOUTME: Storage for files uploaded ahead of execution
// ABOUTME: Key-value blob store keyed by opaque file IDs, with local-disk and in-memory backends

pub mod files;
pub mod memory;

pub use files::{FileMetadata, FileStats, FileStore, FileUpload, LocalFileStore, StoredFile};
pub use memory::MemoryFileStore;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;
