// ABOUTME: File store trait and local-disk implementation for uploaded source files
// ABOUTME: Files live in per-language directories next to a JSON metadata sidecar

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use polybox_core::Language;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

use crate::{Result, StorageError};

/// Request to store a file for later execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileUpload {
    pub filename: String,
    pub content: String,
    pub language: Language,
    #[serde(default = "default_encoding")]
    pub encoding: String,
    #[serde(default)]
    pub binary: bool,
}

fn default_encoding() -> String {
    "utf-8".to_string()
}

/// Metadata describing a stored file, safe to return to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub file_id: String,
    pub filename: String,
    pub language: Language,
    pub size: u64,
    pub uploaded_at: DateTime<Utc>,
    pub encoding: String,
    pub binary: bool,
}

/// Stored file with its content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredFile {
    #[serde(flatten)]
    pub metadata: FileMetadata,
    pub content: String,
}

/// Aggregate statistics over all stored files
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileStats {
    pub total_files: usize,
    pub files_by_language: BTreeMap<Language, usize>,
    pub total_size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload_dir: Option<String>,
}

/// Blob store keyed by opaque file IDs
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Store a file and return its metadata (including the generated ID)
    async fn upload(&self, upload: FileUpload) -> Result<FileMetadata>;

    /// Fetch a file with its content, `None` if the ID is unknown
    async fn get(&self, file_id: &str) -> Result<Option<StoredFile>>;

    /// List metadata for every stored file
    async fn list(&self) -> Result<Vec<FileMetadata>>;

    /// Delete a file, returning whether it existed
    async fn delete(&self, file_id: &str) -> Result<bool>;

    /// Aggregate statistics
    async fn stats(&self) -> Result<FileStats>;
}

/// Validate an upload before anything is written
pub(crate) fn validate_upload(upload: &FileUpload) -> Result<()> {
    let name = upload.filename.trim();
    if name.is_empty() {
        return Err(StorageError::InvalidInput(
            "filename cannot be empty".to_string(),
        ));
    }

    if name.contains('/') || name.contains('\\') || name.contains("..") {
        return Err(StorageError::InvalidInput(format!(
            "filename '{}' must not contain path separators or '..'",
            upload.filename
        )));
    }

    let encoding = upload.encoding.to_ascii_lowercase();
    if encoding != "utf-8" && encoding != "utf8" {
        return Err(StorageError::InvalidInput(format!(
            "unsupported encoding '{}', only utf-8 is accepted",
            upload.encoding
        )));
    }

    Ok(())
}

/// File IDs are UUIDs; anything else can never name a stored file
pub(crate) fn is_valid_file_id(file_id: &str) -> bool {
    uuid::Uuid::parse_str(file_id).is_ok()
}

/// Metadata as persisted on disk, including the host path of the content
#[derive(Debug, Serialize, Deserialize)]
struct DiskMetadata {
    #[serde(flatten)]
    metadata: FileMetadata,
    file_path: PathBuf,
}

/// File store rooted at a local upload directory
pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    /// Open (and create if needed) an upload directory with per-language subdirectories
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        for language in Language::ALL {
            fs::create_dir_all(root.join(language.as_str())).await?;
        }

        info!("File store ready at {}", root.display());
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn language_dir(&self, language: Language) -> PathBuf {
        self.root.join(language.as_str())
    }

    fn metadata_path(&self, language: Language, file_id: &str) -> PathBuf {
        self.language_dir(language)
            .join(format!("{}_metadata.json", file_id))
    }

    /// Locate and parse the metadata sidecar for a file ID
    async fn find_metadata(&self, file_id: &str) -> Result<Option<(PathBuf, DiskMetadata)>> {
        if !is_valid_file_id(file_id) {
            return Ok(None);
        }

        for language in Language::ALL {
            let path = self.metadata_path(language, file_id);
            match fs::read(&path).await {
                Ok(bytes) => {
                    let metadata: DiskMetadata = serde_json::from_slice(&bytes)?;
                    return Ok(Some((path, metadata)));
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Ok(None)
    }

    async fn read_all_metadata(&self) -> Result<Vec<FileMetadata>> {
        let mut files = Vec::new();

        for language in Language::ALL {
            let dir = self.language_dir(language);
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };

            while let Some(entry) = entries.next_entry().await? {
                let name = entry.file_name();
                let name = name.to_string_lossy();
                if !name.ends_with("_metadata.json") {
                    continue;
                }

                let parsed = fs::read(entry.path())
                    .await
                    .map_err(StorageError::from)
                    .and_then(|bytes| {
                        serde_json::from_slice::<DiskMetadata>(&bytes).map_err(StorageError::from)
                    });

                match parsed {
                    Ok(disk) => files.push(disk.metadata),
                    Err(e) => {
                        warn!("Skipping unreadable metadata file {}: {}", name, e);
                    }
                }
            }
        }

        files.sort_by(|a, b| a.uploaded_at.cmp(&b.uploaded_at));
        Ok(files)
    }
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn upload(&self, upload: FileUpload) -> Result<FileMetadata> {
        validate_upload(&upload)?;

        let file_id = uuid::Uuid::new_v4().to_string();
        let language_dir = self.language_dir(upload.language);
        let file_path = language_dir.join(format!("{}_{}", file_id, upload.filename.trim()));

        fs::write(&file_path, upload.content.as_bytes()).await?;

        let metadata = FileMetadata {
            file_id: file_id.clone(),
            filename: upload.filename.trim().to_string(),
            language: upload.language,
            size: upload.content.len() as u64,
            uploaded_at: Utc::now(),
            encoding: upload.encoding,
            binary: upload.binary,
        };

        let disk = DiskMetadata {
            metadata: metadata.clone(),
            file_path,
        };
        let json = serde_json::to_vec_pretty(&disk)?;
        fs::write(self.metadata_path(upload.language, &file_id), json).await?;

        debug!(
            "Stored {} file {} ({} bytes)",
            metadata.language, metadata.file_id, metadata.size
        );
        Ok(metadata)
    }

    async fn get(&self, file_id: &str) -> Result<Option<StoredFile>> {
        let Some((_, disk)) = self.find_metadata(file_id).await? else {
            return Ok(None);
        };

        match fs::read_to_string(&disk.file_path).await {
            Ok(content) => Ok(Some(StoredFile {
                metadata: disk.metadata,
                content,
            })),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Metadata for {} exists but content is missing", file_id);
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self) -> Result<Vec<FileMetadata>> {
        self.read_all_metadata().await
    }

    async fn delete(&self, file_id: &str) -> Result<bool> {
        let Some((metadata_path, disk)) = self.find_metadata(file_id).await? else {
            return Ok(false);
        };

        match fs::remove_file(&disk.file_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        fs::remove_file(&metadata_path).await?;

        info!("Deleted uploaded file {}", file_id);
        Ok(true)
    }

    async fn stats(&self) -> Result<FileStats> {
        let files = self.read_all_metadata().await?;

        let mut stats = FileStats {
            upload_dir: Some(self.root.display().to_string()),
            ..Default::default()
        };
        for language in Language::ALL {
            stats.files_by_language.insert(language, 0);
        }
        for file in &files {
            *stats.files_by_language.entry(file.language).or_default() += 1;
            stats.total_size += file.size;
        }
        stats.total_files = files.len();

        Ok(stats)
    }
}
