// ABOUTME: In-memory file store used by tests and ephemeral deployments
// ABOUTME: Same contract as the local-disk store without touching the filesystem

use async_trait::async_trait;
use chrono::Utc;
use polybox_core::Language;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::files::{validate_upload, FileMetadata, FileStats, FileStore, FileUpload, StoredFile};
use crate::Result;

#[derive(Default)]
pub struct MemoryFileStore {
    files: RwLock<HashMap<String, StoredFile>>,
}

impl MemoryFileStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FileStore for MemoryFileStore {
    async fn upload(&self, upload: FileUpload) -> Result<FileMetadata> {
        validate_upload(&upload)?;

        let metadata = FileMetadata {
            file_id: uuid::Uuid::new_v4().to_string(),
            filename: upload.filename.trim().to_string(),
            language: upload.language,
            size: upload.content.len() as u64,
            uploaded_at: Utc::now(),
            encoding: upload.encoding,
            binary: upload.binary,
        };

        let mut files = self.files.write().await;
        files.insert(
            metadata.file_id.clone(),
            StoredFile {
                metadata: metadata.clone(),
                content: upload.content,
            },
        );

        Ok(metadata)
    }

    async fn get(&self, file_id: &str) -> Result<Option<StoredFile>> {
        let files = self.files.read().await;
        Ok(files.get(file_id).cloned())
    }

    async fn list(&self) -> Result<Vec<FileMetadata>> {
        let files = self.files.read().await;
        let mut list: Vec<FileMetadata> = files.values().map(|f| f.metadata.clone()).collect();
        list.sort_by(|a, b| a.uploaded_at.cmp(&b.uploaded_at));
        Ok(list)
    }

    async fn delete(&self, file_id: &str) -> Result<bool> {
        let mut files = self.files.write().await;
        Ok(files.remove(file_id).is_some())
    }

    async fn stats(&self) -> Result<FileStats> {
        let files = self.files.read().await;

        let mut stats = FileStats::default();
        for language in Language::ALL {
            stats.files_by_language.insert(language, 0);
        }
        for file in files.values() {
            *stats
                .files_by_language
                .entry(file.metadata.language)
                .or_default() += 1;
            stats.total_size += file.metadata.size;
        }
        stats.total_files = files.len();

        Ok(stats)
    }
}
