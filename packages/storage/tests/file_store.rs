// ABOUTME: Integration tests for the uploaded file stores
// ABOUTME: Exercises upload, lookup, listing, deletion, and statistics on disk and in memory

use polybox_core::Language;
use polybox_storage::{FileStore, FileUpload, LocalFileStore, MemoryFileStore, StorageError};
use tempfile::TempDir;

fn upload(filename: &str, content: &str, language: Language) -> FileUpload {
    FileUpload {
        filename: filename.to_string(),
        content: content.to_string(),
        language,
        encoding: "utf-8".to_string(),
        binary: false,
    }
}

#[tokio::test]
async fn test_local_store_creates_language_directories() {
    let temp_dir = TempDir::new().unwrap();
    let store = LocalFileStore::open(temp_dir.path().join("uploads"))
        .await
        .unwrap();

    for language in Language::ALL {
        assert!(store.root().join(language.as_str()).is_dir());
    }
}

#[tokio::test]
async fn test_local_store_upload_and_get() {
    let temp_dir = TempDir::new().unwrap();
    let store = LocalFileStore::open(temp_dir.path()).await.unwrap();

    let metadata = store
        .upload(upload("hello.py", "print('hello')", Language::Python))
        .await
        .unwrap();

    assert_eq!(metadata.filename, "hello.py");
    assert_eq!(metadata.size, 14);

    let stored = store.get(&metadata.file_id).await.unwrap().unwrap();
    assert_eq!(stored.content, "print('hello')");
    assert_eq!(stored.metadata, metadata);

    let on_disk = temp_dir
        .path()
        .join("python")
        .join(format!("{}_hello.py", metadata.file_id));
    assert!(on_disk.is_file());
}

#[tokio::test]
async fn test_local_store_unknown_and_malformed_ids() {
    let temp_dir = TempDir::new().unwrap();
    let store = LocalFileStore::open(temp_dir.path()).await.unwrap();

    let unknown = uuid_like();
    assert!(store.get(&unknown).await.unwrap().is_none());
    assert!(store.get("../../etc/passwd").await.unwrap().is_none());
    assert!(!store.delete("not-a-uuid").await.unwrap());
}

#[tokio::test]
async fn test_local_store_list_and_delete() {
    let temp_dir = TempDir::new().unwrap();
    let store = LocalFileStore::open(temp_dir.path()).await.unwrap();

    let first = store
        .upload(upload("a.js", "console.log(1)", Language::Node))
        .await
        .unwrap();
    let second = store
        .upload(upload("b.sh", "echo 2", Language::Bash))
        .await
        .unwrap();

    let listed = store.list().await.unwrap();
    assert_eq!(listed.len(), 2);
    assert!(listed.iter().any(|f| f.file_id == first.file_id));
    assert!(listed.iter().any(|f| f.file_id == second.file_id));

    assert!(store.delete(&first.file_id).await.unwrap());
    assert!(!store.delete(&first.file_id).await.unwrap());
    assert!(store.get(&first.file_id).await.unwrap().is_none());
    assert_eq!(store.list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_local_store_stats() {
    let temp_dir = TempDir::new().unwrap();
    let store = LocalFileStore::open(temp_dir.path()).await.unwrap();

    store
        .upload(upload("a.py", "print(1)", Language::Python))
        .await
        .unwrap();
    store
        .upload(upload("b.py", "print(22)", Language::Python))
        .await
        .unwrap();
    store
        .upload(upload("c.sh", "ls", Language::Bash))
        .await
        .unwrap();

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.total_files, 3);
    assert_eq!(stats.total_size, 8 + 9 + 2);
    assert_eq!(stats.files_by_language[&Language::Python], 2);
    assert_eq!(stats.files_by_language[&Language::Bash], 1);
    assert_eq!(stats.files_by_language[&Language::Csharp], 0);
    assert!(stats.upload_dir.is_some());
}

#[tokio::test]
async fn test_local_store_rejects_path_traversal_filename() {
    let temp_dir = TempDir::new().unwrap();
    let store = LocalFileStore::open(temp_dir.path()).await.unwrap();

    let result = store
        .upload(upload("../escape.py", "print(1)", Language::Python))
        .await;
    assert!(matches!(result, Err(StorageError::InvalidInput(_))));
}

#[tokio::test]
async fn test_memory_store_contract() {
    let store = MemoryFileStore::new();

    let metadata = store
        .upload(upload("Program.cs", "Console.WriteLine(1);", Language::Csharp))
        .await
        .unwrap();

    let stored = store.get(&metadata.file_id).await.unwrap().unwrap();
    assert_eq!(stored.metadata.language, Language::Csharp);
    assert_eq!(stored.content, "Console.WriteLine(1);");

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.total_files, 1);
    assert_eq!(stats.files_by_language[&Language::Csharp], 1);

    assert!(store.delete(&metadata.file_id).await.unwrap());
    assert!(store.list().await.unwrap().is_empty());
}

fn uuid_like() -> String {
    "7f0c2a4e-3b1d-4c5e-9f6a-0123456789ab".to_string()
}
