//! Blob storage backing the reserved `files` class.

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use regex::Regex;
use std::sync::{Arc, LazyLock};

use super::store::{StoreError, StoreResult};
use super::types::{new_id, now_secs};

static UNSAFE_NAME_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[/\\:\s]+").expect("file name pattern compiles"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub id: String,
    pub name: String,
    pub content_type: Option<String>,
    pub created_at: i32,
    pub bytes: Bytes,
}

#[async_trait]
pub trait FileStore: Send + Sync {
    /// Stores the bytes under a fresh id derived from `name` and returns the stored record.
    async fn put(
        &self,
        name: Option<&str>,
        content_type: Option<String>,
        bytes: Bytes,
    ) -> StoreResult<StoredFile>;

    async fn get(&self, id: &str) -> StoreResult<StoredFile>;
}

/// Strips path separators, colons and whitespace from a client-supplied file name.
pub fn sanitize_file_name(name: &str) -> String {
    UNSAFE_NAME_CHARS.replace_all(name, "").into_owned()
}

#[derive(Debug, Default)]
pub struct MemoryFileStore {
    files: DashMap<String, StoredFile>,
}

impl MemoryFileStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl FileStore for MemoryFileStore {
    async fn put(
        &self,
        name: Option<&str>,
        content_type: Option<String>,
        bytes: Bytes,
    ) -> StoreResult<StoredFile> {
        let object_id = new_id();
        let (id, name) = match name.map(sanitize_file_name).filter(|n| !n.is_empty()) {
            Some(clean) => (format!("{}-{}", object_id, clean), clean),
            None => (object_id.clone(), object_id),
        };

        let file = StoredFile {
            id: id.clone(),
            name,
            content_type,
            created_at: now_secs(),
            bytes,
        };
        self.files.insert(id.clone(), file.clone());
        tracing::debug!("Stored file {} ({} bytes)", id, file.bytes.len());
        Ok(file)
    }

    async fn get(&self, id: &str) -> StoreResult<StoredFile> {
        self.files
            .get(id)
            .map(|file| file.value().clone())
            .ok_or(StoreError::NotFound)
    }
}
