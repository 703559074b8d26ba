//! In-memory file store shared by the coordinator and the HTTP API.
//!
//! Records live for the lifetime of the process. There is no delete and no
//! eviction; deployments that need a capacity bound have to add it outside.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use lanchat_shared::{FileRef, FileUpload};

/// File metadata plus content.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileRecord {
    pub name: String,
    pub size: u64,
    pub media_type: String,
    pub content: Bytes,
}

impl FileRecord {
    pub fn has_content(&self) -> bool {
        !self.content.is_empty()
    }

    /// Content-free view of this record, safe to hand to clients.
    pub fn reference(&self, id: impl Into<String>) -> FileRef {
        FileRef {
            id: id.into(),
            name: self.name.clone(),
            size: self.size,
            media_type: self.media_type.clone(),
        }
    }

    /// Fold a later update into this record.
    ///
    /// Only non-empty incoming values win, so an update never blanks a field
    /// that is already known. Content in particular is never replaced by
    /// empty content.
    fn merge(&mut self, update: FileRecord) {
        if !update.name.is_empty() {
            self.name = update.name;
        }
        if update.size > 0 {
            self.size = update.size;
        }
        if !update.media_type.is_empty() {
            self.media_type = update.media_type;
        }
        if !update.content.is_empty() {
            self.content = update.content;
        }
    }
}

impl From<FileUpload> for FileRecord {
    fn from(upload: FileUpload) -> Self {
        Self {
            name: upload.name,
            size: upload.size,
            media_type: upload.media_type,
            content: upload.content,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BlobStore {
    files: Arc<RwLock<HashMap<String, FileRecord>>>,
}

impl BlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `record` under `id`, or merge it into the existing record.
    pub async fn set(&self, id: &str, record: FileRecord) {
        if record.size == 0 {
            warn!(id, name = %record.name, "Storing file with zero size");
        }

        let mut files = self.files.write().await;
        match files.get_mut(id) {
            Some(existing) => {
                existing.merge(record);
                debug!(
                    id,
                    name = %existing.name,
                    content_len = existing.content.len(),
                    "Merged file record"
                );
            }
            None => {
                debug!(
                    id,
                    name = %record.name,
                    content_len = record.content.len(),
                    "Stored new file record"
                );
                files.insert(id.to_string(), record);
            }
        }
    }

    pub async fn get(&self, id: &str) -> Option<FileRecord> {
        self.files.read().await.get(id).cloned()
    }

    pub async fn file_count(&self) -> usize {
        self.files.read().await.len()
    }
}
