//! File storage facades.
//!
//! Bytes live in a per-component [`BlobStore`] outside the transaction
//! layers; the metadata row in `_storage` is transactional, so a stored file
//! whose action rolled back is unreachable.

use crate::error::{CoreError, CoreResult};
use crate::identity::hex_digest;
use crate::runtime::Component;
use docsim_values::{DocumentId, Value};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::ops::Deref;
use std::sync::Arc;

/// System table holding file metadata.
pub const STORAGE_TABLE: &str = "_storage";

/// Raw bytes of stored files, keyed by storage id.
#[derive(Debug, Default)]
pub(crate) struct BlobStore {
    blobs: Mutex<HashMap<DocumentId, Vec<u8>>>,
}

impl BlobStore {
    fn put(&self, id: DocumentId, bytes: Vec<u8>) {
        self.blobs.lock().insert(id, bytes);
    }

    fn get(&self, id: &DocumentId) -> Option<Vec<u8>> {
        self.blobs.lock().get(id).cloned()
    }

    fn remove(&self, id: &DocumentId) {
        self.blobs.lock().remove(id);
    }

    pub(crate) fn clear(&self) {
        self.blobs.lock().clear();
    }
}

/// Metadata of a stored file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    /// Storage id.
    pub storage_id: DocumentId,
    /// Lower-case hex SHA-256 of the contents.
    pub sha256: String,
    /// Size in bytes.
    pub size: u64,
    /// Content type given when stored.
    pub content_type: Option<String>,
}

/// Read access: URLs and metadata.
#[derive(Debug, Clone)]
pub struct StorageReader {
    component: Arc<Component>,
    url_base: String,
}

impl StorageReader {
    pub(crate) fn new(component: Arc<Component>, url_base: String) -> Self {
        Self {
            component,
            url_base,
        }
    }

    fn parse(&self, id: &str) -> Option<DocumentId> {
        self.component.store().normalize_id(STORAGE_TABLE, id)
    }

    /// Returns a URL for a stored file, or `None` if it does not exist.
    #[must_use]
    pub fn get_url(&self, id: &str) -> Option<String> {
        let id = self.parse(id)?;
        self.component.store().get(&id)?;
        Some(format!("{}/{}", self.url_base.trim_end_matches('/'), id))
    }

    /// Returns metadata of a stored file, or `None` if it does not exist.
    #[must_use]
    pub fn get_metadata(&self, id: &str) -> Option<FileMetadata> {
        let id = self.parse(id)?;
        let doc = self.component.store().get(&id)?;
        Some(FileMetadata {
            storage_id: id,
            sha256: doc.get_str("sha256").unwrap_or_default().to_string(),
            size: doc
                .fields()
                .get("size")
                .and_then(Value::as_f64)
                .map_or(0, |size| size as u64),
            content_type: doc.get_str("contentType").map(str::to_string),
        })
    }
}

/// Mutation scope: adds deletion.
#[derive(Debug, Clone)]
pub struct StorageWriter {
    reader: StorageReader,
}

impl StorageWriter {
    pub(crate) fn new(reader: StorageReader) -> Self {
        Self { reader }
    }

    /// Deletes a stored file.
    pub fn delete(&self, id: &str) -> CoreResult<()> {
        let storage_id = self.reader.parse(id).ok_or_else(|| CoreError::StorageNotFound {
            id: id.to_string(),
        })?;
        let component = &self.reader.component;
        component
            .store()
            .delete_system(&storage_id)
            .map_err(|_| CoreError::StorageNotFound { id: id.to_string() })?;
        component.blobs().remove(&storage_id);
        Ok(())
    }
}

impl Deref for StorageWriter {
    type Target = StorageReader;

    fn deref(&self) -> &StorageReader {
        &self.reader
    }
}

/// Action scope: adds storing and reading bytes.
#[derive(Debug, Clone)]
pub struct ActionStorage {
    writer: StorageWriter,
}

impl ActionStorage {
    pub(crate) fn new(writer: StorageWriter) -> Self {
        Self { writer }
    }

    /// Stores `bytes` and returns the new storage id.
    pub fn store(&self, bytes: impl Into<Vec<u8>>, content_type: Option<&str>) -> CoreResult<DocumentId> {
        let bytes = bytes.into();
        let mut fields = BTreeMap::new();
        fields.insert("sha256".to_string(), Value::from(hex_digest(&bytes)));
        fields.insert("size".to_string(), Value::Float64(bytes.len() as f64));
        if let Some(content_type) = content_type {
            fields.insert("contentType".to_string(), Value::from(content_type));
        }
        let component = &self.writer.reader.component;
        let id = component.store().insert_system(STORAGE_TABLE, fields)?;
        component.blobs().put(id.clone(), bytes);
        Ok(id)
    }

    /// Reads a stored file's bytes, or `None` if it does not exist.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Vec<u8>> {
        let reader = &self.writer.reader;
        let id = reader.parse(id)?;
        reader.component.store().get(&id)?;
        reader.component.blobs().get(&id)
    }
}

impl Deref for ActionStorage {
    type Target = StorageWriter;

    fn deref(&self) -> &StorageWriter {
        &self.writer
    }
}
