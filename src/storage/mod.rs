//! Blob storage for uploaded images (payment QR codes and completion proofs)
//!
//! Files are content-addressed by SHA-256, so re-uploading the same bytes is
//! idempotent.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::error::ApiError;

/// Maximum file size (5MB)
pub const MAX_FILE_SIZE: usize = 5 * 1024 * 1024;

/// Supported image formats
const SUPPORTED_FORMATS: &[&str] = &["png", "jpg", "jpeg", "webp"];

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("{0}")]
    Invalid(String),

    #[error("Failed to store file: {0}")]
    Io(#[from] std::io::Error),
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Invalid(msg) => ApiError::Validation(msg),
            StorageError::Io(e) => ApiError::Storage(e.to_string()),
        }
    }
}

/// A file received in a multipart request
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: None,
            bytes,
        }
    }

    /// Lower-cased extension, falling back to the content type
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_lowercase())
            .or_else(|| {
                self.content_type
                    .as_deref()
                    .and_then(|ct| ct.strip_prefix("image/"))
                    .map(|ext| ext.to_lowercase())
            })
    }

    /// Check size and format before anything touches storage
    pub fn validate(&self) -> Result<String, StorageError> {
        if self.bytes.is_empty() {
            return Err(StorageError::Invalid("Uploaded file is empty".to_string()));
        }
        if self.bytes.len() > MAX_FILE_SIZE {
            return Err(StorageError::Invalid(format!(
                "File too large. Maximum size is {} bytes ({}MB)",
                MAX_FILE_SIZE,
                MAX_FILE_SIZE / 1024 / 1024
            )));
        }

        let ext = self.extension().unwrap_or_default();
        if !SUPPORTED_FORMATS.contains(&ext.as_str()) {
            return Err(StorageError::Invalid(format!(
                "Unsupported file format '{}'. Supported: {}",
                ext,
                SUPPORTED_FORMATS.join(", ")
            )));
        }
        Ok(ext)
    }

    /// Content-addressed object key within `folder`
    fn object_key(&self, folder: &str, ext: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.bytes);
        format!("{}/{}.{}", folder, hex::encode(hasher.finalize()), ext)
    }
}

/// Where a blob ended up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    pub key: String,
    pub url: String,
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, folder: &str, file: &UploadedFile) -> Result<StoredBlob, StorageError>;
}

/// Blob store writing to a local directory served under `/uploads`
pub struct LocalBlobStore {
    root: PathBuf,
    public_base_url: String,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(&self, folder: &str, file: &UploadedFile) -> Result<StoredBlob, StorageError> {
        let ext = file.validate()?;
        let key = file.object_key(folder, &ext);
        let path = self.root.join(&key);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            tracing::debug!(key = %key, "Blob already stored, reusing");
        } else {
            tokio::fs::write(&path, &file.bytes).await?;
            tracing::info!(key = %key, size = file.bytes.len(), "Blob stored");
        }

        Ok(StoredBlob {
            url: format!("{}/uploads/{}", self.public_base_url, key),
            key,
        })
    }
}

/// Blob store kept in memory
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.blobs.read().await.get(key).cloned()
    }

    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, folder: &str, file: &UploadedFile) -> Result<StoredBlob, StorageError> {
        let ext = file.validate()?;
        let key = file.object_key(folder, &ext);
        self.blobs
            .write()
            .await
            .insert(key.clone(), file.bytes.clone());

        Ok(StoredBlob {
            url: format!("memory://{}", key),
            key,
        })
    }
}
