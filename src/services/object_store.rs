//! src/services/object_store.rs
//!
//! Object storage for uploaded scans. `ObjectStore` is the capability the
//! pipeline depends on; `LocalObjectStore` keeps payloads on local disk
//! beneath `base_path/{bucket}/{key}` and serves them back through
//! `GET /objects/{*key}`. The Supabase-backed implementation lives in
//! `services::supabase`.

use async_trait::async_trait;
use bytes::Bytes;
use md5::Context;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    time::Duration,
};
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object `{0}` already exists")]
    AlreadyExists(String),
    #[error("object `{0}` not found")]
    ObjectNotFound(String),
    #[error("invalid object key `{0}`")]
    InvalidObjectKey(String),
    #[error("object store rejected upload ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("object store request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("object store call timed out after {0:?}")]
    Timeout(Duration),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// A blob store addressed by key that hands out public URLs.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `body` under `key`. Must fail with `AlreadyExists` rather than
    /// overwrite an existing object.
    async fn upload(&self, key: &str, body: Bytes, content_type: &str) -> StorageResult<()>;

    /// Publicly resolvable URL for `key`.
    fn public_url(&self, key: &str) -> String;
}

const MAX_OBJECT_KEY_LEN: usize = 1024;

/// Disk-backed object store.
#[derive(Clone, Debug)]
pub struct LocalObjectStore {
    /// Root directory for all buckets.
    pub base_path: PathBuf,

    /// Bucket (subdirectory) objects are written to.
    pub bucket: String,

    /// Externally visible origin of this service, e.g. `http://localhost:5000`.
    pub public_base_url: String,
}

impl LocalObjectStore {
    pub fn new(
        base_path: impl Into<PathBuf>,
        bucket: impl Into<String>,
        public_base_url: impl Into<String>,
    ) -> Self {
        Self {
            base_path: base_path.into(),
            bucket: bucket.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Reject keys that could escape the bucket directory.
    fn ensure_key_safe(&self, key: &str) -> StorageResult<()> {
        let invalid = key.is_empty()
            || key.len() > MAX_OBJECT_KEY_LEN
            || key.starts_with('/')
            || key.ends_with('/')
            || key.contains("..")
            || key
                .bytes()
                .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0');
        if invalid {
            return Err(StorageError::InvalidObjectKey(key.to_string()));
        }
        Ok(())
    }

    fn bucket_root(&self) -> PathBuf {
        self.base_path.join(&self.bucket)
    }

    fn object_path(&self, key: &str) -> PathBuf {
        self.bucket_root().join(key)
    }

    /// Open a stored object for streaming. Returns the file and its length.
    pub async fn open(&self, key: &str) -> StorageResult<(File, u64)> {
        self.ensure_key_safe(key)?;
        let path = self.object_path(key);
        let file = File::open(&path).await.map_err(|err| match err.kind() {
            ErrorKind::NotFound => StorageError::ObjectNotFound(key.to_string()),
            _ => StorageError::Io(err),
        })?;
        let meta = file.metadata().await?;
        if !meta.is_file() {
            return Err(StorageError::ObjectNotFound(key.to_string()));
        }
        Ok((file, meta.len()))
    }

    /// Write `body` to a temp file next to the target, fsync it, then
    /// hard-link it into place. Linking fails if the target exists.
    async fn write_new(&self, path: &Path, key: &str, body: &Bytes) -> StorageResult<String> {
        let parent = path.parent().map(Path::to_path_buf).ok_or_else(|| {
            StorageError::Io(io::Error::new(
                ErrorKind::Other,
                "object path missing parent directory",
            ))
        })?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));

        let result: StorageResult<String> = async {
            let mut file = File::create(&tmp_path).await?;
            let mut digest = Context::new();
            digest.consume(body);
            file.write_all(body).await?;
            file.flush().await?;
            file.sync_all().await?;
            drop(file);

            match fs::hard_link(&tmp_path, path).await {
                Ok(()) => Ok(format!("{:x}", digest.compute())),
                Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                    Err(StorageError::AlreadyExists(key.to_string()))
                }
                Err(err) => Err(StorageError::Io(err)),
            }
        }
        .await;

        if let Err(err) = fs::remove_file(&tmp_path).await {
            if err.kind() != ErrorKind::NotFound {
                debug!("failed to remove temp file {}: {}", tmp_path.display(), err);
            }
        }

        result
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn upload(&self, key: &str, body: Bytes, content_type: &str) -> StorageResult<()> {
        self.ensure_key_safe(key)?;
        let path = self.object_path(key);
        let etag = self.write_new(&path, key, &body).await?;
        debug!(
            key,
            content_type,
            size_bytes = body.len(),
            etag = %etag,
            "stored object on local disk"
        );
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/objects/{}", self.public_base_url, key)
    }
}

/// Best-effort content type for a stored object, from its extension.
pub fn content_type_for_key(key: &str) -> &'static str {
    let ext = Path::new(key)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("bmp") => "image/bmp",
        Some("heic") => "image/heic",
        _ => "application/octet-stream",
    }
}
