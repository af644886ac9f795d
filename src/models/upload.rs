//! An inbound upload and the on-disk staging copy that backs it.

use bytes::Bytes;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use tokio::fs::{self, File};
use tracing::warn;
use uuid::Uuid;

/// A temporary file holding an uploaded payload.
///
/// The file is removed when the guard is dropped, so every exit path of a
/// request (success, error, timeout, or a dropped future) cleans up.
#[derive(Debug)]
pub struct StagedFile {
    path: PathBuf,
}

impl StagedFile {
    /// Create an empty staging file under `dir`.
    pub async fn create(dir: &Path) -> io::Result<(Self, File)> {
        fs::create_dir_all(dir).await?;
        let path = dir.join(format!(".upload-{}", Uuid::new_v4()));
        let file = File::create(&path).await?;
        Ok((Self { path }, file))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the staged payload back into memory.
    pub async fn read(&self) -> io::Result<Bytes> {
        fs::read(&self.path).await.map(Bytes::from)
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if let Err(err) = std::fs::remove_file(&self.path) {
            if err.kind() != ErrorKind::NotFound {
                warn!(
                    path = %self.path.display(),
                    error = %err,
                    "failed to remove staged upload"
                );
            }
        }
    }
}

/// The `file` part of an analyze request.
#[derive(Debug)]
pub struct UploadedFile {
    pub staged: StagedFile,
    pub filename: String,
    pub content_type: String,
    pub size_bytes: u64,
}

/// A validated analyze request.
#[derive(Debug)]
pub struct UploadRequest {
    pub file: UploadedFile,
    pub user_id: String,
    pub device_name: String,
}
