//! The analyze pipeline: upload -> classify -> persist.
//!
//! Each stage talks to one collaborator through its trait and is bounded by
//! `call_timeout`. Upload and classification failures abort the request
//! before anything is persisted. A failed insert does not: the image is
//! already stored, so the outcome carries a warning instead.

use crate::{
    models::{inspection::InspectionRecord, upload::UploadRequest},
    services::{
        classifier::{Classifier, ImageInput, InferenceError},
        object_store::{ObjectStore, StorageError},
        record_store::{PersistenceError, RecordStore},
    },
};
use chrono::Utc;
use std::{future::Future, io, path::Path, sync::Arc, time::Duration};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum AnalyzeError {
    #[error("Storage upload failed: {0}")]
    Storage(#[from] StorageError),
    #[error("Inference failed: {0}")]
    Inference(#[from] InferenceError),
    #[error("Staged upload unreadable: {0}")]
    Staging(#[from] io::Error),
}

/// Result of a completed pipeline run.
#[derive(Debug, Clone)]
pub struct AnalyzeOutcome {
    pub record: InspectionRecord,
    pub storage_key: String,
    /// Set when the record could not be persisted.
    pub warning: Option<String>,
}

pub struct AnalyzePipeline {
    objects: Arc<dyn ObjectStore>,
    classifier: Arc<dyn Classifier>,
    records: Arc<dyn RecordStore>,
    call_timeout: Duration,
}

impl AnalyzePipeline {
    pub fn new(
        objects: Arc<dyn ObjectStore>,
        classifier: Arc<dyn Classifier>,
        records: Arc<dyn RecordStore>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            objects,
            classifier,
            records,
            call_timeout,
        }
    }

    pub fn records(&self) -> &Arc<dyn RecordStore> {
        &self.records
    }

    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    pub async fn run(&self, request: &UploadRequest) -> Result<AnalyzeOutcome, AnalyzeError> {
        let file = &request.file;
        let body = file.staged.read().await?;
        let key = storage_key(&request.user_id, &file.filename);

        info!(
            user_id = %request.user_id,
            filename = %file.filename,
            size_bytes = file.size_bytes,
            "processing scan"
        );

        bounded(
            self.call_timeout,
            self.objects.upload(&key, body.clone(), &file.content_type),
            StorageError::Timeout,
        )
        .await?;
        let image_url = self.objects.public_url(&key);
        info!(key = %key, image_url = %image_url, "image uploaded");

        let image = ImageInput {
            bytes: body,
            filename: file.filename.clone(),
            content_type: file.content_type.clone(),
        };
        let classification = bounded(
            self.call_timeout,
            self.classifier.classify(&image),
            InferenceError::Timeout,
        )
        .await?;
        info!(
            classifier = self.classifier.name(),
            prediction = %classification.prediction,
            defect_type = %classification.defect_type,
            confidence = classification.confidence,
            "image classified"
        );

        let record = InspectionRecord::new(
            file.filename.clone(),
            image_url,
            classification,
            request.user_id.clone(),
            request.device_name.clone(),
        );

        let warning = match bounded(
            self.call_timeout,
            self.records.insert(&record),
            PersistenceError::Timeout,
        )
        .await
        {
            Ok(()) => None,
            Err(err) => {
                warn!(
                    backend = self.records.backend(),
                    key = %key,
                    error = %err,
                    "inspection record not persisted"
                );
                Some(format!("Result was not saved: {}", err))
            }
        };

        Ok(AnalyzeOutcome {
            record,
            storage_key: key,
            warning,
        })
    }
}

/// Await `fut` for at most `limit`, mapping an elapsed timer to `on_timeout`.
pub(crate) async fn bounded<T, E, F>(
    limit: Duration,
    fut: F,
    on_timeout: impl FnOnce(Duration) -> E,
) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(on_timeout(limit)),
    }
}

/// Build `{user}/{millis}_{unique}{.ext}` for an upload.
///
/// The user segment is reduced to `[A-Za-z0-9_-]` and the extension to
/// ASCII alphanumerics, so the key is always a safe two-level path.
pub fn storage_key(user_id: &str, filename: &str) -> String {
    let user: String = user_id
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let user = if user.is_empty() { "anonymous".to_string() } else { user };

    let ext = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            e.chars()
                .filter(char::is_ascii_alphanumeric)
                .collect::<String>()
                .to_ascii_lowercase()
        })
        .filter(|e| !e.is_empty())
        .map(|e| format!(".{}", e))
        .unwrap_or_default();

    format!(
        "{}/{}_{}{}",
        user,
        Utc::now().timestamp_millis(),
        Uuid::new_v4().simple(),
        ext
    )
}
