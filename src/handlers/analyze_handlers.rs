//! `POST /api/analyze`: upload, classify and record one scan.
//!
//! The `file` part is streamed into a staging file rather than buffered by
//! the extractor; the staging guard removes it once the request finishes.

use crate::{
    errors::AppError,
    models::{
        inspection::{AnalyzeResponse, UNKNOWN_DEVICE},
        upload::{StagedFile, UploadRequest, UploadedFile},
    },
    state::AppState,
};
use axum::{
    Json,
    extract::{
        Multipart, State,
        multipart::{Field, MultipartRejection},
    },
};
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tracing::{error, info};

pub const NO_FILE_MESSAGE: &str = "No file uploaded";
pub const MISSING_USER_MESSAGE: &str = "Missing user_id";

pub async fn analyze(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<AnalyzeResponse>, AppError> {
    // a body that is not multipart/form-data carries no file part
    let multipart = multipart.map_err(|rejection| {
        info!(reason = %rejection.body_text(), "analyze request is not a multipart form");
        AppError::bad_request(NO_FILE_MESSAGE)
    })?;
    let request = read_upload_request(&state.staging_dir, multipart).await?;

    let outcome = state.pipeline.run(&request).await.map_err(|err| {
        error!(user_id = %request.user_id, error = %err, "analyze failed");
        AppError::from(err)
    })?;
    info!(
        user_id = %request.user_id,
        key = %outcome.storage_key,
        persisted = outcome.warning.is_none(),
        "scan analyzed"
    );

    Ok(Json(AnalyzeResponse::from_record(
        &outcome.record,
        outcome.warning,
    )))
}

/// Collect the form fields, staging `file` to disk, and validate them.
///
/// Missing `file` is reported before missing `user_id`.
async fn read_upload_request(
    staging_dir: &Path,
    mut multipart: Multipart,
) -> Result<UploadRequest, AppError> {
    let mut file: Option<UploadedFile> = None;
    let mut user_id: Option<String> = None;
    let mut device_name: Option<String> = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            // only a part with a filename counts as the upload
            Some("file") if file.is_none() && field.file_name().is_some() => {
                file = Some(stage_file(staging_dir, field).await?);
            }
            Some("user_id") => user_id = Some(field.text().await?),
            Some("device_name") => device_name = Some(field.text().await?),
            // unknown fields, repeated files and text `file` parts are drained
            _ => {
                field.bytes().await?;
            }
        }
    }

    let file = file.ok_or_else(|| AppError::bad_request(NO_FILE_MESSAGE))?;
    let user_id = user_id
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::bad_request(MISSING_USER_MESSAGE))?;
    let device_name = device_name
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| UNKNOWN_DEVICE.to_string());

    Ok(UploadRequest {
        file,
        user_id,
        device_name,
    })
}

async fn stage_file(staging_dir: &Path, mut field: Field<'_>) -> Result<UploadedFile, AppError> {
    let filename = field
        .file_name()
        .filter(|name| !name.is_empty())
        .unwrap_or("upload")
        .to_string();
    let content_type = field
        .content_type()
        .unwrap_or("application/octet-stream")
        .to_string();

    let (staged, mut out) = StagedFile::create(staging_dir)
        .await
        .map_err(|err| AppError::internal(format!("could not stage upload: {}", err)))?;

    let mut size_bytes: u64 = 0;
    while let Some(chunk) = field.chunk().await? {
        size_bytes += chunk.len() as u64;
        out.write_all(&chunk)
            .await
            .map_err(|err| AppError::internal(format!("could not stage upload: {}", err)))?;
    }
    out.flush()
        .await
        .map_err(|err| AppError::internal(format!("could not stage upload: {}", err)))?;

    Ok(UploadedFile {
        staged,
        filename,
        content_type,
        size_bytes,
    })
}
