//! Health & readiness handlers.
//!
//! - GET /, GET /api/health -> liveness (`{"status": ..., "port": ...}`)
//! - GET /api/ready         -> readiness that checks the record store and staging disk I/O

use crate::{
    services::{pipeline::bounded, record_store::PersistenceError},
    state::AppState,
};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use std::collections::HashMap;
use tokio::fs;
use uuid::Uuid;

pub const LIVENESS_STATUS: &str = "Manager is online";

/// `GET /` and `GET /api/health`
///
/// Liveness probe. Never performs I/O.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: LIVENESS_STATUS.into(),
            port: state.port,
        }),
    )
}

/// `GET /api/ready`
///
/// Readiness probe that:
/// 1. Pings the record store, bounded by `call_timeout`.
/// 2. Performs a best-effort write/read/delete in the staging directory.
///
/// HTTP 200 when all checks pass, HTTP 503 when any check fails.
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let records = state.pipeline.records();
    let ping = bounded(
        state.pipeline.call_timeout(),
        records.ping(),
        PersistenceError::Timeout,
    );
    let record_check = match ping.await {
        Ok(()) => (true, None::<String>),
        Err(e) => (false, Some(format!("error: {}", e))),
    };

    let tmp_path = state.staging_dir.join(format!(".readyz-{}", Uuid::new_v4()));
    let disk_check = match fs::write(&tmp_path, b"readyz").await {
        Ok(_) => {
            let read = fs::read(&tmp_path).await;
            let _ = fs::remove_file(&tmp_path).await; // best-effort cleanup
            match read {
                Ok(bytes) if bytes == b"readyz" => (true, None::<String>),
                Ok(_) => (false, Some("file content mismatch".to_string())),
                Err(e) => (false, Some(format!("could not read tmp file: {}", e))),
            }
        }
        Err(e) => (false, Some(format!("could not write tmp file: {}", e))),
    };

    let overall_ok = record_check.0 && disk_check.0;

    let mut checks = HashMap::new();
    checks.insert(
        records.backend(),
        CheckStatus {
            ok: record_check.0,
            error: record_check.1,
        },
    );
    checks.insert(
        "staging_disk",
        CheckStatus {
            ok: disk_check.0,
            error: disk_check.1,
        },
    );

    let body = ReadyResponse {
        status: if overall_ok {
            "ok".into()
        } else {
            "error".into()
        },
        checks,
    };

    let status = if overall_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    port: u16,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: String,
    checks: HashMap<&'static str, CheckStatus>,
}

#[derive(Serialize)]
struct CheckStatus {
    ok: bool,
    error: Option<String>,
}
