#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, Response, header},
};
use bytes::Bytes;
use scan_relay::{
    AppState, build_router,
    models::inspection::InspectionRecord,
    services::{
        classifier::{Classifier, FixedRandom, MockClassifier},
        object_store::{ObjectStore, StorageError, StorageResult},
        pipeline::AnalyzePipeline,
        record_store::{PersistenceError, PersistenceResult, RecordStore},
    },
};
use std::{
    path::Path,
    sync::{Arc, Mutex},
    time::Duration,
};
use tempfile::TempDir;

pub const BOUNDARY: &str = "scan-relay-test-boundary";

/// Object store fake that records uploads.
#[derive(Default)]
pub struct RecordingObjectStore {
    pub uploads: Mutex<Vec<(String, Bytes, String)>>,
    pub fail: bool,
    pub delay: Option<Duration>,
}

impl RecordingObjectStore {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn count(&self) -> usize {
        self.uploads.lock().unwrap().len()
    }
}

#[async_trait]
impl ObjectStore for RecordingObjectStore {
    async fn upload(&self, key: &str, body: Bytes, content_type: &str) -> StorageResult<()> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(StorageError::Rejected {
                status: 503,
                message: "bucket unavailable".into(),
            });
        }
        self.uploads
            .lock()
            .unwrap()
            .push((key.to_string(), body, content_type.to_string()));
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("https://cdn.test/scans/{}", key)
    }
}

/// Record store fake that keeps inserted records in memory.
#[derive(Default)]
pub struct RecordingRecordStore {
    pub records: Mutex<Vec<InspectionRecord>>,
    pub fail: bool,
    pub ping_delay: Option<Duration>,
}

impl RecordingRecordStore {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn slow_ping(delay: Duration) -> Self {
        Self {
            ping_delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn count(&self) -> usize {
        self.records.lock().unwrap().len()
    }
}

#[async_trait]
impl RecordStore for RecordingRecordStore {
    async fn insert(&self, record: &InspectionRecord) -> PersistenceResult<()> {
        if self.fail {
            return Err(PersistenceError::Rejected {
                status: 500,
                message: "table locked".into(),
            });
        }
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn ping(&self) -> PersistenceResult<()> {
        if let Some(delay) = self.ping_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(PersistenceError::Rejected {
                status: 500,
                message: "table locked".into(),
            });
        }
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

pub struct TestApp {
    pub router: Router,
    pub objects: Arc<RecordingObjectStore>,
    pub records: Arc<RecordingRecordStore>,
    pub staging: TempDir,
}

impl TestApp {
    pub fn staged_files(&self) -> usize {
        count_entries(self.staging.path())
    }
}

pub fn count_entries(dir: &Path) -> usize {
    std::fs::read_dir(dir)
        .map(|entries| entries.filter_map(Result::ok).count())
        .unwrap_or(0)
}

/// Router over recording fakes and a mock classifier pinned to `draw`.
pub fn test_app(
    objects: RecordingObjectStore,
    records: RecordingRecordStore,
    draw: f64,
) -> TestApp {
    test_app_with(objects, records, Arc::new(MockClassifier::new(FixedRandom(draw))))
}

pub fn test_app_with(
    objects: RecordingObjectStore,
    records: RecordingRecordStore,
    classifier: Arc<dyn Classifier>,
) -> TestApp {
    let objects = Arc::new(objects);
    let records = Arc::new(records);
    let staging = tempfile::tempdir().unwrap();

    let pipeline = AnalyzePipeline::new(
        objects.clone(),
        classifier,
        records.clone(),
        Duration::from_millis(500),
    );
    let state = AppState {
        pipeline: Arc::new(pipeline),
        staging_dir: staging.path().to_path_buf(),
        port: 5000,
        max_upload_bytes: 1024 * 1024,
        local_objects: None,
    };

    TestApp {
        router: build_router(state),
        objects,
        records,
        staging,
    }
}

/// One part of a multipart body.
pub enum FormPart<'a> {
    Text(&'a str, &'a str),
    File {
        name: &'a str,
        filename: &'a str,
        content_type: &'a str,
        data: &'a [u8],
    },
}

pub fn multipart_body(parts: &[FormPart<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match part {
            FormPart::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name)
                        .as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
            FormPart::File {
                name,
                filename,
                content_type,
                data,
            } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                        name, filename
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", content_type).as_bytes());
                body.extend_from_slice(data);
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

pub fn analyze_request(parts: &[FormPart<'_>]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/analyze")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(multipart_body(parts)))
        .unwrap()
}

/// The 10-byte `photo.png` upload used across the scenarios.
pub fn photo() -> FormPart<'static> {
    FormPart::File {
        name: "file",
        filename: "photo.png",
        content_type: "image/png",
        data: b"0123456789",
    }
}

pub async fn json_body(response: Response<Body>) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
