mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use common::{RecordingObjectStore, RecordingRecordStore, json_body, test_app};
use std::time::{Duration, Instant};
use tower::util::ServiceExt;

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn liveness_reports_status_and_port() {
    let app = test_app(
        RecordingObjectStore::default(),
        RecordingRecordStore::default(),
        0.5,
    );

    for uri in ["/", "/api/health"] {
        let response = app.router.clone().oneshot(get(uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK, "{uri}");
        let body = json_body(response).await;
        assert_eq!(body["status"], "Manager is online");
        assert_eq!(body["port"], 5000);
    }
}

#[tokio::test]
async fn readiness_passes_with_healthy_record_store() {
    let app = test_app(
        RecordingObjectStore::default(),
        RecordingRecordStore::default(),
        0.5,
    );

    let response = app.router.clone().oneshot(get("/api/ready")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["checks"]["memory"]["ok"], true);
    assert_eq!(body["checks"]["staging_disk"]["ok"], true);
    assert_eq!(app.staged_files(), 0);
}

#[tokio::test]
async fn readiness_fails_when_record_store_is_down() {
    let app = test_app(
        RecordingObjectStore::default(),
        RecordingRecordStore::failing(),
        0.5,
    );

    let response = app.router.clone().oneshot(get("/api/ready")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = json_body(response).await;
    assert_eq!(body["status"], "error");
    assert_eq!(body["checks"]["memory"]["ok"], false);
}

#[tokio::test]
async fn readiness_times_out_a_hanging_record_store() {
    let app = test_app(
        RecordingObjectStore::default(),
        RecordingRecordStore::slow_ping(Duration::from_secs(5)),
        0.5,
    );

    let started = Instant::now();
    let response = app.router.clone().oneshot(get("/api/ready")).await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(4));
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = json_body(response).await;
    assert_eq!(body["checks"]["memory"]["ok"], false);
    let error = body["checks"]["memory"]["error"].as_str().unwrap();
    assert!(error.contains("timed out"), "{error}");
    assert_eq!(body["checks"]["staging_disk"]["ok"], true);
}

#[tokio::test]
async fn objects_route_is_absent_without_local_store() {
    let app = test_app(
        RecordingObjectStore::default(),
        RecordingRecordStore::default(),
        0.5,
    );

    let response = app
        .router
        .clone()
        .oneshot(get("/objects/u1/photo.png"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
