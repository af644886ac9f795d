mod common;

use axum::{
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use common::{FormPart, analyze_request, count_entries, json_body, photo};
use scan_relay::{
    AppState, build_router,
    config::{AppConfig, Args},
    services::record_store::SqliteRecordStore,
};
use tower::util::ServiceExt;

#[tokio::test]
async fn local_disk_and_sqlite_round_trip() {
    let root = tempfile::tempdir().unwrap();
    let staging = root.path().join("uploads");
    let database_url = format!(
        "sqlite://{}",
        root.path().join("meta/scan_relay.db").display()
    );

    let args = Args {
        port: Some(5055),
        staging_dir: Some(staging.clone()),
        storage_dir: Some(root.path().join("objects")),
        database_url: Some(database_url.clone()),
        ..Args::default()
    };
    let (cfg, _) = AppConfig::resolve(args, |_| Ok(None)).unwrap();
    let state = AppState::from_config(&cfg).await.unwrap();
    let router = build_router(state);

    let response = router
        .clone()
        .oneshot(analyze_request(&[
            photo(),
            FormPart::Text("user_id", "u1"),
            FormPart::Text("device_name", "Bench Rig"),
        ]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;

    let image_url = body["image_url"].as_str().unwrap().to_string();
    let path = image_url
        .strip_prefix("http://localhost:5055")
        .expect("local URL uses the public base");
    assert!(path.starts_with("/objects/u1/"));

    let response = router
        .clone()
        .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(bytes.as_ref(), b"0123456789");

    let missing = router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/objects/u1/missing.png")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    let store = SqliteRecordStore::connect(&database_url).await.unwrap();
    assert_eq!(store.count().await.unwrap(), 1);
    let (url, device): (String, String) =
        sqlx::query_as("SELECT image_url, device_name FROM inspections")
            .fetch_one(store.pool())
            .await
            .unwrap();
    assert_eq!(url, image_url);
    assert_eq!(device, "Bench Rig");

    assert_eq!(count_entries(&staging), 0);
}
