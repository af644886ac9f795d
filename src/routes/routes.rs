//! Defines routes for the scan relay.
//!
//! ## Structure
//! - **Health endpoints**
//!   - `GET  /`            -> liveness
//!   - `GET  /api/health`  -> liveness
//!   - `GET  /api/ready`   -> readiness (record store + staging disk)
//!
//! - **Pipeline**
//!   - `POST /api/analyze` -> multipart upload (`file`, `user_id`, `device_name`)
//!
//! - **Local objects** (only with the local object store)
//!   - `GET  /objects/{*key}` -> stream a stored image

use crate::{
    handlers::{
        analyze_handlers::analyze,
        health_handlers::{health, readyz},
        object_handlers::get_object,
    },
    state::AppState,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::Method,
    routing::{get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Build the router with `state` attached.
pub fn routes(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/", get(health))
        .route("/api/health", get(health))
        .route("/api/ready", get(readyz))
        .route(
            "/api/analyze",
            post(analyze).layer(DefaultBodyLimit::max(state.max_upload_bytes)),
        );

    if state.local_objects.is_some() {
        router = router.route("/objects/{*key}", get(get_object));
    }

    router
        .layer(TraceLayer::new_for_http())
        .layer(cors())
        .with_state(state)
}

fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any)
}
