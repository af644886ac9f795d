//! Scan relay: accepts an uploaded device scan, stores the image, classifies
//! it, records the result, and answers with a JSON summary.

pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;

pub use routes::routes::routes as build_router;
pub use state::AppState;
