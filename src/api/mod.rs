//! API module for handling HTTP requests and responses

/// Route handlers.
#[cfg(feature = "web")]
pub mod handlers;
/// JSON response bodies.
#[cfg(feature = "web")]
pub mod responses;

#[cfg(feature = "web")]
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
#[cfg(feature = "web")]
use std::sync::Arc;
#[cfg(feature = "web")]
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
#[cfg(feature = "web")]
use crate::state::AppState;

#[cfg(feature = "web")]
pub use handlers::{compare_images, health_check};

#[cfg(feature = "web")]
/// Create the application router with all routes
pub fn create_router(state: Arc<AppState>) -> Router {
    // Configure CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let max_upload_size = state.config.max_upload_size;

    Router::new()
        .route("/", get(health_check))
        .route("/compare/", post(compare_images))
        .route("/compare", post(compare_images))
        // overflow surfaces as a multipart error, answered with 413
        .layer(DefaultBodyLimit::max(max_upload_size))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
