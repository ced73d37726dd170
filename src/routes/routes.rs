//! Browser routes.
//!
//! - `GET  /`                 : listing of the bucket with thumbnails
//! - `GET  /viewer/{*name}`   : preview page
//! - `GET  /view/{*name}`     : inline body (`?raw=true` for embedding)
//! - `GET  /download/{*name}` : attachment body
//! - `GET  /thumb/{*name}`    : cached or generated JPEG thumbnail
//! - `GET  /upload`, `POST /upload`: upload form and multipart ingestion
//! - `GET  /static/*`         : bundled assets, including the placeholder icon
//!
//! The wildcard `*name` allows nested names like `photos/2025/img.jpg`.

use crate::{
    handlers::{
        browser_handlers::{download_object, index, view_object, viewer},
        health_handlers::{healthz, readyz},
        thumb_handlers::thumbnail,
        upload_handlers::{upload_form, upload_submit},
    },
    state::AppState,
};
use axum::{Router, extract::DefaultBodyLimit, routing::get};
use std::path::Path;
use tower_http::{services::ServeDir, trace::TraceLayer};

/// Build the router. Shared state (`AppState`) is attached by the caller.
pub fn routes(static_dir: impl AsRef<Path>, max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/", get(index))
        .route("/viewer/{*name}", get(viewer))
        .route("/view/{*name}", get(view_object))
        .route("/download/{*name}", get(download_object))
        .route("/thumb/{*name}", get(thumbnail))
        .route("/upload", get(upload_form).post(upload_submit))
        .nest_service("/static", ServeDir::new(static_dir.as_ref()))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
}
