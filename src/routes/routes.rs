//! Defines routes for the file storage API.
//!
//! ## Structure
//! - **Probes**
//!   - `GET    /healthz`, `GET /readyz`
//!
//! - **Files**
//!   - `POST   /api/upload`: multipart upload
//!   - `GET    /api/files`: tag search (`q`, `page`, `limit`)
//!   - `GET    /api/files/{id}/download`: stream content (`preview=true` for inline)
//!   - `PUT    /api/files/{id}`: replace tags
//!   - `DELETE /api/files/{id}`: delete record and blob
//!   - `GET    /api/tags`: tag counts
//!
//! - **Backup**
//!   - `GET    /api/backup`: download a ZIP archive of the whole store
//!   - `POST   /api/restore`: upsert a previously downloaded archive

use crate::{
    handlers::{
        backup_handlers::{create_backup, restore_backup},
        file_handlers::{
            delete_file, download_file, get_tags, search_files, update_file, upload_file,
        },
        health_handlers::{healthz, readyz},
    },
    state::AppState,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{Method, header},
    routing::{get, post, put},
};
use std::time::Duration;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Build the router for every endpoint.
///
/// Upload and restore bodies are capped at `max_upload_bytes`; other routes
/// keep axum's default limit.
pub fn routes(max_upload_bytes: usize) -> Router<AppState> {
    let body_limit = DefaultBodyLimit::max(max_upload_bytes);

    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // file routes
        .route("/api/upload", post(upload_file).layer(body_limit))
        .route("/api/files", get(search_files))
        .route("/api/files/{id}", put(update_file).delete(delete_file))
        .route("/api/files/{id}/download", get(download_file))
        .route("/api/tags", get(get_tags))
        // backup routes
        .route("/api/backup", get(create_backup))
        .route("/api/restore", post(restore_backup).layer(body_limit))
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::ORIGIN, header::CONTENT_TYPE])
        .expose_headers([header::CONTENT_LENGTH])
        .max_age(Duration::from_secs(12 * 60 * 60))
}
