//! HTTP handlers for whole-store backup and restore.
//!
//! Both directions spool the archive through an anonymous temporary file so
//! memory use does not grow with the size of the store.

use crate::{
    errors::AppError, handlers::file_handlers::content_disposition,
    services::backup_service::RestoreReport, state::AppState,
};
use axum::{
    Json,
    body::Body,
    extract::{Multipart, State},
    http::{HeaderValue, header},
    response::Response,
};
use chrono::Utc;
use serde::Serialize;
use std::io::{Seek, SeekFrom};
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;

#[derive(Debug, Serialize)]
pub struct RestoreResponse {
    pub message: String,
    #[serde(flatten)]
    pub report: RestoreReport,
}

/// `GET /api/backup`: stream a ZIP of every record and blob.
pub async fn create_backup(State(state): State<AppState>) -> Result<Response, AppError> {
    let spool = tempfile::tempfile()?;
    let (mut spool, _summary) = state.backups.create_backup(spool).await?;
    spool.seek(SeekFrom::Start(0))?;

    let file = tokio::fs::File::from_std(spool);
    let mut response = Response::new(Body::from_stream(ReaderStream::new(file)));

    let filename = format!("backup-{}.zip", Utc::now().format("%Y%m%d-%H%M%S"));
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/zip"),
    );
    headers.insert(
        header::CONTENT_DISPOSITION,
        content_disposition("attachment", &filename),
    );

    Ok(response)
}

/// `POST /api/restore`: multipart with the archive in field `file`.
pub async fn restore_backup(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<RestoreResponse>, AppError> {
    let mut spooled = None;

    while let Some(mut field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }

        let mut spool = tokio::fs::File::from_std(tempfile::tempfile()?);
        while let Some(chunk) = field.chunk().await? {
            spool.write_all(&chunk).await?;
        }
        spool.flush().await?;
        spooled = Some(spool.into_std().await);
        break;
    }

    let Some(mut archive) = spooled else {
        return Err(AppError::bad_request("No file provided"));
    };
    archive.seek(SeekFrom::Start(0))?;

    let report = state.backups.restore_backup(archive).await?;
    Ok(Json(RestoreResponse {
        message: format!("Restored {} files", report.restored),
        report,
    }))
}
