//! HTTP handlers for single-file operations.
//! Upload and download bodies are streamed; storage concerns live in
//! `FileService`.

use crate::{
    errors::AppError,
    models::{file_record::FileRecord, tag::TagCount},
    services::file_service::{DEFAULT_PAGE_SIZE, StagedBlob},
    state::AppState,
};
use axum::{
    Json,
    body::Body,
    extract::{Multipart, Path, Query, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::io;
use tokio_util::io::ReaderStream;

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    pub preview: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTagsRequest {
    pub tags: Vec<String>,
}

/// A record as listed to clients, with a link to its content.
#[derive(Debug, Serialize)]
pub struct FileView {
    #[serde(flatten)]
    pub record: FileRecord,
    pub url: String,
}

impl From<FileRecord> for FileView {
    fn from(record: FileRecord) -> Self {
        let url = format!("/api/files/{}/download?preview=true", record.id);
        Self { record, url }
    }
}

/// `POST /api/upload`: multipart with a `file` field and optional `tags`.
///
/// Fields may arrive in any order, so the content is staged first and the
/// record is only committed once the whole form has been read.
pub async fn upload_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let mut staged = None;
    let tags = match read_upload_form(&state, &mut multipart, &mut staged).await {
        Ok(tags) => tags,
        Err(err) => {
            if let Some(blob) = staged {
                state.files.discard(blob).await;
            }
            return Err(err);
        }
    };

    let Some(staged) = staged else {
        return Err(AppError::bad_request("No file provided"));
    };
    let record = state.files.commit(staged, &tags).await?;

    Ok((
        StatusCode::OK,
        Json(json!({
            "message": "File uploaded successfully",
            "file": FileView::from(record),
        })),
    ))
}

async fn read_upload_form(
    state: &AppState,
    multipart: &mut Multipart,
    staged: &mut Option<StagedBlob>,
) -> Result<String, AppError> {
    let mut tags = String::new();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" if staged.is_none() => {
                let filename = field.file_name().unwrap_or("upload").to_string();
                let content_type = field.content_type().map(str::to_string);
                let stream = field
                    .map(|chunk| chunk.map_err(io::Error::other))
                    .boxed();
                *staged = Some(state.files.stage(&filename, content_type, stream).await?);
            }
            "tags" => tags = field.text().await?,
            _ => {}
        }
    }

    Ok(tags)
}

/// `GET /api/files?q=&page=&limit=`
pub async fn search_files(
    State(state): State<AppState>,
    Query(q): Query<SearchQuery>,
) -> Result<Json<Vec<FileView>>, AppError> {
    let records = state
        .files
        .search(
            q.q.as_deref(),
            q.page.unwrap_or(1),
            q.limit.unwrap_or(DEFAULT_PAGE_SIZE),
        )
        .await?;

    Ok(Json(records.into_iter().map(FileView::from).collect()))
}

/// `GET /api/files/{id}/download?preview=`
pub async fn download_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(q): Query<DownloadQuery>,
) -> Result<Response, AppError> {
    let (record, reader) = state.files.open(&id).await?;
    let body = Body::from_stream(ReaderStream::new(reader));

    let mut response = Response::new(body);
    let headers = response.headers_mut();

    let content_type = if record.content_type.is_empty() {
        "application/octet-stream"
    } else {
        record.content_type.as_str()
    };
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );

    let disposition = if q.preview.unwrap_or(false) {
        "inline"
    } else {
        "attachment"
    };
    headers.insert(
        header::CONTENT_DISPOSITION,
        content_disposition(disposition, &record.filename),
    );

    Ok(response)
}

/// `PUT /api/files/{id}`: replace the record's tags.
pub async fn update_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateTagsRequest>,
) -> Result<Json<FileView>, AppError> {
    let record = state.files.update_tags(&id, payload.tags).await?;
    Ok(Json(record.into()))
}

/// `DELETE /api/files/{id}`
pub async fn delete_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    state.files.delete(&id).await?;
    Ok(Json(json!({ "message": "File deleted" })))
}

/// `GET /api/tags`
pub async fn get_tags(State(state): State<AppState>) -> Result<Json<Vec<TagCount>>, AppError> {
    Ok(Json(state.files.tags().await?))
}

/// Build a `Content-Disposition` value, falling back to the bare disposition
/// when the filename cannot be carried in a header.
pub(crate) fn content_disposition(disposition: &'static str, filename: &str) -> HeaderValue {
    let escaped = filename.replace(['"', '\\'], "_");
    HeaderValue::from_bytes(format!("{}; filename=\"{}\"", disposition, escaped).as_bytes())
        .unwrap_or_else(|_| HeaderValue::from_static(disposition))
}
