//! src/services/file_service.rs
//!
//! FileService: upload, search, download, retag and delete single files.
//! Each file is one `FileRecord` in the metadata index plus one blob named
//! `id + extension(filename)`.

use crate::{
    models::{
        file_record::{FileRecord, extension_of, normalize_tags, parse_tags},
        tag::TagCount,
    },
    storage::{BlobReader, BlobStore, MetadataIndex, StorageError, StorageResult},
};
use bytes::Bytes;
use chrono::Utc;
use futures::stream::BoxStream;
use std::{io, sync::Arc};
use tracing::{debug, warn};
use uuid::Uuid;

pub const DEFAULT_PAGE_SIZE: u32 = 50;
pub const MAX_PAGE_SIZE: u32 = 500;

/// File content written by [`FileService::stage`] awaiting its metadata.
#[derive(Debug)]
pub struct StagedBlob {
    id: String,
    filename: String,
    content_type: String,
    size: i64,
    blob_name: String,
}

#[derive(Clone)]
pub struct FileService {
    index: Arc<dyn MetadataIndex>,
    blobs: Arc<dyn BlobStore>,
}

impl FileService {
    pub fn new(index: Arc<dyn MetadataIndex>, blobs: Arc<dyn BlobStore>) -> Self {
        Self { index, blobs }
    }

    /// Stage and commit in one step.
    ///
    /// `tags` is the raw comma separated form as submitted by clients.
    #[cfg(test)]
    pub async fn upload(
        &self,
        filename: &str,
        content_type: Option<String>,
        tags: &str,
        stream: BoxStream<'_, io::Result<Bytes>>,
    ) -> StorageResult<FileRecord> {
        let staged = self.stage(filename, content_type, stream).await?;
        self.commit(staged, tags).await
    }

    /// Write a new file's content without publishing any metadata yet.
    ///
    /// The returned [`StagedBlob`] must be passed to [`commit`](Self::commit)
    /// or [`discard`](Self::discard).
    pub async fn stage(
        &self,
        filename: &str,
        content_type: Option<String>,
        stream: BoxStream<'_, io::Result<Bytes>>,
    ) -> StorageResult<StagedBlob> {
        let id = Uuid::new_v4().to_string();
        let blob_name = format!("{}{}", id, extension_of(filename));
        let size = self.blobs.put_stream(&blob_name, stream).await?;
        Ok(StagedBlob {
            id,
            filename: filename.to_string(),
            content_type: content_type.unwrap_or_default(),
            size: i64::try_from(size).unwrap_or(i64::MAX),
            blob_name,
        })
    }

    /// Insert the metadata for a staged blob. The blob is removed again if
    /// the insert fails.
    pub async fn commit(&self, staged: StagedBlob, tags: &str) -> StorageResult<FileRecord> {
        let now = Utc::now();
        let record = FileRecord {
            id: staged.id,
            filename: staged.filename,
            content_type: staged.content_type,
            size: staged.size,
            tags: parse_tags(tags),
            created_at: now,
            updated_at: now,
        };

        if let Err(err) = self.index.upsert(&record).await {
            let _ = self.blobs.delete(&staged.blob_name).await;
            return Err(err);
        }

        debug!(
            "stored {} as {} ({} bytes)",
            record.filename, staged.blob_name, record.size
        );
        Ok(record)
    }

    /// Drop a staged blob that will never be committed.
    pub async fn discard(&self, staged: StagedBlob) {
        if let Err(err) = self.blobs.delete(&staged.blob_name).await {
            warn!("failed to discard staged blob {}: {}", staged.blob_name, err);
        }
    }

    /// One page of records whose tags contain `query`, newest first.
    ///
    /// `page` is 1-based; `limit` is clamped to `1..=MAX_PAGE_SIZE`.
    pub async fn search(
        &self,
        query: Option<&str>,
        page: u32,
        limit: u32,
    ) -> StorageResult<Vec<FileRecord>> {
        let query = query.map(str::trim).filter(|q| !q.is_empty());
        let limit = limit.clamp(1, MAX_PAGE_SIZE);
        let offset = page.max(1).saturating_sub(1).saturating_mul(limit);
        self.index.search(query, offset, limit).await
    }

    pub async fn get(&self, id: &str) -> StorageResult<FileRecord> {
        self.index
            .get(id)
            .await?
            .ok_or_else(|| StorageError::RecordNotFound(id.to_string()))
    }

    /// Record plus an open reader over its blob.
    pub async fn open(&self, id: &str) -> StorageResult<(FileRecord, BlobReader)> {
        let record = self.get(id).await?;
        let reader = self.blobs.reader(&record.blob_name()).await?;
        Ok((record, reader))
    }

    /// Replace a record's tags. Only tags are editable: renaming could change
    /// the extension and orphan the blob.
    pub async fn update_tags(&self, id: &str, tags: Vec<String>) -> StorageResult<FileRecord> {
        self.index.update_tags(id, normalize_tags(tags)).await
    }

    /// Remove the record, then its blob. A blob that cannot be removed is
    /// only logged.
    pub async fn delete(&self, id: &str) -> StorageResult<FileRecord> {
        let record = self.index.delete(id).await?;
        if let Err(err) = self.blobs.delete(&record.blob_name()).await {
            warn!("failed to remove blob {}: {}", record.blob_name(), err);
        }
        Ok(record)
    }

    pub async fn tags(&self) -> StorageResult<Vec<TagCount>> {
        self.index.tag_counts().await
    }

    /// Probe both backing stores, returning a per-store error message.
    pub async fn readiness(&self) -> (Option<String>, Option<String>) {
        let index = self.index.ping().await.err().map(|e| e.to_string());
        let blobs = self.blobs.ping().await.err().map(|e| e.to_string());
        (index, blobs)
    }
}
