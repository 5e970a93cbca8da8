//! Storage collaborators: a blob store for file content and a metadata
//! index for `FileRecord`s.
//!
//! Both are object-safe async traits so the services receive them as
//! `Arc<dyn ...>` handles. `disk` and `sqlite` are the production backends,
//! `memory` holds in-process fakes with the same semantics.

pub mod disk;
pub mod memory;
pub mod sqlite;

use crate::models::{file_record::FileRecord, tag::TagCount};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{StreamExt, stream::BoxStream};
use std::io;
use thiserror::Error;
use tokio::io::AsyncRead;

const MAX_BLOB_NAME_LEN: usize = 255;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("blob `{0}` not found")]
    BlobNotFound(String),
    #[error("invalid blob name `{0}`")]
    InvalidBlobName(String),
    #[error("file record `{0}` not found")]
    RecordNotFound(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Boxed async reader handed out for streaming blob content.
pub type BlobReader = Box<dyn AsyncRead + Send + Unpin>;

/// Content-addressable-by-name byte storage.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Write a blob from a stream of chunks, replacing any existing blob of
    /// the same name. Returns the number of bytes written.
    async fn put_stream(
        &self,
        name: &str,
        stream: BoxStream<'_, io::Result<Bytes>>,
    ) -> StorageResult<u64>;

    /// Write a blob from a single buffer.
    async fn put(&self, name: &str, data: Bytes) -> StorageResult<()> {
        let stream = futures::stream::once(async move { Ok::<_, io::Error>(data) }).boxed();
        self.put_stream(name, stream).await.map(|_| ())
    }

    /// Read a whole blob. Missing blobs yield `BlobNotFound`.
    async fn get(&self, name: &str) -> StorageResult<Bytes>;

    /// Open a blob for streaming reads.
    async fn reader(&self, name: &str) -> StorageResult<BlobReader>;

    /// Remove a blob. Removing a missing blob is not an error.
    async fn delete(&self, name: &str) -> StorageResult<()>;

    async fn exists(&self, name: &str) -> StorageResult<bool>;

    /// Readiness probe.
    async fn ping(&self) -> StorageResult<()>;
}

/// Keyed store of `FileRecord`s.
#[async_trait]
pub trait MetadataIndex: Send + Sync {
    /// Every record, oldest first, ties broken by id.
    async fn list_all(&self) -> StorageResult<Vec<FileRecord>>;

    async fn get(&self, id: &str) -> StorageResult<Option<FileRecord>>;

    /// Insert the record, or overwrite every field of the record with the same id.
    async fn upsert(&self, record: &FileRecord) -> StorageResult<()>;

    /// Replace a record's tags and refresh `updated_at`.
    async fn update_tags(&self, id: &str, tags: Vec<String>) -> StorageResult<FileRecord>;

    /// Remove a record, returning what was removed.
    async fn delete(&self, id: &str) -> StorageResult<FileRecord>;

    /// Newest-first page of records having at least one tag containing
    /// `query` (ASCII case-insensitive). `None` matches everything.
    async fn search(
        &self,
        query: Option<&str>,
        offset: u32,
        limit: u32,
    ) -> StorageResult<Vec<FileRecord>>;

    /// Distinct tags sorted by name, each with the number of records carrying it.
    async fn tag_counts(&self) -> StorageResult<Vec<TagCount>>;

    /// Readiness probe.
    async fn ping(&self) -> StorageResult<()>;
}

/// Reject blob names that could escape the storage root or confuse the filesystem.
pub fn ensure_blob_name_safe(name: &str) -> StorageResult<()> {
    let invalid = name.is_empty()
        || name.len() > MAX_BLOB_NAME_LEN
        || name == "."
        || name.contains("..")
        || name
            .bytes()
            .any(|b| b.is_ascii_control() || b == b'/' || b == b'\\');
    if invalid {
        return Err(StorageError::InvalidBlobName(name.to_string()));
    }
    Ok(())
}
