//! In-process implementations of the storage traits.
//!
//! Semantics match `disk` and `sqlite` closely enough that the services can
//! be exercised without touching the filesystem.

use super::{
    BlobReader, BlobStore, MetadataIndex, StorageError, StorageResult, ensure_blob_name_safe,
};
use crate::models::{file_record::FileRecord, tag::TagCount};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use chrono::Utc;
use futures::{StreamExt, stream::BoxStream};
use std::{
    collections::{BTreeMap, HashMap, HashSet},
    io::{self, Cursor},
};
use tokio::sync::RwLock;

#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, Bytes>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of every stored blob, sorted.
    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.blobs.read().await.keys().cloned().collect();
        names.sort();
        names
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put_stream(
        &self,
        name: &str,
        mut stream: BoxStream<'_, io::Result<Bytes>>,
    ) -> StorageResult<u64> {
        ensure_blob_name_safe(name)?;
        let mut buf = BytesMut::new();
        while let Some(chunk) = stream.next().await {
            buf.extend_from_slice(&chunk?);
        }
        let size = buf.len() as u64;
        self.blobs.write().await.insert(name.to_string(), buf.freeze());
        Ok(size)
    }

    async fn get(&self, name: &str) -> StorageResult<Bytes> {
        self.blobs
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| StorageError::BlobNotFound(name.to_string()))
    }

    async fn reader(&self, name: &str) -> StorageResult<BlobReader> {
        let data = self.get(name).await?;
        Ok(Box::new(Cursor::new(data)))
    }

    async fn delete(&self, name: &str) -> StorageResult<()> {
        self.blobs.write().await.remove(name);
        Ok(())
    }

    async fn exists(&self, name: &str) -> StorageResult<bool> {
        Ok(self.blobs.read().await.contains_key(name))
    }

    async fn ping(&self) -> StorageResult<()> {
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryIndex {
    records: RwLock<HashMap<String, FileRecord>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

fn newest_first(a: &FileRecord, b: &FileRecord) -> std::cmp::Ordering {
    b.created_at
        .cmp(&a.created_at)
        .then_with(|| b.id.cmp(&a.id))
}

#[async_trait]
impl MetadataIndex for MemoryIndex {
    async fn list_all(&self) -> StorageResult<Vec<FileRecord>> {
        let mut all: Vec<_> = self.records.read().await.values().cloned().collect();
        all.sort_by(|a, b| newest_first(b, a));
        Ok(all)
    }

    async fn get(&self, id: &str) -> StorageResult<Option<FileRecord>> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn upsert(&self, record: &FileRecord) -> StorageResult<()> {
        self.records
            .write()
            .await
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn update_tags(&self, id: &str, tags: Vec<String>) -> StorageResult<FileRecord> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(id)
            .ok_or_else(|| StorageError::RecordNotFound(id.to_string()))?;
        record.tags = tags;
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    async fn delete(&self, id: &str) -> StorageResult<FileRecord> {
        self.records
            .write()
            .await
            .remove(id)
            .ok_or_else(|| StorageError::RecordNotFound(id.to_string()))
    }

    async fn search(
        &self,
        query: Option<&str>,
        offset: u32,
        limit: u32,
    ) -> StorageResult<Vec<FileRecord>> {
        let needle = query.map(str::to_ascii_lowercase);
        let mut hits: Vec<_> = self
            .records
            .read()
            .await
            .values()
            .filter(|r| match &needle {
                Some(needle) => r
                    .tags
                    .iter()
                    .any(|t| t.to_ascii_lowercase().contains(needle.as_str())),
                None => true,
            })
            .cloned()
            .collect();
        hits.sort_by(newest_first);
        Ok(hits
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn tag_counts(&self) -> StorageResult<Vec<TagCount>> {
        let mut counts: BTreeMap<String, i64> = BTreeMap::new();
        for record in self.records.read().await.values() {
            let distinct: HashSet<&String> = record.tags.iter().collect();
            for tag in distinct {
                *counts.entry(tag.clone()).or_default() += 1;
            }
        }
        Ok(counts
            .into_iter()
            .map(|(name, count)| TagCount { name, count })
            .collect())
    }

    async fn ping(&self) -> StorageResult<()> {
        Ok(())
    }
}
