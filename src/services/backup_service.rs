//! src/services/backup_service.rs
//!
//! BackupService: exports the metadata index and blob store as one archive
//! and restores such archives into a store that may already hold data.
//!
//! Restore is an upsert, never a wipe. Every blob entry is reconciled on its
//! own; a failure on one entry is logged and skipped so the rest of the
//! archive still comes back.

use crate::{
    archive::{self, ArchiveError, ArchiveReader, BlobEntry, EncodeSummary},
    models::file_record::FileRecord,
    storage::{BlobStore, MetadataIndex, StorageError},
};
use chrono::Utc;
use futures::StreamExt;
use serde::Serialize;
use std::{
    collections::HashMap,
    fs::File,
    io::{Read, Seek, SeekFrom, Write},
    sync::Arc,
};
use thiserror::Error;
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("malformed archive: {0}")]
    MalformedArchive(String),
    #[error("archive manifest contains no records")]
    EmptyManifest,
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("failed to write archive: {0}")]
    Archive(#[source] ArchiveError),
}

/// Why a blob entry did not make it back into the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum SkipReason {
    /// No manifest record claims this entry.
    Unmatched,
    /// The entry could not be read from the archive or written to the blob store.
    BlobUnavailable(String),
    /// The blob was written but the metadata upsert failed.
    MetadataWriteFailure(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedEntry {
    pub entry: String,
    pub reason: SkipReason,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct RestoreReport {
    /// Entries whose blob and metadata were both written.
    pub restored: usize,
    pub skipped: Vec<SkippedEntry>,
}

#[derive(Clone)]
pub struct BackupService {
    index: Arc<dyn MetadataIndex>,
    blobs: Arc<dyn BlobStore>,
}

impl BackupService {
    pub fn new(index: Arc<dyn MetadataIndex>, blobs: Arc<dyn BlobStore>) -> Self {
        Self { index, blobs }
    }

    /// Write an archive of every record and every readable blob into `sink`.
    ///
    /// Records are taken oldest first (ties by id) so repeated backups of an
    /// unchanged store list them identically. Missing blobs are skipped and
    /// reported in the summary; they never fail the backup.
    pub async fn create_backup<W>(&self, sink: W) -> Result<(W, EncodeSummary), BackupError>
    where
        W: Write + Seek + Send,
    {
        let records = self.index.list_all().await?;
        let blobs = self.blobs.clone();

        let (sink, summary) = archive::encode(&records, sink, move |name| {
            let blobs = blobs.clone();
            async move { blobs.get(&name).await }
        })
        .await
        .map_err(BackupError::Archive)?;

        info!(
            "backup complete: {} records, {} blobs, {} missing",
            summary.records,
            summary.blobs_written,
            summary.missing_blobs.len()
        );
        Ok((sink, summary))
    }

    /// Restore an archive produced by [`create_backup`](Self::create_backup)
    /// or by the legacy filename-keyed format.
    ///
    /// Fails only when the archive cannot be decoded or its manifest is empty;
    /// in both cases nothing in the store has been touched.
    pub async fn restore_backup<R>(&self, source: R) -> Result<RestoreReport, BackupError>
    where
        R: Read + Seek + Send,
    {
        let mut archive = archive::blocking(|| ArchiveReader::open(source))
            .map_err(|err| BackupError::MalformedArchive(err.to_string()))?;
        if archive.manifest().is_empty() {
            return Err(BackupError::EmptyManifest);
        }

        let manifest = archive.manifest().to_vec();
        let entries = archive.blob_entries().to_vec();
        let lookup = ManifestLookup::new(&manifest);
        let mut report = RestoreReport::default();

        for entry in &entries {
            let Some(mut record) = lookup.resolve(entry.stem()).cloned() else {
                warn!("no manifest record for archive entry {}, skipping", entry.name);
                report.skip(entry, SkipReason::Unmatched);
                continue;
            };
            if record.id.is_empty() {
                record.id = Uuid::new_v4().to_string();
                debug!("minted id {} for legacy record {}", record.id, record.filename);
            }

            if let Err(reason) = self.restore_blob(&mut archive, entry, &record).await {
                warn!("restore of {} failed: {:?}", entry.name, reason);
                report.skip(entry, reason);
                continue;
            }
            if let Err(err) = self.upsert_record(record).await {
                warn!("metadata upsert for {} failed: {}", entry.name, err);
                report.skip(entry, SkipReason::MetadataWriteFailure(err.to_string()));
                continue;
            }
            report.restored += 1;
        }

        info!(
            "restore complete: {} restored, {} skipped",
            report.restored,
            report.skipped.len()
        );
        Ok(report)
    }

    /// Copy one archive entry into the blob store.
    ///
    /// The entry is decompressed into an anonymous temp file first, so memory
    /// stays bounded however large the entry turns out to be.
    async fn restore_blob<R>(
        &self,
        archive: &mut ArchiveReader<R>,
        entry: &BlobEntry,
        record: &FileRecord,
    ) -> Result<(), SkipReason>
    where
        R: Read + Seek + Send,
    {
        let spool = archive::blocking(|| -> archive::ArchiveResult<File> {
            let mut spool = tempfile::tempfile()?;
            archive.copy_blob(entry, &mut spool)?;
            spool.seek(SeekFrom::Start(0))?;
            Ok(spool)
        })
        .map_err(unavailable)?;

        let stream = ReaderStream::new(tokio::fs::File::from_std(spool)).boxed();
        self.blobs
            .put_stream(&record.blob_name(), stream)
            .await
            .map(|_| ())
            .map_err(unavailable)
    }

    /// Insert the archived record, or merge it into the live record with the same id.
    ///
    /// A live blob stored under a different extension is left where it is.
    async fn upsert_record(&self, archived: FileRecord) -> Result<(), StorageError> {
        let merged = match self.index.get(&archived.id).await? {
            None => archived,
            Some(existing) => {
                let previous_blob = existing.blob_name();
                if previous_blob != archived.blob_name()
                    && matches!(self.blobs.exists(&previous_blob).await, Ok(true))
                {
                    warn!(
                        "blob {} is no longer referenced by record {}",
                        previous_blob, existing.id
                    );
                }
                FileRecord {
                    filename: archived.filename,
                    tags: archived.tags,
                    size: archived.size,
                    content_type: archived.content_type,
                    created_at: archived.created_at,
                    updated_at: Utc::now(),
                    ..existing
                }
            }
        };
        self.index.upsert(&merged).await
    }
}

fn unavailable(err: impl std::fmt::Display) -> SkipReason {
    SkipReason::BlobUnavailable(err.to_string())
}

impl RestoreReport {
    fn skip(&mut self, entry: &BlobEntry, reason: SkipReason) {
        self.skipped.push(SkippedEntry {
            entry: entry.name.clone(),
            reason,
        });
    }
}

/// Join from archive entry stems to manifest records.
///
/// Current archives name entries `<id><ext>`, legacy ones use the original
/// filename. Filenames are not unique: when several records share one, the
/// last of them in manifest order wins.
struct ManifestLookup<'a> {
    by_blob_name: HashMap<String, &'a FileRecord>,
    by_filename: HashMap<&'a str, &'a FileRecord>,
}

impl<'a> ManifestLookup<'a> {
    fn new(manifest: &'a [FileRecord]) -> Self {
        let mut by_blob_name = HashMap::new();
        let mut by_filename = HashMap::new();
        for record in manifest {
            if !record.id.is_empty() {
                by_blob_name.insert(record.blob_name(), record);
            }
            by_filename.insert(record.filename.as_str(), record);
        }
        Self {
            by_blob_name,
            by_filename,
        }
    }

    fn resolve(&self, stem: &str) -> Option<&'a FileRecord> {
        self.by_blob_name
            .get(stem)
            .or_else(|| self.by_filename.get(stem))
            .copied()
    }
}
