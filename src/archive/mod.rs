//! Backup archive format.
//!
//! An archive is a ZIP container holding:
//! - `metadata.json`: a JSON array of every `FileRecord`
//! - `files/<id><ext>`: one entry per record whose blob could be read
//!
//! Archives written by the previous generation of the service name blob
//! entries `files/<original filename>` instead. [`ArchiveReader`] reports
//! entry names verbatim; matching them to manifest records is left to the
//! restore path.

use crate::models::file_record::FileRecord;
use bytes::Bytes;
use std::{
    future::Future,
    io::{self, Read, Seek, Write},
};
use thiserror::Error;
use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::warn;
use zip::{CompressionMethod, ZipArchive, ZipWriter, result::ZipError, write::SimpleFileOptions};

#[cfg(test)]
pub(crate) mod testing;

pub const MANIFEST_ENTRY: &str = "metadata.json";
pub const BLOB_PREFIX: &str = "files/";

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("archive container is unreadable: {0}")]
    Container(#[from] ZipError),
    #[error("archive has no `metadata.json` entry")]
    MissingManifest,
    #[error("archive manifest is not valid: {0}")]
    InvalidManifest(#[from] serde_json::Error),
    #[error("entry `{entry}` declares {declared} bytes but holds {actual}")]
    SizeMismatch {
        entry: String,
        declared: u64,
        actual: u64,
    },
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type ArchiveResult<T> = Result<T, ArchiveError>;

/// Archive entry name for a record's blob under the current convention.
pub fn blob_entry_name(record: &FileRecord) -> String {
    format!("{BLOB_PREFIX}{}", record.blob_name())
}

/// Run synchronous archive I/O, moving off the async worker when the
/// runtime allows it. Current-thread runtimes run `f` inline.
pub(crate) fn blocking<T>(f: impl FnOnce() -> T) -> T {
    match Handle::try_current().map(|handle| handle.runtime_flavor()) {
        Ok(RuntimeFlavor::MultiThread) => tokio::task::block_in_place(f),
        _ => f(),
    }
}

/// Incremental archive writer over any seekable sink.
pub struct ArchiveWriter<W: Write + Seek> {
    zip: ZipWriter<W>,
    options: SimpleFileOptions,
}

impl<W: Write + Seek> ArchiveWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            zip: ZipWriter::new(sink),
            options: SimpleFileOptions::default()
                .compression_method(CompressionMethod::Deflated)
                .large_file(true),
        }
    }

    pub fn write_manifest(&mut self, records: &[FileRecord]) -> ArchiveResult<()> {
        self.zip.start_file(MANIFEST_ENTRY, self.options)?;
        serde_json::to_writer(&mut self.zip, records)?;
        Ok(())
    }

    pub fn write_blob(&mut self, entry_name: &str, data: &[u8]) -> ArchiveResult<()> {
        self.zip.start_file(entry_name, self.options)?;
        self.zip.write_all(data)?;
        Ok(())
    }

    /// Write the central directory and hand back the sink.
    pub fn finish(self) -> ArchiveResult<W> {
        Ok(self.zip.finish()?)
    }
}

/// Outcome of [`encode`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EncodeSummary {
    pub records: usize,
    pub blobs_written: usize,
    /// Blob names that could not be read; their records are metadata-only.
    pub missing_blobs: Vec<String>,
}

/// Encode `records` and their blobs into `sink`.
///
/// `read_blob` is called once per record with the record's blob name. An
/// error from it skips that blob entry only; the manifest always lists
/// every record.
pub async fn encode<W, F, Fut, E>(
    records: &[FileRecord],
    sink: W,
    mut read_blob: F,
) -> ArchiveResult<(W, EncodeSummary)>
where
    W: Write + Seek,
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<Bytes, E>>,
    E: std::fmt::Display,
{
    let mut writer = ArchiveWriter::new(sink);
    blocking(|| writer.write_manifest(records))?;

    let mut summary = EncodeSummary {
        records: records.len(),
        ..Default::default()
    };

    for record in records {
        let blob_name = record.blob_name();
        match read_blob(blob_name.clone()).await {
            Ok(data) => {
                blocking(|| writer.write_blob(&blob_entry_name(record), &data))?;
                summary.blobs_written += 1;
            }
            Err(err) => {
                warn!("skipping blob {} for record {}: {}", blob_name, record.id, err);
                summary.missing_blobs.push(blob_name);
            }
        }
    }

    Ok((blocking(|| writer.finish())?, summary))
}

/// A candidate blob entry found in an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobEntry {
    index: usize,
    /// Full entry name, prefix included.
    pub name: String,
}

impl BlobEntry {
    /// Entry name with the `files/` prefix removed.
    pub fn stem(&self) -> &str {
        self.name.strip_prefix(BLOB_PREFIX).unwrap_or(&self.name)
    }
}

/// Decoded archive: the parsed manifest plus lazy access to blob entries.
pub struct ArchiveReader<R: Read + Seek> {
    zip: ZipArchive<R>,
    manifest: Vec<FileRecord>,
    blob_entries: Vec<BlobEntry>,
}

impl<R: Read + Seek> ArchiveReader<R> {
    /// Open an archive, parse its manifest and enumerate blob entries.
    ///
    /// Entries outside `files/`, directories and the manifest itself are ignored.
    pub fn open(source: R) -> ArchiveResult<Self> {
        let mut zip = ZipArchive::new(source)?;

        let manifest = match zip.by_name(MANIFEST_ENTRY) {
            Ok(entry) => serde_json::from_reader(entry)?,
            Err(ZipError::FileNotFound) => return Err(ArchiveError::MissingManifest),
            Err(err) => return Err(err.into()),
        };

        let mut blob_entries = Vec::new();
        for index in 0..zip.len() {
            let entry = zip.by_index_raw(index)?;
            let name = entry.name();
            if entry.is_dir() || !name.starts_with(BLOB_PREFIX) || name.len() == BLOB_PREFIX.len()
            {
                continue;
            }
            blob_entries.push(BlobEntry {
                index,
                name: name.to_string(),
            });
        }

        Ok(Self {
            zip,
            manifest,
            blob_entries,
        })
    }

    pub fn manifest(&self) -> &[FileRecord] {
        &self.manifest
    }

    /// Blob entries in archive order.
    pub fn blob_entries(&self) -> &[BlobEntry] {
        &self.blob_entries
    }

    /// Decompress one blob entry into `sink`, returning the bytes written.
    ///
    /// Nothing is sized from the entry header. The declared size is only
    /// compared against what was actually decompressed.
    pub fn copy_blob<W: Write>(&mut self, entry: &BlobEntry, sink: &mut W) -> ArchiveResult<u64> {
        let mut file = self.zip.by_index(entry.index)?;
        let declared = file.size();
        let actual = io::copy(&mut file, sink)?;
        if actual != declared {
            return Err(ArchiveError::SizeMismatch {
                entry: entry.name.clone(),
                declared,
                actual,
            });
        }
        Ok(actual)
    }
}
