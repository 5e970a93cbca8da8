//! src/storage/disk.rs
//!
//! DiskBlobStore: blobs as flat files directly beneath `base_path`. Writes
//! go through a `.tmp-<uuid>` sibling that is fsynced and renamed over the
//! destination, so readers never observe a half-written blob.

use super::{BlobReader, BlobStore, StorageError, StorageResult, ensure_blob_name_safe};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{StreamExt, stream::BoxStream};
use std::{
    io::{self, ErrorKind},
    path::PathBuf,
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

#[derive(Clone, Debug)]
pub struct DiskBlobStore {
    base_path: PathBuf,
}

impl DiskBlobStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    fn blob_path(&self, name: &str) -> StorageResult<PathBuf> {
        ensure_blob_name_safe(name)?;
        Ok(self.base_path.join(name))
    }

    fn not_found(name: &str) -> impl FnOnce(io::Error) -> StorageError + '_ {
        move |err| {
            if err.kind() == ErrorKind::NotFound {
                StorageError::BlobNotFound(name.to_string())
            } else {
                StorageError::Io(err)
            }
        }
    }
}

#[async_trait]
impl BlobStore for DiskBlobStore {
    async fn put_stream(
        &self,
        name: &str,
        mut stream: BoxStream<'_, io::Result<Bytes>>,
    ) -> StorageResult<u64> {
        let file_path = self.blob_path(name)?;
        fs::create_dir_all(&self.base_path).await?;
        let tmp_path = self.base_path.join(format!(".tmp-{}", Uuid::new_v4()));
        let mut file = File::create(&tmp_path).await?;

        let mut size: u64 = 0;
        while let Some(chunk_res) = stream.next().await {
            let chunk = match chunk_res {
                Ok(chunk) => chunk,
                Err(err) => {
                    let _ = fs::remove_file(&tmp_path).await;
                    return Err(StorageError::Io(err));
                }
            };
            size += chunk.len() as u64;
            if let Err(err) = file.write_all(&chunk).await {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(StorageError::Io(err));
            }
        }
        if let Err(err) = file.flush().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StorageError::Io(err));
        }
        if let Err(err) = file.sync_all().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StorageError::Io(err));
        }
        drop(file);

        if let Err(err) = fs::rename(&tmp_path, &file_path).await {
            if err.kind() == ErrorKind::AlreadyExists {
                fs::remove_file(&file_path).await?;
                fs::rename(&tmp_path, &file_path).await?;
            } else {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(StorageError::Io(err));
            }
        }

        debug!("wrote blob {} ({} bytes)", file_path.display(), size);
        Ok(size)
    }

    async fn get(&self, name: &str) -> StorageResult<Bytes> {
        let path = self.blob_path(name)?;
        let data = fs::read(&path).await.map_err(Self::not_found(name))?;
        Ok(Bytes::from(data))
    }

    async fn reader(&self, name: &str) -> StorageResult<BlobReader> {
        let path = self.blob_path(name)?;
        let file = File::open(&path).await.map_err(Self::not_found(name))?;
        Ok(Box::new(file))
    }

    async fn delete(&self, name: &str) -> StorageResult<()> {
        let path = self.blob_path(name)?;
        match fs::remove_file(&path).await {
            Ok(_) => debug!("removed blob {}", path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("blob {} already missing", path.display());
            }
            Err(err) => return Err(StorageError::Io(err)),
        }
        Ok(())
    }

    async fn exists(&self, name: &str) -> StorageResult<bool> {
        let path = self.blob_path(name)?;
        Ok(fs::try_exists(&path).await?)
    }

    /// Write, read back and remove a probe file under `base_path`.
    async fn ping(&self) -> StorageResult<()> {
        let tmp_path = self.base_path.join(format!(".readyz-{}", Uuid::new_v4()));
        fs::write(&tmp_path, b"readyz").await?;
        let bytes = fs::read(&tmp_path).await;
        let _ = fs::remove_file(&tmp_path).await;
        if bytes? != b"readyz" {
            return Err(StorageError::Io(io::Error::other("probe file content mismatch")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup_store() -> (TempDir, DiskBlobStore) {
        let temp_dir = TempDir::new().unwrap();
        let store = DiskBlobStore::new(temp_dir.path());
        (temp_dir, store)
    }

    #[tokio::test]
    async fn put_then_get_round_trips_and_overwrites() {
        let (_temp_dir, store) = setup_store();

        store.put("r1.txt", Bytes::from_static(b"first")).await.unwrap();
        store.put("r1.txt", Bytes::from_static(b"second")).await.unwrap();

        assert_eq!(store.get("r1.txt").await.unwrap(), Bytes::from_static(b"second"));
        assert!(store.exists("r1.txt").await.unwrap());
    }

    #[tokio::test]
    async fn put_stream_counts_bytes_and_leaves_no_temp_files() {
        let (temp_dir, store) = setup_store();
        let chunks: Vec<io::Result<Bytes>> = vec![
            Ok(Bytes::from_static(b"hel")),
            Ok(Bytes::from_static(b"lo")),
        ];

        let size = store
            .put_stream("r2.bin", futures::stream::iter(chunks).boxed())
            .await
            .unwrap();

        assert_eq!(size, 5);
        let names: Vec<_> = std::fs::read_dir(temp_dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["r2.bin".to_string()]);
    }

    #[tokio::test]
    async fn failed_stream_discards_partial_blob() {
        let (temp_dir, store) = setup_store();
        let chunks: Vec<io::Result<Bytes>> = vec![
            Ok(Bytes::from_static(b"partial")),
            Err(io::Error::other("client went away")),
        ];

        let result = store
            .put_stream("r3.bin", futures::stream::iter(chunks).boxed())
            .await;

        assert!(matches!(result, Err(StorageError::Io(_))));
        assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn missing_blob_is_not_found_and_delete_is_idempotent() {
        let (_temp_dir, store) = setup_store();

        assert!(matches!(
            store.get("nope.txt").await,
            Err(StorageError::BlobNotFound(name)) if name == "nope.txt"
        ));
        assert!(store.reader("nope.txt").await.is_err());
        store.delete("nope.txt").await.unwrap();
        assert!(!store.exists("nope.txt").await.unwrap());
    }

    #[tokio::test]
    async fn traversal_names_are_rejected() {
        let (_temp_dir, store) = setup_store();
        let result = store.put("../escape.txt", Bytes::from_static(b"x")).await;
        assert!(matches!(result, Err(StorageError::InvalidBlobName(_))));
    }

    #[tokio::test]
    async fn ping_succeeds_on_writable_directory() {
        let (_temp_dir, store) = setup_store();
        store.ping().await.unwrap();
    }
}
