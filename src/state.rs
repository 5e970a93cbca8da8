use crate::{
    services::{backup_service::BackupService, file_service::FileService},
    storage::{BlobStore, MetadataIndex},
};
use std::sync::Arc;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub files: FileService,
    pub backups: BackupService,
}

impl AppState {
    /// Wire both services onto the same pair of storage collaborators.
    pub fn new(index: Arc<dyn MetadataIndex>, blobs: Arc<dyn BlobStore>) -> Self {
        Self {
            files: FileService::new(index.clone(), blobs.clone()),
            backups: BackupService::new(index, blobs),
        }
    }
}
