//! Application services sitting between the HTTP handlers and storage.

pub mod backup_service;
pub mod file_service;
