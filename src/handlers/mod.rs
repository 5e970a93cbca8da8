//! HTTP handlers. Each submodule covers one resource.

pub mod backup_handlers;
pub mod file_handlers;
pub mod health_handlers;
