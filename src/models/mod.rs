//! Core data models for the file vault.
//!
//! `FileRecord` is both the metadata index row and the archive manifest
//! element, so its serde shape doubles as a file format.

pub mod file_record;
pub mod tag;
