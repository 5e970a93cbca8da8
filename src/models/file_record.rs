//! Represents a stored file's descriptive record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Metadata for one uploaded file.
///
/// The blob holding the file's bytes is never named here. It is always
/// addressed as `id + extension_of(filename)`, see [`FileRecord::blob_name`].
/// The serialized field names are part of the archive manifest format.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct FileRecord {
    /// Opaque primary key. Very old manifests may carry an empty or null id.
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,

    /// Display name supplied by the uploader. Not unique.
    pub filename: String,

    /// MIME type reported at upload time.
    #[serde(default, deserialize_with = "null_as_default")]
    pub content_type: String,

    /// Byte length of the blob.
    #[serde(default, deserialize_with = "null_as_default")]
    pub size: i64,

    /// Trimmed, non-empty tags in upload order. Duplicates are kept.
    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: Vec<String>,

    /// Set once at creation; restores carry it over from the archive.
    #[serde(default = "Utc::now", deserialize_with = "null_as_now")]
    pub created_at: DateTime<Utc>,

    /// Refreshed on every metadata mutation.
    #[serde(default = "Utc::now", deserialize_with = "null_as_now")]
    pub updated_at: DateTime<Utc>,
}

impl FileRecord {
    /// Name of the blob backing this record: `<id><ext>`.
    pub fn blob_name(&self) -> String {
        format!("{}{}", self.id, extension_of(&self.filename))
    }
}

/// Returns the extension of `filename` including the leading dot, or `""`.
///
/// Only the final path element is considered, so `dir.d/README` has no
/// extension while `archive.tar.gz` yields `.gz`.
pub fn extension_of(filename: &str) -> &str {
    match filename.rfind(['.', '/', '\\']) {
        Some(pos) if filename[pos..].starts_with('.') => &filename[pos..],
        _ => "",
    }
}

/// Split a comma separated tag string, trimming and dropping empty entries.
pub fn parse_tags(raw: &str) -> Vec<String> {
    normalize_tags(raw.split(','))
}

/// Trim every tag and drop the ones left empty. Order and duplicates are kept.
pub fn normalize_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    tags.into_iter()
        .map(|t| t.as_ref().trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn null_as_now<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<DateTime<Utc>>::deserialize(deserializer)?.unwrap_or_else(Utc::now))
}
