use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A distinct tag and how many records carry it.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq, Eq)]
pub struct TagCount {
    pub name: String,
    pub count: i64,
}
