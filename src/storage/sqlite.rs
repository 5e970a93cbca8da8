//! src/storage/sqlite.rs
//!
//! SqliteIndex: the metadata index as a single `files` table. Tags are a
//! JSON array column and are queried with SQLite's `json_each`.

use super::{MetadataIndex, StorageError, StorageResult};
use crate::models::{file_record::FileRecord, tag::TagCount};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, QueryBuilder, SqlitePool, sqlite::Sqlite, types::Json};
use std::sync::Arc;

const RECORD_COLUMNS: &str = "id, filename, content_type, size, tags, created_at, updated_at";

#[derive(Clone)]
pub struct SqliteIndex {
    /// Shared SQLite connection pool.
    pub db: Arc<SqlitePool>,
}

#[derive(FromRow)]
struct FileRow {
    id: String,
    filename: String,
    content_type: String,
    size: i64,
    tags: Json<Vec<String>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<FileRow> for FileRecord {
    fn from(row: FileRow) -> Self {
        Self {
            id: row.id,
            filename: row.filename,
            content_type: row.content_type,
            size: row.size,
            tags: row.tags.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl SqliteIndex {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }
}

/// Escape `LIKE` wildcards so the query is matched literally.
fn like_pattern(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len() + 2);
    escaped.push('%');
    for c in query.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

#[async_trait]
impl MetadataIndex for SqliteIndex {
    async fn list_all(&self) -> StorageResult<Vec<FileRecord>> {
        let rows: Vec<FileRow> = sqlx::query_as(&format!(
            "SELECT {RECORD_COLUMNS} FROM files ORDER BY created_at ASC, id ASC"
        ))
        .fetch_all(&*self.db)
        .await?;
        Ok(rows.into_iter().map(FileRecord::from).collect())
    }

    async fn get(&self, id: &str) -> StorageResult<Option<FileRecord>> {
        let row: Option<FileRow> =
            sqlx::query_as(&format!("SELECT {RECORD_COLUMNS} FROM files WHERE id = ?"))
                .bind(id)
                .fetch_optional(&*self.db)
                .await?;
        Ok(row.map(FileRecord::from))
    }

    async fn upsert(&self, record: &FileRecord) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO files (id, filename, content_type, size, tags, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                filename = excluded.filename,
                content_type = excluded.content_type,
                size = excluded.size,
                tags = excluded.tags,
                created_at = excluded.created_at,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&record.id)
        .bind(&record.filename)
        .bind(&record.content_type)
        .bind(record.size)
        .bind(Json(&record.tags))
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&*self.db)
        .await?;
        Ok(())
    }

    async fn update_tags(&self, id: &str, tags: Vec<String>) -> StorageResult<FileRecord> {
        let row: Option<FileRow> = sqlx::query_as(&format!(
            "UPDATE files SET tags = ?, updated_at = ? WHERE id = ? RETURNING {RECORD_COLUMNS}"
        ))
        .bind(Json(&tags))
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(&*self.db)
        .await?;
        row.map(FileRecord::from)
            .ok_or_else(|| StorageError::RecordNotFound(id.to_string()))
    }

    async fn delete(&self, id: &str) -> StorageResult<FileRecord> {
        let row: Option<FileRow> = sqlx::query_as(&format!(
            "DELETE FROM files WHERE id = ? RETURNING {RECORD_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(&*self.db)
        .await?;
        row.map(FileRecord::from)
            .ok_or_else(|| StorageError::RecordNotFound(id.to_string()))
    }

    async fn search(
        &self,
        query: Option<&str>,
        offset: u32,
        limit: u32,
    ) -> StorageResult<Vec<FileRecord>> {
        let mut builder =
            QueryBuilder::<Sqlite>::new(format!("SELECT {RECORD_COLUMNS} FROM files"));

        if let Some(query) = query {
            builder.push(
                " WHERE EXISTS (SELECT 1 FROM json_each(files.tags) \
                 WHERE json_each.value LIKE ",
            );
            builder.push_bind(like_pattern(query));
            builder.push(" ESCAPE '\\')");
        }

        builder.push(" ORDER BY created_at DESC, id DESC LIMIT ");
        builder.push_bind(i64::from(limit));
        builder.push(" OFFSET ");
        builder.push_bind(i64::from(offset));

        let rows: Vec<FileRow> = builder.build_query_as().fetch_all(&*self.db).await?;
        Ok(rows.into_iter().map(FileRecord::from).collect())
    }

    async fn tag_counts(&self) -> StorageResult<Vec<TagCount>> {
        let tags = sqlx::query_as::<_, TagCount>(
            "SELECT json_each.value AS name, COUNT(DISTINCT files.id) AS count
             FROM files, json_each(files.tags)
             GROUP BY json_each.value
             ORDER BY json_each.value ASC",
        )
        .fetch_all(&*self.db)
        .await?;
        Ok(tags)
    }

    async fn ping(&self) -> StorageResult<()> {
        let one = sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&*self.db)
            .await?;
        if one != 1 {
            return Err(StorageError::Sqlx(sqlx::Error::Protocol(format!(
                "unexpected readiness result: {one}"
            ))));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use chrono::{Duration, TimeZone};

    async fn setup_index() -> SqliteIndex {
        let pool = db::connect("sqlite::memory:", 1).await.unwrap();
        db::run_migrations(&pool).await.unwrap();
        SqliteIndex::new(Arc::new(pool))
    }

    fn record(id: &str, filename: &str, tags: &[&str], minute: i64) -> FileRecord {
        let created = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap() + Duration::minutes(minute);
        FileRecord {
            id: id.into(),
            filename: filename.into(),
            content_type: "text/plain".into(),
            size: 5,
            tags: tags.iter().map(|t| t.to_string()).collect(),
            created_at: created,
            updated_at: created,
        }
    }

    #[tokio::test]
    async fn upsert_inserts_then_overwrites_by_id() {
        let index = setup_index().await;
        let mut rec = record("r1", "note.txt", &["work", "draft"], 0);
        index.upsert(&rec).await.unwrap();

        rec.tags = vec!["final".into()];
        rec.size = 9;
        index.upsert(&rec).await.unwrap();

        let stored = index.get("r1").await.unwrap().unwrap();
        assert_eq!(stored, rec);
        assert_eq!(index.list_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn list_all_orders_by_creation_then_id() {
        let index = setup_index().await;
        index.upsert(&record("b", "2.txt", &[], 1)).await.unwrap();
        index.upsert(&record("c", "3.txt", &[], 0)).await.unwrap();
        index.upsert(&record("a", "1.txt", &[], 1)).await.unwrap();

        let ids: Vec<_> = index
            .list_all()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[tokio::test]
    async fn search_matches_tag_substrings_newest_first() {
        let index = setup_index().await;
        index.upsert(&record("r1", "a.txt", &["Work"], 0)).await.unwrap();
        index.upsert(&record("r2", "b.txt", &["homework", "x"], 1)).await.unwrap();
        index.upsert(&record("r3", "c.txt", &["play"], 2)).await.unwrap();
        index.upsert(&record("r4", "d.txt", &["100%"], 3)).await.unwrap();

        let hits: Vec<_> = index
            .search(Some("work"), 0, 50)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(hits, vec!["r2", "r1"]);

        let literal: Vec<_> = index
            .search(Some("0%"), 0, 50)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(literal, vec!["r4"]);

        let page = index.search(None, 1, 2).await.unwrap();
        assert_eq!(page.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(), vec!["r3", "r2"]);
    }

    #[tokio::test]
    async fn tag_counts_group_distinct_records() {
        let index = setup_index().await;
        index.upsert(&record("r1", "a.txt", &["work", "work"], 0)).await.unwrap();
        index.upsert(&record("r2", "b.txt", &["draft", "work"], 1)).await.unwrap();

        let counts = index.tag_counts().await.unwrap();
        assert_eq!(
            counts,
            vec![
                TagCount { name: "draft".into(), count: 1 },
                TagCount { name: "work".into(), count: 2 },
            ]
        );
    }

    #[tokio::test]
    async fn update_and_delete_report_missing_records() {
        let index = setup_index().await;
        index.upsert(&record("r1", "a.txt", &["old"], 0)).await.unwrap();

        let updated = index.update_tags("r1", vec!["new".into()]).await.unwrap();
        assert_eq!(updated.tags, vec!["new"]);
        assert!(updated.updated_at > updated.created_at);

        let removed = index.delete("r1").await.unwrap();
        assert_eq!(removed.id, "r1");
        assert!(matches!(
            index.delete("r1").await,
            Err(StorageError::RecordNotFound(_))
        ));
        assert!(matches!(
            index.update_tags("r1", vec![]).await,
            Err(StorageError::RecordNotFound(_))
        ));
    }
}
