//! SQLite backend for identities and knowledge collections.
//!
//! Uses a single SQLite database file with two tables:
//! - `identities`: one row per user, reference embedding as a little-endian f32 blob
//! - `passages`: one row per passage, tagged with its collection id
//!
//! Similarity ranking happens in Rust over the rows of one collection, which
//! keeps scores identical to the in-memory backend.

use crate::vector;
use async_trait::async_trait;
use chrono::Utc;
use mimir_core::error::StoreError;
use mimir_core::identity::{IdentityStore, UserIdentity};
use mimir_core::knowledge::{CollectionStats, KnowledgeIndex, Passage, RetrievalResult};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};

/// A SQLite store implementing both [`IdentityStore`] and [`KnowledgeIndex`].
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the database at `path`.
    ///
    /// Pass `"sqlite::memory:"` for an in-process ephemeral database (useful for tests).
    pub async fn new(path: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| StoreError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite store initialized at {path}");
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS identities (
                user_id      TEXT PRIMARY KEY NOT NULL,
                display_name TEXT NOT NULL,
                role         TEXT NOT NULL,
                embedding    BLOB NOT NULL,
                created_at   TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("identities table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS passages (
                iid           INTEGER PRIMARY KEY AUTOINCREMENT,
                passage_id    TEXT UNIQUE NOT NULL,
                collection_id TEXT NOT NULL,
                text          TEXT NOT NULL,
                source_label  TEXT NOT NULL,
                embedding     BLOB NOT NULL,
                created_at    TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("passages table: {e}")))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_passages_collection ON passages(collection_id)")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::MigrationFailed(format!("collection index: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    fn row_to_identity(row: &sqlx::sqlite::SqliteRow) -> Result<UserIdentity, StoreError> {
        let get = |col: &str| -> Result<String, StoreError> {
            row.try_get(col)
                .map_err(|e| StoreError::QueryFailed(format!("{col} column: {e}")))
        };
        let blob: Vec<u8> = row
            .try_get("embedding")
            .map_err(|e| StoreError::QueryFailed(format!("embedding column: {e}")))?;
        let created_at = chrono::DateTime::parse_from_rfc3339(&get("created_at")?)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| StoreError::InvalidRecord(format!("created_at: {e}")))?;

        Ok(UserIdentity {
            user_id: get("user_id")?,
            display_name: get("display_name")?,
            role: get("role")?,
            reference_embedding: vector::blob_to_embedding(&blob),
            created_at,
        })
    }

    fn row_to_passage(row: &sqlx::sqlite::SqliteRow) -> Result<Passage, StoreError> {
        let get = |col: &str| -> Result<String, StoreError> {
            row.try_get(col)
                .map_err(|e| StoreError::QueryFailed(format!("{col} column: {e}")))
        };
        let blob: Vec<u8> = row
            .try_get("embedding")
            .map_err(|e| StoreError::QueryFailed(format!("embedding column: {e}")))?;

        Ok(Passage {
            passage_id: get("passage_id")?,
            collection_id: get("collection_id")?,
            text: get("text")?,
            embedding: vector::blob_to_embedding(&blob),
            source_label: get("source_label")?,
        })
    }
}

#[async_trait]
impl IdentityStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn upsert(&self, identity: UserIdentity) -> Result<UserIdentity, StoreError> {
        if identity.user_id.is_empty() {
            return Err(StoreError::InvalidRecord("user_id is empty".into()));
        }
        let embedding = vector::normalize(&identity.reference_embedding);

        sqlx::query(
            r#"
            INSERT INTO identities (user_id, display_name, role, embedding, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(user_id) DO UPDATE SET
                display_name = excluded.display_name,
                role = excluded.role,
                embedding = excluded.embedding
            "#,
        )
        .bind(&identity.user_id)
        .bind(&identity.display_name)
        .bind(&identity.role)
        .bind(vector::embedding_to_blob(&embedding))
        .bind(identity.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("identity upsert failed: {e}")))?;

        debug!(user_id = %identity.user_id, "Stored identity");
        self.get(&identity.user_id)
            .await?
            .ok_or_else(|| StoreError::Storage("identity vanished after upsert".into()))
    }

    async fn get(&self, user_id: &str) -> Result<Option<UserIdentity>, StoreError> {
        let row = sqlx::query("SELECT * FROM identities WHERE user_id = ?1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("identity lookup: {e}")))?;
        row.as_ref().map(Self::row_to_identity).transpose()
    }

    async fn remove(&self, user_id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM identities WHERE user_id = ?1")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("identity delete: {e}")))?;
        Ok(result.rows_affected() > 0)
    }

    async fn snapshot(&self) -> Result<Vec<UserIdentity>, StoreError> {
        let rows = sqlx::query("SELECT * FROM identities ORDER BY user_id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("identity snapshot: {e}")))?;
        rows.iter().map(Self::row_to_identity).collect()
    }

    async fn count(&self) -> Result<usize, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM identities")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("identity count: {e}")))?;
        let n: i64 = row.try_get("n").map_err(|e| StoreError::QueryFailed(e.to_string()))?;
        Ok(n as usize)
    }

    async fn clear(&self) -> Result<usize, StoreError> {
        let result = sqlx::query("DELETE FROM identities")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("identity clear: {e}")))?;
        Ok(result.rows_affected() as usize)
    }
}

#[async_trait]
impl KnowledgeIndex for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn search(
        &self,
        collection_id: &str,
        query_embedding: &[f32],
        k: usize,
    ) -> Result<Vec<RetrievalResult>, StoreError> {
        let rows = sqlx::query("SELECT * FROM passages WHERE collection_id = ?1")
            .bind(collection_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("passage search: {e}")))?;

        let passages: Vec<Passage> = rows
            .iter()
            .map(Self::row_to_passage)
            .collect::<Result<_, _>>()?;
        Ok(vector::rank_passages(&passages, query_embedding, k))
    }

    async fn append(&self, collection_id: &str, passages: Vec<Passage>) -> Result<usize, StoreError> {
        if passages.iter().any(|p| p.collection_id != collection_id) {
            return Err(StoreError::InvalidRecord(format!(
                "passage does not belong to collection '{collection_id}'"
            )));
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Storage(format!("begin: {e}")))?;
        let now = Utc::now().to_rfc3339();
        for passage in &passages {
            sqlx::query(
                r#"
                INSERT INTO passages (passage_id, collection_id, text, source_label, embedding, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
            )
            .bind(&passage.passage_id)
            .bind(&passage.collection_id)
            .bind(&passage.text)
            .bind(&passage.source_label)
            .bind(vector::embedding_to_blob(&passage.embedding))
            .bind(&now)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Storage(format!("passage insert: {e}")))?;
        }
        tx.commit()
            .await
            .map_err(|e| StoreError::Storage(format!("commit: {e}")))?;

        debug!(collection = collection_id, added = passages.len(), "Appended passages");
        Ok(passages.len())
    }

    async fn delete_collection(&self, collection_id: &str) -> Result<usize, StoreError> {
        let result = sqlx::query("DELETE FROM passages WHERE collection_id = ?1")
            .bind(collection_id)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("collection delete: {e}")))?;
        Ok(result.rows_affected() as usize)
    }

    async fn collection_stats(&self, collection_id: &str) -> Result<Option<CollectionStats>, StoreError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS n, MAX(length(embedding)) AS bytes FROM passages WHERE collection_id = ?1",
        )
        .bind(collection_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("collection stats: {e}")))?;

        let n: i64 = row.try_get("n").map_err(|e| StoreError::QueryFailed(e.to_string()))?;
        if n == 0 {
            return Ok(None);
        }
        let bytes: Option<i64> = row.try_get("bytes").map_err(|e| StoreError::QueryFailed(e.to_string()))?;
        Ok(Some(CollectionStats {
            collection_id: collection_id.to_string(),
            passage_count: n as usize,
            dimension: bytes.map(|b| b as usize / 4),
        }))
    }

    async fn list_collections(&self) -> Result<Vec<CollectionStats>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT collection_id, COUNT(*) AS n, MAX(length(embedding)) AS bytes
            FROM passages
            GROUP BY collection_id
            ORDER BY collection_id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("list collections: {e}")))?;

        rows.iter()
            .map(|row| {
                let collection_id: String = row
                    .try_get("collection_id")
                    .map_err(|e| StoreError::QueryFailed(e.to_string()))?;
                let n: i64 = row.try_get("n").map_err(|e| StoreError::QueryFailed(e.to_string()))?;
                let bytes: Option<i64> =
                    row.try_get("bytes").map_err(|e| StoreError::QueryFailed(e.to_string()))?;
                Ok(CollectionStats {
                    collection_id,
                    passage_count: n as usize,
                    dimension: bytes.map(|b| b as usize / 4),
                })
            })
            .collect()
    }
}
