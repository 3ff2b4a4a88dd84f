//! SQLite-backed cache of query embeddings.
//!
//! Keyed on (model, text) so a model change never serves stale vectors.
//! Entries older than the TTL are ignored on read and removed by
//! [`EmbeddingCache::purge_expired`].

use chrono::Utc;
use research_core::{AppError, AppResult};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

pub struct EmbeddingCache {
    conn: Mutex<Connection>,
    ttl: Duration,
}

impl std::fmt::Debug for EmbeddingCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingCache")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl EmbeddingCache {
    /// Open (creating if needed) a cache database at `db_path`.
    pub fn open(db_path: &Path, ttl: Duration) -> AppResult<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(db_path).map_err(|e| db_error("open cache", e))?;
        Self::init(conn, ttl)
    }

    /// Cache that lives only as long as the process.
    pub fn in_memory(ttl: Duration) -> AppResult<Self> {
        let conn = Connection::open_in_memory().map_err(|e| db_error("open cache", e))?;
        Self::init(conn, ttl)
    }

    fn init(conn: Connection, ttl: Duration) -> AppResult<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS query_embeddings (
                model TEXT NOT NULL,
                text TEXT NOT NULL,
                embedding BLOB NOT NULL,
                created_at INTEGER NOT NULL,
                PRIMARY KEY (model, text)
            );
            "#,
        )
        .map_err(|e| db_error("create cache table", e))?;

        Ok(Self {
            conn: Mutex::new(conn),
            ttl,
        })
    }

    /// Cached vector for `(model, text)` if present and fresh.
    pub fn get(&self, model: &str, text: &str) -> AppResult<Option<Vec<f32>>> {
        let cutoff = self.cutoff();
        let conn = self.lock()?;

        let bytes: Option<Vec<u8>> = conn
            .query_row(
                "SELECT embedding FROM query_embeddings
                 WHERE model = ?1 AND text = ?2 AND created_at >= ?3",
                params![model, text, cutoff],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| db_error("read cache", e))?;

        bytes.map(|b| bytes_to_embedding(&b)).transpose()
    }

    /// Store or refresh the vector for `(model, text)`.
    pub fn put(&self, model: &str, text: &str, embedding: &[f32]) -> AppResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO query_embeddings (model, text, embedding, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                model,
                text,
                embedding_to_bytes(embedding),
                Utc::now().timestamp()
            ],
        )
        .map_err(|e| db_error("write cache", e))?;
        Ok(())
    }

    /// Delete expired entries, returning how many were removed.
    pub fn purge_expired(&self) -> AppResult<usize> {
        let cutoff = self.cutoff();
        let conn = self.lock()?;
        let removed = conn
            .execute(
                "DELETE FROM query_embeddings WHERE created_at < ?1",
                params![cutoff],
            )
            .map_err(|e| db_error("purge cache", e))?;

        if removed > 0 {
            tracing::debug!("Purged {} expired cached embeddings", removed);
        }
        Ok(removed)
    }

    fn cutoff(&self) -> i64 {
        Utc::now().timestamp() - self.ttl.as_secs() as i64
    }

    fn lock(&self) -> AppResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AppError::Other("embedding cache lock poisoned".to_string()))
    }
}

fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn bytes_to_embedding(bytes: &[u8]) -> AppResult<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(AppError::Other(
            "Invalid cached embedding length".to_string(),
        ));
    }

    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

fn db_error(action: &str, err: rusqlite::Error) -> AppError {
    AppError::Other(format!("Failed to {}: {}", action, err))
}
