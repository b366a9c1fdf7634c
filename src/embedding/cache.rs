// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite-backed embedding cache.
//!
//! One row per document id holding the content hash the embedding was
//! computed from. A lookup only succeeds when the stored hash equals the
//! caller's hash, so edited documents are always re-embedded. Writes are
//! single-row upserts; the connection sits behind a mutex so the cache can
//! be shared by concurrent workers.

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::CacheError;

type Result<T> = std::result::Result<T, CacheError>;

/// A stored embedding row.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub doc_id: String,
    pub content_hash: String,
    pub embedding: Vec<f32>,
    /// Unix timestamp (milliseconds) of the last write
    pub updated_at: i64,
}

/// Durable `doc_id -> (content_hash, embedding)` store.
pub struct EmbeddingCache {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl EmbeddingCache {
    /// Opens or creates a cache database at the specified path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| CacheError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let conn = Connection::open(&path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        // journal_mode returns a row, so it cannot go through execute_batch
        let _mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;

        let cache = Self {
            conn: Mutex::new(conn),
            path: Some(path),
        };
        cache.init_schema()?;
        tracing::debug!(path = ?cache.path, "opened embedding cache");
        Ok(cache)
    }

    /// Opens a throwaway in-memory cache.
    pub fn open_in_memory() -> Result<Self> {
        let cache = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
            path: None,
        };
        cache.init_schema()?;
        Ok(cache)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.lock().execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS embeddings (
                doc_id TEXT PRIMARY KEY,
                content_hash TEXT NOT NULL,
                embedding BLOB NOT NULL,
                updated_at INTEGER NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    /// Returns the path to the database file, if file-backed.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Returns the cached embedding only when the stored hash matches `content_hash`.
    pub fn get(&self, doc_id: &str, content_hash: &str) -> Result<Option<Vec<f32>>> {
        let row: Option<(String, Vec<u8>)> = self
            .conn
            .lock()
            .query_row(
                "SELECT content_hash, embedding FROM embeddings WHERE doc_id = ?1",
                params![doc_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match row {
            Some((stored_hash, blob)) if stored_hash == content_hash => {
                Ok(Some(blob_to_embedding(doc_id, &blob)?))
            }
            _ => Ok(None),
        }
    }

    /// Inserts or replaces the embedding for `doc_id`.
    pub fn put(&self, doc_id: &str, content_hash: &str, embedding: &[f32]) -> Result<()> {
        let updated_at = now_millis();
        self.conn.lock().execute(
            r#"
            INSERT INTO embeddings (doc_id, content_hash, embedding, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(doc_id) DO UPDATE SET
                content_hash = excluded.content_hash,
                embedding = excluded.embedding,
                updated_at = excluded.updated_at
            "#,
            params![doc_id, content_hash, embedding_to_blob(embedding), updated_at],
        )?;
        Ok(())
    }

    /// Exports every cached embedding keyed by document id.
    pub fn all_entries(&self) -> Result<HashMap<String, Vec<f32>>> {
        Ok(self
            .entries()?
            .into_iter()
            .map(|entry| (entry.doc_id, entry.embedding))
            .collect())
    }

    /// Lists full cache rows ordered by document id.
    pub fn entries(&self) -> Result<Vec<CacheEntry>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            r#"
            SELECT doc_id, content_hash, embedding, updated_at
            FROM embeddings
            ORDER BY doc_id
            "#,
        )?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Vec<u8>>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(doc_id, content_hash, blob, updated_at)| {
                let embedding = blob_to_embedding(&doc_id, &blob)?;
                Ok(CacheEntry {
                    doc_id,
                    content_hash,
                    embedding,
                    updated_at,
                })
            })
            .collect()
    }

    /// Counts cached rows.
    pub fn count(&self) -> Result<u64> {
        let count: i64 =
            self.conn
                .lock()
                .query_row("SELECT COUNT(*) FROM embeddings", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

/// Converts an embedding vector to a compact little-endian blob.
fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Converts a blob back to an embedding vector.
fn blob_to_embedding(doc_id: &str, blob: &[u8]) -> Result<Vec<f32>> {
    if blob.len() % 4 != 0 {
        return Err(CacheError::CorruptBlob {
            doc_id: doc_id.to_string(),
            len: blob.len(),
        });
    }
    Ok(blob
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::tempdir;

    #[test]
    fn test_cache_create_and_reopen() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("nested").join("embeddings.sqlite");

        {
            let cache = EmbeddingCache::open(&db_path).unwrap();
            cache.put("doc1", "h1", &[1.0, 2.0, 3.0]).unwrap();
        }
        assert!(db_path.exists());

        let cache = EmbeddingCache::open(&db_path).unwrap();
        assert_eq!(cache.get("doc1", "h1").unwrap(), Some(vec![1.0, 2.0, 3.0]));
    }

    #[test]
    fn test_get_requires_matching_hash() {
        let cache = EmbeddingCache::open_in_memory().unwrap();
        cache.put("doc1", "h1", &[0.5, -0.5]).unwrap();

        assert_eq!(cache.get("doc1", "h1").unwrap(), Some(vec![0.5, -0.5]));
        assert_eq!(cache.get("doc1", "h2").unwrap(), None);
        assert_eq!(cache.get("doc2", "h1").unwrap(), None);
    }

    #[test]
    fn test_put_overwrites_single_row() {
        let cache = EmbeddingCache::open_in_memory().unwrap();
        cache.put("doc1", "h1", &[1.0]).unwrap();
        let first = cache.entries().unwrap()[0].updated_at;

        std::thread::sleep(Duration::from_millis(5));
        cache.put("doc1", "h2", &[2.0]).unwrap();

        assert_eq!(cache.count().unwrap(), 1);
        assert_eq!(cache.get("doc1", "h1").unwrap(), None);
        assert_eq!(cache.get("doc1", "h2").unwrap(), Some(vec![2.0]));
        let entry = &cache.entries().unwrap()[0];
        assert_eq!(entry.content_hash, "h2");
        assert!(entry.updated_at > first);
    }

    #[test]
    fn test_all_entries() {
        let cache = EmbeddingCache::open_in_memory().unwrap();
        cache.put("a", "ha", &[1.0, 0.0]).unwrap();
        cache.put("b", "hb", &[0.0, 1.0]).unwrap();

        let all = cache.all_entries().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all["a"], vec![1.0, 0.0]);
        assert_eq!(all["b"], vec![0.0, 1.0]);
    }

    #[test]
    fn test_concurrent_writers_do_not_lose_rows() {
        let cache = Arc::new(EmbeddingCache::open_in_memory().unwrap());
        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    for i in 0..25 {
                        let id = format!("w{}-d{}", worker, i);
                        cache.put(&id, "h", &[worker as f32, i as f32]).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(cache.count().unwrap(), 200);
        assert_eq!(cache.get("w3-d7", "h").unwrap(), Some(vec![3.0, 7.0]));
    }

    #[test]
    fn test_corrupt_blob_is_an_error() {
        let cache = EmbeddingCache::open_in_memory().unwrap();
        cache
            .conn
            .lock()
            .execute(
                "INSERT INTO embeddings (doc_id, content_hash, embedding, updated_at) VALUES ('bad', 'h', x'010203', 0)",
                [],
            )
            .unwrap();

        let err = cache.get("bad", "h").unwrap_err();
        assert!(matches!(err, CacheError::CorruptBlob { len: 3, .. }));
    }
}
