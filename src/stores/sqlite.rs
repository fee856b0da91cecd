//! SQLite-backed vector collection using the `sqlite-vec` extension.
//!
//! Layout: a `chunks` table holds text plus the fixed provenance columns, a
//! `chunk_vectors` vec0 virtual table holds one embedding per chunk (joined
//! by rowid), and `collection_meta` records the embedder identity and vector
//! dimension fixed at first insert. Opening an existing file attaches to the
//! persisted collection; nothing is rebuilt.

use std::mem::transmute;
use std::os::raw::c_char;
use std::path::Path;
use std::sync::OnceLock;

use async_trait::async_trait;
use tokio_rusqlite::{Connection, OptionalExtension, ffi};

use super::{ChunkMetadata, NewChunk, ScoredChunk, VectorStore};
use crate::types::{RagError, Result};

/// Durable chunk collection with cosine nearest-neighbour search.
#[derive(Clone)]
pub struct SqliteVectorStore {
    conn: Connection,
}

impl SqliteVectorStore {
    /// Opens (or creates) the collection file at `path`.
    ///
    /// Registers the sqlite-vec extension process-wide, verifies it answers
    /// `vec_version()`, and ensures the base tables exist. The vector table
    /// itself is created on first insert, once the dimension is known.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        register_sqlite_vec()?;

        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let conn = Connection::open(path)
            .await
            .map_err(|err| RagError::Storage(err.to_string()))?;

        conn.call(|conn| {
            conn.query_row("select vec_version()", [], |row| row.get::<_, String>(0))
                .map_err(tokio_rusqlite::Error::Rusqlite)?;
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS chunks (
                     seq INTEGER PRIMARY KEY AUTOINCREMENT,
                     source TEXT NOT NULL,
                     chunk_index INTEGER NOT NULL,
                     scope TEXT,
                     content TEXT NOT NULL
                 );
                 CREATE INDEX IF NOT EXISTS idx_chunks_scope ON chunks(scope);
                 CREATE TABLE IF NOT EXISTS collection_meta (
                     key TEXT PRIMARY KEY,
                     value TEXT NOT NULL
                 );",
            )
            .map_err(tokio_rusqlite::Error::Rusqlite)?;
            Ok(())
        })
        .await
        .map_err(|err| RagError::Storage(err.to_string()))?;

        Ok(Self { conn })
    }

    /// Embedder identity persisted with the collection, if any rows exist.
    pub async fn embedder_id(&self) -> Result<Option<String>> {
        self.conn
            .call(|conn| {
                conn.query_row(
                    "SELECT value FROM collection_meta WHERE key = 'embedder'",
                    [],
                    |row| row.get::<_, String>(0),
                )
                .optional()
                .map_err(tokio_rusqlite::Error::Rusqlite)
            })
            .await
            .map_err(|err| RagError::Storage(err.to_string()))
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn insert_chunks(&self, embedder_id: &str, chunks: Vec<NewChunk>) -> Result<usize> {
        if chunks.is_empty() {
            return Ok(0);
        }
        let dims = chunks[0].embedding.len();
        if dims == 0 {
            return Err(RagError::Storage("refusing to store zero-length vectors".into()));
        }
        if let Some(bad) = chunks.iter().find(|c| c.embedding.len() != dims) {
            return Err(RagError::Storage(format!(
                "vector dimension mismatch within batch: expected {dims}, got {} for chunk {} of '{}'",
                bad.embedding.len(),
                bad.metadata.chunk_index,
                bad.metadata.source,
            )));
        }

        let embedder_id = embedder_id.to_string();
        self.conn
            .call(move |conn| {
                let tx = conn.transaction().map_err(tokio_rusqlite::Error::Rusqlite)?;

                let stored: Option<(String, usize)> = tx
                    .query_row(
                        "SELECT
                             (SELECT value FROM collection_meta WHERE key = 'embedder'),
                             (SELECT value FROM collection_meta WHERE key = 'dims')",
                        [],
                        |row| {
                            let embedder: Option<String> = row.get(0)?;
                            let dims_raw: Option<String> = row.get(1)?;
                            Ok(embedder.zip(dims_raw.and_then(|d| d.parse().ok())))
                        },
                    )
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;

                match stored {
                    Some((stored_embedder, stored_dims)) => {
                        if stored_dims != dims {
                            return Err(tokio_rusqlite::Error::Other(
                                format!(
                                    "collection was built with {stored_dims}-dim vectors, batch has {dims}"
                                )
                                .into(),
                            ));
                        }
                        if stored_embedder != embedder_id {
                            // Append-only corpus: no re-embedding, but mixed
                            // embedding spaces degrade relevance silently.
                            tracing::warn!(
                                stored = %stored_embedder,
                                incoming = %embedder_id,
                                "embedder changed since collection was created"
                            );
                        }
                    }
                    None => {
                        tx.execute(
                            &format!(
                                "CREATE VIRTUAL TABLE IF NOT EXISTS chunk_vectors USING vec0(embedding float[{dims}])"
                            ),
                            [],
                        )
                        .map_err(tokio_rusqlite::Error::Rusqlite)?;
                        tx.execute(
                            "INSERT OR REPLACE INTO collection_meta (key, value) VALUES ('embedder', ?1), ('dims', ?2)",
                            [&embedder_id, &dims.to_string()],
                        )
                        .map_err(tokio_rusqlite::Error::Rusqlite)?;
                    }
                }

                let mut written = 0usize;
                for chunk in &chunks {
                    tx.execute(
                        "INSERT INTO chunks (source, chunk_index, scope, content) VALUES (?1, ?2, ?3, ?4)",
                        rusqlite_params(chunk),
                    )
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                    let seq = tx.last_insert_rowid();
                    let vector_json = serde_json::to_string(&chunk.embedding)
                        .map_err(|err| tokio_rusqlite::Error::Other(err.into()))?;
                    tx.execute(
                        "INSERT INTO chunk_vectors (rowid, embedding) VALUES (?1, ?2)",
                        (seq, vector_json),
                    )
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                    written += 1;
                }

                tx.commit().map_err(tokio_rusqlite::Error::Rusqlite)?;
                Ok(written)
            })
            .await
            .map_err(|err| RagError::Storage(err.to_string()))
    }

    async fn search(
        &self,
        embedding: &[f32],
        k: usize,
        scope: Option<&str>,
    ) -> Result<Vec<ScoredChunk>> {
        let vector_json = serde_json::to_string(embedding)
            .map_err(|err| RagError::Storage(err.to_string()))?;
        let scope = scope.map(str::to_string);

        self.conn
            .call(move |conn| {
                let sql = format!(
                    "SELECT c.seq, c.source, c.chunk_index, c.scope, c.content,
                            vec_distance_cosine(v.embedding, vec_f32(?1)) AS distance
                     FROM chunks c
                     JOIN chunk_vectors v ON v.rowid = c.seq
                     WHERE (?2 IS NULL OR c.scope = ?2)
                     ORDER BY distance ASC, c.seq ASC
                     LIMIT {k}"
                );
                let mut stmt = conn
                    .prepare(&sql)
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;

                let rows = stmt
                    .query_map((&vector_json, scope.as_deref()), |row| {
                        Ok(ScoredChunk {
                            seq: row.get(0)?,
                            metadata: ChunkMetadata {
                                source: row.get(1)?,
                                chunk_index: row.get::<_, i64>(2)? as usize,
                                scope: row.get(3)?,
                            },
                            content: row.get(4)?,
                            distance: row.get(5)?,
                        })
                    })
                    .map_err(tokio_rusqlite::Error::Rusqlite)?
                    .collect::<std::result::Result<Vec<_>, _>>();
                rows.map_err(tokio_rusqlite::Error::Rusqlite)
            })
            .await
            .map_err(|err| RagError::Storage(err.to_string()))
    }

    async fn count(&self) -> Result<usize> {
        self.conn
            .call(|conn| {
                let count: i64 = conn
                    .query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                Ok(count as usize)
            })
            .await
            .map_err(|err| RagError::Storage(err.to_string()))
    }

    async fn scopes(&self) -> Result<Vec<String>> {
        self.conn
            .call(|conn| {
                let mut stmt = conn
                    .prepare(
                        "SELECT DISTINCT scope FROM chunks WHERE scope IS NOT NULL ORDER BY scope ASC",
                    )
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                let rows = stmt
                    .query_map([], |row| row.get::<_, String>(0))
                    .map_err(tokio_rusqlite::Error::Rusqlite)?
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                Ok(rows)
            })
            .await
            .map_err(|err| RagError::Storage(err.to_string()))
    }

    async fn reset(&self) -> Result<()> {
        self.conn
            .call(|conn| {
                conn.execute_batch(
                    "DELETE FROM chunks;
                     DROP TABLE IF EXISTS chunk_vectors;
                     DELETE FROM collection_meta;",
                )
                .map_err(tokio_rusqlite::Error::Rusqlite)?;
                Ok(())
            })
            .await
            .map_err(|err| RagError::Storage(err.to_string()))
    }
}

fn rusqlite_params(chunk: &NewChunk) -> (&str, i64, Option<&str>, &str) {
    (
        chunk.metadata.source.as_str(),
        chunk.metadata.chunk_index as i64,
        chunk.metadata.scope.as_deref(),
        chunk.content.as_str(),
    )
}

/// Registers the sqlite-vec extension for every connection in the process.
fn register_sqlite_vec() -> Result<()> {
    static REGISTERED: OnceLock<std::result::Result<(), String>> = OnceLock::new();

    let outcome = REGISTERED.get_or_init(|| unsafe {
        type SqliteExtensionInit = unsafe extern "C" fn(
            *mut ffi::sqlite3,
            *mut *mut c_char,
            *const ffi::sqlite3_api_routines,
        ) -> i32;

        let init: unsafe extern "C" fn() = sqlite_vec::sqlite3_vec_init;
        let init_fn: SqliteExtensionInit =
            transmute::<unsafe extern "C" fn(), SqliteExtensionInit>(init);
        let rc = ffi::sqlite3_auto_extension(Some(init_fn));
        if rc != 0 {
            Err(format!("failed to register sqlite-vec extension (code {rc})"))
        } else {
            Ok(())
        }
    });

    outcome.clone().map_err(RagError::Storage)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn chunk(source: &str, index: usize, scope: Option<&str>, content: &str, v: Vec<f32>) -> NewChunk {
        NewChunk {
            content: content.to_string(),
            metadata: ChunkMetadata {
                source: source.to_string(),
                chunk_index: index,
                scope: scope.map(str::to_string),
            },
            embedding: v,
        }
    }

    #[tokio::test]
    async fn insert_count_and_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("col.sqlite3");

        let store = SqliteVectorStore::open(&path).await.unwrap();
        let written = store
            .insert_chunks(
                "mock",
                vec![
                    chunk("a.pdf", 0, Some("2023"), "alpha", vec![1.0, 0.0, 0.0]),
                    chunk("a.pdf", 1, Some("2023"), "beta", vec![0.0, 1.0, 0.0]),
                ],
            )
            .await
            .unwrap();
        assert_eq!(written, 2);
        assert_eq!(store.count().await.unwrap(), 2);
        drop(store);

        let reopened = SqliteVectorStore::open(&path).await.unwrap();
        assert_eq!(reopened.count().await.unwrap(), 2);
        assert_eq!(reopened.embedder_id().await.unwrap().as_deref(), Some("mock"));
    }

    #[tokio::test]
    async fn search_orders_by_distance_then_insertion() {
        let dir = tempdir().unwrap();
        let store = SqliteVectorStore::open(dir.path().join("col.sqlite3"))
            .await
            .unwrap();
        store
            .insert_chunks(
                "mock",
                vec![
                    chunk("doc", 0, None, "far", vec![0.0, 1.0, 0.0]),
                    chunk("doc", 1, None, "near-first", vec![1.0, 0.0, 0.0]),
                    chunk("doc", 2, None, "near-second", vec![1.0, 0.0, 0.0]),
                ],
            )
            .await
            .unwrap();

        let hits = store.search(&[1.0, 0.0, 0.0], 3, None).await.unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].content, "near-first");
        assert_eq!(hits[1].content, "near-second");
        assert!(hits[0].seq < hits[1].seq, "ties break by insertion order");
        assert_eq!(hits[2].content, "far");
        assert!(hits[0].distance <= hits[2].distance);
    }

    #[tokio::test]
    async fn scope_filter_restricts_results() {
        let dir = tempdir().unwrap();
        let store = SqliteVectorStore::open(dir.path().join("col.sqlite3"))
            .await
            .unwrap();
        store
            .insert_chunks(
                "mock",
                vec![
                    chunk("r23.pdf", 0, Some("2023"), "old figures", vec![1.0, 0.0]),
                    chunk("r24.pdf", 0, Some("2024"), "new figures", vec![1.0, 0.0]),
                ],
            )
            .await
            .unwrap();

        let hits = store.search(&[1.0, 0.0], 5, Some("2023")).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].metadata.scope.as_deref(), Some("2023"));

        assert_eq!(store.scopes().await.unwrap(), vec!["2023", "2024"]);
    }

    #[tokio::test]
    async fn dimension_mismatch_is_rejected() {
        let dir = tempdir().unwrap();
        let store = SqliteVectorStore::open(dir.path().join("col.sqlite3"))
            .await
            .unwrap();
        store
            .insert_chunks("mock", vec![chunk("d", 0, None, "x", vec![1.0, 0.0])])
            .await
            .unwrap();
        let err = store
            .insert_chunks("mock", vec![chunk("d", 1, None, "y", vec![1.0, 0.0, 0.0])])
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Storage(_)));
    }

    #[tokio::test]
    async fn reset_empties_the_collection() {
        let dir = tempdir().unwrap();
        let store = SqliteVectorStore::open(dir.path().join("col.sqlite3"))
            .await
            .unwrap();
        store
            .insert_chunks("mock", vec![chunk("d", 0, None, "x", vec![1.0])])
            .await
            .unwrap();
        store.reset().await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
        assert_eq!(store.embedder_id().await.unwrap(), None);
    }
}
