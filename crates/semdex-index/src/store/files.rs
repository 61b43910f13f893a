use serde::Serialize;
use sqlx::SqliteConnection;

use super::vector::{cosine_distance, pack, unpack};
use super::{EmbeddingStore, unix_now};
use crate::chunker::ChunkKind;
use crate::error::Result;

/// A chunk with its embedding, as handed to [`EmbeddingStore::store_file`].
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkRecord {
    pub text: String,
    pub line_start: usize,
    pub line_end: usize,
    pub kind: ChunkKind,
    pub symbol_name: Option<String>,
    pub summary: Option<String>,
    pub embedding: Vec<f32>,
}

/// A chunk read back from the store, with its owning file.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredChunk {
    pub id: i64,
    pub uri: String,
    pub language_id: String,
    pub text: String,
    pub line_start: usize,
    pub line_end: usize,
    pub kind: ChunkKind,
    pub symbol_name: Option<String>,
    pub summary: Option<String>,
    pub embedding: Vec<f32>,
}

/// KNN hit: chunk plus cosine distance (`1 - similarity`).
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk: StoredChunk,
    pub distance: f32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexedFileInfo {
    pub uri: String,
    pub content_hash: String,
    pub language_id: String,
    pub chunk_count: usize,
    pub last_indexed_at: i64,
}

type ChunkRow = (
    i64,
    String,
    String,
    String,
    i64,
    i64,
    String,
    Option<String>,
    Option<String>,
    Vec<u8>,
);

const CHUNK_SELECT: &str = "SELECT c.id, f.uri, f.language_id, c.text, c.line_start, c.line_end, \
     c.kind, c.symbol_name, c.summary, c.embedding \
     FROM chunks c JOIN files f ON f.id = c.file_id";

fn row_to_chunk(row: ChunkRow) -> Result<StoredChunk> {
    let (id, uri, language_id, text, line_start, line_end, kind, symbol_name, summary, blob) = row;
    Ok(StoredChunk {
        id,
        uri,
        language_id,
        text,
        line_start: usize::try_from(line_start)?,
        line_end: usize::try_from(line_end)?,
        kind: kind.parse().unwrap_or(ChunkKind::Unknown),
        symbol_name,
        summary,
        embedding: unpack(&blob),
    })
}

impl EmbeddingStore {
    /// True iff `uri` is stored with exactly `content_hash`.
    ///
    /// # Errors
    ///
    /// Returns an error if the `SQLite` query fails.
    pub async fn is_indexed(&self, uri: &str, content_hash: &str) -> Result<bool> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM files WHERE uri = ? AND content_hash = ?")
                .bind(uri)
                .bind(content_hash)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.is_some())
    }

    /// Replace every chunk of `uri` with `chunks` in one transaction.
    ///
    /// On any failure the transaction rolls back and the previous record is
    /// left untouched. Returns the number of chunks written.
    ///
    /// # Errors
    ///
    /// Returns an error if any statement fails or a line number overflows `i64`.
    pub async fn store_file(
        &self,
        uri: &str,
        content_hash: &str,
        language_id: &str,
        chunks: &[ChunkRecord],
    ) -> Result<usize> {
        let mut tx = self.pool.begin().await?;

        let (file_id,): (i64,) = sqlx::query_as(
            "INSERT INTO files (uri, content_hash, language_id, last_indexed_at) \
             VALUES (?, ?, ?, ?) \
             ON CONFLICT(uri) DO UPDATE SET \
             content_hash = excluded.content_hash, \
             language_id = excluded.language_id, \
             last_indexed_at = excluded.last_indexed_at \
             RETURNING id",
        )
        .bind(uri)
        .bind(content_hash)
        .bind(language_id)
        .bind(unix_now())
        .fetch_one(&mut *tx)
        .await?;

        self.delete_file_chunks(&mut tx, file_id).await?;

        for (ordinal, chunk) in chunks.iter().enumerate() {
            let chunk_id = sqlx::query(
                "INSERT INTO chunks \
                 (file_id, ordinal, text, line_start, line_end, kind, symbol_name, summary, embedding) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(file_id)
            .bind(i64::try_from(ordinal)?)
            .bind(&chunk.text)
            .bind(i64::try_from(chunk.line_start)?)
            .bind(i64::try_from(chunk.line_end)?)
            .bind(chunk.kind.as_str())
            .bind(chunk.symbol_name.as_deref())
            .bind(chunk.summary.as_deref())
            .bind(pack(&chunk.embedding))
            .execute(&mut *tx)
            .await?
            .last_insert_rowid();

            if self.vector_index && chunk.embedding.len() == self.dimensions {
                let vec_rowid = sqlx::query("INSERT INTO vec_chunks (embedding) VALUES (?)")
                    .bind(pack(&chunk.embedding))
                    .execute(&mut *tx)
                    .await?
                    .last_insert_rowid();
                sqlx::query("INSERT INTO vec_chunk_map (vec_rowid, chunk_id) VALUES (?, ?)")
                    .bind(vec_rowid)
                    .bind(chunk_id)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        tx.commit().await?;
        Ok(chunks.len())
    }

    /// Remove `uri` with its chunks and vector-index rows. Returns `false` if it was not stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction fails.
    pub async fn remove_file(&self, uri: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM files WHERE uri = ?")
            .bind(uri)
            .fetch_optional(&mut *tx)
            .await?;
        let Some((file_id,)) = row else {
            return Ok(false);
        };

        self.delete_file_chunks(&mut tx, file_id).await?;
        sqlx::query("DELETE FROM files WHERE id = ?")
            .bind(file_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn delete_file_chunks(&self, conn: &mut SqliteConnection, file_id: i64) -> Result<()> {
        if self.vector_index {
            let rowids: Vec<(i64,)> = sqlx::query_as(
                "SELECT m.vec_rowid FROM vec_chunk_map m \
                 JOIN chunks c ON c.id = m.chunk_id WHERE c.file_id = ?",
            )
            .bind(file_id)
            .fetch_all(&mut *conn)
            .await?;
            for (rowid,) in rowids {
                sqlx::query("DELETE FROM vec_chunks WHERE rowid = ?")
                    .bind(rowid)
                    .execute(&mut *conn)
                    .await?;
            }
        }
        sqlx::query(
            "DELETE FROM vec_chunk_map WHERE chunk_id IN (SELECT id FROM chunks WHERE file_id = ?)",
        )
        .bind(file_id)
        .execute(&mut *conn)
        .await?;
        sqlx::query("DELETE FROM chunks WHERE file_id = ?")
            .bind(file_id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    /// Chunks of `uri` in file order.
    ///
    /// # Errors
    ///
    /// Returns an error if the `SQLite` query fails.
    pub async fn get_chunks_for_file(&self, uri: &str) -> Result<Vec<StoredChunk>> {
        let rows: Vec<ChunkRow> =
            sqlx::query_as(&format!("{CHUNK_SELECT} WHERE f.uri = ? ORDER BY c.ordinal"))
                .bind(uri)
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(row_to_chunk).collect()
    }

    /// Every stored chunk.
    ///
    /// # Errors
    ///
    /// Returns an error if the `SQLite` query fails.
    pub async fn get_all_chunks(&self) -> Result<Vec<StoredChunk>> {
        let rows: Vec<ChunkRow> =
            sqlx::query_as(&format!("{CHUNK_SELECT} ORDER BY f.uri, c.ordinal"))
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(row_to_chunk).collect()
    }

    async fn chunks_for_language(&self, language_id: &str) -> Result<Vec<StoredChunk>> {
        let rows: Vec<ChunkRow> = sqlx::query_as(&format!(
            "{CHUNK_SELECT} WHERE f.language_id = ? ORDER BY f.uri, c.ordinal"
        ))
        .bind(language_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(row_to_chunk).collect()
    }

    async fn chunks_by_id(&self, ids: &[i64]) -> Result<Vec<StoredChunk>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!("{CHUNK_SELECT} WHERE c.id IN ({placeholders})");
        let mut query = sqlx::query_as::<_, ChunkRow>(&sql);
        for id in ids {
            query = query.bind(id);
        }
        let rows = query.fetch_all(&self.pool).await?;
        rows.into_iter().map(row_to_chunk).collect()
    }

    /// Per-file summary, ordered by URI.
    ///
    /// # Errors
    ///
    /// Returns an error if the `SQLite` query fails.
    pub async fn indexed_files(&self) -> Result<Vec<IndexedFileInfo>> {
        let rows: Vec<(String, String, String, i64, i64)> = sqlx::query_as(
            "SELECT f.uri, f.content_hash, f.language_id, f.last_indexed_at, COUNT(c.id) \
             FROM files f LEFT JOIN chunks c ON c.file_id = f.id \
             GROUP BY f.id ORDER BY f.uri",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|(uri, content_hash, language_id, last_indexed_at, count)| {
                Ok(IndexedFileInfo {
                    uri,
                    content_hash,
                    language_id,
                    chunk_count: usize::try_from(count)?,
                    last_indexed_at,
                })
            })
            .collect()
    }

    /// URIs of every stored file.
    ///
    /// # Errors
    ///
    /// Returns an error if the `SQLite` query fails.
    pub async fn indexed_uris(&self) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT uri FROM files ORDER BY uri")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(uri,)| uri).collect())
    }

    /// `k` nearest chunks to `query` by ascending cosine distance.
    ///
    /// Uses the `vec0` index when loaded and `query` has the configured
    /// dimensionality, otherwise a brute-force scan.
    ///
    /// # Errors
    ///
    /// Returns an error if the `SQLite` query fails.
    pub async fn search_knn(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        if k == 0 || query.is_empty() {
            return Ok(Vec::new());
        }
        if self.vector_index && query.len() == self.dimensions {
            match self.search_indexed(query, k).await {
                Ok(hits) => return Ok(hits),
                Err(e) => tracing::warn!("vector index query failed, scanning instead: {e:#}"),
            }
        }
        let all = self.get_all_chunks().await?;
        Ok(rank(all, query, k))
    }

    /// Like [`search_knn`](Self::search_knn), restricted to one language when `language_id` is set.
    ///
    /// Filtered queries always scan, so the filter never shrinks the candidate set below `k`.
    ///
    /// # Errors
    ///
    /// Returns an error if the `SQLite` query fails.
    pub async fn search_knn_filtered(
        &self,
        query: &[f32],
        k: usize,
        language_id: Option<&str>,
    ) -> Result<Vec<ScoredChunk>> {
        let Some(language_id) = language_id else {
            return self.search_knn(query, k).await;
        };
        if k == 0 || query.is_empty() {
            return Ok(Vec::new());
        }
        let candidates = self.chunks_for_language(language_id).await?;
        Ok(rank(candidates, query, k))
    }

    async fn search_indexed(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        let hits: Vec<(i64, f64)> = sqlx::query_as(
            "SELECT m.chunk_id, knn.distance FROM \
             (SELECT rowid, distance FROM vec_chunks WHERE embedding MATCH ? AND k = ?) knn \
             JOIN vec_chunk_map m ON m.vec_rowid = knn.rowid \
             ORDER BY knn.distance",
        )
        .bind(pack(query))
        .bind(i64::try_from(k)?)
        .fetch_all(&self.pool)
        .await?;

        let ids: Vec<i64> = hits.iter().map(|(id, _)| *id).collect();
        let mut by_id: std::collections::HashMap<i64, StoredChunk> = self
            .chunks_by_id(&ids)
            .await?
            .into_iter()
            .map(|c| (c.id, c))
            .collect();

        #[allow(clippy::cast_possible_truncation)]
        let scored = hits
            .into_iter()
            .filter_map(|(id, distance)| {
                by_id.remove(&id).map(|chunk| ScoredChunk {
                    chunk,
                    distance: distance as f32,
                })
            })
            .collect();
        Ok(scored)
    }
}

fn rank(candidates: Vec<StoredChunk>, query: &[f32], k: usize) -> Vec<ScoredChunk> {
    let mut scored: Vec<ScoredChunk> = candidates
        .into_iter()
        .filter(|c| c.embedding.len() == query.len())
        .map(|chunk| {
            let distance = cosine_distance(query, &chunk.embedding);
            ScoredChunk { chunk, distance }
        })
        .collect();
    scored.sort_by(|a, b| {
        a.distance
            .total_cmp(&b.distance)
            .then_with(|| a.chunk.id.cmp(&b.chunk.id))
    });
    scored.truncate(k);
    scored
}
