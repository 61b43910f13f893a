//! `SQLite` embedding cache: file records, chunk vectors, summary job ledger.
//!
//! One database per workspace. On open the stored `(schema_version, model_id,
//! dimensions)` tuple is compared with the running configuration and the whole
//! store is rebuilt on mismatch. When the `sqlite-vec` extension is loaded,
//! KNN queries go through a `vec0` table; otherwise they fall back to a
//! brute-force cosine scan.

mod files;
mod jobs;
pub mod vector;

use std::path::PathBuf;
use std::str::FromStr;

use serde::Serialize;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};

use crate::error::Result;

pub use files::{ChunkRecord, IndexedFileInfo, ScoredChunk, StoredChunk};
pub use jobs::{JobStatus, SummaryJob};

/// Bumped whenever the table layout changes.
pub const SCHEMA_VERSION: i64 = 1;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS cache_meta (
        id INTEGER PRIMARY KEY CHECK (id = 1),
        schema_version INTEGER NOT NULL,
        model_id TEXT NOT NULL,
        dimensions INTEGER NOT NULL,
        vector_index INTEGER NOT NULL,
        created_at INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS files (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        uri TEXT NOT NULL UNIQUE,
        content_hash TEXT NOT NULL,
        language_id TEXT NOT NULL,
        last_indexed_at INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS chunks (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        file_id INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
        ordinal INTEGER NOT NULL,
        text TEXT NOT NULL,
        line_start INTEGER NOT NULL,
        line_end INTEGER NOT NULL,
        kind TEXT NOT NULL,
        symbol_name TEXT,
        summary TEXT,
        embedding BLOB NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_chunks_file ON chunks(file_id)",
    "CREATE TABLE IF NOT EXISTS summary_jobs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        file_id TEXT NOT NULL,
        status TEXT NOT NULL,
        chunk_start INTEGER NOT NULL,
        chunk_end INTEGER NOT NULL,
        result TEXT,
        error TEXT,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_summary_jobs_file ON summary_jobs(file_id)",
    "CREATE TABLE IF NOT EXISTS vec_chunk_map (
        vec_rowid INTEGER PRIMARY KEY,
        chunk_id INTEGER NOT NULL UNIQUE REFERENCES chunks(id) ON DELETE CASCADE
    )",
];

const DROP: &[&str] = &[
    "DROP TABLE IF EXISTS vec_chunk_map",
    "DROP TABLE IF EXISTS chunks",
    "DROP TABLE IF EXISTS files",
    "DROP TABLE IF EXISTS summary_jobs",
    "DROP TABLE IF EXISTS cache_meta",
];

/// Where and how to open the store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Database file. `None` opens an in-memory store.
    pub path: Option<PathBuf>,
    /// Embedding model the stored vectors were produced with.
    pub model_id: String,
    /// Expected embedding dimensionality.
    pub dimensions: usize,
    /// Path to the `sqlite-vec` loadable extension, enabling the `vec0` KNN path.
    pub vector_extension: Option<PathBuf>,
}

impl StoreConfig {
    #[must_use]
    pub fn in_memory(model_id: impl Into<String>, dimensions: usize) -> Self {
        Self {
            path: None,
            model_id: model_id.into(),
            dimensions,
            vector_extension: None,
        }
    }
}

/// Outcome of the version check performed on open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaCheck {
    /// Empty database, metadata written.
    Created,
    /// Stored version matched.
    Current,
    /// Stored version differed; all data was dropped.
    Rebuilt { previous: String },
}

/// Aggregate counts and capabilities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub file_count: usize,
    pub chunk_count: usize,
    pub model_id: String,
    pub dimensions: usize,
    pub vector_index: bool,
    pub persistent: bool,
}

/// Content-addressed embedding store. Cloning shares the underlying pool.
#[derive(Debug, Clone)]
pub struct EmbeddingStore {
    pool: SqlitePool,
    model_id: String,
    dimensions: usize,
    vector_index: bool,
    persistent: bool,
    schema_check: SchemaCheck,
}

impl EmbeddingStore {
    /// Open the store described by `config`.
    ///
    /// Falls back to an in-memory database when the persistent file cannot be
    /// opened, and to the brute-force KNN path when the vector extension
    /// cannot be loaded.
    ///
    /// # Errors
    ///
    /// Returns an error only if the in-memory fallback also fails.
    pub async fn open(config: &StoreConfig) -> Result<Self> {
        if let Some(ref path) = config.path {
            match Self::open_file(path, config).await {
                Ok(store) => return Ok(store),
                Err(e) => tracing::warn!(
                    path = %path.display(),
                    "persistent store unavailable, falling back to in-memory: {e:#}"
                ),
            }
        }
        Self::open_memory(config).await
    }

    async fn open_file(path: &std::path::Path, config: &StoreConfig) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let url = format!("sqlite:{}", path.display());
        let opts = SqliteConnectOptions::from_str(&url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);
        let pool = connect(opts, config, SqlitePoolOptions::new().max_connections(5)).await?;
        Self::init(pool, config, true).await
    }

    async fn open_memory(config: &StoreConfig) -> Result<Self> {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        // every connection to :memory: is a separate database, so keep exactly one alive
        let pool_opts = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None);
        let pool = connect(opts, config, pool_opts).await?;
        Self::init(pool, config, false).await
    }

    async fn init(pool: SqlitePool, config: &StoreConfig, persistent: bool) -> Result<Self> {
        let vector_index = probe_vector_extension(&pool).await;
        let mut store = Self {
            pool,
            model_id: config.model_id.clone(),
            dimensions: config.dimensions,
            vector_index,
            persistent,
            schema_check: SchemaCheck::Created,
        };
        store.schema_check = store.ensure_schema().await?;
        match store.schema_check {
            SchemaCheck::Rebuilt { ref previous } => tracing::warn!(
                previous = %previous,
                model_id = %store.model_id,
                dimensions = store.dimensions,
                "embedding store version mismatch, rebuilt from empty"
            ),
            SchemaCheck::Created | SchemaCheck::Current => tracing::debug!(
                persistent,
                vector_index,
                check = ?store.schema_check,
                "embedding store opened"
            ),
        }
        Ok(store)
    }

    async fn ensure_schema(&self) -> Result<SchemaCheck> {
        self.create_tables().await?;

        let row: Option<(i64, String, i64, bool)> = sqlx::query_as(
            "SELECT schema_version, model_id, dimensions, vector_index FROM cache_meta WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        let dimensions = i64::try_from(self.dimensions)?;

        let check = match row {
            Some((version, ref model, dims, vec))
                if version == SCHEMA_VERSION
                    && *model == self.model_id
                    && dims == dimensions
                    && vec == self.vector_index =>
            {
                return Ok(SchemaCheck::Current);
            }
            Some((version, model, dims, vec)) => SchemaCheck::Rebuilt {
                previous: format!(
                    "v{version} {model} ({dims}d{})",
                    if vec { ", vec0" } else { "" }
                ),
            },
            None => SchemaCheck::Created,
        };

        let mut tx = self.pool.begin().await?;
        // vec0 tables can only be dropped while the extension is loaded
        if self.vector_index {
            sqlx::query("DROP TABLE IF EXISTS vec_chunks")
                .execute(&mut *tx)
                .await?;
        }
        for stmt in DROP {
            sqlx::query(stmt).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        self.create_tables().await?;

        sqlx::query(
            "INSERT INTO cache_meta (id, schema_version, model_id, dimensions, vector_index, created_at) \
             VALUES (1, ?, ?, ?, ?, ?)",
        )
        .bind(SCHEMA_VERSION)
        .bind(&self.model_id)
        .bind(dimensions)
        .bind(self.vector_index)
        .bind(unix_now())
        .execute(&self.pool)
        .await?;

        Ok(check)
    }

    async fn create_tables(&self) -> Result<()> {
        for stmt in SCHEMA {
            sqlx::query(stmt).execute(&self.pool).await?;
        }
        if self.vector_index {
            let ddl = format!(
                "CREATE VIRTUAL TABLE IF NOT EXISTS vec_chunks USING vec0(\
                 embedding float[{}] distance_metric=cosine)",
                self.dimensions
            );
            sqlx::query(&ddl).execute(&self.pool).await?;
        }
        Ok(())
    }

    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    #[must_use]
    pub fn schema_check(&self) -> &SchemaCheck {
        &self.schema_check
    }

    #[must_use]
    pub fn is_persistent(&self) -> bool {
        self.persistent
    }

    #[must_use]
    pub fn has_vector_index(&self) -> bool {
        self.vector_index
    }

    #[must_use]
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// File and chunk counts plus capability flags.
    ///
    /// # Errors
    ///
    /// Returns an error if the `SQLite` query fails.
    pub async fn stats(&self) -> Result<StoreStats> {
        let (files, chunks): (i64, i64) = sqlx::query_as(
            "SELECT (SELECT COUNT(*) FROM files), (SELECT COUNT(*) FROM chunks)",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(StoreStats {
            file_count: usize::try_from(files)?,
            chunk_count: usize::try_from(chunks)?,
            model_id: self.model_id.clone(),
            dimensions: self.dimensions,
            vector_index: self.vector_index,
            persistent: self.persistent,
        })
    }
}

async fn connect(
    opts: SqliteConnectOptions,
    config: &StoreConfig,
    pool_opts: SqlitePoolOptions,
) -> Result<SqlitePool> {
    if let Some(ref ext) = config.vector_extension {
        let with_ext = opts
            .clone()
            .extension(ext.to_string_lossy().into_owned());
        match pool_opts.clone().connect_with(with_ext).await {
            Ok(pool) => return Ok(pool),
            Err(e) => tracing::warn!(
                extension = %ext.display(),
                "vector extension failed to load, using brute-force search: {e}"
            ),
        }
    }
    Ok(pool_opts.connect_with(opts).await?)
}

async fn probe_vector_extension(pool: &SqlitePool) -> bool {
    sqlx::query_scalar::<_, String>("SELECT vec_version()")
        .fetch_one(pool)
        .await
        .is_ok()
}

pub(crate) fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
}
