mod env;
mod types;


pub use types::*;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use semdex_index::{ChunkerConfig, IndexerConfig, StoreConfig, SummarizerConfig};

/// Index database location relative to the workspace root.
pub const DEFAULT_DB_PATH: &str = ".semdex/index.db";

impl Config {
    /// Load configuration from a TOML file with env var overrides.
    ///
    /// Falls back to defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str::<Self>(&content).context("failed to parse config file")?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns an error naming the first setting that cannot work.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.provider.embedding_dimensions == 0 {
            bail!("provider.embedding_dimensions must be greater than zero");
        }
        if self.provider.embed_batch_size == 0 {
            bail!("provider.embed_batch_size must be greater than zero");
        }
        if self.chunker.min_chunk_chars > self.chunker.max_chunk_chars {
            bail!(
                "chunker.min_chunk_chars ({}) exceeds chunker.max_chunk_chars ({})",
                self.chunker.min_chunk_chars,
                self.chunker.max_chunk_chars
            );
        }
        if self.chunker.window_lines == 0 || self.chunker.overlap_lines >= self.chunker.window_lines
        {
            bail!("chunker.overlap_lines must be smaller than a non-zero chunker.window_lines");
        }
        if self.summarizer.batch_size == 0 || self.summarizer.job_size == 0 {
            bail!("summarizer batch_size and job_size must be greater than zero");
        }
        if self.summarizer.max_concurrent_jobs == 0 {
            bail!("summarizer.max_concurrent_jobs must be greater than zero");
        }
        Ok(())
    }

    /// Whether chunks get summarized before embedding.
    #[must_use]
    pub fn summaries_enabled(&self) -> bool {
        self.summarizer.enabled && self.provider.summary_model.is_some()
    }

    #[must_use]
    pub fn indexer_config(&self) -> IndexerConfig {
        IndexerConfig {
            enabled: self.index.enabled,
            summarize: self.summaries_enabled(),
            summarizer: self.summarizer_config(),
            max_file_bytes: self.index.max_file_bytes,
            debounce: Duration::from_millis(self.index.debounce_ms),
            embed_batch_size: self.provider.embed_batch_size,
            embed_timeout: Duration::from_secs(self.provider.timeout_secs),
            query_cache_size: self.index.query_cache_size,
        }
    }

    #[must_use]
    pub fn summarizer_config(&self) -> SummarizerConfig {
        SummarizerConfig {
            batch_size: self.summarizer.batch_size,
            job_size: self.summarizer.job_size,
            max_concurrent_jobs: self.summarizer.max_concurrent_jobs,
            timeout: Duration::from_secs(self.summarizer.timeout_secs),
        }
    }

    #[must_use]
    pub fn chunker_config(&self) -> ChunkerConfig {
        ChunkerConfig {
            min_chunk_chars: self.chunker.min_chunk_chars,
            max_chunk_chars: self.chunker.max_chunk_chars,
            window_lines: self.chunker.window_lines,
            overlap_lines: self.chunker.overlap_lines,
        }
    }

    /// Relative `db_path` values resolve against the workspace root.
    #[must_use]
    pub fn db_path(&self, root: &Path) -> PathBuf {
        match &self.index.db_path {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => root.join(path),
            None => root.join(DEFAULT_DB_PATH),
        }
    }

    #[must_use]
    pub fn store_config(&self, root: &Path) -> StoreConfig {
        StoreConfig {
            path: Some(self.db_path(root)),
            model_id: self.provider.embedding_model.clone(),
            dimensions: self.provider.embedding_dimensions,
            vector_extension: self.index.vector_extension.clone(),
        }
    }
}
