use std::path::PathBuf;

use semdex_index::languages::DEFAULT_EXTENSIONS;
use semdex_index::workspace::DEFAULT_EXCLUDES;
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub chunker: ChunkerSettings,
    #[serde(default)]
    pub summarizer: SummarizerSettings,
    #[serde(default)]
    pub provider: ProviderConfig,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct IndexConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Defaults to `.semdex/index.db` under the workspace root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_path: Option<PathBuf>,
    /// Path to the `sqlite-vec` loadable extension.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector_extension: Option<PathBuf>,
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    #[serde(default = "default_exclude")]
    pub exclude: Vec<String>,
    #[serde(default)]
    pub watch: bool,
    #[serde(default = "default_query_cache_size")]
    pub query_cache_size: usize,
}

fn default_true() -> bool {
    true
}

fn default_max_file_bytes() -> u64 {
    1024 * 1024
}

fn default_debounce_ms() -> u64 {
    1500
}

fn default_extensions() -> Vec<String> {
    DEFAULT_EXTENSIONS.iter().map(|&e| e.to_owned()).collect()
}

fn default_exclude() -> Vec<String> {
    DEFAULT_EXCLUDES.iter().map(|&e| e.to_owned()).collect()
}

fn default_query_cache_size() -> usize {
    64
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            db_path: None,
            vector_extension: None,
            max_file_bytes: default_max_file_bytes(),
            debounce_ms: default_debounce_ms(),
            extensions: default_extensions(),
            exclude: default_exclude(),
            watch: false,
            query_cache_size: default_query_cache_size(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ChunkerSettings {
    #[serde(default = "default_min_chunk_chars")]
    pub min_chunk_chars: usize,
    #[serde(default = "default_max_chunk_chars")]
    pub max_chunk_chars: usize,
    #[serde(default = "default_window_lines")]
    pub window_lines: usize,
    #[serde(default = "default_overlap_lines")]
    pub overlap_lines: usize,
}

fn default_min_chunk_chars() -> usize {
    50
}

fn default_max_chunk_chars() -> usize {
    4000
}

fn default_window_lines() -> usize {
    40
}

fn default_overlap_lines() -> usize {
    10
}

impl Default for ChunkerSettings {
    fn default() -> Self {
        Self {
            min_chunk_chars: default_min_chunk_chars(),
            max_chunk_chars: default_max_chunk_chars(),
            window_lines: default_window_lines(),
            overlap_lines: default_overlap_lines(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SummarizerSettings {
    /// Summaries are only requested when a summary model is also configured.
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_summary_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_summary_job_size")]
    pub job_size: usize,
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,
    #[serde(default = "default_summary_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_summary_batch_size() -> usize {
    8
}

fn default_summary_job_size() -> usize {
    32
}

fn default_max_concurrent_jobs() -> usize {
    4
}

fn default_summary_timeout_secs() -> u64 {
    60
}

impl Default for SummarizerSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            batch_size: default_summary_batch_size(),
            job_size: default_summary_job_size(),
            max_concurrent_jobs: default_max_concurrent_jobs(),
            timeout_secs: default_summary_timeout_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ProviderConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_embedding_dimensions")]
    pub embedding_dimensions: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary_model: Option<String>,
    #[serde(default = "default_provider_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embed_batch_size")]
    pub embed_batch_size: usize,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".into()
}

fn default_embedding_dimensions() -> usize {
    1536
}

fn default_provider_timeout_secs() -> u64 {
    60
}

fn default_max_retries() -> u32 {
    3
}

fn default_embed_batch_size() -> usize {
    32
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            embedding_model: default_embedding_model(),
            embedding_dimensions: default_embedding_dimensions(),
            summary_model: None,
            timeout_secs: default_provider_timeout_secs(),
            max_retries: default_max_retries(),
            embed_batch_size: default_embed_batch_size(),
        }
    }
}
