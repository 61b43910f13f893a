use std::path::PathBuf;

use super::Config;

impl Config {
    pub(crate) fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("SEMDEX_INDEX_ENABLED")
            && let Ok(enabled) = v.parse::<bool>()
        {
            self.index.enabled = enabled;
        }
        if let Ok(v) = std::env::var("SEMDEX_DB_PATH") {
            self.index.db_path = Some(PathBuf::from(v));
        }
        if let Ok(v) = std::env::var("SEMDEX_VECTOR_EXTENSION") {
            self.index.vector_extension = (!v.is_empty()).then(|| PathBuf::from(v));
        }
        if let Ok(v) = std::env::var("SEMDEX_DEBOUNCE_MS")
            && let Ok(ms) = v.parse::<u64>()
        {
            self.index.debounce_ms = ms;
        }

        if let Ok(v) = std::env::var("SEMDEX_PROVIDER_BASE_URL") {
            self.provider.base_url = v;
        }
        if let Ok(v) = std::env::var("SEMDEX_PROVIDER_API_KEY") {
            self.provider.api_key = Some(v);
        }
        if let Ok(v) = std::env::var("SEMDEX_EMBEDDING_MODEL") {
            self.provider.embedding_model = v;
        }
        if let Ok(v) = std::env::var("SEMDEX_EMBEDDING_DIMENSIONS") {
            if let Ok(dims) = v.parse::<usize>() {
                self.provider.embedding_dimensions = dims;
            } else {
                tracing::warn!("ignoring invalid SEMDEX_EMBEDDING_DIMENSIONS value: {v}");
            }
        }
        if let Ok(v) = std::env::var("SEMDEX_SUMMARY_MODEL") {
            self.provider.summary_model = (!v.is_empty()).then_some(v);
        }

        if let Ok(v) = std::env::var("SEMDEX_SUMMARIZE")
            && let Ok(enabled) = v.parse::<bool>()
        {
            self.summarizer.enabled = enabled;
        }

        if let Ok(v) = std::env::var("SEMDEX_CHUNK_MIN_CHARS")
            && let Ok(n) = v.parse::<usize>()
        {
            self.chunker.min_chunk_chars = n;
        }
        if let Ok(v) = std::env::var("SEMDEX_CHUNK_MAX_CHARS")
            && let Ok(n) = v.parse::<usize>()
        {
            self.chunker.max_chunk_chars = n;
        }
    }
}
