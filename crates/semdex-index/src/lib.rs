//! Semantic code indexing: chunking, embedding cache and incremental updates.
//!
//! Source files are split into syntax-aware chunks, optionally summarized,
//! embedded through a [`semdex_llm::EmbeddingProvider`] and stored in a
//! content-addressed `SQLite` cache that answers nearest-neighbor queries.
//! [`CodeIndexer`] drives full scans and debounced incremental updates.

pub mod chunker;
pub mod debounce;
pub mod error;
pub mod indexer;
pub mod languages;
pub mod progress;
pub mod store;
pub mod summarizer;
pub mod syntax;
pub mod watcher;
pub mod workspace;

pub use chunker::{Chunk, ChunkKind, Chunker, ChunkerConfig};
pub use error::{IndexError, Result};
pub use indexer::{CodeIndexer, IndexReport, IndexerConfig, SearchResult};
pub use languages::TreeSitterProvider;
pub use progress::{IndexProgress, IndexState};
pub use store::{EmbeddingStore, StoreConfig};
pub use summarizer::SummarizerConfig;
pub use watcher::IndexWatcher;
pub use workspace::{FsWorkspace, SourceFile, WorkspaceSource};
