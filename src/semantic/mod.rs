//! Semantic indexing and retrieval for note content.
//!
//! Notes are split into paragraph chunks, each chunk is embedded with a
//! local fastembed model and stored in an on-disk vector index scoped by
//! owner. A search embeds the query, scans the owner's chunks by cosine
//! distance and collapses chunk hits back into ranked notes.
//!
//! # Architecture
//!
//! - `chunker`: paragraph splitting with a minimum-length cutoff
//! - `embeddings`: `Embedder` trait + fastembed-backed implementation
//! - `index`: in-memory chunk table with owner-filtered distance scan
//! - `storage`: binary file I/O for vectors.bin persistence
//! - `search`: threshold filtering, per-note collapsing, ranking
//! - `service`: high-level indexing/search service owned by the app

pub mod chunker;
pub mod embeddings;
mod index;
mod search;
mod service;
mod storage;

pub use chunker::chunk_text;
pub use embeddings::{Embedder, EmbeddingError, EmbeddingModel};
pub use index::{ChunkHit, ChunkId, ChunkIndex, ChunkRecord, IndexError};
pub use search::SearchHit;
pub use service::{SemanticIndexError, SemanticIndexService};
pub use storage::{VectorStorage, VectorStorageError};

/// Default embedding model; multilingual, matches notes written in any language
pub const DEFAULT_MODEL: &str = "paraphrase-multilingual-minilm-l12-v2";

/// Default cosine-distance cutoff: hits at or beyond this distance are dropped
pub const DEFAULT_RELEVANCE_THRESHOLD: f32 = 0.5;

/// Default minimum trimmed paragraph length (chars) for a chunk to be indexed
pub const DEFAULT_MIN_CHUNK_CHARS: usize = 50;

/// Default number of nearest chunks fetched per query
pub const DEFAULT_MAX_RESULTS: usize = 5;
