//! Semantic index service: note indexing and query resolution.
//!
//! Owns the embedder, the in-memory chunk index and its on-disk storage.
//! Constructed by the app at startup and passed down explicitly; nothing
//! here is process-global. All index state sits behind one mutex, so
//! concurrent reindexes of the same note serialize at call granularity.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::config::SemanticIndexConfig;
use crate::semantic::chunker::chunk_text;
use crate::semantic::embeddings::{Embedder, EmbeddingError, EmbeddingModel};
use crate::semantic::index::{ChunkIndex, ChunkRecord, IndexError};
use crate::semantic::search::{assemble_hits, SearchHit};
use crate::semantic::storage::{VectorStorage, VectorStorageError};

/// Errors that can occur during semantic index operations.
///
/// Every variant means the index is unavailable for the attempted call;
/// note persistence never depends on it.
#[derive(Debug, thiserror::Error)]
pub enum SemanticIndexError {
    #[error("Semantic indexing is disabled")]
    Disabled,

    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Storage error: {0}")]
    Storage(#[from] VectorStorageError),

    #[error("Service not initialized")]
    NotInitialized,

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Lazy-loaded index components.
struct IndexState {
    embedder: Arc<dyn Embedder>,
    index: ChunkIndex,
    storage: VectorStorage,
}

impl IndexState {
    fn persist(&self) -> Result<(), SemanticIndexError> {
        self.storage
            .save(&self.index, &self.embedder.model_id_hash())?;
        Ok(())
    }
}

/// Service for indexing note text and resolving semantic queries.
///
/// Lazily loads the embedding model and the stored index on first use.
/// Thread-safe through interior mutability.
pub struct SemanticIndexService {
    config: SemanticIndexConfig,
    base_path: PathBuf,
    /// Pre-built embedder; when `None`, fastembed is constructed lazily
    embedder: Option<Arc<dyn Embedder>>,
    state: Mutex<Option<IndexState>>,
}

impl SemanticIndexService {
    /// Create a service that lazily loads the configured fastembed model.
    ///
    /// # Arguments
    /// * `config` - Semantic index configuration
    /// * `base_path` - Base directory for data files (vectors.bin, models/)
    pub fn new(config: SemanticIndexConfig, base_path: PathBuf) -> Self {
        Self {
            config,
            base_path,
            embedder: None,
            state: Mutex::new(None),
        }
    }

    /// Create a service around an externally supplied embedder.
    pub fn with_embedder(
        config: SemanticIndexConfig,
        base_path: PathBuf,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        Self {
            config,
            base_path,
            embedder: Some(embedder),
            state: Mutex::new(None),
        }
    }

    /// Check if semantic indexing is enabled.
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Check if the service has been initialized.
    pub fn is_initialized(&self) -> bool {
        self.state
            .lock()
            .ok()
            .map(|guard| guard.is_some())
            .unwrap_or(false)
    }

    /// Number of indexed chunks, 0 if not yet initialized.
    pub fn indexed_chunks(&self) -> usize {
        self.state
            .lock()
            .ok()
            .and_then(|guard| guard.as_ref().map(|s| s.index.len()))
            .unwrap_or(0)
    }

    /// Force initialization of the service.
    ///
    /// Normally initialization happens lazily on the first operation.
    pub fn initialize(&self) -> Result<(), SemanticIndexError> {
        if !self.config.enabled {
            return Err(SemanticIndexError::Disabled);
        }
        self.ensure_initialized()
    }

    /// Replace a note's indexed chunks with chunks of `full_text`.
    ///
    /// Any previously stored chunks for the note are removed first, so the
    /// stored set is always exactly `{note_id}_0 .. {note_id}_(k-1)` for the
    /// current text. Empty or whitespace-only text, or text with no
    /// paragraph above the length cutoff, leaves the note with zero chunks.
    ///
    /// Returns the number of chunks now indexed for the note.
    pub fn reindex_note(
        &self,
        note_id: u64,
        user_id: u64,
        full_text: &str,
    ) -> Result<usize, SemanticIndexError> {
        if !self.config.enabled {
            return Err(SemanticIndexError::Disabled);
        }

        self.ensure_initialized()?;
        let mut guard = self.lock_state()?;
        let state = guard.as_mut().ok_or(SemanticIndexError::NotInitialized)?;

        // Stale chunks go first; a failed reindex leaves the note
        // unindexed rather than searchable with outdated text.
        let removed = state.index.delete_note(note_id);

        let chunks = chunk_text(full_text, self.config.min_chunk_chars);
        if chunks.is_empty() {
            if removed > 0 {
                state.persist()?;
            }
            log::debug!("note {note_id}: no indexable chunks ({removed} removed)");
            return Ok(0);
        }

        let embeddings = match state.embedder.embed_batch(&chunks) {
            Ok(embeddings) => embeddings,
            Err(err) => {
                // make the delete durable so a restart cannot resurrect
                // chunks of text that failed to index
                if removed > 0 {
                    state.persist()?;
                }
                return Err(err.into());
            }
        };

        let records: Vec<ChunkRecord> = chunks
            .into_iter()
            .zip(embeddings)
            .enumerate()
            .map(|(seq, (text, embedding))| ChunkRecord {
                note_id,
                seq: seq as u32,
                user_id,
                text,
                embedding,
            })
            .collect();
        let count = records.len();

        state.index.upsert_chunks(records)?;
        state.persist()?;

        log::debug!("note {note_id}: indexed {count} chunks for user {user_id}");
        Ok(count)
    }

    /// Remove every chunk stored for `note_id`.
    ///
    /// Idempotent: removing a note that has no chunks succeeds.
    pub fn remove_note(&self, note_id: u64) -> Result<usize, SemanticIndexError> {
        if !self.config.enabled {
            return Err(SemanticIndexError::Disabled);
        }

        self.ensure_initialized()?;
        let mut guard = self.lock_state()?;
        let state = guard.as_mut().ok_or(SemanticIndexError::NotInitialized)?;

        let removed = state.index.delete_note(note_id);
        if removed > 0 {
            state.persist()?;
        }
        Ok(removed)
    }

    /// Drop every stored chunk. Used before a full rebuild.
    pub fn clear(&self) -> Result<(), SemanticIndexError> {
        if !self.config.enabled {
            return Err(SemanticIndexError::Disabled);
        }

        self.ensure_initialized()?;
        let mut guard = self.lock_state()?;
        let state = guard.as_mut().ok_or(SemanticIndexError::NotInitialized)?;

        state.index.clear();
        state.persist()?;
        Ok(())
    }

    /// Resolve a free-text query into ranked, per-note results.
    ///
    /// An empty or whitespace-only query returns no results without ever
    /// touching the embedder. Results are scoped to `user_id`, thresholded,
    /// collapsed to one hit per note and sorted by relevance descending.
    pub fn search(
        &self,
        user_id: u64,
        query: &str,
        top_n: Option<usize>,
        threshold: Option<f32>,
    ) -> Result<Vec<SearchHit>, SemanticIndexError> {
        if !self.config.enabled {
            return Err(SemanticIndexError::Disabled);
        }

        if query.trim().is_empty() {
            return Ok(Vec::new());
        }

        self.ensure_initialized()?;
        let mut guard = self.lock_state()?;
        let state = guard.as_mut().ok_or(SemanticIndexError::NotInitialized)?;

        let query_embedding = state.embedder.embed(query)?;
        let top_n = top_n.unwrap_or(self.config.max_results);
        let raw = state.index.query(&query_embedding, user_id, top_n)?;

        let threshold = threshold.unwrap_or(self.config.relevance_threshold);
        Ok(assemble_hits(raw, threshold))
    }

    /// Flush the current index state to storage.
    ///
    /// No-op when the service was never initialized.
    pub fn save(&self) -> Result<(), SemanticIndexError> {
        let guard = self.lock_state()?;
        match guard.as_ref() {
            Some(state) => state.persist(),
            None => Ok(()),
        }
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, Option<IndexState>>, SemanticIndexError> {
        self.state
            .lock()
            .map_err(|e| SemanticIndexError::Internal(format!("Lock poisoned: {}", e)))
    }

    /// Ensure the service is initialized, initializing if needed.
    fn ensure_initialized(&self) -> Result<(), SemanticIndexError> {
        let mut guard = self.lock_state()?;

        if guard.is_none() {
            *guard = Some(self.do_init()?);
        }

        Ok(())
    }

    /// Perform actual initialization.
    fn do_init(&self) -> Result<IndexState, SemanticIndexError> {
        let embedder: Arc<dyn Embedder> = match &self.embedder {
            Some(embedder) => embedder.clone(),
            None => {
                log::info!(
                    "initializing semantic index with model '{}'",
                    self.config.model
                );
                let timeout = Duration::from_secs(self.config.download_timeout_secs);
                Arc::new(EmbeddingModel::new(
                    &self.config.model,
                    self.base_path.clone(),
                    Some(timeout),
                )?)
            }
        };

        let model_id = embedder.model_id_hash();
        let dimensions = embedder.dimensions();

        let storage = VectorStorage::new(self.base_path.join("vectors.bin"));

        let index = if storage.exists() {
            match storage.load(&model_id, dimensions) {
                Ok(idx) => {
                    log::info!("loaded {} chunks from storage", idx.len());
                    idx
                }
                Err(VectorStorageError::ModelMismatch) => {
                    log::warn!("embedding model changed, starting with a fresh index");
                    ChunkIndex::new(dimensions)
                }
                Err(VectorStorageError::VersionMismatch(file_ver, _)) => {
                    log::warn!("storage version {file_ver} unsupported, starting fresh");
                    ChunkIndex::new(dimensions)
                }
                Err(e) => {
                    log::error!("failed to load vectors: {}", e);
                    return Err(e.into());
                }
            }
        } else {
            log::info!("no existing index, starting fresh");
            ChunkIndex::new(dimensions)
        };

        Ok(IndexState {
            embedder,
            index,
            storage,
        })
    }
}
