//! The note-management layer: wires the note store to the semantic index.
//!
//! Every content mutation flows through here so the two stores stay in
//! step: writes hit the note store first, then the index. An index failure
//! never rolls back a committed note; the note stays readable and editable
//! and simply won't surface in search until the next successful reindex.

pub mod errors;

use std::path::Path;
use std::sync::{Arc, RwLock};

use crate::config::Config;
use crate::notes::{self, BackendJson, Note, NoteCreate, NoteManager, NoteUpdate, TextBlock, User};
use crate::semantic::SemanticIndexService;

pub use errors::AppError;

/// A hydrated search result: the full note plus the matching snippet.
#[derive(Debug, Clone, serde::Serialize)]
pub struct NoteMatch {
    pub note: Note,
    pub snippet: String,
    pub relevance: f32,
}

/// Outcome of a full index rebuild.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct ReindexSummary {
    pub notes: usize,
    pub chunks: usize,
}

pub struct App {
    pub notes: Arc<dyn NoteManager>,
    pub semantic: Arc<SemanticIndexService>,
    config: Arc<RwLock<Config>>,
}

impl App {
    /// Open the store and semantic index under the configured base path.
    pub fn open(config: Arc<RwLock<Config>>) -> anyhow::Result<Self> {
        let (base_path, semantic_config) = {
            let config = config.read().expect("config lock poisoned");
            (config.base_path(), config.semantic_index.clone())
        };

        let notes = Arc::new(BackendJson::load(&base_path)?);
        let semantic = Arc::new(SemanticIndexService::new(semantic_config, base_path));

        Ok(Self {
            notes,
            semantic,
            config,
        })
    }

    /// Assemble an app from pre-built parts. Used by tests and by callers
    /// that inject their own embedder.
    pub fn with_parts(
        notes: Arc<dyn NoteManager>,
        semantic: Arc<SemanticIndexService>,
        config: Arc<RwLock<Config>>,
    ) -> Self {
        Self {
            notes,
            semantic,
            config,
        }
    }

    pub fn config(&self) -> Arc<RwLock<Config>> {
        self.config.clone()
    }

    /// Register a device, creating the user on first contact and rotating
    /// the bearer token on every call.
    pub fn register(&self, device_id: &str) -> Result<User, AppError> {
        if device_id.trim().is_empty() {
            return Err(AppError::Other(anyhow::anyhow!("device id is required")));
        }
        Ok(self.notes.register_user(device_id.trim())?)
    }

    /// Resolve a bearer token to its user.
    pub fn authenticate(&self, token: &str) -> Result<User, AppError> {
        self.notes
            .user_by_token(token)
            .ok_or(AppError::Unauthorized)
    }

    /// Create a note and index its text.
    ///
    /// The note is committed to the store before indexing starts; an index
    /// failure is logged and the note is returned anyway.
    pub fn create_note(&self, user: &User, create: NoteCreate) -> Result<Note, AppError> {
        let note = self.notes.create(user.id, create)?;
        self.index_note(&note);
        Ok(note)
    }

    /// Append a text block to a note and reindex its full text.
    pub fn append_block(
        &self,
        user: &User,
        note_id: u64,
        block: TextBlock,
    ) -> Result<Note, AppError> {
        let note = self
            .notes
            .append_block(note_id, user.id, block)?
            .ok_or(AppError::NotFound)?;
        self.index_note(&note);
        Ok(note)
    }

    /// Retitle a note or move it between folders. Content is untouched, so
    /// the index is left alone.
    pub fn update_note(
        &self,
        user: &User,
        note_id: u64,
        update: NoteUpdate,
    ) -> Result<Note, AppError> {
        if let Some(folder_id) = update.folder_id {
            self.notes
                .folders(user.id)
                .iter()
                .find(|f| f.id == folder_id)
                .ok_or(AppError::FolderNotFound)?;
        }
        self.notes
            .update(note_id, user.id, update)?
            .ok_or(AppError::NotFound)
    }

    /// Delete a note and drop its chunks from the index.
    pub fn delete_note(&self, user: &User, note_id: u64) -> Result<(), AppError> {
        self.notes
            .delete(note_id, user.id)?
            .ok_or(AppError::NotFound)?;

        if self.semantic.is_enabled() {
            if let Err(err) = self.semantic.remove_note(note_id) {
                // stale chunks resolve to a missing note and are skipped at
                // search time; the next rebuild clears them
                log::warn!("note {note_id} deleted but chunks not removed: {err}");
            }
        }
        Ok(())
    }

    pub fn list_notes(&self, user: &User) -> Vec<Note> {
        self.notes.list(user.id)
    }

    pub fn get_note(&self, user: &User, note_id: u64) -> Result<Note, AppError> {
        self.notes.get(note_id, user.id).ok_or(AppError::NotFound)
    }

    /// Semantic search over the user's notes.
    ///
    /// Results come back in resolver order; ids the store no longer knows
    /// (deleted notes with stale chunks) are skipped silently.
    pub fn search_notes(
        &self,
        user: &User,
        query: &str,
        limit: Option<usize>,
        threshold: Option<f32>,
    ) -> Result<Vec<NoteMatch>, AppError> {
        let hits = self.semantic.search(user.id, query, limit, threshold)?;

        let matches = hits
            .into_iter()
            .filter_map(|hit| {
                self.notes.get(hit.note_id, user.id).map(|note| NoteMatch {
                    note,
                    snippet: hit.snippet,
                    relevance: hit.relevance,
                })
            })
            .collect();

        Ok(matches)
    }

    pub fn create_folder(&self, user: &User, name: &str) -> Result<notes::Folder, AppError> {
        Ok(self.notes.create_folder(user.id, name)?)
    }

    pub fn list_folders(&self, user: &User) -> Vec<notes::Folder> {
        self.notes.folders(user.id)
    }

    pub fn rename_folder(
        &self,
        user: &User,
        folder_id: u64,
        name: &str,
    ) -> Result<notes::Folder, AppError> {
        self.notes
            .rename_folder(folder_id, user.id, name)?
            .ok_or(AppError::FolderNotFound)
    }

    pub fn delete_folder(&self, user: &User, folder_id: u64) -> Result<(), AppError> {
        self.notes
            .delete_folder(folder_id, user.id)?
            .ok_or(AppError::FolderNotFound)?;
        Ok(())
    }

    /// Rebuild the whole vector index from the note store.
    ///
    /// Recovery path for store/index divergence (crash mid-reindex, notes
    /// written while the index was unavailable).
    pub fn reindex_all(&self) -> Result<ReindexSummary, AppError> {
        self.semantic.clear()?;

        let mut summary = ReindexSummary::default();
        for note in self.notes.all_notes() {
            let chunks = self
                .semantic
                .reindex_note(note.id, note.user_id, &note.full_text())?;
            summary.notes += 1;
            summary.chunks += chunks;
        }

        log::info!(
            "reindexed {} notes into {} chunks",
            summary.notes,
            summary.chunks
        );
        Ok(summary)
    }

    /// Flush both stores. Called on daemon shutdown.
    pub fn shutdown(&self) {
        if let Err(err) = self.notes.save() {
            log::error!("failed to save note store: {err}");
        }
        if let Err(err) = self.semantic.save() {
            log::error!("failed to save vector index: {err}");
        }
    }

    /// Index a note's current text, logging instead of failing.
    fn index_note(&self, note: &Note) {
        if !self.semantic.is_enabled() {
            return;
        }
        match self
            .semantic
            .reindex_note(note.id, note.user_id, &note.full_text())
        {
            Ok(chunks) => log::debug!("note {} indexed as {chunks} chunks", note.id),
            Err(err) => log::warn!("note {} saved but not indexed: {err}", note.id),
        }
    }
}
