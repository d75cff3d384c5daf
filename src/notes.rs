//! Users, folders, notes and their file-backed store.
//!
//! This is the relational side of the backend: plain records in a single
//! JSON document, held in memory behind a RwLock and rewritten atomically
//! on every mutation. The semantic index never touches this store; the app
//! layer keeps the two in step.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::auth;
use crate::eid::Eid;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store data error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("folder {0:?} already exists")]
    FolderExists(String),

    #[error("store lock poisoned")]
    Poisoned,
}

/// Where a note's content originally came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoteKind {
    Text,
    Photo,
    Audio,
    Link,
}

impl Default for NoteKind {
    fn default() -> Self {
        NoteKind::Text
    }
}

/// One block of note content. Blocks are ordered; headers are optional
/// structure produced by whatever extracted the text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextBlock {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_header: Option<String>,
    pub text: String,
}

impl TextBlock {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            header: None,
            sub_header: None,
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    pub device_id: String,
    /// Opaque bearer token; rotated on every registration
    pub token: String,
    pub created_at: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Folder {
    pub id: u64,
    pub user_id: u64,
    pub name: String,
    pub created_at: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Note {
    pub id: u64,
    pub user_id: u64,

    pub title: String,
    #[serde(default)]
    pub kind: NoteKind,
    #[serde(default)]
    pub content: Vec<TextBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<u64>,

    pub created_at: u64,
    pub updated_at: u64,
}

impl Note {
    /// Concatenated block texts, one paragraph break between blocks.
    /// This is the text the semantic index sees.
    pub fn full_text(&self) -> String {
        self.content
            .iter()
            .map(|block| block.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct NoteCreate {
    pub title: String,
    #[serde(default)]
    pub kind: NoteKind,
    #[serde(default)]
    pub content: Vec<TextBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct NoteUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<u64>,
}

/// The note store the app talks to. One implementation backed by a JSON
/// file; tests use it directly against a temp directory.
pub trait NoteManager: Send + Sync {
    /// Create a user for `device_id`, or rotate the token of an existing one.
    fn register_user(&self, device_id: &str) -> Result<User, StoreError>;
    fn user_by_token(&self, token: &str) -> Option<User>;
    fn user_by_id(&self, user_id: u64) -> Option<User>;

    fn create(&self, user_id: u64, create: NoteCreate) -> Result<Note, StoreError>;
    /// Fetch a note only if it belongs to `user_id`.
    fn get(&self, note_id: u64, user_id: u64) -> Option<Note>;
    /// All notes of a user, most recently updated first.
    fn list(&self, user_id: u64) -> Vec<Note>;
    fn append_block(
        &self,
        note_id: u64,
        user_id: u64,
        block: TextBlock,
    ) -> Result<Option<Note>, StoreError>;
    fn update(
        &self,
        note_id: u64,
        user_id: u64,
        update: NoteUpdate,
    ) -> Result<Option<Note>, StoreError>;
    fn delete(&self, note_id: u64, user_id: u64) -> Result<Option<Note>, StoreError>;
    /// Every note in the store, across all users. Used by index rebuilds.
    fn all_notes(&self) -> Vec<Note>;

    fn create_folder(&self, user_id: u64, name: &str) -> Result<Folder, StoreError>;
    /// All folders of a user, sorted by name.
    fn folders(&self, user_id: u64) -> Vec<Folder>;
    fn rename_folder(
        &self,
        folder_id: u64,
        user_id: u64,
        name: &str,
    ) -> Result<Option<Folder>, StoreError>;
    /// Delete a folder; its notes stay, with their folder reference cleared.
    fn delete_folder(&self, folder_id: u64, user_id: u64) -> Result<Option<Folder>, StoreError>;

    fn save(&self) -> Result<(), StoreError>;
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreData {
    next_user_id: u64,
    next_note_id: u64,
    next_folder_id: u64,
    #[serde(default)]
    users: Vec<User>,
    #[serde(default)]
    folders: Vec<Folder>,
    #[serde(default)]
    notes: HashMap<u64, Note>,
}

impl StoreData {
    fn next_user_id(&mut self) -> u64 {
        self.next_user_id += 1;
        self.next_user_id
    }

    fn next_note_id(&mut self) -> u64 {
        self.next_note_id += 1;
        self.next_note_id
    }

    fn next_folder_id(&mut self) -> u64 {
        self.next_folder_id += 1;
        self.next_folder_id
    }
}

const STORE_FILE: &str = "notes.json";

/// JSON-file-backed note store.
pub struct BackendJson {
    path: PathBuf,
    data: RwLock<StoreData>,
}

impl BackendJson {
    /// Load the store from `base_path`, starting empty when no file exists.
    pub fn load(base_path: &Path) -> Result<Self, StoreError> {
        std::fs::create_dir_all(base_path)?;
        let path = base_path.join(STORE_FILE);

        let data = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            serde_json::from_str(&raw)?
        } else {
            StoreData::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    /// Atomic rewrite: temp file in the same directory, then rename.
    fn persist(&self, data: &StoreData) -> Result<(), StoreError> {
        let temp_path = self.path.with_file_name(format!("{}-notes.json", Eid::new()));
        std::fs::write(&temp_path, serde_json::to_vec(data)?)?;
        std::fs::rename(&temp_path, &self.path)?;
        Ok(())
    }
}

impl NoteManager for BackendJson {
    fn register_user(&self, device_id: &str) -> Result<User, StoreError> {
        let mut data = self.data.write().map_err(|_| StoreError::Poisoned)?;

        let token = Eid::new().to_string();
        let user = match data.users.iter().position(|u| u.device_id == device_id) {
            Some(idx) => {
                data.users[idx].token = token;
                data.users[idx].clone()
            }
            None => {
                let user = User {
                    id: data.next_user_id(),
                    device_id: device_id.to_string(),
                    token,
                    created_at: now(),
                };
                data.users.push(user.clone());
                user
            }
        };

        self.persist(&data)?;
        Ok(user)
    }

    fn user_by_token(&self, token: &str) -> Option<User> {
        let data = self.data.read().ok()?;
        data.users
            .iter()
            .find(|u| auth::token_eq(token, &u.token))
            .cloned()
    }

    fn user_by_id(&self, user_id: u64) -> Option<User> {
        let data = self.data.read().ok()?;
        data.users.iter().find(|u| u.id == user_id).cloned()
    }

    fn create(&self, user_id: u64, create: NoteCreate) -> Result<Note, StoreError> {
        let mut data = self.data.write().map_err(|_| StoreError::Poisoned)?;

        let ts = now();
        let note = Note {
            id: data.next_note_id(),
            user_id,
            title: create.title,
            kind: create.kind,
            content: create.content,
            source_uri: create.source_uri,
            folder_id: create.folder_id,
            created_at: ts,
            updated_at: ts,
        };
        data.notes.insert(note.id, note.clone());

        self.persist(&data)?;
        Ok(note)
    }

    fn get(&self, note_id: u64, user_id: u64) -> Option<Note> {
        let data = self.data.read().ok()?;
        data.notes
            .get(&note_id)
            .filter(|note| note.user_id == user_id)
            .cloned()
    }

    fn list(&self, user_id: u64) -> Vec<Note> {
        let Ok(data) = self.data.read() else {
            return Vec::new();
        };
        let mut notes: Vec<Note> = data
            .notes
            .values()
            .filter(|note| note.user_id == user_id)
            .cloned()
            .collect();
        notes.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(b.id.cmp(&a.id)));
        notes
    }

    fn append_block(
        &self,
        note_id: u64,
        user_id: u64,
        block: TextBlock,
    ) -> Result<Option<Note>, StoreError> {
        let mut data = self.data.write().map_err(|_| StoreError::Poisoned)?;

        let Some(note) = data
            .notes
            .get_mut(&note_id)
            .filter(|note| note.user_id == user_id)
        else {
            return Ok(None);
        };

        note.content.push(block);
        note.updated_at = now();
        let note = note.clone();

        self.persist(&data)?;
        Ok(Some(note))
    }

    fn update(
        &self,
        note_id: u64,
        user_id: u64,
        update: NoteUpdate,
    ) -> Result<Option<Note>, StoreError> {
        let mut data = self.data.write().map_err(|_| StoreError::Poisoned)?;

        let Some(note) = data
            .notes
            .get_mut(&note_id)
            .filter(|note| note.user_id == user_id)
        else {
            return Ok(None);
        };

        if let Some(title) = update.title {
            note.title = title;
        }
        if let Some(folder_id) = update.folder_id {
            note.folder_id = Some(folder_id);
        }
        note.updated_at = now();
        let note = note.clone();

        self.persist(&data)?;
        Ok(Some(note))
    }

    fn delete(&self, note_id: u64, user_id: u64) -> Result<Option<Note>, StoreError> {
        let mut data = self.data.write().map_err(|_| StoreError::Poisoned)?;

        let owned = data
            .notes
            .get(&note_id)
            .map(|note| note.user_id == user_id)
            .unwrap_or(false);
        let removed = if owned { data.notes.remove(&note_id) } else { None };

        if removed.is_some() {
            self.persist(&data)?;
        }
        Ok(removed)
    }

    fn all_notes(&self) -> Vec<Note> {
        let Ok(data) = self.data.read() else {
            return Vec::new();
        };
        let mut notes: Vec<Note> = data.notes.values().cloned().collect();
        notes.sort_by_key(|note| note.id);
        notes
    }

    fn create_folder(&self, user_id: u64, name: &str) -> Result<Folder, StoreError> {
        let mut data = self.data.write().map_err(|_| StoreError::Poisoned)?;

        // one folder name per user
        if data
            .folders
            .iter()
            .any(|f| f.user_id == user_id && f.name == name)
        {
            return Err(StoreError::FolderExists(name.to_string()));
        }

        let folder = Folder {
            id: data.next_folder_id(),
            user_id,
            name: name.to_string(),
            created_at: now(),
        };
        data.folders.push(folder.clone());

        self.persist(&data)?;
        Ok(folder)
    }

    fn folders(&self, user_id: u64) -> Vec<Folder> {
        let Ok(data) = self.data.read() else {
            return Vec::new();
        };
        let mut folders: Vec<Folder> = data
            .folders
            .iter()
            .filter(|f| f.user_id == user_id)
            .cloned()
            .collect();
        folders.sort_by(|a, b| a.name.cmp(&b.name));
        folders
    }

    fn rename_folder(
        &self,
        folder_id: u64,
        user_id: u64,
        name: &str,
    ) -> Result<Option<Folder>, StoreError> {
        let mut data = self.data.write().map_err(|_| StoreError::Poisoned)?;

        if data
            .folders
            .iter()
            .any(|f| f.user_id == user_id && f.name == name && f.id != folder_id)
        {
            return Err(StoreError::FolderExists(name.to_string()));
        }

        let Some(folder) = data
            .folders
            .iter_mut()
            .find(|f| f.id == folder_id && f.user_id == user_id)
        else {
            return Ok(None);
        };

        folder.name = name.to_string();
        let folder = folder.clone();

        self.persist(&data)?;
        Ok(Some(folder))
    }

    fn delete_folder(&self, folder_id: u64, user_id: u64) -> Result<Option<Folder>, StoreError> {
        let mut data = self.data.write().map_err(|_| StoreError::Poisoned)?;

        let position = data
            .folders
            .iter()
            .position(|f| f.id == folder_id && f.user_id == user_id);
        let Some(position) = position else {
            return Ok(None);
        };
        let folder = data.folders.remove(position);

        // notes keep living, outside any folder
        for note in data.notes.values_mut() {
            if note.folder_id == Some(folder_id) {
                note.folder_id = None;
            }
        }

        self.persist(&data)?;
        Ok(Some(folder))
    }

    fn save(&self) -> Result<(), StoreError> {
        let data = self.data.read().map_err(|_| StoreError::Poisoned)?;
        self.persist(&data)
    }
}
