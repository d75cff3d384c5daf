use crate::notes::StoreError;
use crate::semantic::SemanticIndexError;

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("note not found")]
    NotFound,

    #[error("folder not found")]
    FolderNotFound,

    #[error("invalid or missing token")]
    Unauthorized,

    #[error("semantic index unavailable: {0}")]
    IndexUnavailable(#[from] SemanticIndexError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("io error: {0:?}")]
    IO(#[from] std::io::Error),

    #[error("unexpected error: {0:?}")]
    Other(#[from] anyhow::Error),
}
