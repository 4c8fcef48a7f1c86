//! Reader error types

use crate::model::{ChapterId, MangaId};
use thiserror::Error;

/// Main reader error type
#[derive(Error, Debug)]
pub enum ReaderError {
    // ===== Fatal at init (abort session construction) =====
    #[error("Chapter {chapter_id} not found in manga {manga_id}")]
    ChapterNotFound { manga_id: MangaId, chapter_id: ChapterId },

    #[error("Manga not found: {0}")]
    MangaNotFound(MangaId),

    // ===== Recoverable (chapter stays retryable) =====
    #[error("Failed to load chapter {chapter_id}: {message}")]
    Load { chapter_id: ChapterId, message: String },

    #[error("Load of chapter {0} was cancelled")]
    LoadCancelled(ChapterId),

    #[error("Invalid state transition for chapter {chapter_id}: {from} -> {to}")]
    InvalidTransition {
        chapter_id: ChapterId,
        from: &'static str,
        to: &'static str,
    },

    #[error("Chapter {0} released more times than acquired")]
    ReleaseUnderflow(ChapterId),

    #[error("Chapter index {index} out of range ({len} chapters)")]
    IndexOutOfRange { index: usize, len: usize },

    // ===== Background collaborators (logged, never block reading) =====
    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Image export error: {0}")]
    Export(String),

    // ===== Session lifecycle =====
    #[error("Reader session is not initialized")]
    NotInitialized,

    #[error("Reader session is already initialized")]
    AlreadyInitialized,

    #[error("Reader session is closed")]
    SessionClosed,

    #[error("No async runtime available: {0}")]
    Runtime(String),

    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ReaderError {
    /// Is this error recoverable?
    pub fn is_recoverable(&self) -> bool {
        !self.is_fatal()
    }

    /// Errors that abort session construction
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ReaderError::ChapterNotFound { .. }
                | ReaderError::MangaNotFound(_)
                | ReaderError::Runtime(_)
        )
    }

    /// Get a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            ReaderError::ChapterNotFound { .. } => "Chapter not found".to_string(),
            ReaderError::MangaNotFound(_) => "Manga not found".to_string(),
            ReaderError::Load { message, .. } => format!("Cannot load chapter: {}", message),
            ReaderError::LoadCancelled(_) => "Chapter loading was interrupted".to_string(),
            _ => self.to_string(),
        }
    }
}

impl From<app_db::DbError> for ReaderError {
    fn from(e: app_db::DbError) -> Self {
        ReaderError::Persistence(e.to_string())
    }
}

impl From<tokio::task::JoinError> for ReaderError {
    fn from(e: tokio::task::JoinError) -> Self {
        ReaderError::Persistence(format!("background write failed: {}", e))
    }
}
