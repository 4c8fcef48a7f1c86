//! Manga Reader Core Domain Logic
//!
//! This crate contains:
//! - Chapter resources with reference-counted page streams
//! - The previous/current/next viewer window
//! - The reader session and its published state
//! - Double-page layout
//! - Download-ahead and delete-after-read policies
//! - Configuration
//! - Error types
//! - Collaborator traits and SQLite-backed stores

pub mod config;
pub mod error;
pub mod layout;
pub mod model;
pub mod policy;
pub mod ports;
pub mod progress;
pub mod resource;
pub mod session;
pub mod state;
pub mod store;
pub mod window;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{DownloadConfig, PrivacyConfig, ReaderConfig, ReadingDirection, TrackingConfig, ViewerConfig};
pub use error::ReaderError;
pub use layout::{build_spreads, should_shift, DoublePageState, PageLayout, Spread};
pub use model::{
    Chapter, ChapterId, LoadedPages, Manga, MangaId, Page, PageList, PageSource, PageState, PageStatus,
    SharedChapter,
};
pub use ports::{
    ChapterLoader, ChapterSource, DownloadQueue, HistoryEntry, HistoryStore, ImageExporter, LaunchTracker,
    ProgressStore, ProgressUpdate, ServiceId, SessionDeps, TrackResult, TrackSync,
};
pub use resource::{ChapterRegistry, ChapterResource, ChapterState};
pub use session::ReaderSession;
pub use state::{Direction, ReaderEvent, ReaderState};
pub use store::SqliteStore;
pub use window::{ViewerChapters, ViewerWindow};
