//! Collaborators the reading engine consumes
//!
//! Byte fetching, the chapter catalog, persistence, the download queue and
//! tracker sync live elsewhere; the session only sees these traits, handed
//! to it through [`SessionDeps`].

use crate::error::ReaderError;
use crate::model::{Chapter, ChapterId, LoadedPages, Manga, MangaId, Page};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Resolves a manga and its ordered, filtered chapter list
#[async_trait]
pub trait ChapterSource: Send + Sync {
    async fn manga(&self, manga_id: MangaId) -> Result<Manga, ReaderError>;

    /// Chapters in reading order
    async fn chapters(&self, manga: &Manga) -> Result<Vec<Chapter>, ReaderError>;
}

/// Resolves the page list of a chapter and closes its page streams
#[async_trait]
pub trait ChapterLoader: Send + Sync {
    async fn load(&self, chapter: &Chapter) -> Result<LoadedPages, ReaderError>;

    /// Close any open page streams of a chapter that is no longer referenced
    fn teardown(&self, chapter: &Chapter, pages: &[Arc<Page>]);
}

/// Reading state written for one chapter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub chapter_id: ChapterId,
    pub read: bool,
    pub bookmark: bool,
    pub last_page_read: usize,
    pub pages_left: usize,
}

#[async_trait]
pub trait ProgressStore: Send + Sync {
    async fn update(&self, update: ProgressUpdate) -> Result<(), ReaderError>;
}

/// One reading session of a chapter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub chapter_id: ChapterId,
    pub last_read_at: DateTime<Utc>,
    pub time_read: chrono::Duration,
}

#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn append(&self, entry: HistoryEntry) -> Result<(), ReaderError>;
}

#[async_trait]
pub trait DownloadQueue: Send + Sync {
    /// Queue chapters for download, optionally ahead of everything else
    async fn enqueue(&self, manga: &Manga, chapters: &[Chapter], front: bool) -> Result<(), ReaderError>;

    /// Mark downloaded chapters for deletion
    async fn delete_pending(&self, manga: &Manga, chapters: &[Chapter]) -> Result<(), ReaderError>;

    /// Remove a chapter from the queue; true if it was queued
    async fn cancel_queued(&self, manga: &Manga, chapter: &Chapter) -> bool;

    fn is_downloaded(&self, manga: &Manga, chapter: &Chapter) -> bool;
}

/// Tracker service identifier
pub type ServiceId = String;

/// Outcome of reporting to one tracker service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackResult {
    pub service: ServiceId,
    pub error: Option<String>,
}

#[async_trait]
pub trait TrackSync: Send + Sync {
    async fn has_trackers(&self, manga_id: MangaId) -> bool;

    async fn report_chapter_read(&self, manga_id: MangaId, chapter_number: f32) -> Vec<TrackResult>;
}

/// Writes page images out of the reader
#[async_trait]
pub trait ImageExporter: Send + Sync {
    async fn save(&self, page: &Page) -> Result<PathBuf, ReaderError>;

    /// Prepare a shareable copy
    async fn share(&self, page: &Page) -> Result<PathBuf, ReaderError>;
}

/// Remembers whether a reader session already ran in this process
#[derive(Debug, Default)]
pub struct LaunchTracker {
    opened: AtomicBool,
}

impl LaunchTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a session start; true if an earlier one exists
    pub fn mark_opened(&self) -> bool {
        self.opened.swap(true, Ordering::SeqCst)
    }
}

/// Everything a session talks to
#[derive(Clone)]
pub struct SessionDeps {
    pub source: Arc<dyn ChapterSource>,
    pub loader: Arc<dyn ChapterLoader>,
    pub progress: Arc<dyn ProgressStore>,
    pub history: Arc<dyn HistoryStore>,
    pub downloads: Arc<dyn DownloadQueue>,
    pub tracker: Arc<dyn TrackSync>,
    pub exporter: Option<Arc<dyn ImageExporter>>,
    pub launches: Arc<LaunchTracker>,
}
