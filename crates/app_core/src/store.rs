//! SQLite-backed progress and history stores

use crate::error::ReaderError;
use crate::model::Chapter;
use crate::ports::{HistoryEntry, HistoryStore, ProgressStore, ProgressUpdate};
use app_db::{HistoryRecord, ProgressDb, ProgressRecord};
use async_trait::async_trait;

/// [`ProgressStore`] and [`HistoryStore`] over the reading database.
/// Queries run on the blocking pool.
#[derive(Clone)]
pub struct SqliteStore {
    db: ProgressDb,
}

impl SqliteStore {
    pub fn new(db: ProgressDb) -> Self {
        Self { db }
    }

    /// Overlay saved reading state onto freshly listed chapters
    pub fn apply_saved_progress(&self, chapters: &mut [Chapter]) -> Result<(), ReaderError> {
        for chapter in chapters.iter_mut() {
            if let Some(record) = self.db.get_progress(chapter.id.0)? {
                chapter.read = record.read;
                chapter.bookmark = record.bookmark;
                chapter.last_page_read = usize::try_from(record.last_page_read).unwrap_or(0);
                chapter.pages_left = usize::try_from(record.pages_left).unwrap_or(0);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ProgressStore for SqliteStore {
    async fn update(&self, update: ProgressUpdate) -> Result<(), ReaderError> {
        let db = self.db.clone();
        let record = ProgressRecord {
            chapter_id: update.chapter_id.0,
            read: update.read,
            bookmark: update.bookmark,
            last_page_read: update.last_page_read as i64,
            pages_left: update.pages_left as i64,
        };
        tokio::task::spawn_blocking(move || db.upsert_progress(&record)).await??;
        Ok(())
    }
}

#[async_trait]
impl HistoryStore for SqliteStore {
    async fn append(&self, entry: HistoryEntry) -> Result<(), ReaderError> {
        let db = self.db.clone();
        let record = HistoryRecord {
            chapter_id: entry.chapter_id.0,
            last_read_at: entry.last_read_at,
            time_read_ms: entry.time_read.num_milliseconds().max(0),
        };
        tokio::task::spawn_blocking(move || db.append_history(&record)).await??;
        Ok(())
    }
}
