//! Progress and history persistence for chapters being left
//!
//! Writes are captured synchronously on the session worker and performed
//! later in the non-cancellable scope, so capturing fixes their order.

use crate::config::ReaderConfig;
use crate::model::MangaId;
use crate::ports::{HistoryEntry, HistoryStore, ProgressStore, ProgressUpdate, SessionDeps, TrackSync};
use crate::resource::ChapterResource;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;

/// Writes captured for one chapter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterWrite {
    pub manga_id: MangaId,
    pub progress: ProgressUpdate,
    pub history: Option<HistoryEntry>,
}

pub struct ProgressRecorder {
    progress: Arc<dyn ProgressStore>,
    history: Arc<dyn HistoryStore>,
    tracker: Arc<dyn TrackSync>,
    incognito: bool,
    read_started: Mutex<Option<DateTime<Utc>>>,
}

impl ProgressRecorder {
    pub fn new(deps: &SessionDeps, config: &ReaderConfig) -> Self {
        Self {
            progress: deps.progress.clone(),
            history: deps.history.clone(),
            tracker: deps.tracker.clone(),
            incognito: config.privacy.incognito,
            read_started: Mutex::new(None),
        }
    }

    /// Start timing a new stretch of reading
    pub fn restart_timer(&self) {
        *self.read_started.lock() = Some(Utc::now());
    }

    pub fn read_started(&self) -> Option<DateTime<Utc>> {
        *self.read_started.lock()
    }

    /// Snapshot what must be written for `resource`, or `None` if nothing
    /// was selected in it. Takes the read timer for the history entry.
    pub fn capture(&self, manga_id: MangaId, resource: &ChapterResource) -> Option<ChapterWrite> {
        if !resource.has_progress() {
            return None;
        }

        let chapter = resource.chapter();
        let progress = ProgressUpdate {
            chapter_id: chapter.id,
            read: chapter.read,
            bookmark: chapter.bookmark,
            last_page_read: chapter.last_page_read,
            pages_left: chapter.pages_left,
        };

        let history = if self.incognito {
            None
        } else {
            self.read_started.lock().take().map(|started| {
                let now = Utc::now();
                HistoryEntry {
                    chapter_id: chapter.id,
                    last_read_at: now,
                    time_read: now - started,
                }
            })
        };

        Some(ChapterWrite {
            manga_id,
            progress,
            history,
        })
    }

    /// Perform a captured write. Failures are logged; they never reach the reader.
    pub async fn write(&self, write: ChapterWrite) {
        let chapter_id = write.progress.chapter_id;

        // Tracked manga keep their progress even in incognito mode
        let save_progress = !self.incognito || self.tracker.has_trackers(write.manga_id).await;
        if save_progress {
            if let Err(e) = self.progress.update(write.progress).await {
                tracing::warn!(chapter = %chapter_id, "Failed to save chapter progress: {}", e);
            }
        } else {
            tracing::debug!(chapter = %chapter_id, "Incognito: progress not saved");
        }

        if let Some(entry) = write.history {
            if let Err(e) = self.history.append(entry).await {
                tracing::warn!(chapter = %chapter_id, "Failed to save reading history: {}", e);
            }
        }
    }
}
