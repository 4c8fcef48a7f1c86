//! Reader state and events published to the presentation layer

use crate::layout::{DoublePageState, PageLayout};
use crate::model::{ChapterId, Manga};
use crate::ports::TrackResult;
use crate::window::ViewerChapters;
use std::path::PathBuf;

/// Adjacent chapter direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Next,
    Previous,
}

/// Published session state; always replaced as a whole
#[derive(Debug, Clone)]
pub struct ReaderState {
    pub manga: Option<Manga>,
    pub viewer_chapters: Option<ViewerChapters>,
    pub is_loading_adjacent_chapter: bool,
    /// Page the viewer should open the current chapter at
    pub last_resume_page: usize,
    /// Last page selected in the current chapter
    pub current_page: Option<usize>,
    pub layout: DoublePageState,
}

impl ReaderState {
    pub fn new(layout: PageLayout) -> Self {
        Self {
            manga: None,
            viewer_chapters: None,
            is_loading_adjacent_chapter: false,
            last_resume_page: 0,
            current_page: None,
            layout: DoublePageState::new(layout),
        }
    }

    pub fn current_chapter(&self) -> Option<ChapterId> {
        self.viewer_chapters.as_ref().map(|v| v.curr.id())
    }

    /// Index the double-page shift is computed from
    pub fn page_index(&self) -> usize {
        self.current_page.unwrap_or(self.last_resume_page)
    }
}

/// One-time notifications, delivered in order
#[derive(Debug, Clone)]
pub enum ReaderEvent {
    /// A chapter of the window finished loading in the background
    ReloadViewerChapters,
    AdjacentLoadStarted(Direction),
    AdjacentLoadFinished { direction: Direction, resume_page: usize },
    ChapterLoadError { chapter_id: ChapterId, message: String },
    SavedImage(Result<PathBuf, String>),
    ShareImage(Result<PathBuf, String>),
    /// Services that failed to record a completed chapter
    TrackingErrors(Vec<TrackResult>),
}
