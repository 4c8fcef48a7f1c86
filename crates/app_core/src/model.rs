//! Reader domain model: manga, chapters and pages

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Manga identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MangaId(pub i64);

/// Chapter identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChapterId(pub i64);

impl fmt::Display for MangaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ChapterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Manga as seen by the reader
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manga {
    pub id: MangaId,
    pub title: String,
    /// Only favorited manga download ahead
    pub favorite: bool,
    /// Category ids, empty means the default category
    pub categories: Vec<i64>,
}

/// A chapter: immutable identity plus mutable reading state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    pub id: ChapterId,
    pub manga_id: MangaId,
    pub url: String,
    pub name: String,
    pub chapter_number: f32,

    pub read: bool,
    pub bookmark: bool,
    pub last_page_read: usize,
    pub pages_left: usize,
}

impl Chapter {
    pub fn new(id: ChapterId, manga_id: MangaId, url: &str, chapter_number: f32) -> Self {
        Self {
            id,
            manga_id,
            url: url.to_string(),
            name: format!("Chapter {}", chapter_number),
            chapter_number,
            read: false,
            bookmark: false,
            last_page_read: 0,
            pages_left: 0,
        }
    }

    /// Page to reopen the chapter at
    pub fn resume_page(&self) -> usize {
        if self.pages_left <= 1 {
            0
        } else {
            self.last_page_read
        }
    }
}

/// Chapter entry of the session's ordered list, shared with its resource
pub type SharedChapter = Arc<RwLock<Chapter>>;

/// Page loading status
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageStatus {
    Queued,
    LoadingData,
    Ready,
    Error(String),
}

impl PageStatus {
    pub fn is_error(&self) -> bool {
        matches!(self, PageStatus::Error(_))
    }
}

/// Mutable part of a page, written by the page stream and the viewer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageState {
    pub status: PageStatus,
    /// Never paired in double-page mode (covers, spreads)
    pub alone_page: bool,
    /// `Some(true)` for the first half of a page split in two
    pub first_half: Option<bool>,
}

/// One displayable page of a chapter
#[derive(Debug)]
pub struct Page {
    chapter_id: ChapterId,
    index: usize,
    url: String,
    state: RwLock<PageState>,
}

impl Page {
    pub fn new(chapter_id: ChapterId, index: usize, url: impl Into<String>) -> Self {
        Self {
            chapter_id,
            index,
            url: url.into(),
            state: RwLock::new(PageState {
                status: PageStatus::Queued,
                alone_page: false,
                first_half: None,
            }),
        }
    }

    pub fn chapter_id(&self) -> ChapterId {
        self.chapter_id
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// 1-based page number
    pub fn number(&self) -> usize {
        self.index + 1
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn status(&self) -> PageStatus {
        self.state.read().status.clone()
    }

    pub fn set_status(&self, status: PageStatus) {
        self.state.write().status = status;
    }

    pub fn is_alone(&self) -> bool {
        self.state.read().alone_page
    }

    pub fn set_alone(&self, alone: bool) {
        self.state.write().alone_page = alone;
    }

    pub fn first_half(&self) -> Option<bool> {
        self.state.read().first_half
    }

    pub fn set_first_half(&self, first_half: Option<bool>) {
        self.state.write().first_half = first_half;
    }

    pub fn snapshot(&self) -> PageState {
        self.state.read().clone()
    }
}

/// Loaded pages of a chapter
pub type PageList = Arc<Vec<Arc<Page>>>;

/// Where a chapter's page streams come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageSource {
    Downloaded,
    Remote,
}

/// Result of resolving a chapter's page list
#[derive(Debug)]
pub struct LoadedPages {
    pub pages: Vec<Page>,
    pub source: PageSource,
}
