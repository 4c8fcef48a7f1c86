//! In-memory collaborators for unit tests

use crate::error::ReaderError;
use crate::model::{Chapter, ChapterId, LoadedPages, Manga, MangaId, Page, PageSource, PageStatus, SharedChapter};
use crate::ports::{
    ChapterLoader, ChapterSource, DownloadQueue, HistoryEntry, HistoryStore, ImageExporter,
    LaunchTracker, ProgressStore, ProgressUpdate, SessionDeps, TrackResult, TrackSync,
};
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use parking_lot::{Mutex, RwLock};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const MANGA: MangaId = MangaId(1);

pub fn chapter(id: i64) -> Chapter {
    Chapter::new(ChapterId(id), MANGA, &format!("/chapter/{}", id), id as f32)
}

pub fn shared_chapter(id: i64) -> SharedChapter {
    Arc::new(RwLock::new(chapter(id)))
}

/// Chapters with ids `1..=count`
pub fn shared_chapters(count: usize) -> Vec<SharedChapter> {
    (1..=count as i64).map(shared_chapter).collect()
}

#[derive(Default)]
pub struct FakeLoader {
    pages: DashMap<ChapterId, usize>,
    failing: DashSet<ChapterId>,
    slow: DashSet<ChapterId>,
    loads: DashMap<ChapterId, usize>,
    teardowns: DashMap<ChapterId, usize>,
    delay: Mutex<Option<Duration>>,
    source: Mutex<Option<PageSource>>,
}

impl FakeLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_pages(&self, id: ChapterId, count: usize) {
        self.pages.insert(id, count);
    }

    pub fn fail(&self, id: ChapterId, failing: bool) {
        if failing {
            self.failing.insert(id);
        } else {
            self.failing.remove(&id);
        }
    }

    /// Delay every load
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    /// Delay only loads of `id`
    pub fn make_slow(&self, id: ChapterId) {
        self.slow.insert(id);
    }

    pub fn set_source(&self, source: PageSource) {
        *self.source.lock() = Some(source);
    }

    pub fn load_count(&self, id: ChapterId) -> usize {
        self.loads.get(&id).map(|n| *n).unwrap_or(0)
    }

    pub fn teardown_count(&self, id: ChapterId) -> usize {
        self.teardowns.get(&id).map(|n| *n).unwrap_or(0)
    }
}

#[async_trait]
impl ChapterLoader for FakeLoader {
    async fn load(&self, chapter: &Chapter) -> Result<LoadedPages, ReaderError> {
        *self.loads.entry(chapter.id).or_insert(0) += 1;

        let delay = if self.slow.contains(&chapter.id) {
            Some(Duration::from_millis(50))
        } else {
            *self.delay.lock()
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.failing.contains(&chapter.id) {
            return Err(ReaderError::Load {
                chapter_id: chapter.id,
                message: "offline".into(),
            });
        }

        let count = self.pages.get(&chapter.id).map(|n| *n).unwrap_or(0);
        let pages = (0..count)
            .map(|i| {
                let page = Page::new(chapter.id, i, format!("{}/{}.png", chapter.url, i));
                page.set_status(PageStatus::Ready);
                page
            })
            .collect();
        let source = (*self.source.lock()).unwrap_or(PageSource::Downloaded);
        Ok(LoadedPages { pages, source })
    }

    fn teardown(&self, chapter: &Chapter, _pages: &[Arc<Page>]) {
        *self.teardowns.entry(chapter.id).or_insert(0) += 1;
    }
}

pub struct FakeSource {
    pub manga: RwLock<Manga>,
    pub chapters: RwLock<Vec<Chapter>>,
}

#[async_trait]
impl ChapterSource for FakeSource {
    async fn manga(&self, manga_id: MangaId) -> Result<Manga, ReaderError> {
        let manga = self.manga.read().clone();
        if manga.id == manga_id {
            Ok(manga)
        } else {
            Err(ReaderError::MangaNotFound(manga_id))
        }
    }

    async fn chapters(&self, _manga: &Manga) -> Result<Vec<Chapter>, ReaderError> {
        Ok(self.chapters.read().clone())
    }
}

#[derive(Default)]
pub struct MemoryProgress {
    pub updates: Mutex<Vec<ProgressUpdate>>,
}

impl MemoryProgress {
    pub fn for_chapter(&self, id: ChapterId) -> Vec<ProgressUpdate> {
        self.updates.lock().iter().filter(|u| u.chapter_id == id).cloned().collect()
    }
}

#[async_trait]
impl ProgressStore for MemoryProgress {
    async fn update(&self, update: ProgressUpdate) -> Result<(), ReaderError> {
        self.updates.lock().push(update);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryHistory {
    pub entries: Mutex<Vec<HistoryEntry>>,
}

#[async_trait]
impl HistoryStore for MemoryHistory {
    async fn append(&self, entry: HistoryEntry) -> Result<(), ReaderError> {
        self.entries.lock().push(entry);
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingDownloads {
    /// (chapter ids, queued at front)
    pub enqueued: Mutex<Vec<(Vec<ChapterId>, bool)>>,
    pub deleted: Mutex<Vec<Vec<ChapterId>>>,
    pub downloaded: DashSet<ChapterId>,
    pub queued: DashSet<ChapterId>,
}

#[async_trait]
impl DownloadQueue for RecordingDownloads {
    async fn enqueue(&self, _manga: &Manga, chapters: &[Chapter], front: bool) -> Result<(), ReaderError> {
        self.enqueued
            .lock()
            .push((chapters.iter().map(|c| c.id).collect(), front));
        Ok(())
    }

    async fn delete_pending(&self, _manga: &Manga, chapters: &[Chapter]) -> Result<(), ReaderError> {
        self.deleted.lock().push(chapters.iter().map(|c| c.id).collect());
        Ok(())
    }

    async fn cancel_queued(&self, _manga: &Manga, chapter: &Chapter) -> bool {
        self.queued.remove(&chapter.id).is_some()
    }

    fn is_downloaded(&self, _manga: &Manga, chapter: &Chapter) -> bool {
        self.downloaded.contains(&chapter.id)
    }
}

#[derive(Default)]
pub struct FakeTracker {
    pub attached: AtomicBool,
    pub failing: AtomicBool,
    pub reports: AtomicUsize,
}

#[async_trait]
impl TrackSync for FakeTracker {
    async fn has_trackers(&self, _manga_id: MangaId) -> bool {
        self.attached.load(Ordering::SeqCst)
    }

    async fn report_chapter_read(&self, _manga_id: MangaId, _chapter_number: f32) -> Vec<TrackResult> {
        self.reports.fetch_add(1, Ordering::SeqCst);
        let error = self
            .failing
            .load(Ordering::SeqCst)
            .then(|| "unauthorized".to_string());
        vec![TrackResult {
            service: "tracker".into(),
            error,
        }]
    }
}

pub struct TempExporter;

#[async_trait]
impl ImageExporter for TempExporter {
    async fn save(&self, page: &Page) -> Result<PathBuf, ReaderError> {
        Ok(PathBuf::from(format!("saved/{}-{}.png", page.chapter_id(), page.index())))
    }

    async fn share(&self, _page: &Page) -> Result<PathBuf, ReaderError> {
        Err(ReaderError::Export("no share target".into()))
    }
}

/// A manga with one chapter per entry of `page_counts`, ids starting at 1
pub struct Fixture {
    pub source: Arc<FakeSource>,
    pub loader: Arc<FakeLoader>,
    pub progress: Arc<MemoryProgress>,
    pub history: Arc<MemoryHistory>,
    pub downloads: Arc<RecordingDownloads>,
    pub tracker: Arc<FakeTracker>,
    pub launches: Arc<LaunchTracker>,
}

impl Fixture {
    pub fn new(page_counts: &[usize]) -> Self {
        let loader = Arc::new(FakeLoader::new());
        let chapters: Vec<Chapter> = page_counts
            .iter()
            .enumerate()
            .map(|(i, count)| {
                let c = chapter(i as i64 + 1);
                loader.set_pages(c.id, *count);
                c
            })
            .collect();

        let manga = Manga {
            id: MANGA,
            title: "Fixture".into(),
            favorite: true,
            categories: Vec::new(),
        };

        Self {
            source: Arc::new(FakeSource {
                manga: RwLock::new(manga),
                chapters: RwLock::new(chapters),
            }),
            loader,
            progress: Arc::new(MemoryProgress::default()),
            history: Arc::new(MemoryHistory::default()),
            downloads: Arc::new(RecordingDownloads::default()),
            tracker: Arc::new(FakeTracker::default()),
            launches: Arc::new(LaunchTracker::new()),
        }
    }

    pub fn update_chapter(&self, id: i64, f: impl FnOnce(&mut Chapter)) {
        let mut chapters = self.source.chapters.write();
        if let Some(c) = chapters.iter_mut().find(|c| c.id == ChapterId(id)) {
            f(c);
        }
    }

    pub fn deps(&self) -> SessionDeps {
        SessionDeps {
            source: self.source.clone(),
            loader: self.loader.clone(),
            progress: self.progress.clone(),
            history: self.history.clone(),
            downloads: self.downloads.clone(),
            tracker: self.tracker.clone(),
            exporter: Some(Arc::new(TempExporter)),
            launches: self.launches.clone(),
        }
    }
}
