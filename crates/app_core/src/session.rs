//! Reader session
//!
//! One worker task owns the viewer window and applies every command in
//! order. Observers read the published [`ReaderState`] through a watch
//! channel and consume [`ReaderEvent`]s once. Loads, preloads and tracker
//! calls run in a background scope that is aborted when the session ends;
//! progress writes and download queue changes run in a separate scope that
//! is always awaited.

use crate::config::ReaderConfig;
use crate::error::ReaderError;
use crate::layout::PageLayout;
use crate::model::{Chapter, ChapterId, Manga, MangaId, Page, PageSource, PageStatus, SharedChapter};
use crate::policy;
use crate::ports::{SessionDeps, TrackResult};
use crate::progress::ProgressRecorder;
use crate::resource::{ChapterRegistry, ChapterResource};
use crate::state::{Direction, ReaderEvent, ReaderState};
use crate::window::ViewerWindow;
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{JoinHandle, JoinSet};

/// Work for the session worker
enum Command {
    Init {
        manga_id: MangaId,
        chapter_id: ChapterId,
        callback: oneshot::Sender<Result<(), ReaderError>>,
    },
    PageSelected {
        page: Arc<Page>,
        has_extra_page: bool,
    },
    LoadAdjacent {
        direction: Direction,
        callback: oneshot::Sender<Result<Option<usize>, ReaderError>>,
    },
    PreloadFinished(ChapterId),
    Barrier(oneshot::Sender<()>),
    End {
        callback: Option<oneshot::Sender<()>>,
    },
}

/// State reachable from the session handle, the worker and background tasks
struct Shared {
    deps: SessionDeps,
    config: ReaderConfig,
    registry: ChapterRegistry,
    recorder: Arc<ProgressRecorder>,
    state: watch::Sender<ReaderState>,
    events: mpsc::UnboundedSender<ReaderEvent>,
    commands: mpsc::UnboundedSender<Command>,
    runtime: Handle,
    /// Cancelled as a unit at session end
    background: Mutex<JoinSet<()>>,
    /// Never cancelled; awaited at session end
    persistence: Mutex<Vec<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl Shared {
    fn send(&self, command: Command) -> Result<(), ReaderError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ReaderError::SessionClosed);
        }
        self.commands.send(command).map_err(|_| ReaderError::SessionClosed)
    }

    fn emit(&self, event: ReaderEvent) {
        if self.events.send(event).is_err() {
            tracing::trace!("Reader event dropped, no listener");
        }
    }

    fn spawn_background<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.closed.load(Ordering::Acquire) {
            tracing::debug!("Session closed, background task not started");
            return;
        }

        let mut background = self.background.lock();
        while let Some(finished) = background.try_join_next() {
            if let Err(e) = finished {
                if e.is_panic() {
                    tracing::error!("Background task panicked: {}", e);
                }
            }
        }
        background.spawn_on(task, &self.runtime);
    }

    fn spawn_persistent<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = self.runtime.spawn(task);
        let mut persistence = self.persistence.lock();
        persistence.retain(|h| !h.is_finished());
        persistence.push(handle);
    }

    /// Best-effort load of a window member
    fn preload(self: &Arc<Self>, resource: &Arc<ChapterResource>) {
        if !resource.needs_load() || resource.ref_count() == 0 {
            return;
        }

        let shared = self.clone();
        let resource = resource.clone();
        self.spawn_background(async move {
            if resource.ref_count() == 0 {
                return;
            }
            match resource.begin_load().await {
                Ok(pages) => {
                    tracing::debug!(chapter = %resource.id(), pages = pages.len(), "Chapter preloaded");
                    let _ = shared.send(Command::PreloadFinished(resource.id()));
                }
                Err(ReaderError::LoadCancelled(id)) => {
                    tracing::debug!(chapter = %id, "Preload discarded");
                }
                Err(e) => {
                    tracing::warn!(chapter = %resource.id(), "Preload failed: {}", e);
                }
            }
        });
    }

    fn export_image(self: &Arc<Self>, page: &Arc<Page>, share: bool) {
        if page.status() != PageStatus::Ready {
            tracing::debug!(page = page.number(), "Page not ready, nothing to export");
            return;
        }

        let shared = self.clone();
        let page = page.clone();
        self.spawn_background(async move {
            let result = match &shared.deps.exporter {
                Some(exporter) if share => exporter.share(&page).await,
                Some(exporter) => exporter.save(&page).await,
                None => Err(ReaderError::Export("no image exporter configured".into())),
            };
            let result = result.map_err(|e| {
                tracing::warn!(page = page.number(), "Image export failed: {}", e);
                e.user_message()
            });

            shared.emit(if share {
                ReaderEvent::ShareImage(result)
            } else {
                ReaderEvent::SavedImage(result)
            });
        });
    }
}

/// Clears the adjacent-loading flag however the load ends
struct AdjacentLoadGuard {
    shared: Arc<Shared>,
}

impl AdjacentLoadGuard {
    fn start(shared: &Arc<Shared>) -> Self {
        shared.state.send_modify(|s| s.is_loading_adjacent_chapter = true);
        Self { shared: shared.clone() }
    }
}

impl Drop for AdjacentLoadGuard {
    fn drop(&mut self) {
        self.shared.state.send_modify(|s| s.is_loading_adjacent_chapter = false);
    }
}

/// Manga and its ordered chapter list
struct Catalog {
    manga: Manga,
    chapters: Vec<SharedChapter>,
}

impl Catalog {
    fn index_of(&self, id: ChapterId) -> Option<usize> {
        self.chapters.iter().position(|c| c.read().id == id)
    }

    fn snapshot(&self) -> Vec<Chapter> {
        self.chapters.iter().map(|c| c.read().clone()).collect()
    }
}

struct Worker {
    shared: Arc<Shared>,
    catalog: Option<Catalog>,
    window: Option<ViewerWindow>,
    completed: HashSet<ChapterId>,
    downloaded_ahead: HashSet<ChapterId>,
    /// Opened chapter whose queued download was cancelled while reading it
    chapter_to_download: Option<Chapter>,
}

impl Worker {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = commands.recv().await {
            match command {
                Command::Init {
                    manga_id,
                    chapter_id,
                    callback,
                } => {
                    let result = self.init(manga_id, chapter_id).await;
                    let _ = callback.send(result);
                }
                Command::PageSelected {
                    page,
                    has_extra_page,
                } => self.page_selected(page, has_extra_page).await,
                Command::LoadAdjacent {
                    direction,
                    callback,
                } => {
                    let result = self.load_adjacent(direction).await;
                    let _ = callback.send(result);
                }
                Command::PreloadFinished(id) => self.preload_finished(id),
                Command::Barrier(callback) => {
                    let _ = callback.send(());
                }
                Command::End { callback } => {
                    self.end().await;
                    if let Some(callback) = callback {
                        let _ = callback.send(());
                    }
                    break;
                }
            }
        }
        tracing::debug!("Reader session worker stopped");
    }

    async fn init(&mut self, manga_id: MangaId, chapter_id: ChapterId) -> Result<(), ReaderError> {
        if self.catalog.is_some() {
            return Err(ReaderError::AlreadyInitialized);
        }

        let deps = &self.shared.deps;
        let manga = deps.source.manga(manga_id).await?;
        let chapters = deps.source.chapters(&manga).await?;
        let index = chapters
            .iter()
            .position(|c| c.id == chapter_id)
            .ok_or(ReaderError::ChapterNotFound { manga_id, chapter_id })?;
        let chapters: Vec<SharedChapter> = chapters
            .into_iter()
            .map(|c| Arc::new(RwLock::new(c)))
            .collect();

        let window = ViewerWindow::construct(&self.shared.registry, &chapters, index)?;
        let current = window.current().clone();
        let chapter = current.chapter();

        let second_run = deps.launches.mark_opened();
        let resume = if self.shared.config.reader.restart_read_chapters && second_run && chapter.read {
            0
        } else {
            chapter.last_page_read
        };
        current.set_requested_page(resume);

        if deps.downloads.cancel_queued(&manga, &chapter).await {
            tracing::debug!(chapter = %chapter.id, "Queued download cancelled while reading");
            self.chapter_to_download = Some(chapter);
        }

        if let Err(e) = current.ensure_loaded().await {
            tracing::error!(chapter = %chapter_id, "Failed to open chapter: {}", e);
            if let Err(release) = window.final_release() {
                tracing::error!("Failed to release viewer window: {}", release);
            }
            self.requeue_pending_download(&manga);
            return Err(e);
        }

        if self.shared.config.reader.preload_adjacent {
            for adjacent in [window.previous(), window.next()].into_iter().flatten() {
                self.shared.preload(adjacent);
            }
        }

        self.shared.recorder.restart_timer();
        let snapshot = window.snapshot();
        let pages = current.pages();
        self.shared.state.send_modify(|s| {
            s.manga = Some(manga.clone());
            s.viewer_chapters = Some(snapshot);
            s.last_resume_page = resume;
            s.current_page = None;
            s.layout.recompute(pages.as_ref().map(|p| p.as_slice()), resume);
        });

        tracing::info!(manga = %manga_id, chapter = %chapter_id, resume, "Reader session opened");
        self.catalog = Some(Catalog { manga, chapters });
        self.window = Some(window);
        Ok(())
    }

    async fn page_selected(&mut self, page: Arc<Page>, has_extra_page: bool) {
        if page.status().is_error() {
            tracing::debug!(page = page.number(), "Ignoring selection of a failed page");
            return;
        }
        let Some(window) = self.window.as_ref() else {
            tracing::debug!("Page selected before the session opened");
            return;
        };
        let current_id = window.current().id();
        let Some(resource) = window.members().find(|r| r.id() == page.chapter_id()).cloned() else {
            tracing::debug!(chapter = %page.chapter_id(), "Page of a chapter outside the viewer window");
            return;
        };
        let Some(pages) = resource.pages() else {
            return;
        };

        let total = pages.len();
        let index = page.index();
        if index >= total {
            tracing::warn!(chapter = %resource.id(), index, total, "Selected page out of range");
            return;
        }

        resource.mark_page_selected(index);
        resource.update_chapter(|c| {
            c.last_page_read = index;
            c.pages_left = total - index;
        });

        let last_page = index + 1 == total && page.first_half() != Some(true);
        let paired_with_last = has_extra_page && index + 2 == total;
        if (last_page || paired_with_last) && self.completed.insert(resource.id()) {
            self.complete_chapter(&resource);
        }

        if resource.id() != current_id {
            self.cross_to(&resource, index).await;
        } else {
            self.shared.state.send_modify(|s| s.current_page = Some(index));
        }

        self.download_ahead(&resource, index, total);
    }

    fn complete_chapter(&mut self, resource: &Arc<ChapterResource>) {
        let chapter = resource.update_chapter(|c| {
            c.read = true;
            c.clone()
        });
        tracing::info!(chapter = %chapter.id, "Chapter completed");

        let Some((manga, index)) = self
            .catalog
            .as_ref()
            .and_then(|c| Some((c.manga.clone(), c.index_of(chapter.id)?)))
        else {
            return;
        };

        self.report_read(&manga, &chapter);
        self.delete_after_read(&manga, &chapter, index);
    }

    fn report_read(&self, manga: &Manga, chapter: &Chapter) {
        let config = &self.shared.config;
        if config.privacy.incognito || !config.tracking.update_on_read {
            return;
        }

        let shared = self.shared.clone();
        let manga_id = manga.id;
        let chapter_number = chapter.chapter_number;
        self.shared.spawn_background(async move {
            let tracker = &shared.deps.tracker;
            if !tracker.has_trackers(manga_id).await {
                return;
            }

            let failures: Vec<TrackResult> = tracker
                .report_chapter_read(manga_id, chapter_number)
                .await
                .into_iter()
                .filter(|r| r.error.is_some())
                .collect();
            if !failures.is_empty() {
                tracing::warn!(manga = %manga_id, failed = failures.len(), "Tracker update failed");
                shared.emit(ReaderEvent::TrackingErrors(failures));
            }
        });
    }

    fn delete_after_read(&mut self, manga: &Manga, completed: &Chapter, index: usize) {
        let download = &self.shared.config.download;
        let slots = download.remove_after_read_slots;

        if self
            .chapter_to_download
            .as_ref()
            .is_some_and(|c| c.id == completed.id)
        {
            self.chapter_to_download = None;
        }
        // A pending download goes back to the queue before anything is deleted
        let requeue = if slots > 0 {
            self.chapter_to_download.take()
        } else {
            None
        };

        let excluded = policy::is_deletion_excluded(&manga.categories, &download.remove_exclude_categories);
        if excluded {
            tracing::debug!(manga = %manga.id, "Manga category excluded from delete-after-read");
        }
        let target = match (&self.catalog, excluded) {
            (Some(catalog), false) => {
                policy::delete_after_read_target(index, slots, catalog.chapters.len())
                    .and_then(|i| catalog.chapters.get(i))
                    .map(|c| c.read().clone())
            }
            _ => None,
        };

        if requeue.is_none() && target.is_none() {
            return;
        }

        let downloads = self.shared.deps.downloads.clone();
        let manga = manga.clone();
        self.shared.spawn_persistent(async move {
            if let Some(pending) = requeue {
                if let Err(e) = downloads.enqueue(&manga, std::slice::from_ref(&pending), true).await {
                    tracing::warn!(chapter = %pending.id, "Failed to requeue download: {}", e);
                }
            }
            if let Some(target) = target {
                tracing::debug!(chapter = %target.id, "Queueing chapter deletion after read");
                if let Err(e) = downloads.delete_pending(&manga, std::slice::from_ref(&target)).await {
                    tracing::warn!(chapter = %target.id, "Failed to queue chapter deletion: {}", e);
                }
            }
        });
    }

    fn download_ahead(&mut self, resource: &ChapterResource, index: usize, total: usize) {
        let amount = self.shared.config.download.download_ahead;
        if amount == 0 || !policy::past_download_threshold(index, total) {
            return;
        }
        if resource.source() != Some(PageSource::Downloaded) || self.downloaded_ahead.contains(&resource.id()) {
            return;
        }
        let Some(catalog) = &self.catalog else {
            return;
        };
        if !catalog.manga.favorite {
            return;
        }

        let Some(next_index) = catalog.index_of(resource.id()).map(|i| i + 1) else {
            return;
        };
        let Some(next) = catalog.chapters.get(next_index).map(|c| c.read().clone()) else {
            return;
        };
        // Only keep going when the reader is already ahead of the network
        if !self.shared.deps.downloads.is_downloaded(&catalog.manga, &next) {
            return;
        }

        let chapters = policy::chapters_to_download_ahead(&catalog.snapshot(), next_index, amount);
        let manga = catalog.manga.clone();
        self.downloaded_ahead.insert(resource.id());
        if chapters.is_empty() {
            return;
        }

        tracing::debug!(count = chapters.len(), "Downloading chapters ahead");
        let downloads = self.shared.deps.downloads.clone();
        self.shared.spawn_background(async move {
            if let Err(e) = downloads.enqueue(&manga, &chapters, false).await {
                tracing::warn!(manga = %manga.id, "Download ahead failed: {}", e);
            }
        });
    }

    async fn cross_to(&mut self, target: &Arc<ChapterResource>, page: usize) {
        let Some(index) = self.catalog.as_ref().and_then(|c| c.index_of(target.id())) else {
            return;
        };
        if let Some(leaving) = self.window.as_ref().map(|w| w.current().id()) {
            tracing::info!(from = %leaving, to = %target.id(), "Crossing chapter boundary");
        }

        if let Err(e) = self.transition_to(index, Some(page)).await {
            tracing::warn!(chapter = %target.id(), "Chapter transition failed: {}", e);
            self.shared.emit(ReaderEvent::ChapterLoadError {
                chapter_id: target.id(),
                message: e.user_message(),
            });
        }
    }

    async fn load_adjacent(&mut self, direction: Direction) -> Result<Option<usize>, ReaderError> {
        let window = self.window.as_ref().ok_or(ReaderError::NotInitialized)?;
        let target = match direction {
            Direction::Next => window.next(),
            Direction::Previous => window.previous(),
        }
        .cloned();
        let Some(target) = target else {
            tracing::debug!(?direction, "No adjacent chapter");
            return Ok(None);
        };
        let index = self
            .catalog
            .as_ref()
            .and_then(|c| c.index_of(target.id()))
            .ok_or(ReaderError::NotInitialized)?;

        let _loading = AdjacentLoadGuard::start(&self.shared);
        self.shared.emit(ReaderEvent::AdjacentLoadStarted(direction));
        target.set_requested_page(target.chapter().resume_page());

        match self.transition_to(index, None).await {
            Ok(()) => {
                let resume_page = target.requested_page();
                tracing::info!(chapter = %target.id(), resume_page, "Adjacent chapter loaded");
                self.shared.emit(ReaderEvent::AdjacentLoadFinished {
                    direction,
                    resume_page,
                });
                Ok(Some(resume_page))
            }
            Err(e) => {
                tracing::warn!(chapter = %target.id(), "Failed to load adjacent chapter: {}", e);
                self.shared.emit(ReaderEvent::ChapterLoadError {
                    chapter_id: target.id(),
                    message: e.user_message(),
                });
                Err(e)
            }
        }
    }

    /// Center the window on `chapters[index]`. The old window is only
    /// released once the new one holds its references and its current
    /// chapter is loaded; on failure the old window stays and nothing is
    /// written for the chapter being left.
    async fn transition_to(&mut self, index: usize, current_page: Option<usize>) -> Result<(), ReaderError> {
        let catalog = self.catalog.as_ref().ok_or(ReaderError::NotInitialized)?;
        let window = ViewerWindow::construct(&self.shared.registry, &catalog.chapters, index)?;
        let current = window.current().clone();

        if let Err(e) = current.ensure_loaded().await {
            if let Err(release) = window.final_release() {
                tracing::error!("Failed to release abandoned window: {}", release);
            }
            return Err(e);
        }

        // Progress of the chapter being left is issued before the new window is published
        if let Some(leaving) = self.window.as_ref().map(|w| w.current().clone()) {
            self.persist(&leaving);
        }
        self.shared.recorder.restart_timer();

        if let Some(old) = self.window.take() {
            if let Err(e) = old.supersede(&window) {
                tracing::error!("Failed to release superseded window: {}", e);
            }
        }

        let snapshot = window.snapshot();
        self.window = Some(window);

        let resume = current.requested_page();
        let pages = current.pages();
        self.shared.state.send_modify(|s| {
            s.viewer_chapters = Some(snapshot);
            s.last_resume_page = resume;
            s.current_page = current_page;
            s.layout.recompute(pages.as_ref().map(|p| p.as_slice()), current_page.unwrap_or(resume));
        });
        Ok(())
    }

    fn preload_finished(&self, id: ChapterId) {
        if self.window.as_ref().is_some_and(|w| w.contains(id)) {
            self.shared.emit(ReaderEvent::ReloadViewerChapters);
        } else {
            tracing::debug!(chapter = %id, "Preloaded chapter left the window, ignoring");
        }
    }

    /// Issue the progress and history writes for a chapter being left
    fn persist(&self, resource: &ChapterResource) {
        let Some(catalog) = &self.catalog else {
            return;
        };
        if let Some(write) = self.shared.recorder.capture(catalog.manga.id, resource) {
            let recorder = self.shared.recorder.clone();
            self.shared.spawn_persistent(async move { recorder.write(write).await });
        }
    }

    fn requeue_pending_download(&mut self, manga: &Manga) {
        let Some(chapter) = self.chapter_to_download.take() else {
            return;
        };

        let downloads = self.shared.deps.downloads.clone();
        let manga = manga.clone();
        self.shared.spawn_persistent(async move {
            tracing::debug!(chapter = %chapter.id, "Requeueing download at the front");
            if let Err(e) = downloads.enqueue(&manga, std::slice::from_ref(&chapter), true).await {
                tracing::warn!(chapter = %chapter.id, "Failed to requeue download: {}", e);
            }
        });
    }

    async fn end(&mut self) {
        if let Some(window) = self.window.take() {
            let current = window.current().clone();
            self.persist(&current);

            let manga = self.catalog.as_ref().map(|c| c.manga.clone());
            if let Some(manga) = manga {
                self.requeue_pending_download(&manga);
            }

            if let Err(e) = window.final_release() {
                tracing::error!("Failed to release viewer window: {}", e);
            }
        }

        self.shared.closed.store(true, Ordering::Release);
        let mut background = std::mem::take(&mut *self.shared.background.lock());
        background.shutdown().await;

        let pending = std::mem::take(&mut *self.shared.persistence.lock());
        for handle in pending {
            if let Err(e) = handle.await {
                tracing::error!("Persistence task failed: {}", e);
            }
        }
        tracing::info!("Reader session closed");
    }
}

/// Handle to a running reader session
pub struct ReaderSession {
    shared: Arc<Shared>,
    events: Mutex<Option<mpsc::UnboundedReceiver<ReaderEvent>>>,
}

impl ReaderSession {
    /// Start a session worker on the current tokio runtime
    pub fn new(deps: SessionDeps, config: ReaderConfig) -> Result<Self, ReaderError> {
        let runtime = Handle::try_current().map_err(|e| ReaderError::Runtime(e.to_string()))?;

        let (commands, command_rx) = mpsc::unbounded_channel();
        let (events, event_rx) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(ReaderState::new(config.reader.page_layout));

        let shared = Arc::new(Shared {
            registry: ChapterRegistry::new(deps.loader.clone()),
            recorder: Arc::new(ProgressRecorder::new(&deps, &config)),
            deps,
            config,
            state,
            events,
            commands,
            runtime: runtime.clone(),
            background: Mutex::new(JoinSet::new()),
            persistence: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        });

        let worker = Worker {
            shared: shared.clone(),
            catalog: None,
            window: None,
            completed: HashSet::new(),
            downloaded_ahead: HashSet::new(),
            chapter_to_download: None,
        };
        runtime.spawn(worker.run(command_rx));

        Ok(Self {
            shared,
            events: Mutex::new(Some(event_rx)),
        })
    }

    /// Open `chapter_id` of `manga_id`. Errors here end the session before it starts.
    pub async fn init(&self, manga_id: MangaId, chapter_id: ChapterId) -> Result<(), ReaderError> {
        let (callback, result) = oneshot::channel();
        self.shared.send(Command::Init {
            manga_id,
            chapter_id,
            callback,
        })?;
        result.await.map_err(|_| ReaderError::SessionClosed)?
    }

    /// The viewer showed `page`. `has_extra_page` is set when the last page
    /// is paired with this one in a double spread.
    pub fn on_page_selected(&self, page: &Arc<Page>, has_extra_page: bool) {
        let command = Command::PageSelected {
            page: page.clone(),
            has_extra_page,
        };
        if let Err(e) = self.shared.send(command) {
            tracing::debug!("Page selection dropped: {}", e);
        }
    }

    /// Move to the adjacent chapter; `None` when there is none.
    /// Returns the page to resume at.
    pub async fn load_adjacent(&self, direction: Direction) -> Result<Option<usize>, ReaderError> {
        let (callback, result) = oneshot::channel();
        self.shared.send(Command::LoadAdjacent { direction, callback })?;
        result.await.map_err(|_| ReaderError::SessionClosed)?
    }

    /// Hint that `resource` will be needed soon
    pub fn preload(&self, resource: &Arc<ChapterResource>) {
        self.shared.preload(resource);
    }

    pub fn toggle_double_shift(&self) {
        self.shared.state.send_modify(|s| {
            if s.layout.is_double() {
                s.layout.toggle_shift();
            }
        });
    }

    pub fn reset_double_shift(&self) {
        self.shared.state.send_modify(|s| {
            let pages = s.viewer_chapters.as_ref().and_then(|v| v.curr.pages());
            let index = s.page_index();
            s.layout.reset_shift(pages.as_ref().map(|p| p.as_slice()), index);
        });
    }

    pub fn set_page_layout(&self, layout: PageLayout) {
        self.shared.state.send_modify(|s| {
            let pages = s.viewer_chapters.as_ref().and_then(|v| v.curr.pages());
            let index = s.page_index();
            s.layout.set_layout(layout, pages.as_ref().map(|p| p.as_slice()), index);
        });
    }

    pub fn save_image(&self, page: &Arc<Page>) {
        self.shared.export_image(page, false);
    }

    pub fn share_image(&self, page: &Arc<Page>) {
        self.shared.export_image(page, true);
    }

    /// Persist the current chapter, release the window and stop the worker.
    /// Pending writes are finished before this returns.
    pub async fn on_session_end(&self) -> Result<(), ReaderError> {
        if self.is_closed() {
            return Ok(());
        }
        let (callback, done) = oneshot::channel();
        self.shared.send(Command::End {
            callback: Some(callback),
        })?;
        done.await.map_err(|_| ReaderError::SessionClosed)
    }

    pub fn state(&self) -> ReaderState {
        self.shared.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ReaderState> {
        self.shared.state.subscribe()
    }

    /// The event queue; there is only one consumer
    pub fn take_events(&self) -> Option<mpsc::UnboundedReceiver<ReaderEvent>> {
        self.events.lock().take()
    }

    pub fn resource(&self, id: ChapterId) -> Option<Arc<ChapterResource>> {
        self.shared.registry.get(id)
    }

    pub fn config(&self) -> &ReaderConfig {
        &self.shared.config
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Wait until queued commands and every task they started have finished
    pub async fn wait_idle(&self) {
        loop {
            let (callback, done) = oneshot::channel();
            if self.shared.send(Command::Barrier(callback)).is_ok() {
                let _ = done.await;
            }

            let mut background = std::mem::take(&mut *self.shared.background.lock());
            let persistence = std::mem::take(&mut *self.shared.persistence.lock());
            if background.is_empty() && persistence.is_empty() {
                return;
            }
            while background.join_next().await.is_some() {}
            for handle in persistence {
                let _ = handle.await;
            }
        }
    }
}

impl Drop for ReaderSession {
    fn drop(&mut self) {
        if !self.is_closed() {
            let _ = self.shared.send(Command::End { callback: None });
        }
    }
}
