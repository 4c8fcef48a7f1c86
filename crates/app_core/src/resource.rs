//! Chapter resources: loaded page lists shared between viewer windows
//!
//! A [`ChapterResource`] owns the load state of one chapter. Windows take a
//! reference with [`ChapterResource::acquire`] and give it back with
//! [`ChapterResource::release`]; when the last reference goes the page
//! streams are torn down and the resource returns to `Wait`.

use crate::error::ReaderError;
use crate::model::{Chapter, ChapterId, LoadedPages, Page, PageList, PageSource, SharedChapter};
use crate::ports::ChapterLoader;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Load state of a chapter
#[derive(Debug, Clone)]
pub enum ChapterState {
    Wait,
    Loading,
    Loaded(PageList),
    Error(String),
}

impl ChapterState {
    fn name(&self) -> &'static str {
        match self {
            ChapterState::Wait => "Wait",
            ChapterState::Loading => "Loading",
            ChapterState::Loaded(_) => "Loaded",
            ChapterState::Error(_) => "Error",
        }
    }
}

type LoadOutcome = Result<PageList, String>;

struct LoadSlot {
    state: ChapterState,
    source: Option<PageSource>,
    /// Followers of the running load subscribe here
    in_flight: Option<broadcast::Sender<LoadOutcome>>,
}

pub struct ChapterResource {
    id: ChapterId,
    chapter: SharedChapter,
    loader: Arc<dyn ChapterLoader>,
    slot: Mutex<LoadSlot>,
    refs: AtomicUsize,
    /// Bumped on teardown; loads started under an older generation are discarded
    generation: AtomicU64,
    requested_page: AtomicUsize,
    touched: AtomicBool,
}

impl ChapterResource {
    pub fn new(chapter: SharedChapter, loader: Arc<dyn ChapterLoader>) -> Self {
        let id = chapter.read().id;
        Self {
            id,
            chapter,
            loader,
            slot: Mutex::new(LoadSlot {
                state: ChapterState::Wait,
                source: None,
                in_flight: None,
            }),
            refs: AtomicUsize::new(0),
            generation: AtomicU64::new(0),
            requested_page: AtomicUsize::new(0),
            touched: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> ChapterId {
        self.id
    }

    /// Snapshot of the chapter's current reading state
    pub fn chapter(&self) -> Chapter {
        self.chapter.read().clone()
    }

    pub fn update_chapter<R>(&self, f: impl FnOnce(&mut Chapter) -> R) -> R {
        f(&mut self.chapter.write())
    }

    pub fn state(&self) -> ChapterState {
        self.slot.lock().state.clone()
    }

    /// Pages, present only while loaded
    pub fn pages(&self) -> Option<PageList> {
        match &self.slot.lock().state {
            ChapterState::Loaded(pages) => Some(pages.clone()),
            _ => None,
        }
    }

    pub fn source(&self) -> Option<PageSource> {
        self.slot.lock().source
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.slot.lock().state, ChapterState::Loaded(_))
    }

    /// Preloading only makes sense from `Wait` or `Error`
    pub fn needs_load(&self) -> bool {
        matches!(self.slot.lock().state, ChapterState::Wait | ChapterState::Error(_))
    }

    pub fn requested_page(&self) -> usize {
        self.requested_page.load(Ordering::Acquire)
    }

    /// Set the page to resume at without counting it as read progress
    pub fn set_requested_page(&self, page: usize) {
        self.requested_page.store(page, Ordering::Release);
    }

    /// Record a page the reader actually showed
    pub fn mark_page_selected(&self, page: usize) {
        self.set_requested_page(page);
        self.touched.store(true, Ordering::Release);
    }

    /// A page of this chapter was selected during the session
    pub fn has_progress(&self) -> bool {
        self.touched.load(Ordering::Acquire)
    }

    pub fn ref_count(&self) -> usize {
        self.refs.load(Ordering::Acquire)
    }

    pub fn acquire(&self) -> usize {
        self.refs.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Drop one reference; the last one tears the page streams down
    pub fn release(&self) -> Result<usize, ReaderError> {
        let mut current = self.refs.load(Ordering::Acquire);
        loop {
            if current == 0 {
                tracing::error!(chapter = %self.id, "Release of an unreferenced chapter");
                return Err(ReaderError::ReleaseUnderflow(self.id));
            }
            match self
                .refs
                .compare_exchange_weak(current, current - 1, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }

        let remaining = current - 1;
        if remaining == 0 {
            self.teardown();
        }
        Ok(remaining)
    }

    fn teardown(&self) {
        let mut slot = self.slot.lock();
        self.generation.fetch_add(1, Ordering::AcqRel);
        // Dropping the sender wakes followers of an abandoned load
        slot.in_flight = None;
        slot.source = None;
        let previous = std::mem::replace(&mut slot.state, ChapterState::Wait);
        drop(slot);

        if let ChapterState::Loaded(pages) = previous {
            self.loader.teardown(&self.chapter(), &pages);
        }
        tracing::debug!(chapter = %self.id, "Chapter resource released");
    }

    /// Resolve the page list. Valid from `Wait` or `Error` while at least one
    /// window holds the chapter; while a load is running, callers join it
    /// instead of starting another.
    pub async fn begin_load(&self) -> Result<PageList, ReaderError> {
        let (follower, generation) = {
            let mut guard = self.slot.lock();
            let slot = &mut *guard;
            // Released before the load got the slot; nothing would tear it down
            if self.refs.load(Ordering::Acquire) == 0 {
                tracing::debug!(chapter = %self.id, "Load of an unreferenced chapter skipped");
                return Err(ReaderError::LoadCancelled(self.id));
            }
            let generation = self.generation.load(Ordering::Acquire);
            let follower = match &slot.state {
                ChapterState::Loaded(_) => {
                    return Err(ReaderError::InvalidTransition {
                        chapter_id: self.id,
                        from: "Loaded",
                        to: "Loading",
                    });
                }
                ChapterState::Loading => match &slot.in_flight {
                    Some(tx) => Some(tx.subscribe()),
                    None => {
                        return Err(ReaderError::InvalidTransition {
                            chapter_id: self.id,
                            from: "Loading",
                            to: "Loading",
                        });
                    }
                },
                ChapterState::Wait | ChapterState::Error(_) => {
                    let (tx, _) = broadcast::channel(1);
                    slot.in_flight = Some(tx);
                    slot.state = ChapterState::Loading;
                    None
                }
            };
            (follower, generation)
        };

        if let Some(mut rx) = follower {
            tracing::debug!(chapter = %self.id, "Joining in-flight chapter load");
            return match rx.recv().await {
                Ok(Ok(pages)) => Ok(pages),
                Ok(Err(message)) => Err(ReaderError::Load { chapter_id: self.id, message }),
                Err(_) => Err(ReaderError::LoadCancelled(self.id)),
            };
        }

        let mut guard = LoadGuard { resource: self, generation, armed: true };

        tracing::debug!(chapter = %self.id, "Loading chapter");
        let chapter = self.chapter();
        let result = self.loader.load(&chapter).await;
        guard.armed = false;

        self.finish_load(generation, result)
    }

    /// Pages if already loaded, otherwise load them
    pub async fn ensure_loaded(&self) -> Result<PageList, ReaderError> {
        match self.pages() {
            Some(pages) => Ok(pages),
            None => self.begin_load().await,
        }
    }

    fn finish_load(
        &self,
        generation: u64,
        result: Result<LoadedPages, ReaderError>,
    ) -> Result<PageList, ReaderError> {
        let mut slot = self.slot.lock();

        if self.generation.load(Ordering::Acquire) != generation {
            // Released while loading; whatever is in the slot now belongs to a newer load
            drop(slot);
            if let Ok(loaded) = result {
                let pages: Vec<Arc<Page>> = loaded.pages.into_iter().map(Arc::new).collect();
                self.loader.teardown(&self.chapter(), &pages);
            }
            tracing::debug!(chapter = %self.id, "Discarding load of released chapter");
            return Err(ReaderError::LoadCancelled(self.id));
        }

        let in_flight = slot.in_flight.take();
        match result {
            Ok(loaded) => {
                let pages: PageList = Arc::new(loaded.pages.into_iter().map(Arc::new).collect());
                slot.state = ChapterState::Loaded(pages.clone());
                slot.source = Some(loaded.source);
                drop(slot);

                tracing::debug!(chapter = %self.id, pages = pages.len(), "Chapter loaded");
                if let Some(tx) = in_flight {
                    let _ = tx.send(Ok(pages.clone()));
                }
                Ok(pages)
            }
            Err(e) => {
                let message = e.to_string();
                slot.state = ChapterState::Error(message.clone());
                drop(slot);

                tracing::warn!(chapter = %self.id, "Chapter load failed: {}", message);
                if let Some(tx) = in_flight {
                    let _ = tx.send(Err(message));
                }
                Err(e)
            }
        }
    }
}

/// Puts an abandoned load back to `Wait` so it can be retried
struct LoadGuard<'a> {
    resource: &'a ChapterResource,
    generation: u64,
    armed: bool,
}

impl Drop for LoadGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let resource = self.resource;
        let mut slot = resource.slot.lock();
        if resource.generation.load(Ordering::Acquire) == self.generation
            && matches!(slot.state, ChapterState::Loading)
        {
            slot.state = ChapterState::Wait;
            slot.in_flight = None;
            tracing::debug!(chapter = %resource.id, "Chapter load cancelled");
        }
    }
}

impl fmt::Debug for ChapterResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChapterResource")
            .field("id", &self.id)
            .field("state", &self.slot.lock().state.name())
            .field("refs", &self.ref_count())
            .field("requested_page", &self.requested_page())
            .finish()
    }
}

/// Lazily created chapter resources, keyed by chapter id
#[derive(Clone)]
pub struct ChapterRegistry {
    resources: Arc<DashMap<ChapterId, Arc<ChapterResource>>>,
    loader: Arc<dyn ChapterLoader>,
}

impl ChapterRegistry {
    pub fn new(loader: Arc<dyn ChapterLoader>) -> Self {
        Self {
            resources: Arc::new(DashMap::new()),
            loader,
        }
    }

    pub fn get(&self, id: ChapterId) -> Option<Arc<ChapterResource>> {
        self.resources.get(&id).map(|r| r.value().clone())
    }

    /// Resource for a chapter, created on first reference
    pub fn get_or_create(&self, chapter: &SharedChapter) -> Arc<ChapterResource> {
        let id = chapter.read().id;
        self.resources
            .entry(id)
            .or_insert_with(|| Arc::new(ChapterResource::new(chapter.clone(), self.loader.clone())))
            .value()
            .clone()
    }

    /// Forget a resource nobody references any more
    pub fn evict_if_unreferenced(&self, id: ChapterId) -> bool {
        self.resources
            .remove_if(&id, |_, resource| resource.ref_count() == 0)
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{shared_chapter, FakeLoader};
    use std::time::Duration;

    fn resource(loader: &Arc<FakeLoader>, id: i64, pages: usize) -> ChapterResource {
        loader.set_pages(ChapterId(id), pages);
        ChapterResource::new(shared_chapter(id), loader.clone())
    }

    #[tokio::test]
    async fn test_load_state_machine() {
        let loader = Arc::new(FakeLoader::new());
        let res = resource(&loader, 1, 4);
        res.acquire();
        assert!(matches!(res.state(), ChapterState::Wait));
        assert!(res.pages().is_none());

        let pages = res.begin_load().await.unwrap();
        assert_eq!(pages.len(), 4);
        assert!(res.is_loaded());
        assert_eq!(res.source(), Some(PageSource::Downloaded));

        // Loaded chapters are never re-fetched
        let err = res.begin_load().await.unwrap_err();
        assert!(matches!(err, ReaderError::InvalidTransition { from: "Loaded", .. }));
        assert_eq!(loader.load_count(ChapterId(1)), 1);
    }

    #[tokio::test]
    async fn test_error_then_retry() {
        let loader = Arc::new(FakeLoader::new());
        let res = resource(&loader, 2, 3);
        res.acquire();
        loader.fail(ChapterId(2), true);

        assert!(res.begin_load().await.is_err());
        assert!(matches!(res.state(), ChapterState::Error(_)));
        assert!(res.pages().is_none());
        assert!(res.needs_load());

        loader.fail(ChapterId(2), false);
        assert_eq!(res.begin_load().await.unwrap().len(), 3);
        assert_eq!(loader.load_count(ChapterId(2)), 2);
    }

    #[tokio::test]
    async fn test_concurrent_loads_coalesce() {
        let loader = Arc::new(FakeLoader::new());
        loader.set_delay(Duration::from_millis(30));
        let res = resource(&loader, 3, 5);
        res.acquire();

        let (a, b) = tokio::join!(res.begin_load(), res.begin_load());
        let (a, b) = (a.unwrap(), b.unwrap());
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(loader.load_count(ChapterId(3)), 1);
    }

    #[tokio::test]
    async fn test_release_tears_down_at_zero() {
        let loader = Arc::new(FakeLoader::new());
        let res = resource(&loader, 4, 2);
        assert_eq!(res.acquire(), 1);
        assert_eq!(res.acquire(), 2);
        res.begin_load().await.unwrap();

        assert_eq!(res.release().unwrap(), 1);
        assert_eq!(loader.teardown_count(ChapterId(4)), 0);
        assert!(res.is_loaded());

        assert_eq!(res.release().unwrap(), 0);
        assert_eq!(loader.teardown_count(ChapterId(4)), 1);
        assert!(matches!(res.state(), ChapterState::Wait));
    }

    #[test]
    fn test_release_underflow_is_reported() {
        let loader = Arc::new(FakeLoader::new());
        let res = resource(&loader, 5, 1);
        let err = res.release().unwrap_err();
        assert!(matches!(err, ReaderError::ReleaseUnderflow(ChapterId(5))));
        assert_eq!(res.ref_count(), 0);
    }

    #[tokio::test]
    async fn test_load_finishing_after_release_is_discarded() {
        let loader = Arc::new(FakeLoader::new());
        loader.set_delay(Duration::from_millis(30));
        let res = Arc::new(resource(&loader, 6, 3));
        res.acquire();

        let loading = {
            let res = res.clone();
            tokio::spawn(async move { res.begin_load().await })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        res.release().unwrap();

        let outcome = loading.await.unwrap();
        assert!(matches!(outcome, Err(ReaderError::LoadCancelled(_))));
        assert!(matches!(res.state(), ChapterState::Wait));
        assert_eq!(loader.teardown_count(ChapterId(6)), 1);
    }

    #[tokio::test]
    async fn test_load_after_last_release_is_refused() {
        let loader = Arc::new(FakeLoader::new());
        let res = resource(&loader, 7, 3);
        res.acquire();
        res.release().unwrap();

        let outcome = res.begin_load().await;
        assert!(matches!(outcome, Err(ReaderError::LoadCancelled(ChapterId(7)))));
        assert!(!res.is_loaded());
        assert!(matches!(res.state(), ChapterState::Wait));
        assert_eq!(loader.load_count(ChapterId(7)), 0);
        assert_eq!(res.ref_count(), 0);
    }

    #[test]
    fn test_registry_eviction() {
        let loader = Arc::new(FakeLoader::new());
        let registry = ChapterRegistry::new(loader);
        let chapter = shared_chapter(8);

        let res = registry.get_or_create(&chapter);
        assert!(Arc::ptr_eq(&res, &registry.get_or_create(&chapter)));

        res.acquire();
        assert!(!registry.evict_if_unreferenced(ChapterId(8)));
        res.release().unwrap();
        assert!(registry.evict_if_unreferenced(ChapterId(8)));
        assert!(registry.get(ChapterId(8)).is_none());
    }
}
