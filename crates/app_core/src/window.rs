//! Viewer window: the previous/current/next chapter triple kept in memory

use crate::error::ReaderError;
use crate::model::{ChapterId, SharedChapter};
use crate::resource::{ChapterRegistry, ChapterResource};
use std::sync::Arc;

/// Non-owning view of a window, published to observers
#[derive(Debug, Clone)]
pub struct ViewerChapters {
    pub prev: Option<Arc<ChapterResource>>,
    pub curr: Arc<ChapterResource>,
    pub next: Option<Arc<ChapterResource>>,
}

impl ViewerChapters {
    pub fn contains(&self, id: ChapterId) -> bool {
        self.curr.id() == id
            || self.prev.as_ref().is_some_and(|r| r.id() == id)
            || self.next.as_ref().is_some_and(|r| r.id() == id)
    }
}

/// Owns one reference on each of its chapters.
///
/// Replacing a window must go through [`ViewerWindow::supersede`] after the
/// new window exists, so a chapter present in both never drops to zero
/// references in between.
pub struct ViewerWindow {
    prev: Option<Arc<ChapterResource>>,
    curr: Arc<ChapterResource>,
    next: Option<Arc<ChapterResource>>,
    registry: ChapterRegistry,
    released: bool,
}

impl ViewerWindow {
    /// Window centered on `chapters[index]`, with all members acquired
    pub fn construct(
        registry: &ChapterRegistry,
        chapters: &[SharedChapter],
        index: usize,
    ) -> Result<Self, ReaderError> {
        let current = chapters.get(index).ok_or(ReaderError::IndexOutOfRange {
            index,
            len: chapters.len(),
        })?;

        let prev = index
            .checked_sub(1)
            .and_then(|i| chapters.get(i))
            .map(|c| registry.get_or_create(c));
        let curr = registry.get_or_create(current);
        let next = chapters.get(index + 1).map(|c| registry.get_or_create(c));

        let window = Self {
            prev,
            curr,
            next,
            registry: registry.clone(),
            released: false,
        };
        for resource in window.members() {
            resource.acquire();
        }

        tracing::debug!(
            prev = ?window.prev.as_ref().map(|r| r.id()),
            curr = %window.curr.id(),
            next = ?window.next.as_ref().map(|r| r.id()),
            "Viewer window constructed"
        );
        Ok(window)
    }

    pub fn previous(&self) -> Option<&Arc<ChapterResource>> {
        self.prev.as_ref()
    }

    pub fn current(&self) -> &Arc<ChapterResource> {
        &self.curr
    }

    pub fn next(&self) -> Option<&Arc<ChapterResource>> {
        self.next.as_ref()
    }

    pub fn members(&self) -> impl Iterator<Item = &Arc<ChapterResource>> {
        self.prev.iter().chain(std::iter::once(&self.curr)).chain(self.next.iter())
    }

    pub fn contains(&self, id: ChapterId) -> bool {
        self.members().any(|r| r.id() == id)
    }

    pub fn snapshot(&self) -> ViewerChapters {
        ViewerChapters {
            prev: self.prev.clone(),
            curr: self.curr.clone(),
            next: self.next.clone(),
        }
    }

    /// Hand over to `new`, which has already acquired its own references.
    ///
    /// Every reference of this window is returned; chapters shared with
    /// `new` keep at least its reference and are never torn down here.
    pub fn supersede(mut self, new: &ViewerWindow) -> Result<(), ReaderError> {
        let kept = self.members().filter(|r| new.contains(r.id())).count();
        tracing::debug!(kept, "Superseding viewer window");
        self.release_all()
    }

    /// Release everything with no replacement window
    pub fn final_release(mut self) -> Result<(), ReaderError> {
        self.release_all()
    }

    fn release_all(&mut self) -> Result<(), ReaderError> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        let mut first_error = None;
        for resource in self.members() {
            match resource.release() {
                Ok(0) => {
                    self.registry.evict_if_unreferenced(resource.id());
                }
                Ok(_) => {}
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for ViewerWindow {
    fn drop(&mut self) {
        if !self.released {
            tracing::warn!(curr = %self.curr.id(), "Viewer window dropped without release");
            if let Err(e) = self.release_all() {
                tracing::error!("Failed to release dropped viewer window: {}", e);
            }
        }
    }
}
