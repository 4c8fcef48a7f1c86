//! Local library: a manga directory whose subdirectories are chapters and
//! whose image files are pages

use app_core::{
    Chapter, ChapterId, ChapterLoader, ChapterSource, DownloadQueue, ImageExporter, LoadedPages, Manga, MangaId,
    Page, PageSource, PageStatus, ReaderError, SqliteStore, TrackResult, TrackSync,
};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use xxhash_rust::xxh3::xxh3_64;

/// Stable id for a path
pub fn path_id(path: &Path) -> i64 {
    xxh3_64(path.to_string_lossy().as_bytes()) as i64
}

pub fn is_page_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            matches!(
                e.to_lowercase().as_str(),
                "jpg" | "jpeg" | "png" | "gif" | "webp" | "bmp" | "avif"
            )
        })
        .unwrap_or(false)
}

/// Covers and pre-joined spreads are never paired
fn is_alone_page(path: &Path) -> bool {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(|s| {
            let s = s.to_lowercase();
            s.contains("cover") || s.contains("spread")
        })
        .unwrap_or(false)
}

/// Entries of `dir` in natural order, either subdirectories or page images
fn sorted_entries(dir: &Path, directories: bool) -> std::io::Result<Vec<PathBuf>> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| if directories { path.is_dir() } else { path.is_file() && is_page_image(path) })
        .collect();

    entries.sort_by_cached_key(|path| {
        natural_sort_key(&path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default())
    });
    Ok(entries)
}

/// "page2.png" sorts before "page10.png"
fn natural_sort_key(s: &str) -> Vec<NaturalSortPart> {
    let mut parts = Vec::new();
    let mut digits = String::new();
    let mut text = String::new();

    for c in s.chars() {
        if c.is_ascii_digit() {
            if !text.is_empty() {
                parts.push(NaturalSortPart::Str(text.to_lowercase()));
                text.clear();
            }
            digits.push(c);
        } else {
            if !digits.is_empty() {
                parts.push(NaturalSortPart::Num(digits.parse().unwrap_or(u64::MAX)));
                digits.clear();
            }
            text.push(c);
        }
    }
    if !digits.is_empty() {
        parts.push(NaturalSortPart::Num(digits.parse().unwrap_or(u64::MAX)));
    }
    if !text.is_empty() {
        parts.push(NaturalSortPart::Str(text.to_lowercase()));
    }

    parts
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum NaturalSortPart {
    Num(u64),
    Str(String),
}

async fn list(dir: PathBuf, directories: bool) -> Result<Vec<PathBuf>, ReaderError> {
    let entries = tokio::task::spawn_blocking(move || sorted_entries(&dir, directories))
        .await
        .map_err(|e| ReaderError::Io(std::io::Error::other(e)))??;
    Ok(entries)
}

pub struct LocalLibrary {
    manga: Manga,
    root: PathBuf,
    store: Option<SqliteStore>,
    export_dir: PathBuf,
}

impl LocalLibrary {
    pub fn open(root: &Path, store: Option<SqliteStore>, export_dir: PathBuf) -> Result<Self, ReaderError> {
        if !root.is_dir() {
            return Err(ReaderError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} is not a directory", root.display()),
            )));
        }

        let title = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| root.display().to_string());
        let manga = Manga {
            id: MangaId(path_id(root)),
            title,
            favorite: true,
            categories: Vec::new(),
        };

        Ok(Self {
            manga,
            root: root.to_path_buf(),
            store,
            export_dir,
        })
    }

    pub fn manga(&self) -> &Manga {
        &self.manga
    }

    /// Id of the chapter stored in `dir_name`
    pub fn chapter_id(&self, dir_name: &str) -> ChapterId {
        ChapterId(path_id(&self.root.join(dir_name)))
    }

    async fn copy_page(&self, page: &Page, dir: &Path) -> Result<PathBuf, ReaderError> {
        let source = Path::new(page.url());
        let extension = source.extension().and_then(|e| e.to_str()).unwrap_or("img");
        let chapter = source
            .parent()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let target = dir.join(format!("{}_{}_{:03}.{}", self.manga.title, chapter, page.number(), extension));

        tokio::fs::create_dir_all(dir).await?;
        tokio::fs::copy(source, &target).await?;
        tracing::info!(target = ?target, "Page exported");
        Ok(target)
    }
}

#[async_trait]
impl ChapterSource for LocalLibrary {
    async fn manga(&self, manga_id: MangaId) -> Result<Manga, ReaderError> {
        if manga_id == self.manga.id {
            Ok(self.manga.clone())
        } else {
            Err(ReaderError::MangaNotFound(manga_id))
        }
    }

    async fn chapters(&self, manga: &Manga) -> Result<Vec<Chapter>, ReaderError> {
        let dirs = list(self.root.clone(), true).await?;
        let mut chapters: Vec<Chapter> = dirs
            .iter()
            .enumerate()
            .map(|(i, dir)| {
                let mut chapter = Chapter::new(ChapterId(path_id(dir)), manga.id, &dir.to_string_lossy(), (i + 1) as f32);
                if let Some(name) = dir.file_name() {
                    chapter.name = name.to_string_lossy().into_owned();
                }
                chapter
            })
            .collect();

        if let Some(store) = self.store.clone() {
            chapters = tokio::task::spawn_blocking(move || {
                store.apply_saved_progress(&mut chapters).map(|()| chapters)
            })
            .await??;
        }
        tracing::debug!(manga = %manga.id, count = chapters.len(), "Chapters listed");
        Ok(chapters)
    }
}

#[async_trait]
impl ChapterLoader for LocalLibrary {
    async fn load(&self, chapter: &Chapter) -> Result<LoadedPages, ReaderError> {
        let files = list(PathBuf::from(&chapter.url), false)
            .await
            .map_err(|e| ReaderError::Load {
                chapter_id: chapter.id,
                message: e.to_string(),
            })?;

        let pages = files
            .iter()
            .enumerate()
            .map(|(i, file)| {
                let page = Page::new(chapter.id, i, file.to_string_lossy());
                page.set_alone(is_alone_page(file));
                page.set_status(PageStatus::Ready);
                page
            })
            .collect();

        Ok(LoadedPages {
            pages,
            source: PageSource::Downloaded,
        })
    }

    fn teardown(&self, chapter: &Chapter, pages: &[Arc<Page>]) {
        tracing::debug!(chapter = %chapter.name, pages = pages.len(), "Chapter pages closed");
    }
}

/// Everything in a local library is already on disk
#[async_trait]
impl DownloadQueue for LocalLibrary {
    async fn enqueue(&self, _manga: &Manga, chapters: &[Chapter], front: bool) -> Result<(), ReaderError> {
        tracing::debug!(count = chapters.len(), front, "Chapters already on disk, nothing to download");
        Ok(())
    }

    async fn delete_pending(&self, _manga: &Manga, chapters: &[Chapter]) -> Result<(), ReaderError> {
        for chapter in chapters {
            tracing::info!(chapter = %chapter.name, "Read chapter kept, local library files are never deleted");
        }
        Ok(())
    }

    async fn cancel_queued(&self, _manga: &Manga, _chapter: &Chapter) -> bool {
        false
    }

    fn is_downloaded(&self, _manga: &Manga, chapter: &Chapter) -> bool {
        Path::new(&chapter.url).is_dir()
    }
}

#[async_trait]
impl ImageExporter for LocalLibrary {
    async fn save(&self, page: &Page) -> Result<PathBuf, ReaderError> {
        self.copy_page(page, &self.export_dir).await
    }

    async fn share(&self, page: &Page) -> Result<PathBuf, ReaderError> {
        self.copy_page(page, &std::env::temp_dir().join("manga_reader_share")).await
    }
}

/// No tracker services are configured for local reading
pub struct NoTracking;

#[async_trait]
impl TrackSync for NoTracking {
    async fn has_trackers(&self, _manga_id: MangaId) -> bool {
        false
    }

    async fn report_chapter_read(&self, _manga_id: MangaId, _chapter_number: f32) -> Vec<TrackResult> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use app_core::{ProgressStore, ProgressUpdate};
    use tempfile::TempDir;

    fn library_with(chapters: &[(&str, &[&str])]) -> (TempDir, LocalLibrary) {
        let dir = TempDir::new().unwrap();
        for (name, pages) in chapters {
            let chapter = dir.path().join(name);
            std::fs::create_dir(&chapter).unwrap();
            for page in *pages {
                std::fs::write(chapter.join(page), b"img").unwrap();
            }
        }
        let library = LocalLibrary::open(dir.path(), None, dir.path().join("saved")).unwrap();
        (dir, library)
    }

    #[test]
    fn test_natural_sort() {
        let mut names = vec!["page10.png", "page2.png", "Page1.png"];
        names.sort_by_key(|n| natural_sort_key(n));
        assert_eq!(names, vec!["Page1.png", "page2.png", "page10.png"]);
    }

    #[tokio::test]
    async fn test_chapters_in_natural_order() {
        let (_dir, library) = library_with(&[("ch10", &["1.png"]), ("ch2", &["1.png"]), ("ch1", &[])]);
        let manga = library.manga().clone();

        let chapters = library.chapters(&manga).await.unwrap();
        let names: Vec<&str> = chapters.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["ch1", "ch2", "ch10"]);
        assert_eq!(chapters[1].id, library.chapter_id("ch2"));
        assert_eq!(chapters[2].chapter_number, 3.0);
    }

    #[tokio::test]
    async fn test_chapters_carry_saved_progress() {
        let (dir, _) = library_with(&[("ch1", &["1.png"]), ("ch2", &["1.png", "2.png"])]);
        let store = SqliteStore::new(app_db::ProgressDb::open(&dir.path().join("reading.db")).unwrap());
        let library = LocalLibrary::open(dir.path(), Some(store.clone()), dir.path().join("saved")).unwrap();

        store
            .update(ProgressUpdate {
                chapter_id: library.chapter_id("ch2"),
                read: true,
                bookmark: false,
                last_page_read: 1,
                pages_left: 1,
            })
            .await
            .unwrap();

        let manga = library.manga().clone();
        let chapters = library.chapters(&manga).await.unwrap();
        assert!(!chapters[0].read);
        assert!(chapters[1].read);
        assert_eq!(chapters[1].last_page_read, 1);
    }

    #[tokio::test]
    async fn test_pages_skip_non_images() {
        let (_dir, library) = library_with(&[("ch1", &["cover.jpg", "2.png", "10.png", "notes.txt"])]);
        let manga = library.manga().clone();
        let chapter = library.chapters(&manga).await.unwrap().remove(0);

        let loaded = library.load(&chapter).await.unwrap();
        assert_eq!(loaded.source, PageSource::Downloaded);
        let files: Vec<String> = loaded
            .pages
            .iter()
            .map(|p| Path::new(p.url()).file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(files, vec!["2.png", "10.png", "cover.jpg"]);
        assert!(loaded.pages[2].is_alone());
        assert!(loaded.pages.iter().all(|p| p.status() == PageStatus::Ready));
    }

    #[tokio::test]
    async fn test_save_copies_page() {
        let (dir, library) = library_with(&[("ch1", &["1.png"])]);
        let manga = library.manga().clone();
        let chapter = library.chapters(&manga).await.unwrap().remove(0);
        let page = library.load(&chapter).await.unwrap().pages.remove(0);

        let saved = library.save(&page).await.unwrap();
        assert!(saved.starts_with(dir.path().join("saved")));
        assert_eq!(std::fs::read(saved).unwrap(), b"img");
    }
}
