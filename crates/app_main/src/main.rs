//! Manga Reader - terminal reader for a local manga library
//!
//! Usage: `manga_reader <manga-dir> [chapter-dir]`

mod library;
mod repl;

use anyhow::{bail, Context, Result};
use app_core::{ChapterSource, ImageExporter, LaunchTracker, ReaderConfig, ReaderSession, SessionDeps, SqliteStore};
use directories::UserDirs;
use library::{LocalLibrary, NoTracking};
use std::path::PathBuf;
use std::sync::Arc;

fn main() -> Result<()> {
    // Logging and panic hook first; the console layer would interleave with the prompt
    let _log_guard = app_log::init(app_log::LogOptions {
        console: false,
        ..Default::default()
    })?;

    // Clean up old logs (7 days)
    if let Err(e) = app_log::cleanup_old_logs(7) {
        tracing::warn!("Failed to cleanup old logs: {}", e);
    }

    tracing::info!("Manga Reader starting...");

    let config = ReaderConfig::load().unwrap_or_default();

    let mut args = std::env::args().skip(1);
    let Some(root) = args.next().map(PathBuf::from) else {
        eprintln!("usage: manga_reader <manga-dir> [chapter-dir]");
        std::process::exit(2);
    };
    let chapter = args.next();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("reader-worker")
        .build()?;

    runtime.block_on(run(root, chapter, config))
}

async fn run(root: PathBuf, chapter: Option<String>, config: ReaderConfig) -> Result<()> {
    let store = SqliteStore::new(app_db::init()?);

    let export_dir = UserDirs::new()
        .and_then(|dirs| dirs.picture_dir().map(|p| p.join("Manga Reader")))
        .unwrap_or_else(|| app_db::db_dir().join("saved"));

    let library = Arc::new(LocalLibrary::open(&root, Some(store.clone()), export_dir)?);
    let manga = library.manga().clone();

    let chapter_id = match chapter {
        Some(name) => library.chapter_id(&name),
        None => {
            let chapters = library.chapters(&manga).await?;
            match chapters.iter().find(|c| !c.read).or(chapters.first()) {
                Some(c) => c.id,
                None => bail!("No chapters found in {}", root.display()),
            }
        }
    };

    let store = Arc::new(store);
    let deps = SessionDeps {
        source: library.clone(),
        loader: library.clone(),
        progress: store.clone(),
        history: store,
        downloads: library.clone(),
        tracker: Arc::new(NoTracking),
        exporter: Some(library as Arc<dyn ImageExporter>),
        launches: Arc::new(LaunchTracker::new()),
    };

    let session = ReaderSession::new(deps, config)?;
    session
        .init(manga.id, chapter_id)
        .await
        .with_context(|| format!("Failed to open {}", manga.title))?;

    let result = repl::run(&session).await;

    session.on_session_end().await?;
    tracing::info!("Manga Reader exiting");
    result
}
