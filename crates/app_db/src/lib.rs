//! Manga reader persistence layer
//!
//! Provides SQLite storage for:
//! - Per-chapter reading progress (read flag, bookmark, last page, pages left)
//! - Reading history (last read timestamp and time spent per session)

mod pool;
mod progress;
mod schema;

pub use pool::{init_pool, DbPool};
pub use progress::{HistoryRecord, ProgressDb, ProgressRecord};
pub use schema::migrate;

use directories::ProjectDirs;
use std::path::PathBuf;
use thiserror::Error;

/// Database errors
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Pool error: {0}")]
    Pool(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DbError>;

/// Get the database directory
pub fn db_dir() -> PathBuf {
    ProjectDirs::from("com", "MangaReader", "MangaReader")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("./data"))
}

/// Open (and migrate) the reading database in the default location
pub fn init() -> Result<ProgressDb> {
    let db_path = db_dir();
    std::fs::create_dir_all(&db_path)?;
    let db = ProgressDb::open(&db_path.join("reading.db"))?;
    tracing::info!("Database initialized at {:?}", db_path);
    Ok(db)
}
