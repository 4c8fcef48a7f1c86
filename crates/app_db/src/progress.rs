//! Chapter progress and reading history records

use crate::{pool, schema, DbError, DbPool, Result};
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::OptionalExtension;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Persisted reading state of one chapter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub chapter_id: i64,
    pub read: bool,
    pub bookmark: bool,
    pub last_page_read: i64,
    pub pages_left: i64,
}

/// One reading session of a chapter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub chapter_id: i64,
    pub last_read_at: DateTime<Utc>,
    pub time_read_ms: i64,
}

/// Progress and history storage
#[derive(Clone)]
pub struct ProgressDb {
    pool: DbPool,
}

impl ProgressDb {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Open a database file and bring its schema up to date
    pub fn open(path: &Path) -> Result<Self> {
        let pool = pool::init_pool(path)?;
        schema::migrate(&pool)?;
        Ok(Self::new(pool))
    }

    fn conn(&self) -> Result<r2d2::PooledConnection<r2d2_sqlite::SqliteConnectionManager>> {
        self.pool.get().map_err(|e| DbError::Pool(e.to_string()))
    }

    // ===== Progress =====

    /// Insert or replace the reading state of a chapter
    pub fn upsert_progress(&self, record: &ProgressRecord) -> Result<()> {
        let conn = self.conn()?;

        conn.execute(
            r#"
            INSERT INTO chapter_progress (chapter_id, read, bookmark, last_page_read, pages_left)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(chapter_id) DO UPDATE SET
                read = excluded.read,
                bookmark = excluded.bookmark,
                last_page_read = excluded.last_page_read,
                pages_left = excluded.pages_left,
                updated_at = strftime('%s', 'now')
            "#,
            rusqlite::params![
                record.chapter_id,
                record.read,
                record.bookmark,
                record.last_page_read,
                record.pages_left,
            ],
        )?;

        Ok(())
    }

    /// Reading state of a chapter, if it was ever saved
    pub fn get_progress(&self, chapter_id: i64) -> Result<Option<ProgressRecord>> {
        let conn = self.conn()?;

        let record = conn
            .query_row(
                "SELECT chapter_id, read, bookmark, last_page_read, pages_left
                 FROM chapter_progress WHERE chapter_id = ?1",
                [chapter_id],
                |row| {
                    Ok(ProgressRecord {
                        chapter_id: row.get(0)?,
                        read: row.get(1)?,
                        bookmark: row.get(2)?,
                        last_page_read: row.get(3)?,
                        pages_left: row.get(4)?,
                    })
                },
            )
            .optional()?;

        Ok(record)
    }

    // ===== History =====

    /// Append a history entry
    pub fn append_history(&self, record: &HistoryRecord) -> Result<()> {
        let conn = self.conn()?;

        conn.execute(
            "INSERT INTO reading_history (chapter_id, last_read_at, time_read_ms) VALUES (?1, ?2, ?3)",
            rusqlite::params![
                record.chapter_id,
                record.last_read_at.timestamp_millis(),
                record.time_read_ms,
            ],
        )?;

        Ok(())
    }

    /// History of a chapter, most recent first
    pub fn history_for_chapter(&self, chapter_id: i64) -> Result<Vec<HistoryRecord>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            "SELECT chapter_id, last_read_at, time_read_ms FROM reading_history
             WHERE chapter_id = ?1
             ORDER BY last_read_at DESC, history_id DESC",
        )?;

        let rows = stmt.query_map([chapter_id], |row| {
            let millis: i64 = row.get(1)?;
            Ok(HistoryRecord {
                chapter_id: row.get(0)?,
                last_read_at: Utc
                    .timestamp_millis_opt(millis)
                    .single()
                    .unwrap_or_default(),
                time_read_ms: row.get(2)?,
            })
        })?;

        let mut history = Vec::new();
        for row in rows {
            history.push(row?);
        }

        Ok(history)
    }

    /// Total milliseconds spent reading a chapter
    pub fn total_time_read(&self, chapter_id: i64) -> Result<i64> {
        let conn = self.conn()?;

        let total: i64 = conn.query_row(
            "SELECT COALESCE(SUM(time_read_ms), 0) FROM reading_history WHERE chapter_id = ?1",
            [chapter_id],
            |row| row.get(0),
        )?;

        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn open_temp() -> (NamedTempFile, ProgressDb) {
        let file = NamedTempFile::new().unwrap();
        let db = ProgressDb::open(file.path()).unwrap();
        (file, db)
    }

    #[test]
    fn test_progress_upsert_overwrites() {
        let (_file, db) = open_temp();
        assert_eq!(db.get_progress(7).unwrap(), None);

        let mut record = ProgressRecord {
            chapter_id: 7,
            read: false,
            bookmark: true,
            last_page_read: 3,
            pages_left: 9,
        };
        db.upsert_progress(&record).unwrap();
        assert_eq!(db.get_progress(7).unwrap(), Some(record.clone()));

        record.read = true;
        record.last_page_read = 11;
        record.pages_left = 1;
        db.upsert_progress(&record).unwrap();
        assert_eq!(db.get_progress(7).unwrap(), Some(record));
    }

    #[test]
    fn test_history_order_and_total() {
        let (_file, db) = open_temp();
        let first = Utc.timestamp_millis_opt(1_000_000).unwrap();
        let second = Utc.timestamp_millis_opt(2_000_000).unwrap();

        db.append_history(&HistoryRecord { chapter_id: 1, last_read_at: first, time_read_ms: 500 }).unwrap();
        db.append_history(&HistoryRecord { chapter_id: 1, last_read_at: second, time_read_ms: 250 }).unwrap();
        db.append_history(&HistoryRecord { chapter_id: 2, last_read_at: second, time_read_ms: 99 }).unwrap();

        let history = db.history_for_chapter(1).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].last_read_at, second);
        assert_eq!(history[1].last_read_at, first);
        assert_eq!(db.total_time_read(1).unwrap(), 750);
        assert_eq!(db.total_time_read(3).unwrap(), 0);
    }
}
