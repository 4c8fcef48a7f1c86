//! Download-ahead and delete-after-read decisions
//!
//! Pure functions over the ordered chapter list; the session performs the
//! resulting queue operations.

use crate::model::Chapter;

/// Fraction of a chapter that must be read before downloading ahead
pub const DOWNLOAD_AHEAD_THRESHOLD: f64 = 0.2;

/// Category id used for manga without categories
pub const DEFAULT_CATEGORY: i64 = 0;

/// The page at `index` lies past the download-ahead threshold
pub fn past_download_threshold(index: usize, total: usize) -> bool {
    total > 0 && (index + 1) as f64 / total as f64 > DOWNLOAD_AHEAD_THRESHOLD
}

/// Unread chapters to queue when keeping `amount` chapters downloaded ahead.
///
/// The next chapter (at `next_index`) counts toward `amount` but is never
/// part of the result.
pub fn chapters_to_download_ahead(chapters: &[Chapter], next_index: usize, amount: usize) -> Vec<Chapter> {
    if amount <= 1 {
        return Vec::new();
    }
    chapters
        .iter()
        .skip(next_index + 1)
        .filter(|c| !c.read)
        .take(amount - 1)
        .cloned()
        .collect()
}

/// Index of the chapter to delete after completing `completed_index`
pub fn delete_after_read_target(completed_index: usize, slots: i32, len: usize) -> Option<usize> {
    if slots < 0 {
        return None;
    }
    let target = completed_index.checked_sub(slots as usize)?;
    (target < len).then_some(target)
}

/// Manga in an excluded category keep their downloads
pub fn is_deletion_excluded(manga_categories: &[i64], excluded: &[i64]) -> bool {
    if excluded.is_empty() {
        return false;
    }
    if manga_categories.is_empty() {
        return excluded.contains(&DEFAULT_CATEGORY);
    }
    manga_categories.iter().any(|c| excluded.contains(c))
}
