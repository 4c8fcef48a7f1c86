//! Double-page layout: shift parity and spread pairing

use crate::model::Page;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// How pages are laid out on screen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PageLayout {
    #[default]
    #[serde(rename = "single")]
    Single,
    #[serde(rename = "double")]
    Double,
    /// Wide pages are cut in two and shown one half at a time
    #[serde(rename = "split")]
    Split,
}

/// Whether pairing must be shifted by one so that `index` starts a pair.
///
/// Alone pages take a slot of their own, so each one before `index` flips
/// the parity of everything after it.
pub fn should_shift(pages: &[Arc<Page>], index: usize) -> bool {
    should_shift_flags(pages.iter().map(|p| p.is_alone()), index)
}

/// [`should_shift`] over plain alone flags
pub fn should_shift_flags(alone: impl IntoIterator<Item = bool>, index: usize) -> bool {
    let alone_before = alone.into_iter().take(index).filter(|a| *a).count();
    (index + alone_before) % 2 != 0
}

/// One screen in double-page mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Spread {
    Single(usize),
    Double(usize, usize),
}

impl Spread {
    pub fn first(&self) -> usize {
        match *self {
            Spread::Single(i) | Spread::Double(i, _) => i,
        }
    }

    pub fn contains(&self, index: usize) -> bool {
        match *self {
            Spread::Single(i) => i == index,
            Spread::Double(a, b) => a == index || b == index,
        }
    }
}

fn pairable(page: &Page) -> bool {
    !page.is_alone() && page.first_half().is_none()
}

/// Group pages into screens. Alone pages and split halves stand by
/// themselves; when `shifted`, the first pairable page does too.
pub fn build_spreads(pages: &[Arc<Page>], shifted: bool) -> Vec<Spread> {
    let mut spreads = Vec::with_capacity(pages.len() / 2 + 1);
    let mut pending_shift = shifted;
    let mut i = 0;

    while i < pages.len() {
        if !pairable(&pages[i]) {
            spreads.push(Spread::Single(i));
            i += 1;
            continue;
        }
        if pending_shift {
            pending_shift = false;
            spreads.push(Spread::Single(i));
            i += 1;
            continue;
        }
        match pages.get(i + 1) {
            Some(next) if pairable(next) => {
                spreads.push(Spread::Double(i, i + 1));
                i += 2;
            }
            _ => {
                spreads.push(Spread::Single(i));
                i += 1;
            }
        }
    }

    spreads
}

/// Double-page settings of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DoublePageState {
    pub layout: PageLayout,
    /// Set by the user; wins over the computed shift until reset
    pub manual_shift: Option<bool>,
    /// Shift currently applied
    pub shifted: bool,
}

impl DoublePageState {
    pub fn new(layout: PageLayout) -> Self {
        Self {
            layout,
            manual_shift: None,
            shifted: false,
        }
    }

    pub fn is_double(&self) -> bool {
        self.layout == PageLayout::Double
    }

    /// Recompute the applied shift for pages starting at `index`
    pub fn recompute(&mut self, pages: Option<&[Arc<Page>]>, index: usize) {
        self.shifted = if !self.is_double() {
            false
        } else if let Some(manual) = self.manual_shift {
            manual
        } else {
            pages.map(|p| should_shift(p, index)).unwrap_or(false)
        };
    }

    pub fn toggle_shift(&mut self) {
        self.manual_shift = Some(!self.shifted);
        self.shifted = !self.shifted;
    }

    pub fn reset_shift(&mut self, pages: Option<&[Arc<Page>]>, index: usize) {
        self.manual_shift = None;
        self.recompute(pages, index);
    }

    pub fn set_layout(&mut self, layout: PageLayout, pages: Option<&[Arc<Page>]>, index: usize) {
        self.layout = layout;
        self.recompute(pages, index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ChapterId;

    fn pages(alone: &[bool]) -> Vec<Arc<Page>> {
        alone
            .iter()
            .enumerate()
            .map(|(i, a)| {
                let page = Page::new(ChapterId(1), i, format!("{}.png", i));
                page.set_alone(*a);
                Arc::new(page)
            })
            .collect()
    }

    #[test]
    fn test_shift_with_alone_cover() {
        let pages = pages(&[true, false, false, false]);
        assert!(should_shift(&pages, 2));
        assert!(!should_shift(&pages, 1));
        assert!(!should_shift(&pages, 3));
    }

    #[test]
    fn test_shift_without_alone_pages_is_index_parity() {
        let pages = pages(&[false; 8]);
        for i in 0..8 {
            assert_eq!(should_shift(&pages, i), i % 2 != 0, "index {}", i);
        }
    }

    #[test]
    fn test_shift_ignores_pages_after_index() {
        assert!(!should_shift_flags([false, false, true, true], 2));
        assert!(should_shift_flags([false, true, true, true], 2));
        assert!(!should_shift_flags([true, true, true], 1));
    }

    #[test]
    fn test_spreads_plain() {
        let pages = pages(&[false; 5]);
        assert_eq!(
            build_spreads(&pages, false),
            vec![Spread::Double(0, 1), Spread::Double(2, 3), Spread::Single(4)]
        );
        assert_eq!(
            build_spreads(&pages, true),
            vec![Spread::Single(0), Spread::Double(1, 2), Spread::Double(3, 4)]
        );
    }

    #[test]
    fn test_spreads_agree_with_shift() {
        let pages = pages(&[true, false, false, false]);
        let shifted = should_shift(&pages, 2);
        let spreads = build_spreads(&pages, shifted);
        assert_eq!(
            spreads,
            vec![Spread::Single(0), Spread::Single(1), Spread::Double(2, 3)]
        );
        assert!(spreads.iter().any(|s| s.first() == 2 && s.contains(3)));
    }

    #[test]
    fn test_split_halves_stand_alone() {
        let pages = pages(&[false, false, false]);
        pages[1].set_first_half(Some(true));
        assert_eq!(
            build_spreads(&pages, false),
            vec![Spread::Single(0), Spread::Single(1), Spread::Single(2)]
        );
    }

    #[test]
    fn test_manual_shift_overrides_until_reset() {
        let pages = pages(&[false; 4]);
        let mut state = DoublePageState::new(PageLayout::Double);
        state.recompute(Some(&pages[..]), 1);
        assert!(state.shifted);

        state.toggle_shift();
        assert!(!state.shifted);
        state.recompute(Some(&pages[..]), 1);
        assert!(!state.shifted, "manual shift survives recompute");

        state.reset_shift(Some(&pages[..]), 1);
        assert_eq!(state.manual_shift, None);
        assert!(state.shifted);
    }

    #[test]
    fn test_single_layout_never_shifts() {
        let pages = pages(&[false; 4]);
        let mut state = DoublePageState::new(PageLayout::Double);
        state.recompute(Some(&pages[..]), 3);
        assert!(state.shifted);

        state.set_layout(PageLayout::Single, Some(&pages[..]), 3);
        assert!(!state.shifted);
        state.set_layout(PageLayout::Split, Some(&pages[..]), 3);
        assert!(!state.shifted);
    }
}
