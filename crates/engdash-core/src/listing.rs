use std::collections::HashSet;
use std::ops::Range;

use ratatui::widgets::ListState;

use crate::option_tree::TreeOption;

/// Case-insensitive search used by list pages: the query may hit the
/// name, the subtitle, or the name of any descendant.
pub fn item_matches<T: TreeOption>(item: &T, subtitle: Option<&str>, query: &str) -> bool {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return true;
    }
    if item.label().to_lowercase().contains(&needle) {
        return true;
    }
    if subtitle.is_some_and(|s| s.to_lowercase().contains(&needle)) {
        return true;
    }
    let mut seen = HashSet::new();
    seen.insert(item.key());
    let mut stack: Vec<&T> = item.children().iter().collect();
    while let Some(child) = stack.pop() {
        if !seen.insert(child.key()) {
            continue;
        }
        if child.label().to_lowercase().contains(&needle) {
            return true;
        }
        stack.extend(child.children().iter());
    }
    false
}

/// Page-number slicing over a filtered list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    page: usize,
    page_size: usize,
}

impl Pagination {
    pub fn new(page_size: usize) -> Self {
        Self {
            page: 0,
            page_size: page_size.max(1),
        }
    }

    /// Zero-based page index.
    pub fn page(&self) -> usize {
        self.page
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Number of pages for `total` items; an empty list has one page.
    pub fn page_count(&self, total: usize) -> usize {
        total.div_ceil(self.page_size).max(1)
    }

    pub fn range(&self, total: usize) -> Range<usize> {
        let start = (self.page * self.page_size).min(total);
        let end = (start + self.page_size).min(total);
        start..end
    }

    pub fn next(&mut self, total: usize) -> bool {
        if self.page + 1 < self.page_count(total) {
            self.page += 1;
            true
        } else {
            false
        }
    }

    pub fn prev(&mut self) -> bool {
        if self.page > 0 {
            self.page -= 1;
            true
        } else {
            false
        }
    }

    pub fn clamp(&mut self, total: usize) {
        let last = self.page_count(total) - 1;
        if self.page > last {
            self.page = last;
        }
    }

    pub fn reset(&mut self) {
        self.page = 0;
    }
}

/// Filter + pagination + cursor state of a flat list page.
#[derive(Debug, Clone)]
pub struct FlatListing {
    /// Indices into the source items that pass the search.
    pub filtered: Vec<usize>,
    pub pagination: Pagination,
    /// Cursor within the current page.
    pub list_state: ListState,
}

impl FlatListing {
    pub fn new(page_size: usize) -> Self {
        Self {
            filtered: Vec::new(),
            pagination: Pagination::new(page_size),
            list_state: ListState::default(),
        }
    }

    /// Recompute the filtered indices for `items`.
    pub fn apply_filter<T, F>(&mut self, items: &[T], query: &str, subtitle: F)
    where
        T: TreeOption,
        F: Fn(&T) -> Option<String>,
    {
        self.filtered = items
            .iter()
            .enumerate()
            .filter(|(_, item)| item_matches(*item, subtitle(*item).as_deref(), query))
            .map(|(i, _)| i)
            .collect();
        self.pagination.clamp(self.filtered.len());
        self.clamp_cursor();
    }

    /// Source indices shown on the current page.
    pub fn page_indices(&self) -> &[usize] {
        &self.filtered[self.pagination.range(self.filtered.len())]
    }

    /// Source index under the cursor.
    pub fn selected_index(&self) -> Option<usize> {
        let sel = self.list_state.selected()?;
        self.page_indices().get(sel).copied()
    }

    pub fn move_down(&mut self, n: usize) {
        let len = self.page_indices().len();
        if len > 0 {
            let sel = self.list_state.selected().unwrap_or(0);
            self.list_state.select(Some((sel + n).min(len - 1)));
        }
    }

    pub fn move_up(&mut self, n: usize) {
        if !self.page_indices().is_empty() {
            let sel = self.list_state.selected().unwrap_or(0);
            self.list_state.select(Some(sel.saturating_sub(n)));
        }
    }

    pub fn goto_top(&mut self) {
        if !self.page_indices().is_empty() {
            self.list_state.select(Some(0));
        }
    }

    pub fn goto_bottom(&mut self) {
        let len = self.page_indices().len();
        if len > 0 {
            self.list_state.select(Some(len - 1));
        }
    }

    pub fn next_page(&mut self) {
        if self.pagination.next(self.filtered.len()) {
            self.list_state.select(Some(0));
        }
    }

    pub fn prev_page(&mut self) {
        if self.pagination.prev() {
            self.list_state.select(Some(0));
        }
    }

    fn clamp_cursor(&mut self) {
        let len = self.page_indices().len();
        if len == 0 {
            self.list_state.select(None);
        } else {
            let sel = self.list_state.selected().unwrap_or(0);
            self.list_state.select(Some(sel.min(len - 1)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::option_tree::tests::{TestNode, node};

    fn teams() -> Vec<TestNode> {
        vec![
            node(1, "Platform", vec![node(10, "Observability", vec![])]),
            node(2, "Payments", vec![]),
            node(3, "Mobile", vec![]),
        ]
    }

    #[test]
    fn test_item_matches_name_subtitle_and_children() {
        let items = teams();
        assert!(item_matches(&items[0], None, "PLAT"));
        assert!(item_matches(&items[0], None, "observ"));
        assert!(item_matches(&items[1], Some("card processing"), "card"));
        assert!(!item_matches(&items[2], Some("iOS and Android"), "web"));
        assert!(item_matches(&items[2], None, "   "));
    }

    #[test]
    fn test_pagination_ranges() {
        let mut p = Pagination::new(2);
        assert_eq!(p.page_count(0), 1);
        assert_eq!(p.page_count(5), 3);
        assert_eq!(p.range(5), 0..2);
        assert!(p.next(5));
        assert!(p.next(5));
        assert_eq!(p.range(5), 4..5);
        assert!(!p.next(5));

        p.clamp(3);
        assert_eq!(p.page(), 1);
        assert!(p.prev());
        assert!(!p.prev());
        assert_eq!(Pagination::new(0).page_size(), 1);
    }

    #[test]
    fn test_flat_listing_filter_and_cursor() {
        let items = teams();
        let mut listing = FlatListing::new(2);
        listing.apply_filter(&items, "", |_| None);
        assert_eq!(listing.filtered, vec![0, 1, 2]);
        assert_eq!(listing.page_indices(), &[0, 1]);
        assert_eq!(listing.selected_index(), Some(0));

        listing.move_down(5);
        assert_eq!(listing.selected_index(), Some(1));
        listing.next_page();
        assert_eq!(listing.page_indices(), &[2]);
        assert_eq!(listing.selected_index(), Some(2));

        listing.apply_filter(&items, "pay", |_| None);
        assert_eq!(listing.pagination.page(), 0);
        assert_eq!(listing.selected_index(), Some(1));

        listing.apply_filter(&items, "zzz", |_| None);
        assert!(listing.page_indices().is_empty());
        assert_eq!(listing.selected_index(), None);
    }
}
