use std::collections::{HashMap, HashSet};

use ratatui::{
    Frame,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::Paragraph,
};
use tracing::debug;
use unicode_width::UnicodeWidthStr;

// ── TreeOption trait ─────────────────────────────────────────────────

/// Trait that any entity must implement to be shown in an [`OptionTree`].
///
/// `children` returns the same-typed children in source order; leaves
/// (and entities whose children were never loaded) return an empty slice.
pub trait TreeOption: Clone {
    /// Stable identifier, unique within one forest.
    fn key(&self) -> String;
    fn label(&self) -> &str;
    fn children(&self) -> &[Self];
}

// ── VisibleRow ───────────────────────────────────────────────────────

/// One visible line of a rendered forest: a node and its nesting depth.
#[derive(Debug, Clone)]
pub struct VisibleRow<'a, T> {
    pub node: &'a T,
    pub key: String,
    /// Nesting depth, root = 0.
    pub depth: usize,
    pub has_children: bool,
    /// Whether the row's children are shown (forced while searching).
    pub expanded: bool,
    /// Whether the row's own label contains the query.
    pub matched: bool,
}

/// Why a tree has nothing to show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmptyState {
    /// The source forest itself is empty.
    NoSource,
    /// The forest has nodes but the query matched none of them.
    NoMatches,
}

// ── Filtering ────────────────────────────────────────────────────────

/// Case-insensitive substring match. `needle` must already be lowercased.
pub fn label_matches(label: &str, needle: &str) -> bool {
    needle.is_empty() || label.to_lowercase().contains(needle)
}

/// Compute, for every reachable node key, whether the node is included
/// under `query`: its own label matches, or any descendant is included.
///
/// Iterative post-order walk. Nodes listed in `excluded` are dropped
/// together with their subtrees, and a child whose key already appears
/// on the current path is skipped so a malformed (cyclic) forest
/// terminates.
pub fn match_index<T: TreeOption>(
    forest: &[T],
    query: &str,
    excluded: &HashSet<String>,
) -> HashMap<String, bool> {
    let needle = query.to_lowercase();
    match_index_by(forest, excluded, |node: &T| label_matches(node.label(), &needle))
}

/// [`match_index`] with a caller-supplied hit test in place of the
/// label match.
pub fn match_index_by<T: TreeOption>(
    forest: &[T],
    excluded: &HashSet<String>,
    is_hit: impl Fn(&T) -> bool,
) -> HashMap<String, bool> {
    struct Frame<'a, T> {
        node: &'a T,
        key: String,
        next_child: usize,
        included: bool,
    }

    let mut memo: HashMap<String, bool> = HashMap::new();

    for root in forest {
        let root_key = root.key();
        if excluded.contains(&root_key) || memo.contains_key(&root_key) {
            continue;
        }
        let mut stack = vec![Frame {
            node: root,
            included: is_hit(root),
            key: root_key,
            next_child: 0,
        }];

        loop {
            let Some(top) = stack.last_mut() else { break };
            let node = top.node;
            let children = node.children();

            if top.next_child < children.len() {
                let child = &children[top.next_child];
                top.next_child += 1;

                let child_key = child.key();
                if excluded.contains(&child_key) {
                    continue;
                }
                if let Some(&included) = memo.get(&child_key) {
                    if included {
                        top.included = true;
                    }
                    continue;
                }
                if stack.iter().any(|f| f.key == child_key) {
                    debug!(key = %child_key, "cycle in option forest, skipping child");
                    continue;
                }
                stack.push(Frame {
                    node: child,
                    included: is_hit(child),
                    key: child_key,
                    next_child: 0,
                });
            } else {
                let Some(done) = stack.pop() else { break };
                if done.included {
                    if let Some(parent) = stack.last_mut() {
                        parent.included = true;
                    }
                }
                memo.insert(done.key, done.included);
            }
        }
    }

    memo
}

/// Flatten a forest into visible rows.
///
/// With an empty query every node whose ancestors are all in `expanded`
/// is shown in pre-order. With a non-empty query only included nodes
/// (see [`match_index`]) are shown and every branch is treated as
/// expanded. Children keep their source order.
pub fn visible_rows<'a, T: TreeOption>(
    forest: &'a [T],
    query: &str,
    expanded: &HashSet<String>,
) -> Vec<VisibleRow<'a, T>> {
    visible_rows_excluding(forest, query, expanded, &HashSet::new())
}

/// [`visible_rows`] with a set of keys whose subtrees are hidden entirely.
pub fn visible_rows_excluding<'a, T: TreeOption>(
    forest: &'a [T],
    query: &str,
    expanded: &HashSet<String>,
    excluded: &HashSet<String>,
) -> Vec<VisibleRow<'a, T>> {
    let needle = query.to_lowercase();
    let is_hit = |node: &T| label_matches(node.label(), &needle);
    visible_rows_by(forest, !query.is_empty(), expanded, excluded, is_hit)
}

/// Visible rows where, while `searching`, `is_hit` decides which nodes
/// match. Ancestors of a hit stay visible and every branch is expanded.
pub fn visible_rows_by<'a, T: TreeOption>(
    forest: &'a [T],
    searching: bool,
    expanded: &HashSet<String>,
    excluded: &HashSet<String>,
    is_hit: impl Fn(&T) -> bool,
) -> Vec<VisibleRow<'a, T>> {
    let index = searching.then(|| match_index_by(forest, excluded, &is_hit));

    let mut rows = Vec::new();
    let mut stack: Vec<(&'a T, usize)> = forest.iter().rev().map(|n| (n, 0)).collect();
    // Keys of the ancestors of the node being visited, indexed by depth.
    let mut path: Vec<String> = Vec::new();

    while let Some((node, depth)) = stack.pop() {
        let key = node.key();
        if excluded.contains(&key) {
            continue;
        }
        if let Some(index) = &index {
            if !index.get(&key).copied().unwrap_or(false) {
                continue;
            }
        }
        path.truncate(depth);
        if path.contains(&key) {
            debug!(key = %key, "cycle in option forest, skipping row");
            continue;
        }

        let children = node.children();
        let has_children = !children.is_empty();
        let is_expanded = has_children && (searching || expanded.contains(&key));

        rows.push(VisibleRow {
            node,
            key: key.clone(),
            depth,
            has_children,
            expanded: is_expanded,
            matched: searching && is_hit(node),
        });
        path.push(key);

        if is_expanded {
            for child in children.iter().rev() {
                stack.push((child, depth + 1));
            }
        }
    }

    rows
}

/// Keys of every node that has children, at any depth.
pub fn branch_keys<T: TreeOption>(forest: &[T]) -> HashSet<String> {
    let mut keys = HashSet::new();
    let mut stack: Vec<&T> = forest.iter().collect();
    while let Some(node) = stack.pop() {
        let children = node.children();
        if !children.is_empty() && keys.insert(node.key()) {
            stack.extend(children.iter());
        }
    }
    keys
}

/// Find a node anywhere in the forest by key.
pub fn find_node<'a, T: TreeOption>(forest: &'a [T], key: &str) -> Option<&'a T> {
    let mut stack: Vec<&T> = forest.iter().collect();
    let mut seen = HashSet::new();
    while let Some(node) = stack.pop() {
        let node_key = node.key();
        if node_key == key {
            return Some(node);
        }
        if seen.insert(node_key) {
            stack.extend(node.children().iter());
        }
    }
    None
}

/// Keys of a node and all its descendants.
pub fn subtree_keys<T: TreeOption>(node: &T) -> HashSet<String> {
    let mut keys = HashSet::new();
    let mut stack = vec![node];
    while let Some(current) = stack.pop() {
        if keys.insert(current.key()) {
            stack.extend(current.children().iter());
        }
    }
    keys
}

// ── OptionTree ───────────────────────────────────────────────────────

/// Searchable, expandable, single-select view over a forest.
///
/// Owns the forest snapshot, the expanded key set, the query, the
/// selection and a cursor over the visible rows. All state is local:
/// nothing here writes back to the entity store.
#[derive(Debug, Clone)]
pub struct OptionTree<T: TreeOption> {
    forest: Vec<T>,
    expanded: HashSet<String>,
    excluded: HashSet<String>,
    query: String,
    /// Keys that match the query when the caller decides matching.
    hits: Option<HashSet<String>>,
    selection: Option<T>,
    cursor: usize,
    expand_all: bool,
    mounted: bool,
}

impl<T: TreeOption> Default for OptionTree<T> {
    fn default() -> Self {
        Self::new(false)
    }
}

impl<T: TreeOption> OptionTree<T> {
    /// `expand_all` expands every branch the first time a non-empty
    /// forest is loaded.
    pub fn new(expand_all: bool) -> Self {
        Self {
            forest: Vec::new(),
            expanded: HashSet::new(),
            excluded: HashSet::new(),
            query: String::new(),
            hits: None,
            selection: None,
            cursor: 0,
            expand_all,
            mounted: false,
        }
    }

    /// Replace the forest (e.g. when a fetch completes).
    pub fn set_forest(&mut self, forest: Vec<T>) {
        self.forest = forest;
        if !self.mounted && !self.forest.is_empty() {
            self.mounted = true;
            if self.expand_all {
                self.expanded = branch_keys(&self.forest);
            }
        }
        if !self.query.is_empty() {
            self.apply_search_expansion();
        }
        self.clamp_cursor();
    }

    pub fn forest(&self) -> &[T] {
        &self.forest
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    /// Update the search text.
    ///
    /// A non-empty query replaces the expanded set with every branch
    /// that is part of a match. Clearing the query keeps that set: the
    /// previous manual expansion is not restored.
    pub fn set_query(&mut self, query: impl Into<String>) {
        self.hits = None;
        self.update_query(query.into());
    }

    /// Like [`set_query`](Self::set_query), but the nodes whose keys are
    /// in `hits` are the matches instead of label matches. Ancestors of
    /// a hit stay visible.
    pub fn set_query_matching(&mut self, query: impl Into<String>, hits: HashSet<String>) {
        self.hits = Some(hits);
        self.update_query(query.into());
    }

    fn update_query(&mut self, query: String) {
        self.query = query;
        if !self.query.is_empty() {
            self.apply_search_expansion();
        }
        self.cursor = 0;
    }

    pub fn clear_query(&mut self) {
        self.set_query(String::new());
    }

    fn apply_search_expansion(&mut self) {
        let keys: HashSet<String> = self
            .rows()
            .into_iter()
            .filter(|row| row.has_children)
            .map(|row| row.key)
            .collect();
        self.expanded = keys;
    }

    /// Hide these keys (and their subtrees) from the rows.
    pub fn set_excluded(&mut self, excluded: HashSet<String>) {
        self.excluded = excluded;
        self.clamp_cursor();
    }

    pub fn expanded(&self) -> &HashSet<String> {
        &self.expanded
    }

    pub fn is_expanded(&self, key: &str) -> bool {
        self.expanded.contains(key)
    }

    /// Flip the expansion of `key`. No-op for unknown nodes and leaves.
    /// Returns whether the expanded set changed.
    pub fn toggle_expand(&mut self, key: &str) -> bool {
        let has_children = find_node(&self.forest, key)
            .map(|n| !n.children().is_empty())
            .unwrap_or(false);
        if !has_children {
            return false;
        }
        if !self.expanded.remove(key) {
            self.expanded.insert(key.to_string());
        }
        self.clamp_cursor();
        true
    }

    pub fn expand_all(&mut self) {
        self.expanded = branch_keys(&self.forest);
    }

    pub fn collapse_all(&mut self) {
        self.expanded.clear();
        self.clamp_cursor();
    }

    pub fn select(&mut self, node: T) {
        self.selection = Some(node);
    }

    pub fn clear_selection(&mut self) {
        self.selection = None;
    }

    pub fn selection(&self) -> Option<&T> {
        self.selection.as_ref()
    }

    /// Selection equality is by key, not identity.
    pub fn is_selected(&self, node: &T) -> bool {
        self.is_selected_key(&node.key())
    }

    pub fn is_selected_key(&self, key: &str) -> bool {
        self.selection.as_ref().is_some_and(|s| s.key() == key)
    }

    /// The rows visible under the current query and expansion.
    pub fn rows(&self) -> Vec<VisibleRow<'_, T>> {
        match &self.hits {
            Some(hits) if !self.query.is_empty() => visible_rows_by(
                &self.forest,
                true,
                &self.expanded,
                &self.excluded,
                |node: &T| hits.contains(&node.key()),
            ),
            _ => visible_rows_excluding(&self.forest, &self.query, &self.expanded, &self.excluded),
        }
    }

    /// `Some` when there is nothing to show, telling apart an empty
    /// source from a query that matched nothing.
    pub fn empty_state(&self) -> Option<EmptyState> {
        if !self.rows().is_empty() {
            None
        } else if self.forest.is_empty() {
            Some(EmptyState::NoSource)
        } else {
            Some(EmptyState::NoMatches)
        }
    }

    // ── Cursor ───────────────────────────────────────────────────────

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn cursor_row(&self) -> Option<VisibleRow<'_, T>> {
        self.rows().into_iter().nth(self.cursor)
    }

    pub fn cursor_node(&self) -> Option<T> {
        self.cursor_row().map(|row| row.node.clone())
    }

    pub fn move_down(&mut self, n: usize) {
        let len = self.rows().len();
        if len > 0 {
            self.cursor = (self.cursor + n).min(len - 1);
        }
    }

    pub fn move_up(&mut self, n: usize) {
        self.cursor = self.cursor.saturating_sub(n);
    }

    pub fn goto_top(&mut self) {
        self.cursor = 0;
    }

    pub fn goto_bottom(&mut self) {
        self.cursor = self.rows().len().saturating_sub(1);
    }

    /// Place the cursor on `key` if it is visible.
    pub fn focus_key(&mut self, key: &str) -> bool {
        match self.rows().iter().position(|row| row.key == key) {
            Some(pos) => {
                self.cursor = pos;
                true
            }
            None => false,
        }
    }

    pub fn toggle_cursor(&mut self) -> bool {
        match self.cursor_row().map(|row| row.key) {
            Some(key) => self.toggle_expand(&key),
            None => false,
        }
    }

    /// Expand the branch under the cursor.
    pub fn expand_cursor(&mut self) -> bool {
        let Some(row) = self.cursor_row() else {
            return false;
        };
        if row.has_children && !row.expanded {
            let key = row.key;
            self.toggle_expand(&key)
        } else {
            false
        }
    }

    /// Collapse the branch under the cursor, or move to its parent row.
    pub fn collapse_cursor_or_parent(&mut self) {
        let rows = self.rows();
        let Some(row) = rows.get(self.cursor) else {
            return;
        };
        if row.has_children && self.expanded.contains(&row.key) {
            let key = row.key.clone();
            drop(rows);
            self.toggle_expand(&key);
            return;
        }
        let depth = row.depth;
        if depth == 0 {
            return;
        }
        if let Some(parent_pos) = rows[..self.cursor].iter().rposition(|r| r.depth < depth) {
            self.cursor = parent_pos;
        }
    }

    fn clamp_cursor(&mut self) {
        let len = self.rows().len();
        if self.cursor >= len {
            self.cursor = len.saturating_sub(1);
        }
    }
}

// ── Rendering ────────────────────────────────────────────────────────

const GUIDE_STYLE: Style = Style::new().fg(Color::DarkGray);
const CURSOR_BG: Color = Color::Gray;
pub const NO_OPTIONS: &str = "No options";

/// Configuration for rendering an option tree.
pub struct OptionTreeRenderConfig<'a> {
    pub focused: bool,
    /// Icon for leaves. Defaults to "● ".
    pub leaf_icon: Option<&'a str>,
    /// Optional secondary text per row (dimmed, after the label).
    pub subtitle: Option<&'a dyn Fn(&str) -> Option<String>>,
}

impl Default for OptionTreeRenderConfig<'_> {
    fn default() -> Self {
        Self {
            focused: true,
            leaf_icon: None,
            subtitle: None,
        }
    }
}

/// Render the visible rows of `tree` into `area`, scrolled to keep the
/// cursor visible.
pub fn render_option_tree<T: TreeOption>(
    frame: &mut Frame,
    area: Rect,
    tree: &OptionTree<T>,
    config: &OptionTreeRenderConfig<'_>,
) {
    if area.height == 0 || area.width == 0 {
        return;
    }

    let rows = tree.rows();
    if rows.is_empty() {
        let empty = Paragraph::new(format!("  {NO_OPTIONS}"))
            .style(Style::default().fg(Color::DarkGray));
        frame.render_widget(empty, area);
        return;
    }

    let visible_lines = area.height as usize;
    let scroll_offset = if tree.cursor() >= visible_lines {
        tree.cursor() - visible_lines + 1
    } else {
        0
    };

    let lines: Vec<Line> = rows
        .iter()
        .enumerate()
        .skip(scroll_offset)
        .take(visible_lines)
        .map(|(idx, row)| render_row(row, idx == tree.cursor(), tree, area.width, config))
        .collect();

    frame.render_widget(Paragraph::new(lines), area);
}

fn render_row<T: TreeOption>(
    row: &VisibleRow<'_, T>,
    on_cursor: bool,
    tree: &OptionTree<T>,
    width: u16,
    config: &OptionTreeRenderConfig<'_>,
) -> Line<'static> {
    let selected = tree.is_selected_key(&row.key);
    let highlight = on_cursor && config.focused;

    let mut base_style = if row.has_children {
        Style::default().fg(Color::Blue)
    } else {
        Style::default().fg(Color::White)
    };
    if row.matched {
        base_style = base_style.add_modifier(Modifier::BOLD);
    }
    if selected {
        base_style = base_style.fg(Color::Green);
    }
    if highlight {
        base_style = base_style.bg(CURSOR_BG).fg(Color::Black);
    }

    let mut spans: Vec<Span<'static>> = Vec::new();
    for _ in 0..row.depth {
        let guide = if highlight {
            GUIDE_STYLE.bg(CURSOR_BG)
        } else {
            GUIDE_STYLE
        };
        spans.push(Span::styled("\u{2502} ", guide));
    }

    let icon = if row.has_children {
        if row.expanded { "\u{25BC} " } else { "\u{25B6} " }
    } else {
        config.leaf_icon.unwrap_or("\u{25CF} ")
    };
    spans.push(Span::styled(icon.to_string(), base_style));
    spans.push(Span::styled(row.node.label().to_string(), base_style));
    if selected {
        spans.push(Span::styled(" \u{2713}".to_string(), base_style));
    }
    if let Some(subtitle) = config.subtitle.and_then(|f| f(&row.key)) {
        let mut dim = Style::default().fg(Color::DarkGray);
        if highlight {
            dim = dim.bg(CURSOR_BG);
        }
        spans.push(Span::styled(format!("  {subtitle}"), dim));
    }

    if highlight {
        let used: usize = spans.iter().map(|s| s.content.width()).sum();
        let remaining = (width as usize).saturating_sub(used);
        if remaining > 0 {
            spans.push(Span::styled(" ".repeat(remaining), Style::default().bg(CURSOR_BG)));
        }
    }

    Line::from(spans)
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Debug, Clone, PartialEq)]
    pub(crate) struct TestNode {
        pub id: u32,
        pub name: String,
        pub children: Vec<TestNode>,
    }

    impl TreeOption for TestNode {
        fn key(&self) -> String {
            self.id.to_string()
        }
        fn label(&self) -> &str {
            &self.name
        }
        fn children(&self) -> &[Self] {
            &self.children
        }
    }

    pub(crate) fn node(id: u32, name: &str, children: Vec<TestNode>) -> TestNode {
        TestNode {
            id,
            name: name.to_string(),
            children,
        }
    }

    /// Eng > Backend > API
    fn eng_forest() -> Vec<TestNode> {
        vec![node(
            1,
            "Eng",
            vec![node(2, "Backend", vec![node(3, "API", vec![])])],
        )]
    }

    fn labels_and_depths(rows: &[VisibleRow<'_, TestNode>]) -> Vec<(String, usize)> {
        rows.iter()
            .map(|r| (r.node.name.clone(), r.depth))
            .collect()
    }

    #[test]
    fn test_search_reveals_nested_match() {
        let forest = eng_forest();
        let rows = visible_rows(&forest, "API", &HashSet::new());
        assert_eq!(
            labels_and_depths(&rows),
            vec![
                ("Eng".to_string(), 0),
                ("Backend".to_string(), 1),
                ("API".to_string(), 2)
            ]
        );
        assert!(rows[0].expanded && rows[1].expanded);
        assert!(!rows[0].matched);
        assert!(rows[2].matched);
    }

    #[test]
    fn test_empty_query_collapsed() {
        let forest = eng_forest();
        let rows = visible_rows(&forest, "", &HashSet::new());
        assert_eq!(labels_and_depths(&rows), vec![("Eng".to_string(), 0)]);
    }

    #[test]
    fn test_toggle_then_empty_query() {
        let mut tree = OptionTree::new(false);
        tree.set_forest(eng_forest());
        assert!(tree.toggle_expand("1"));
        tree.set_query("");
        assert_eq!(
            labels_and_depths(&tree.rows()),
            vec![("Eng".to_string(), 0), ("Backend".to_string(), 1)]
        );
    }

    #[test]
    fn test_toggle_leaf_is_noop() {
        let mut tree = OptionTree::new(false);
        tree.set_forest(eng_forest());
        tree.expand_all();
        let before = tree.expanded().clone();
        assert!(!tree.toggle_expand("3"));
        assert!(!tree.toggle_expand("missing"));
        assert_eq!(tree.expanded(), &before);
    }

    #[test]
    fn test_non_matching_leaves_are_dropped() {
        let forest = vec![
            node(1, "Platform", vec![node(2, "Infra", vec![]), node(3, "Billing API", vec![])]),
            node(4, "Design", vec![]),
        ];
        let rows = visible_rows(&forest, "api", &HashSet::new());
        assert_eq!(
            labels_and_depths(&rows),
            vec![("Platform".to_string(), 0), ("Billing API".to_string(), 1)]
        );
    }

    #[test]
    fn test_matching_parent_does_not_pull_in_unmatched_children() {
        let forest = vec![node(1, "Growth", vec![node(2, "Ads", vec![])])];
        let rows = visible_rows(&forest, "grow", &HashSet::new());
        assert_eq!(labels_and_depths(&rows), vec![("Growth".to_string(), 0)]);
    }

    #[test]
    fn test_source_order_is_preserved() {
        let forest = vec![
            node(1, "zeta", vec![]),
            node(2, "alpha", vec![node(3, "omega", vec![]), node(4, "beta", vec![])]),
        ];
        let mut expanded = HashSet::new();
        expanded.insert("2".to_string());
        let rows = visible_rows(&forest, "", &expanded);
        let names: Vec<&str> = rows.iter().map(|r| r.node.name.as_str()).collect();
        assert_eq!(names, vec!["zeta", "alpha", "omega", "beta"]);
    }

    #[test]
    fn test_search_overwrites_manual_expansion() {
        let forest = vec![
            node(1, "Eng", vec![node(2, "Backend", vec![node(3, "API", vec![])])]),
            node(4, "Sales", vec![node(5, "EMEA", vec![])]),
        ];
        let mut tree = OptionTree::new(false);
        tree.set_forest(forest);
        tree.toggle_expand("4");
        assert!(tree.is_expanded("4"));

        tree.set_query("api");
        let expected: HashSet<String> = ["1", "2"].iter().map(|s| s.to_string()).collect();
        assert_eq!(tree.expanded(), &expected);

        // Clearing the query keeps the search expansion, not the manual one.
        tree.clear_query();
        assert!(!tree.is_expanded("4"));
        assert!(tree.is_expanded("1"));
        assert_eq!(tree.rows().len(), 4);
    }

    #[test]
    fn test_expand_all_on_first_load() {
        let mut tree = OptionTree::new(true);
        tree.set_forest(Vec::new());
        assert!(tree.expanded().is_empty());
        tree.set_forest(eng_forest());
        assert_eq!(tree.rows().len(), 3);

        // Later reloads keep the user's state.
        tree.collapse_all();
        tree.set_forest(eng_forest());
        assert_eq!(tree.rows().len(), 1);
    }

    #[test]
    fn test_selection_equality_by_key() {
        let mut tree = OptionTree::new(false);
        tree.set_forest(eng_forest());
        tree.select(node(2, "Backend", vec![]));

        let renamed = vec![node(1, "Eng", vec![node(2, "Server side", vec![])])];
        tree.set_forest(renamed);
        let other_instance = node(2, "Server side", vec![node(9, "x", vec![])]);
        assert!(tree.is_selected(&other_instance));
        assert!(!tree.is_selected(&node(1, "Eng", vec![])));

        tree.clear_selection();
        assert!(!tree.is_selected(&other_instance));
        assert!(tree.selection().is_none());
    }

    #[test]
    fn test_empty_states_are_distinguishable() {
        let mut tree: OptionTree<TestNode> = OptionTree::new(false);
        assert_eq!(tree.empty_state(), Some(EmptyState::NoSource));

        tree.set_forest(eng_forest());
        assert_eq!(tree.empty_state(), None);

        tree.set_query("nothing like this");
        assert!(tree.rows().is_empty());
        assert_eq!(tree.empty_state(), Some(EmptyState::NoMatches));
    }

    #[test]
    fn test_excluded_subtree_is_hidden() {
        let forest = vec![node(
            1,
            "Eng",
            vec![node(2, "Backend", vec![node(3, "API", vec![])]), node(4, "Frontend", vec![])],
        )];
        let expanded = branch_keys(&forest);
        let excluded = subtree_keys(&forest[0].children[0]);
        let rows = visible_rows_excluding(&forest, "", &expanded, &excluded);
        let names: Vec<&str> = rows.iter().map(|r| r.node.name.as_str()).collect();
        assert_eq!(names, vec!["Eng", "Frontend"]);

        // A match inside the excluded subtree does not keep its ancestors.
        let rows = visible_rows_excluding(&forest, "api", &expanded, &excluded);
        assert!(rows.is_empty());
    }

    #[test]
    fn test_cyclic_keys_terminate() {
        // Node 1 lists a child that reuses its own key.
        let forest = vec![node(1, "Loop", vec![node(2, "Mid", vec![node(1, "Loop again", vec![])])])];
        let expanded = branch_keys(&forest);
        let rows = visible_rows(&forest, "", &expanded);
        let names: Vec<&str> = rows.iter().map(|r| r.node.name.as_str()).collect();
        assert_eq!(names, vec!["Loop", "Mid"]);

        let rows = visible_rows(&forest, "loop", &expanded);
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn test_cursor_navigation() {
        let mut tree = OptionTree::new(true);
        tree.set_forest(eng_forest());
        tree.goto_bottom();
        assert_eq!(tree.cursor_row().map(|r| r.key), Some("3".to_string()));

        // Collapse on a leaf moves to the parent row.
        tree.collapse_cursor_or_parent();
        assert_eq!(tree.cursor_row().map(|r| r.key), Some("2".to_string()));

        // Collapse on an expanded branch folds it.
        tree.collapse_cursor_or_parent();
        assert!(!tree.is_expanded("2"));
        assert_eq!(tree.rows().len(), 2);

        assert!(tree.expand_cursor());
        assert_eq!(tree.rows().len(), 3);

        tree.move_down(10);
        assert_eq!(tree.cursor(), 2);
        tree.move_up(1);
        assert_eq!(tree.cursor(), 1);
        assert!(tree.focus_key("1"));
        assert_eq!(tree.cursor(), 0);
    }

    #[test]
    fn test_query_with_caller_hits() {
        let mut tree = OptionTree::new(false);
        tree.set_forest(eng_forest());

        // "latency" is in no label; the caller says Backend matches.
        tree.set_query_matching("latency", HashSet::from(["2".to_string()]));
        let rows = tree.rows();
        assert_eq!(
            labels_and_depths(&rows),
            vec![("Eng".to_string(), 0), ("Backend".to_string(), 1)]
        );
        assert!(rows[1].matched && !rows[0].matched);
        assert!(tree.is_expanded("1"));

        // A plain query goes back to label matching.
        tree.set_query("latency");
        assert_eq!(tree.empty_state(), Some(EmptyState::NoMatches));
    }

    #[test]
    fn test_cursor_clamped_after_collapse() {
        let mut tree = OptionTree::new(true);
        tree.set_forest(eng_forest());
        tree.goto_bottom();
        tree.collapse_all();
        assert_eq!(tree.cursor(), 0);
    }

    // ── Properties ──────────────────────────────────────────────────

    /// Reference predicate: own label matches or any descendant does.
    fn subtree_contains(node: &TestNode, needle: &str) -> bool {
        node.name.to_lowercase().contains(needle)
            || node.children.iter().any(|c| subtree_contains(c, needle))
    }

    /// Reference listing of included nodes with their depth, pre-order.
    fn reference_rows(nodes: &[TestNode], needle: &str, depth: usize, out: &mut Vec<(u32, usize)>) {
        for n in nodes {
            if subtree_contains(n, needle) {
                out.push((n.id, depth));
                reference_rows(&n.children, needle, depth + 1, out);
            }
        }
    }

    fn renumber(nodes: &mut [TestNode], next: &mut u32) {
        for n in nodes {
            n.id = *next;
            *next += 1;
            renumber(&mut n.children, next);
        }
    }

    fn arb_forest() -> impl Strategy<Value = Vec<TestNode>> {
        let leaf = "[abc]{1,3}".prop_map(|name| node(0, &name, vec![]));
        let tree = leaf.prop_recursive(4, 40, 4, |inner| {
            ("[abc]{1,3}", prop::collection::vec(inner, 0..4))
                .prop_map(|(name, children)| node(0, &name, children))
        });
        prop::collection::vec(tree, 0..4).prop_map(|mut forest| {
            let mut next = 1;
            renumber(&mut forest, &mut next);
            forest
        })
    }

    proptest! {
        #[test]
        fn prop_filter_is_sound_and_complete(forest in arb_forest(), query in "[abc]{1,2}") {
            let rows = visible_rows(&forest, &query, &HashSet::new());
            let needle = query.to_lowercase();

            for row in &rows {
                prop_assert!(subtree_contains(row.node, &needle));
            }

            let mut expected = Vec::new();
            reference_rows(&forest, &needle, 0, &mut expected);
            let actual: Vec<(u32, usize)> = rows.iter().map(|r| (r.node.id, r.depth)).collect();
            prop_assert_eq!(actual, expected);
        }

        #[test]
        fn prop_double_toggle_is_identity(forest in arb_forest(), pick in 0usize..64) {
            let mut tree = OptionTree::new(false);
            tree.set_forest(forest.clone());
            let keys: Vec<String> = {
                let mut k: Vec<String> = branch_keys(&forest).into_iter().collect();
                k.sort();
                k
            };
            for key in keys.iter().step_by(2) {
                tree.toggle_expand(key);
            }
            let before: Vec<String> = tree.rows().into_iter().map(|r| r.key).collect();
            if !keys.is_empty() {
                let key = &keys[pick % keys.len()];
                tree.toggle_expand(key);
                tree.toggle_expand(key);
            }
            let after: Vec<String> = tree.rows().into_iter().map(|r| r.key).collect();
            prop_assert_eq!(before, after);
        }
    }
}
