use engdash_api::Entity;
use engdash_core::keybinds::TextInput;
use engdash_core::listing::{FlatListing, item_matches};
use engdash_core::option_tree::{OptionTree, TreeOption, find_node};

use crate::forest::{build_forest, flatten};
use crate::kind::EntityKind;

/// Flat kinds page through a filtered list; tree kinds show the
/// expandable, filterable forest.
#[derive(Debug, Clone)]
pub enum ListView {
    Flat(FlatListing),
    Tree(OptionTree<Entity>),
}

/// The list half of an entity page.
#[derive(Debug, Clone)]
pub struct EntityList {
    kind: &'static EntityKind,
    items: Vec<Entity>,
    pub view: ListView,
    pub search: TextInput,
}

impl EntityList {
    pub fn new(kind: &'static EntityKind, page_size: usize, expand_all: bool) -> Self {
        let view = if kind.tree {
            ListView::Tree(OptionTree::new(expand_all))
        } else {
            ListView::Flat(FlatListing::new(page_size))
        };
        Self {
            kind,
            items: Vec::new(),
            view,
            search: TextInput::new(),
        }
    }

    pub fn kind(&self) -> &'static EntityKind {
        self.kind
    }

    /// Raw collection as fetched.
    pub fn items(&self) -> &[Entity] {
        &self.items
    }

    /// The collection as a forest (tree kinds) or as-is (flat kinds).
    pub fn forest(&self) -> Vec<Entity> {
        match &self.view {
            ListView::Tree(tree) => tree.forest().to_vec(),
            ListView::Flat(_) => self.items.clone(),
        }
    }

    pub fn set_items(&mut self, items: Vec<Entity>) {
        self.items = items;
        if let ListView::Tree(tree) = &mut self.view {
            tree.set_forest(build_forest(&self.items));
        }
        self.refilter();
    }

    pub fn set_search(&mut self, text: &str) {
        self.search = TextInput::with_text(text);
        self.refilter();
    }

    pub fn query(&self) -> &str {
        &self.search.text
    }

    pub fn refilter(&mut self) {
        let kind = self.kind;
        let query = self.search.text.clone();
        match &mut self.view {
            ListView::Flat(listing) => {
                listing.apply_filter(&self.items, &query, |e| kind.subtitle(e));
            }
            ListView::Tree(tree) => {
                let hits = flatten(tree.forest())
                    .into_iter()
                    .filter(|e| item_matches(*e, kind.subtitle(e).as_deref(), &query))
                    .map(TreeOption::key)
                    .collect();
                tree.set_query_matching(query, hits);
            }
        }
    }

    /// The entity under the cursor.
    pub fn selected(&self) -> Option<&Entity> {
        match &self.view {
            ListView::Flat(listing) => listing.selected_index().and_then(|i| self.items.get(i)),
            ListView::Tree(tree) => tree.cursor_row().map(|row| row.node),
        }
    }

    /// Place the cursor on the entity with `id` when it is visible.
    pub fn focus_id(&mut self, id: i64) -> bool {
        let key = id.to_string();
        match &mut self.view {
            ListView::Tree(tree) => tree.focus_key(&key),
            ListView::Flat(listing) => {
                let Some(pos) = self
                    .items
                    .iter()
                    .position(|e| e.key() == key)
                    .and_then(|src| listing.filtered.iter().position(|&i| i == src))
                else {
                    return false;
                };
                let size = listing.pagination.page_size();
                listing.pagination.reset();
                for _ in 0..pos / size {
                    listing.pagination.next(listing.filtered.len());
                }
                listing.list_state.select(Some(pos % size));
                true
            }
        }
    }

    /// Rows shown vs. rows loaded.
    pub fn counts(&self) -> (usize, usize) {
        match &self.view {
            ListView::Flat(listing) => (listing.filtered.len(), self.items.len()),
            ListView::Tree(tree) => (tree.rows().len(), self.items.len()),
        }
    }

    pub fn count_label(&self) -> String {
        let (shown, total) = self.counts();
        let noun = if total == 1 { self.kind.singular } else { self.kind.name };
        if self.search.text.trim().is_empty() {
            format!("{total} {}", noun.to_lowercase())
        } else {
            format!("{shown} of {total} {}", noun.to_lowercase())
        }
    }

    /// Look up a loaded entity anywhere in the collection.
    pub fn find(&self, id: i64) -> Option<&Entity> {
        let key = id.to_string();
        self.items
            .iter()
            .find(|e| e.id == Some(id))
            .or_else(|| find_node(&self.items, &key))
    }

    pub fn move_down(&mut self, n: usize) {
        match &mut self.view {
            ListView::Flat(listing) => listing.move_down(n),
            ListView::Tree(tree) => tree.move_down(n),
        }
    }

    pub fn move_up(&mut self, n: usize) {
        match &mut self.view {
            ListView::Flat(listing) => listing.move_up(n),
            ListView::Tree(tree) => tree.move_up(n),
        }
    }

    pub fn goto_top(&mut self) {
        match &mut self.view {
            ListView::Flat(listing) => listing.goto_top(),
            ListView::Tree(tree) => tree.goto_top(),
        }
    }

    pub fn goto_bottom(&mut self) {
        match &mut self.view {
            ListView::Flat(listing) => listing.goto_bottom(),
            ListView::Tree(tree) => tree.goto_bottom(),
        }
    }

    pub fn next_page(&mut self) {
        if let ListView::Flat(listing) = &mut self.view {
            listing.next_page();
        }
    }

    pub fn prev_page(&mut self) {
        if let ListView::Flat(listing) = &mut self.view {
            listing.prev_page();
        }
    }

    pub fn expand(&mut self) {
        if let ListView::Tree(tree) = &mut self.view {
            tree.expand_cursor();
        }
    }

    pub fn collapse(&mut self) {
        if let ListView::Tree(tree) = &mut self.view {
            tree.collapse_cursor_or_parent();
        }
    }

    pub fn expand_all(&mut self) {
        if let ListView::Tree(tree) = &mut self.view {
            tree.expand_all();
        }
    }

    pub fn collapse_all(&mut self) {
        if let ListView::Tree(tree) = &mut self.view {
            tree.collapse_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind::{GOALS, TEAMS};
    use serde_json::json;

    fn teams() -> Vec<Entity> {
        serde_json::from_value(json!([
            {"id": 1, "name": "Platform", "description": "infra and tooling"},
            {"id": 2, "name": "Payments", "description": "card processing"},
            {"id": 3, "name": "Mobile", "description": "iOS and Android"}
        ]))
        .unwrap()
    }

    fn goals() -> Vec<Entity> {
        serde_json::from_value(json!([
            {"id": 1, "name": "Goal1", "parent": null},
            {"id": 2, "name": "Goal2", "parent": 1},
            {"id": 3, "name": "Goal3", "parent": 2},
            {"id": 4, "name": "Hiring", "parent": null}
        ]))
        .unwrap()
    }

    #[test]
    fn test_flat_search_uses_subtitle_and_pages() {
        let mut list = EntityList::new(&TEAMS, 2, false);
        list.set_items(teams());
        assert_eq!(list.counts(), (3, 3));
        assert_eq!(list.count_label(), "3 teams");

        list.set_search("CARD");
        assert_eq!(list.counts(), (1, 3));
        assert_eq!(list.selected().map(|e| e.name.as_str()), Some("Payments"));
        assert_eq!(list.count_label(), "1 of 3 teams");

        list.set_search("");
        list.next_page();
        assert_eq!(list.selected().map(|e| e.name.as_str()), Some("Mobile"));
    }

    #[test]
    fn test_tree_view_builds_forest_and_filters() {
        let mut list = EntityList::new(&GOALS, 20, false);
        list.set_items(goals());
        assert_eq!(list.counts(), (2, 4));

        list.expand();
        assert_eq!(list.counts(), (3, 4));

        list.set_search("goal3");
        let ListView::Tree(tree) = &list.view else {
            panic!("goals use the tree view");
        };
        let labels: Vec<String> = tree.rows().iter().map(|r| r.node.label().to_string()).collect();
        assert_eq!(labels, vec!["Goal1", "Goal2", "Goal3"]);
    }

    #[test]
    fn test_tree_search_matches_description() {
        let mut list = EntityList::new(&GOALS, 20, false);
        list.set_items(
            serde_json::from_value(json!([
                {"id": 1, "name": "Goal1", "description": "reduce latency"},
                {"id": 2, "name": "Goal2", "parent": 1},
                {"id": 4, "name": "Hiring", "description": "grow the team"}
            ]))
            .unwrap(),
        );

        list.set_search("LATENCY");
        assert_eq!(list.counts(), (1, 3));
        assert_eq!(list.selected().map(|e| e.name.as_str()), Some("Goal1"));
        assert_eq!(list.count_label(), "1 of 3 goals");

        // A description hit deep in the tree keeps its ancestors.
        list.set_items(
            serde_json::from_value(json!([
                {"id": 1, "name": "Goal1"},
                {"id": 2, "name": "Goal2", "parent": 1, "description": "p99 latency"},
                {"id": 4, "name": "Hiring"}
            ]))
            .unwrap(),
        );
        let ListView::Tree(tree) = &list.view else {
            panic!("goals use the tree view");
        };
        let labels: Vec<String> = tree.rows().iter().map(|r| r.node.label().to_string()).collect();
        assert_eq!(labels, vec!["Goal1", "Goal2"]);
    }

    #[test]
    fn test_focus_id() {
        let mut list = EntityList::new(&TEAMS, 2, false);
        list.set_items(teams());
        assert!(list.focus_id(3));
        assert_eq!(list.selected().map(|e| e.id), Some(Some(3)));
        assert!(!list.focus_id(42));

        let mut tree = EntityList::new(&GOALS, 20, true);
        tree.set_items(goals());
        assert!(tree.focus_id(3));
        assert_eq!(tree.selected().and_then(|e| e.id), Some(3));
    }

    #[test]
    fn test_find_and_forest() {
        let mut list = EntityList::new(&GOALS, 20, false);
        list.set_items(goals());
        assert_eq!(list.find(2).map(|e| e.name.as_str()), Some("Goal2"));
        assert!(list.find(9).is_none());
        assert_eq!(list.forest().len(), 2);
    }
}
