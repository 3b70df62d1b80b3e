//! Ancestor chains and the hierarchy preview shown next to an entity form.
//!
//! Two sources of parent information are supported: entities carrying a
//! same-typed parent reference ([`ParentLink`]), and a [`ParentIndex`]
//! arena built from a children-shaped forest. Both walks are iterative
//! and stop with [`AncestryError::Cycle`] when a key repeats.

use std::collections::{HashMap, HashSet};

use ratatui::{
    Frame,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::Paragraph,
};
use thiserror::Error;

use crate::option_tree::TreeOption;

/// An entity that may point at its parent of the same type.
pub trait ParentLink: TreeOption {
    fn parent(&self) -> Option<&Self>;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AncestryError {
    #[error("entity {key} appears in its own ancestor chain")]
    Cycle { key: String },
}

/// Ancestors of `node`, root first, excluding `node` itself.
pub fn ancestor_chain<T: ParentLink>(node: &T) -> Result<Vec<&T>, AncestryError> {
    let mut seen = HashSet::new();
    seen.insert(node.key());

    let mut chain = Vec::new();
    let mut current = node.parent();
    while let Some(parent) = current {
        let key = parent.key();
        if !seen.insert(key.clone()) {
            return Err(AncestryError::Cycle { key });
        }
        chain.push(parent);
        current = parent.parent();
    }
    chain.reverse();
    Ok(chain)
}

// ── ParentIndex ──────────────────────────────────────────────────────

/// A node in the [`ParentIndex`] arena.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedNode {
    pub key: String,
    pub label: String,
    /// Arena index of the parent.
    pub parent: Option<usize>,
}

/// Arena of parent links, addressed by integer index.
#[derive(Debug, Clone, Default)]
pub struct ParentIndex {
    nodes: Vec<IndexedNode>,
    by_key: HashMap<String, usize>,
}

impl ParentIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive parent links from a forest's children lists.
    /// When a key occurs twice, the first occurrence wins.
    pub fn from_forest<T: TreeOption>(forest: &[T]) -> Self {
        let mut index = Self::new();
        let mut stack: Vec<(&T, Option<usize>)> = forest.iter().rev().map(|n| (n, None)).collect();
        while let Some((node, parent)) = stack.pop() {
            let key = node.key();
            if index.by_key.contains_key(&key) {
                continue;
            }
            let idx = index.push(key, node.label().to_string(), parent);
            for child in node.children().iter().rev() {
                stack.push((child, Some(idx)));
            }
        }
        index
    }

    /// Record the parent-reference chain of `node` for keys not known yet.
    pub fn insert_chain<T: ParentLink>(&mut self, node: &T) {
        // Walk up first (bounded by a seen set), then link top-down.
        let mut lineage: Vec<&T> = vec![node];
        let mut seen = HashSet::new();
        seen.insert(node.key());
        let mut current = node.parent();
        while let Some(parent) = current {
            if !seen.insert(parent.key()) {
                break;
            }
            lineage.push(parent);
            current = parent.parent();
        }

        let mut parent_idx: Option<usize> = None;
        for entry in lineage.into_iter().rev() {
            let key = entry.key();
            parent_idx = Some(match self.by_key.get(&key) {
                Some(&idx) => idx,
                None => self.push(key, entry.label().to_string(), parent_idx),
            });
        }
    }

    fn push(&mut self, key: String, label: String, parent: Option<usize>) -> usize {
        let idx = self.nodes.len();
        self.by_key.insert(key.clone(), idx);
        self.nodes.push(IndexedNode { key, label, parent });
        idx
    }

    pub fn get(&self, key: &str) -> Option<&IndexedNode> {
        self.by_key.get(key).map(|&idx| &self.nodes[idx])
    }

    pub fn contains(&self, key: &str) -> bool {
        self.by_key.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Ancestors of `key`, root first, excluding `key` itself.
    /// Unknown keys have no ancestors.
    pub fn ancestor_chain(&self, key: &str) -> Result<Vec<&IndexedNode>, AncestryError> {
        let Some(&start) = self.by_key.get(key) else {
            return Ok(Vec::new());
        };
        let mut visited = HashSet::new();
        visited.insert(start);

        let mut chain = Vec::new();
        let mut current = self.nodes[start].parent;
        while let Some(idx) = current {
            if !visited.insert(idx) {
                return Err(AncestryError::Cycle {
                    key: self.nodes[idx].key.clone(),
                });
            }
            chain.push(&self.nodes[idx]);
            current = self.nodes[idx].parent;
        }
        chain.reverse();
        Ok(chain)
    }

    /// Whether choosing `candidate` as the parent of `subject` would put
    /// `subject` in its own ancestor chain.
    pub fn would_create_cycle(&self, subject: &str, candidate: &str) -> bool {
        if subject == candidate {
            return true;
        }
        match self.ancestor_chain(candidate) {
            Ok(chain) => chain.iter().any(|n| n.key == subject),
            Err(_) => true,
        }
    }
}

// ── Hierarchy preview ────────────────────────────────────────────────

/// One line of the preview: either an ancestor or the edited entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewRow {
    pub label: String,
    pub depth: usize,
    /// The in-progress entity, drawn innermost and highlighted.
    pub is_subject: bool,
}

/// Build the preview for `subject_label` placed under `parent_key`.
///
/// The parent and its ancestors are listed root first as plain rows;
/// the subject closes the list one level deeper. With no parent the
/// subject stands alone.
pub fn preview_rows(
    index: &ParentIndex,
    subject_label: &str,
    parent_key: Option<&str>,
) -> Result<Vec<PreviewRow>, AncestryError> {
    let mut labels: Vec<String> = Vec::new();
    if let Some(parent_key) = parent_key {
        for ancestor in index.ancestor_chain(parent_key)? {
            labels.push(ancestor.label.clone());
        }
        let parent_label = index
            .get(parent_key)
            .map(|n| n.label.clone())
            .unwrap_or_else(|| format!("#{parent_key}"));
        labels.push(parent_label);
    }

    let mut rows: Vec<PreviewRow> = labels
        .into_iter()
        .enumerate()
        .map(|(depth, label)| PreviewRow {
            label,
            depth,
            is_subject: false,
        })
        .collect();
    rows.push(PreviewRow {
        label: subject_label.to_string(),
        depth: rows.len(),
        is_subject: true,
    });
    Ok(rows)
}

/// Render a preview (or the cycle error) into `area`.
pub fn render_hierarchy_preview(
    frame: &mut Frame,
    area: Rect,
    preview: &Result<Vec<PreviewRow>, AncestryError>,
    subject_marker: &str,
) {
    let lines: Vec<Line> = match preview {
        Ok(rows) => rows
            .iter()
            .map(|row| {
                let indent = "  ".repeat(row.depth);
                if row.is_subject {
                    let style = Style::default()
                        .fg(Color::Yellow)
                        .add_modifier(Modifier::BOLD);
                    Line::from(vec![
                        Span::raw(indent),
                        Span::styled(format!("\u{2605} {}", row.label), style),
                        Span::styled(
                            format!("  {subject_marker}"),
                            Style::default().fg(Color::DarkGray),
                        ),
                    ])
                } else {
                    Line::from(vec![
                        Span::raw(indent),
                        Span::styled(
                            format!("\u{25BC} {}", row.label),
                            Style::default().fg(Color::Blue),
                        ),
                    ])
                }
            })
            .collect(),
        Err(err) => vec![Line::from(Span::styled(
            err.to_string(),
            Style::default().fg(Color::Red),
        ))],
    };
    frame.render_widget(Paragraph::new(lines), area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::option_tree::tests::{TestNode, node};

    #[derive(Debug, Clone)]
    struct Goal {
        id: u32,
        name: String,
        parent: Option<Box<Goal>>,
    }

    impl TreeOption for Goal {
        fn key(&self) -> String {
            self.id.to_string()
        }
        fn label(&self) -> &str {
            &self.name
        }
        fn children(&self) -> &[Self] {
            &[]
        }
    }

    impl ParentLink for Goal {
        fn parent(&self) -> Option<&Self> {
            self.parent.as_deref()
        }
    }

    fn goal(id: u32, name: &str, parent: Option<Goal>) -> Goal {
        Goal {
            id,
            name: name.to_string(),
            parent: parent.map(Box::new),
        }
    }

    fn goal_chain() -> Goal {
        let g1 = goal(1, "Goal1", None);
        let g2 = goal(2, "Goal2", Some(g1));
        goal(3, "Goal3", Some(g2))
    }

    #[test]
    fn test_chain_is_root_first() {
        let g3 = goal_chain();
        let chain = ancestor_chain(&g3).unwrap();
        let names: Vec<&str> = chain.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, vec!["Goal1", "Goal2"]);

        let g2 = g3.parent.as_deref().unwrap();
        let chain = ancestor_chain(g2).unwrap();
        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].name, "Goal1");

        let root = goal(1, "Goal1", None);
        assert!(ancestor_chain(&root).unwrap().is_empty());
    }

    #[test]
    fn test_repeated_key_is_a_cycle() {
        // Owned parents cannot loop, but a stale payload can repeat a key.
        let inner = goal(7, "Again", None);
        let mid = goal(8, "Mid", Some(inner));
        let looped = goal(7, "Start", Some(mid));
        assert_eq!(
            ancestor_chain(&looped).unwrap_err(),
            AncestryError::Cycle { key: "7".into() }
        );
    }

    #[test]
    fn test_index_from_forest() {
        let forest: Vec<TestNode> = vec![node(
            1,
            "Eng",
            vec![node(2, "Backend", vec![node(3, "API", vec![])])],
        )];
        let index = ParentIndex::from_forest(&forest);
        assert_eq!(index.len(), 3);

        let chain = index.ancestor_chain("3").unwrap();
        let labels: Vec<&str> = chain.iter().map(|n| n.label.as_str()).collect();
        assert_eq!(labels, vec!["Eng", "Backend"]);
        assert!(index.ancestor_chain("1").unwrap().is_empty());
        assert!(index.ancestor_chain("missing").unwrap().is_empty());
    }

    #[test]
    fn test_insert_chain_links_parent_refs() {
        let mut index = ParentIndex::new();
        index.insert_chain(&goal_chain());
        let labels: Vec<String> = index
            .ancestor_chain("3")
            .unwrap()
            .into_iter()
            .map(|n| n.label.clone())
            .collect();
        assert_eq!(labels, vec!["Goal1", "Goal2"]);

        // Existing entries are kept.
        index.insert_chain(&goal(2, "Renamed", None));
        assert_eq!(index.get("2").unwrap().label, "Goal2");
    }

    #[test]
    fn test_would_create_cycle() {
        let forest = vec![node(
            1,
            "Eng",
            vec![node(2, "Backend", vec![node(3, "API", vec![])])],
        )];
        let index = ParentIndex::from_forest(&forest);
        assert!(index.would_create_cycle("2", "2"));
        assert!(index.would_create_cycle("2", "3"));
        assert!(!index.would_create_cycle("3", "1"));
        assert!(!index.would_create_cycle("new", "3"));
    }

    #[test]
    fn test_preview_without_parent() {
        let rows = preview_rows(&ParentIndex::new(), "Ship v2", None).unwrap();
        assert_eq!(
            rows,
            vec![PreviewRow {
                label: "Ship v2".into(),
                depth: 0,
                is_subject: true
            }]
        );
    }

    #[test]
    fn test_preview_nests_subject_under_parent() {
        let mut index = ParentIndex::new();
        index.insert_chain(&goal_chain());

        // Editing Goal2 with Goal1 picked as parent: Goal1 > Goal2 (marked).
        let rows = preview_rows(&index, "Goal2", Some("1")).unwrap();
        let shape: Vec<(&str, usize, bool)> = rows
            .iter()
            .map(|r| (r.label.as_str(), r.depth, r.is_subject))
            .collect();
        assert_eq!(shape, vec![("Goal1", 0, false), ("Goal2", 1, true)]);

        // A new goal under Goal2: Goal1 > Goal2 > new goal (marked).
        let rows = preview_rows(&index, "New goal", Some("2")).unwrap();
        let shape: Vec<(&str, usize, bool)> = rows
            .iter()
            .map(|r| (r.label.as_str(), r.depth, r.is_subject))
            .collect();
        assert_eq!(
            shape,
            vec![("Goal1", 0, false), ("Goal2", 1, false), ("New goal", 2, true)]
        );
    }

    #[test]
    fn test_candidate_parent_chain_excludes_the_parent() {
        let g3 = goal_chain();
        let g2 = g3.parent.as_deref().unwrap();
        let chain = ancestor_chain(g2).unwrap();
        let names: Vec<&str> = chain.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, vec!["Goal1"]);

        // The preview lists that chain, then the candidate parent, then
        // the record being edited.
        let mut index = ParentIndex::new();
        index.insert_chain(&g3);
        let labels: Vec<String> = index
            .ancestor_chain("2")
            .unwrap()
            .iter()
            .map(|n| n.label.clone())
            .collect();
        assert_eq!(labels, vec!["Goal1"]);
        let rows = preview_rows(&index, "Draft", Some("2")).unwrap();
        let labels: Vec<&str> = rows.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, vec!["Goal1", "Goal2", "Draft"]);
        assert!(rows[2].is_subject);
    }

    #[test]
    fn test_preview_with_unknown_parent_uses_placeholder() {
        let rows = preview_rows(&ParentIndex::new(), "Child", Some("42")).unwrap();
        assert_eq!(rows[0].label, "#42");
        assert!(rows[1].is_subject);
    }
}
