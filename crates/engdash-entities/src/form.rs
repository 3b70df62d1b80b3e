use std::collections::HashSet;

use crossterm::event::{KeyCode, KeyEvent};
use engdash_api::Entity;
use engdash_core::ancestry::{AncestryError, ParentIndex, PreviewRow, preview_rows};
use engdash_core::dropdown::{Dropdown, DropdownEvent};
use engdash_core::keybinds::TextInput;
use engdash_core::option_tree::{TreeOption, find_node, subtree_keys};
use thiserror::Error;

use crate::kind::{EntityKind, FieldKind, FieldSpec};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormError {
    #[error("{0} is required")]
    Required(&'static str),
    #[error("\"{parent}\" is this {kind} or one of its descendants and cannot be its parent")]
    ParentCycle { kind: &'static str, parent: String },
}

/// What a key press in the form led to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormEvent {
    None,
    /// Field editing started or ended; the page should switch modes.
    EditStarted,
    EditFinished,
}

/// The details half of an entity page: text inputs per field, the
/// parent picker and the hierarchy preview.
#[derive(Debug, Clone)]
pub struct EntityForm {
    kind: &'static EntityKind,
    /// Record as loaded (or empty for a new one).
    original: Entity,
    inputs: Vec<TextInput>,
    focus: usize,
    editing: bool,
    pub parent_picker: Dropdown<Entity>,
    index: ParentIndex,
    pub error: Option<String>,
    pub saving: bool,
}

impl EntityForm {
    pub fn new(kind: &'static EntityKind, entity: Entity, expand_all: bool) -> Self {
        let inputs = kind
            .fields
            .iter()
            .map(|f| match f.kind {
                FieldKind::Text => TextInput::with_text(entity.field(f.key).unwrap_or_default()),
                FieldKind::Parent => TextInput::new(),
            })
            .collect();

        let mut parent_picker = Dropdown::new(format!("{} parent", kind.singular_title()), expand_all);
        parent_picker.set_selection(entity.parent.as_deref().cloned());

        let mut index = ParentIndex::new();
        if entity.id.is_some() {
            index.insert_chain(&entity);
        } else if let Some(parent) = entity.parent.as_deref() {
            index.insert_chain(parent);
        }

        Self {
            kind,
            original: entity,
            inputs,
            focus: 0,
            editing: false,
            parent_picker,
            index,
            error: None,
            saving: false,
        }
    }

    pub fn kind(&self) -> &'static EntityKind {
        self.kind
    }

    pub fn id(&self) -> Option<i64> {
        self.original.id
    }

    pub fn is_new(&self) -> bool {
        self.original.id.is_none()
    }

    pub fn original(&self) -> &Entity {
        &self.original
    }

    /// Parent choices: the whole forest minus this record and its
    /// descendants.
    pub fn set_parent_options(&mut self, forest: Vec<Entity>) {
        let mut excluded = HashSet::new();
        if let Some(id) = self.original.id {
            let key = id.to_string();
            excluded = find_node(&forest, &key)
                .map(subtree_keys)
                .unwrap_or_default();
            excluded.insert(key);
        }

        let mut index = ParentIndex::from_forest(&forest);
        if let Some(parent) = self.parent_picker.selection() {
            index.insert_chain(parent);
        }
        index.insert_chain(&self.original);
        self.index = index;

        // Refresh the chosen parent with the loaded record.
        let fresh = self
            .parent_picker
            .selection()
            .and_then(|p| find_node(&forest, &p.key()).cloned());
        self.parent_picker.tree.set_excluded(excluded);
        self.parent_picker.tree.set_forest(forest);
        if let Some(fresh) = fresh {
            self.parent_picker.set_selection(Some(fresh));
        }
    }

    pub fn fields(&self) -> &'static [FieldSpec] {
        self.kind.fields
    }

    pub fn focus(&self) -> usize {
        self.focus
    }

    pub fn focused_field(&self) -> &'static FieldSpec {
        &self.kind.fields[self.focus]
    }

    pub fn is_editing(&self) -> bool {
        self.editing || self.parent_picker.is_open()
    }

    pub fn input(&self, i: usize) -> &TextInput {
        &self.inputs[i]
    }

    /// Text shown for a field: the input, or the parent's name.
    pub fn display_value(&self, i: usize) -> String {
        match self.kind.fields[i].kind {
            FieldKind::Text => self.inputs[i].text.clone(),
            FieldKind::Parent => self
                .parent()
                .map(|p| match (p.name.is_empty(), p.id) {
                    (true, Some(id)) => self
                        .index
                        .get(&id.to_string())
                        .filter(|n| !n.label.is_empty())
                        .map(|n| n.label.clone())
                        .unwrap_or_else(|| p.display_name()),
                    _ => p.display_name(),
                })
                .unwrap_or_default(),
        }
    }

    pub fn parent(&self) -> Option<&Entity> {
        self.parent_picker.selection()
    }

    pub fn set_parent(&mut self, parent: Option<Entity>) {
        self.parent_picker.set_selection(parent);
        self.error = None;
    }

    pub fn focus_next(&mut self) {
        self.focus = (self.focus + 1) % self.kind.fields.len();
    }

    pub fn focus_prev(&mut self) {
        self.focus = self.focus.checked_sub(1).unwrap_or(self.kind.fields.len() - 1);
    }

    /// Begin editing the focused field; parent fields open the picker.
    pub fn start_edit(&mut self) -> FormEvent {
        match self.focused_field().kind {
            FieldKind::Text => self.editing = true,
            FieldKind::Parent => self.parent_picker.open(),
        }
        FormEvent::EditStarted
    }

    /// Route a key while a field is being edited.
    pub fn handle_edit_key(&mut self, key: KeyEvent) -> FormEvent {
        if self.parent_picker.is_open() {
            return match self.parent_picker.handle_key(key) {
                DropdownEvent::None => FormEvent::None,
                DropdownEvent::Selected(_) | DropdownEvent::Cleared => {
                    self.error = None;
                    FormEvent::EditFinished
                }
                DropdownEvent::Closed => FormEvent::EditFinished,
            };
        }
        if !self.editing {
            return FormEvent::None;
        }
        match key.code {
            KeyCode::Esc | KeyCode::Enter => {
                self.editing = false;
                FormEvent::EditFinished
            }
            KeyCode::Tab => {
                self.focus_next();
                if self.focused_field().kind == FieldKind::Parent {
                    self.editing = false;
                    return FormEvent::EditFinished;
                }
                FormEvent::None
            }
            KeyCode::BackTab => {
                self.focus_prev();
                if self.focused_field().kind == FieldKind::Parent {
                    self.editing = false;
                    return FormEvent::EditFinished;
                }
                FormEvent::None
            }
            _ => {
                self.inputs[self.focus].handle_key(key);
                FormEvent::None
            }
        }
    }

    /// The record as it would be written.
    pub fn draft(&self) -> Entity {
        let mut entity = self.original.clone();
        entity.children = Vec::new();
        for (field, input) in self.kind.fields.iter().zip(&self.inputs) {
            match field.kind {
                FieldKind::Text => entity.set_field(field.key, input.text.trim()),
                FieldKind::Parent => {
                    entity.parent = self.parent().map(|p| Box::new(p.clone()));
                }
            }
        }
        entity
    }

    pub fn is_dirty(&self) -> bool {
        let draft = self.draft();
        self.kind.fields.iter().any(|f| match f.kind {
            FieldKind::Text => {
                draft.field(f.key).unwrap_or_default()
                    != self.original.field(f.key).unwrap_or_default()
            }
            FieldKind::Parent => draft.parent_id() != self.original.parent_id(),
        })
    }

    /// Check required fields and reject a parent that would make this
    /// record its own ancestor.
    pub fn validate(&self) -> Result<Entity, FormError> {
        let draft = self.draft();
        for field in self.kind.fields {
            if field.required && draft.field(field.key).is_none_or(|v| v.trim().is_empty()) {
                return Err(FormError::Required(field.label));
            }
        }
        if let (Some(id), Some(parent_id)) = (draft.id, draft.parent_id()) {
            if self
                .index
                .would_create_cycle(&id.to_string(), &parent_id.to_string())
            {
                return Err(FormError::ParentCycle {
                    kind: self.kind.singular,
                    parent: self.display_value(self.parent_field_index().unwrap_or(0)),
                });
            }
        }
        Ok(draft)
    }

    fn parent_field_index(&self) -> Option<usize> {
        self.kind
            .fields
            .iter()
            .position(|f| f.kind == FieldKind::Parent)
    }

    /// Rows for the hierarchy preview: chosen parent's ancestors, the
    /// parent, then this record.
    pub fn preview(&self) -> Result<Vec<PreviewRow>, AncestryError> {
        let name = self.draft().display_name();
        let label = if self.is_new() && self.draft().name.is_empty() {
            format!("New {}", self.kind.singular)
        } else {
            name
        };
        let parent_key = self.parent().map(|p| p.key());
        preview_rows(&self.index, &label, parent_key.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forest::build_forest;
    use crate::kind::{GOALS, TEAMS};
    use crossterm::event::KeyModifiers;
    use serde_json::json;

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn goals() -> Vec<Entity> {
        build_forest(
            &serde_json::from_value::<Vec<Entity>>(json!([
                {"id": 1, "name": "Goal1", "parent": null},
                {"id": 2, "name": "Goal2", "parent": 1},
                {"id": 3, "name": "Goal3", "parent": 2},
                {"id": 4, "name": "Hiring", "parent": null}
            ]))
            .unwrap(),
        )
    }

    fn goal2() -> Entity {
        serde_json::from_value(json!({
            "id": 2, "name": "Goal2", "description": "",
            "parent": {"id": 1, "name": "Goal1", "parent": null}
        }))
        .unwrap()
    }

    fn labels(rows: &[PreviewRow]) -> Vec<(String, bool)> {
        rows.iter().map(|r| (r.label.clone(), r.is_subject)).collect()
    }

    #[test]
    fn test_preview_for_existing_goal() {
        let form = EntityForm::new(&GOALS, goal2(), false);
        let rows = form.preview().unwrap();
        assert_eq!(
            labels(&rows),
            vec![("Goal1".to_string(), false), ("Goal2".to_string(), true)]
        );
    }

    #[test]
    fn test_preview_for_new_goal_under_goal2() {
        let mut form = EntityForm::new(&GOALS, Entity::default(), false);
        form.set_parent_options(goals());
        let goal2 = find_node(form.parent_picker.tree.forest(), "2").cloned();
        form.set_parent(goal2);

        let rows = form.preview().unwrap();
        assert_eq!(
            labels(&rows),
            vec![
                ("Goal1".to_string(), false),
                ("Goal2".to_string(), false),
                ("New goal".to_string(), true),
            ]
        );
        assert_eq!(rows[2].depth, 2);
    }

    #[test]
    fn test_picker_hides_self_and_descendants() {
        let mut form = EntityForm::new(&GOALS, goal2(), false);
        form.set_parent_options(goals());
        form.parent_picker.tree.expand_all();
        let keys: Vec<String> = form
            .parent_picker
            .tree
            .rows()
            .iter()
            .map(|r| r.key.clone())
            .collect();
        assert_eq!(keys, vec!["1", "4"]);
        assert_eq!(form.display_value(2), "Goal1");
    }

    #[test]
    fn test_descendant_parent_is_rejected() {
        let mut form = EntityForm::new(&GOALS, goal2(), false);
        form.set_parent_options(goals());
        form.set_parent(Some(Entity {
            id: Some(3),
            ..Entity::new("Goal3")
        }));
        match form.validate() {
            Err(FormError::ParentCycle { parent, .. }) => assert_eq!(parent, "Goal3"),
            other => panic!("expected a cycle error, got {other:?}"),
        }

        form.set_parent(Some(Entity {
            id: Some(2),
            ..Entity::new("Goal2")
        }));
        assert!(matches!(form.validate(), Err(FormError::ParentCycle { .. })));

        form.set_parent(None);
        assert!(form.validate().is_ok());
    }

    #[test]
    fn test_edit_text_and_required() {
        let mut form = EntityForm::new(&TEAMS, Entity::default(), false);
        assert_eq!(form.validate(), Err(FormError::Required("Name")));

        assert_eq!(form.start_edit(), FormEvent::EditStarted);
        for c in "Platform".chars() {
            form.handle_edit_key(press(KeyCode::Char(c)));
        }
        form.handle_edit_key(press(KeyCode::Tab));
        for c in "infra".chars() {
            form.handle_edit_key(press(KeyCode::Char(c)));
        }
        assert_eq!(form.handle_edit_key(press(KeyCode::Enter)), FormEvent::EditFinished);
        assert!(!form.is_editing());
        assert!(form.is_dirty());

        let draft = form.validate().unwrap();
        assert_eq!(draft.name, "Platform");
        assert_eq!(draft.field("description").as_deref(), Some("infra"));
        assert!(draft.id.is_none());
    }

    #[test]
    fn test_parent_field_opens_picker() {
        let mut form = EntityForm::new(&GOALS, Entity::default(), true);
        form.set_parent_options(goals());
        form.focus_prev();
        assert_eq!(form.focused_field().key, "parent");
        form.start_edit();
        assert!(form.parent_picker.is_open());
        assert!(form.is_editing());

        form.handle_edit_key(press(KeyCode::Down));
        assert_eq!(form.handle_edit_key(press(KeyCode::Enter)), FormEvent::EditFinished);
        assert_eq!(form.parent().and_then(|p| p.id), Some(2));
        assert!(!form.is_editing());
    }
}
