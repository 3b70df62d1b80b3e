use engdash_api::Entity;

/// How a form field is edited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Single-line text.
    Text,
    /// Choice of another entity of the same kind, through the tree picker.
    Parent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub key: &'static str,
    pub label: &'static str,
    pub kind: FieldKind,
    pub required: bool,
}

const fn text(key: &'static str, label: &'static str, required: bool) -> FieldSpec {
    FieldSpec {
        key,
        label,
        kind: FieldKind::Text,
        required,
    }
}

const PARENT: FieldSpec = FieldSpec {
    key: "parent",
    label: "Parent",
    kind: FieldKind::Parent,
    required: false,
};

/// Static description of one entity collection: where it lives, how its
/// list looks and which fields its form edits.
#[derive(Debug, PartialEq, Eq)]
pub struct EntityKind {
    /// Plural display name, used as page name.
    pub name: &'static str,
    pub singular: &'static str,
    /// Collection path under the API base URL; also the route.
    pub collection: &'static str,
    pub leader_key: char,
    pub description: &'static str,
    /// Parent/child hierarchy: tree list and tree parent picker.
    pub tree: bool,
    /// Field shown dimmed after the name in lists and searched by them.
    pub subtitle_field: &'static str,
    pub fields: &'static [FieldSpec],
}

pub static GOALS: EntityKind = EntityKind {
    name: "Goals",
    singular: "goal",
    collection: "goals",
    leader_key: 'g',
    description: "Goal hierarchy",
    tree: true,
    subtitle_field: "description",
    fields: &[
        text("name", "Name", true),
        text("description", "Description", false),
        PARENT,
    ],
};

pub static REMINDERS: EntityKind = EntityKind {
    name: "Reminders",
    singular: "reminder",
    collection: "reminders",
    leader_key: 'r',
    description: "Scheduled reminders",
    tree: false,
    subtitle_field: "message",
    fields: &[
        text("name", "Name", true),
        text("message", "Message", false),
        text("schedule", "Schedule", false),
    ],
};

pub static TASK_TYPES: EntityKind = EntityKind {
    name: "Task types",
    singular: "task type",
    collection: "task-types",
    leader_key: 'k',
    description: "Task type hierarchy",
    tree: true,
    subtitle_field: "description",
    fields: &[
        text("name", "Name", true),
        text("description", "Description", false),
        PARENT,
    ],
};

pub static TEAMS: EntityKind = EntityKind {
    name: "Teams",
    singular: "team",
    collection: "teams",
    leader_key: 't',
    description: "Engineering teams",
    tree: false,
    subtitle_field: "description",
    fields: &[
        text("name", "Name", true),
        text("description", "Description", false),
    ],
};

pub static USERS: EntityKind = EntityKind {
    name: "Users",
    singular: "user",
    collection: "users",
    leader_key: 'u',
    description: "People",
    tree: false,
    subtitle_field: "email",
    fields: &[text("name", "Name", true), text("email", "Email", false)],
};

/// Every kind, in tab order.
pub fn all() -> [&'static EntityKind; 5] {
    [&GOALS, &REMINDERS, &TASK_TYPES, &TEAMS, &USERS]
}

pub fn by_collection(collection: &str) -> Option<&'static EntityKind> {
    all().into_iter().find(|k| k.collection == collection)
}

impl EntityKind {
    /// Subtitle text of `entity`, if non-empty.
    pub fn subtitle(&self, entity: &Entity) -> Option<String> {
        entity
            .field(self.subtitle_field)
            .filter(|s| !s.trim().is_empty())
    }

    pub fn has_parent(&self) -> bool {
        self.fields.iter().any(|f| f.kind == FieldKind::Parent)
    }

    /// "Goal", "Task type".
    pub fn singular_title(&self) -> String {
        let mut chars = self.singular.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_and_keys_are_unique() {
        assert_eq!(by_collection("task-types"), Some(&TASK_TYPES));
        assert_eq!(by_collection("nope"), None);

        let kinds = all();
        for (i, a) in kinds.iter().enumerate() {
            for b in &kinds[i + 1..] {
                assert_ne!(a.leader_key, b.leader_key);
                assert_ne!(a.collection, b.collection);
            }
        }
    }

    #[test]
    fn test_tree_kinds_have_parent_field() {
        for kind in all() {
            assert_eq!(kind.tree, kind.has_parent(), "{}", kind.name);
            assert_eq!(kind.fields[0].key, "name");
        }
    }

    #[test]
    fn test_subtitle_and_titles() {
        let mut user = Entity::new("Ann");
        assert_eq!(USERS.subtitle(&user), None);
        user.set_field("email", "ann@example.com");
        assert_eq!(USERS.subtitle(&user).as_deref(), Some("ann@example.com"));
        user.set_field("email", "  ");
        assert_eq!(USERS.subtitle(&user), None);

        assert_eq!(TASK_TYPES.singular_title(), "Task type");
    }
}
