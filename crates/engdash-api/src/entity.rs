use engdash_core::ancestry::ParentLink;
use engdash_core::option_tree::TreeOption;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

/// A record from any entity collection.
///
/// `name`, `parent` and `children` are the fields the tree and ancestry
/// code reads; every other attribute of the record is kept in `fields`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Entity {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "parent_ref")]
    pub parent: Option<Box<Entity>>,
    #[serde(default, deserialize_with = "child_refs")]
    pub children: Vec<Entity>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// `parent` arrives either as a nested record or as a bare id.
#[derive(Deserialize)]
#[serde(untagged)]
enum ParentRef {
    Id(i64),
    Full(Box<Entity>),
}

impl From<ParentRef> for Box<Entity> {
    fn from(r: ParentRef) -> Self {
        match r {
            ParentRef::Id(id) => Box::new(Entity::stub(id)),
            ParentRef::Full(entity) => entity,
        }
    }
}

fn parent_ref<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Box<Entity>>, D::Error> {
    Ok(Option::<ParentRef>::deserialize(d)?.map(Into::into))
}

/// Children may be nested records or bare ids; ids carry no subtree, so
/// they are dropped.
#[derive(Deserialize)]
#[serde(untagged)]
enum ChildRef {
    Full(Entity),
    Other(Value),
}

fn child_refs<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<Entity>, D::Error> {
    let refs = Option::<Vec<ChildRef>>::deserialize(d)?.unwrap_or_default();
    Ok(refs
        .into_iter()
        .filter_map(|c| match c {
            ChildRef::Full(entity) => Some(entity),
            ChildRef::Other(_) => None,
        })
        .collect())
}

impl Entity {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// A placeholder for a record known only by id.
    pub fn stub(id: i64) -> Self {
        Self {
            id: Some(id),
            ..Self::default()
        }
    }

    pub fn is_new(&self) -> bool {
        self.id.is_none()
    }

    pub fn display_name(&self) -> String {
        match (self.name.is_empty(), self.id) {
            (false, _) => self.name.clone(),
            (true, Some(id)) => format!("#{id}"),
            (true, None) => String::from("(unnamed)"),
        }
    }

    /// Text value of an attribute; `name` is looked up on the struct,
    /// numbers and booleans are rendered, `null` reads as absent.
    pub fn field(&self, key: &str) -> Option<String> {
        if key == "name" {
            return Some(self.name.clone());
        }
        match self.fields.get(key)? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    pub fn set_field(&mut self, key: &str, value: &str) {
        if key == "name" {
            self.name = value.to_string();
        } else {
            self.fields
                .insert(key.to_string(), Value::String(value.to_string()));
        }
    }

    pub fn parent_id(&self) -> Option<i64> {
        self.parent.as_ref().and_then(|p| p.id)
    }

    /// JSON body for POST/PUT: the attributes plus `name`, and `parent`
    /// as an id (or null) when `with_parent` is set.
    pub fn payload(&self, with_parent: bool) -> Value {
        let mut body = self.fields.clone();
        body.insert("name".into(), Value::String(self.name.clone()));
        if with_parent {
            body.insert(
                "parent".into(),
                self.parent_id().map(Value::from).unwrap_or(Value::Null),
            );
        }
        Value::Object(body)
    }
}

impl TreeOption for Entity {
    fn key(&self) -> String {
        self.id.map(|id| id.to_string()).unwrap_or_default()
    }

    fn label(&self) -> &str {
        &self.name
    }

    fn children(&self) -> &[Self] {
        &self.children
    }
}

impl ParentLink for Entity {
    fn parent(&self) -> Option<&Self> {
        self.parent.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engdash_core::ancestry::ancestor_chain;
    use serde_json::json;

    #[test]
    fn test_nested_parent_and_children() {
        let goal: Entity = serde_json::from_value(json!({
            "id": 3,
            "name": "Goal3",
            "description": "ship it",
            "parent": {"id": 2, "name": "Goal2", "parent": {"id": 1, "name": "Goal1", "parent": null}},
            "children": [{"id": 4, "name": "Goal4", "children": []}, 9]
        }))
        .unwrap();

        assert_eq!(goal.field("description").as_deref(), Some("ship it"));
        assert_eq!(goal.children.len(), 1);
        assert_eq!(goal.children[0].key(), "4");
        assert_eq!(goal.parent_id(), Some(2));

        let chain: Vec<&str> = ancestor_chain(&goal)
            .unwrap()
            .into_iter()
            .map(|e| e.label())
            .collect();
        assert_eq!(chain, vec!["Goal1", "Goal2"]);
    }

    #[test]
    fn test_parent_as_bare_id() {
        let goal: Entity =
            serde_json::from_value(json!({"id": 5, "name": "x", "parent": 2})).unwrap();
        assert_eq!(goal.parent_id(), Some(2));
        assert!(goal.parent.as_ref().is_some_and(|p| p.name.is_empty()));
    }

    #[test]
    fn test_fields_render_as_text() {
        let user: Entity = serde_json::from_value(json!({
            "id": 1, "name": "Ann", "email": "ann@example.com", "active": true, "manager": null
        }))
        .unwrap();
        assert_eq!(user.field("email").as_deref(), Some("ann@example.com"));
        assert_eq!(user.field("active").as_deref(), Some("true"));
        assert_eq!(user.field("manager"), None);
        assert_eq!(user.field("name").as_deref(), Some("Ann"));
        assert!(!user.fields.contains_key("id"));
    }

    #[test]
    fn test_payload() {
        let mut goal = Entity::new("New goal");
        goal.set_field("description", "d");
        goal.parent = Some(Box::new(Entity::stub(7)));

        assert_eq!(
            goal.payload(true),
            json!({"name": "New goal", "description": "d", "parent": 7})
        );
        assert_eq!(goal.payload(false), json!({"name": "New goal", "description": "d"}));

        goal.parent = None;
        assert_eq!(goal.payload(true)["parent"], Value::Null);
    }

    #[test]
    fn test_display_name() {
        assert_eq!(Entity::stub(4).display_name(), "#4");
        assert_eq!(Entity::default().display_name(), "(unnamed)");
        assert!(Entity::default().is_new());
    }
}
