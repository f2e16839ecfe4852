//! # State File Document
//!
//! Parsed and schema-checked form of the external state file. Nothing in
//! here touches the live scene; a document that fails these checks is
//! rejected as a whole before any mutation is attempted.

use log::warn;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use tabletop_shared::constants::state_file::LAST_MODIFIED_KEY;
use tabletop_shared::ObjectCategory;

use crate::error::{SceneError, SceneResult};

/// Field map of every object in one category, keyed by name
pub type ObjectFields = BTreeMap<String, Map<String, Value>>;

/// A validated external scene description
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SceneDocument {
    pub entities: ObjectFields,
    pub models: ObjectFields,
    pub lights: ObjectFields,

    /// Camera block, compared wholesale
    pub cameras: Map<String, Value>,

    /// Settings block, compared wholesale
    pub settings: Map<String, Value>,

    /// `last_modified` stamp as found in the file
    pub last_modified: Option<String>,

    /// Whole top-level object, kept so write-back preserves unknown keys
    raw: Map<String, Value>,
}

impl SceneDocument {
    /// Parse and validate file contents. Unparseable text counts as a
    /// validation failure since it usually means a write is in progress.
    pub fn parse(text: &str) -> SceneResult<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| SceneError::validation(format!("state file is not valid JSON: {}", e)))?;
        Self::from_value(value)
    }

    /// Validate an already-parsed document
    pub fn from_value(value: Value) -> SceneResult<Self> {
        let Value::Object(root) = value else {
            return Err(SceneError::validation("state file top level must be a JSON object"));
        };

        let entities = match root.get("entities") {
            Some(Value::Object(entities)) => entities,
            Some(_) => return Err(SceneError::validation("'entities' must be an object")),
            None => return Err(SceneError::validation("state file is missing 'entities'")),
        };
        let settings = match root.get("settings") {
            Some(Value::Object(settings)) => settings.clone(),
            Some(_) => return Err(SceneError::validation("'settings' must be an object")),
            None => return Err(SceneError::validation("state file is missing 'settings'")),
        };

        for (key, value) in entities {
            validate_entity(key, value)?;
        }

        Ok(Self {
            entities: collect(ObjectCategory::Entity, entities)?,
            models: optional_collection(&root, ObjectCategory::Model)?,
            lights: optional_collection(&root, ObjectCategory::Light)?,
            cameras: match root.get("cameras") {
                None | Some(Value::Null) => Map::new(),
                Some(Value::Object(cameras)) => cameras.clone(),
                Some(_) => return Err(SceneError::validation("'cameras' must be an object")),
            },
            settings,
            last_modified: root.get(LAST_MODIFIED_KEY).and_then(Value::as_str).map(str::to_string),
            raw: root,
        })
    }

    /// The per-object maps that are diffed field by field
    pub fn collections(&self) -> [(ObjectCategory, &ObjectFields); 3] {
        [
            (ObjectCategory::Entity, &self.entities),
            (ObjectCategory::Model, &self.models),
            (ObjectCategory::Light, &self.lights),
        ]
    }

    /// Number of objects outside the camera block
    pub fn object_count(&self) -> usize {
        self.entities.len() + self.models.len() + self.lights.len()
    }

    /// Drop `name` from every per-object map that holds it. The raw file
    /// contents are left alone.
    pub fn forget_object(&mut self, name: &str) -> bool {
        let mut removed = false;
        for objects in [&mut self.entities, &mut self.models, &mut self.lights] {
            removed |= objects.remove(name).is_some();
        }
        removed
    }

    /// Serialized file contents with `last_modified` replaced by `stamp`
    pub fn render_with_stamp(&self, stamp: &str) -> SceneResult<String> {
        let mut root = self.raw.clone();
        root.insert(LAST_MODIFIED_KEY.to_string(), Value::String(stamp.to_string()));
        Ok(serde_json::to_string_pretty(&Value::Object(root))?)
    }
}

/// Schema gate for one entity: non-empty name and template, three-element position
fn validate_entity(key: &str, value: &Value) -> SceneResult<()> {
    let Some(fields) = value.as_object() else {
        return Err(SceneError::validation(format!("entity '{}' must be an object", key)));
    };

    for required in ["name", "template"] {
        match fields.get(required).and_then(Value::as_str) {
            Some(s) if !s.trim().is_empty() => {}
            _ => {
                return Err(SceneError::validation(format!(
                    "entity '{}' requires a non-empty '{}'",
                    key, required
                )));
            }
        }
    }

    match fields.get("position") {
        Some(Value::Array(items)) if items.len() == 3 => Ok(()),
        _ => Err(SceneError::validation(format!(
            "entity '{}' requires a 'position' array of length 3",
            key
        ))),
    }
}

fn optional_collection(root: &Map<String, Value>, category: ObjectCategory) -> SceneResult<ObjectFields> {
    let key = category.collection_key();
    match root.get(key) {
        None | Some(Value::Null) => Ok(ObjectFields::new()),
        Some(Value::Object(objects)) => collect(category, objects),
        Some(_) => Err(SceneError::validation(format!("'{}' must be an object", key))),
    }
}

/// The map key is the object's identity; a conflicting `name` field is overridden
fn collect(category: ObjectCategory, objects: &Map<String, Value>) -> SceneResult<ObjectFields> {
    let mut collected = ObjectFields::new();

    for (key, value) in objects {
        let mut fields = value
            .as_object()
            .cloned()
            .ok_or_else(|| SceneError::validation(format!("{} '{}' must be an object", category, key)))?;

        match fields.get("name").and_then(Value::as_str) {
            Some(name) if name == key => {}
            Some(name) => {
                warn!("{} keyed '{}' is named '{}'; using the key", category, key, name);
                fields.insert("name".to_string(), Value::String(key.clone()));
            }
            None => {
                fields.insert("name".to_string(), Value::String(key.clone()));
            }
        }

        collected.insert(key.clone(), fields);
    }

    Ok(collected)
}
