//! # Object Module
//!
//! Turns loosely-typed creation payloads (from live commands or from the
//! external state file) into validated object specs, and specs into records
//! with computed defaults.

use serde_json::{Map, Value};

use tabletop_shared::{vec3_from_json, ObjectCategory, ObjectRecord, Vec3, VEC3_ONE, VEC3_ZERO};

use crate::error::{SceneError, SceneResult};

pub mod template;

/// Keys with a dedicated meaning; anything else in a payload is folded into `properties`
const RESERVED_KEYS: &[&str] = &[
    "name",
    "template",
    "position",
    "rotation",
    "scale",
    "owner",
    "properties",
    "source",
    "category",
    "collisionBox",
    "collision_box",
    "lastMove",
    "lastRotate",
    "created",
];

/// Validated description of an object to create
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ObjectSpec {
    pub name: String,
    pub template: Option<String>,
    pub position: Option<Vec3>,
    pub rotation: Option<Vec3>,
    pub scale: Option<Vec3>,
    pub owner: Option<String>,
    pub properties: Map<String, Value>,
    pub source: Option<String>,
}

impl ObjectSpec {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn with_template(mut self, template: &str) -> Self {
        self.template = Some(template.to_string());
        self
    }

    pub fn with_position(mut self, position: Vec3) -> Self {
        self.position = Some(position);
        self
    }

    pub fn with_rotation(mut self, rotation: Vec3) -> Self {
        self.rotation = Some(rotation);
        self
    }

    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = Some(scale);
        self
    }

    pub fn with_owner(mut self, owner: &str) -> Self {
        self.owner = Some(owner.to_string());
        self
    }

    pub fn with_property(mut self, key: &str, value: Value) -> Self {
        self.properties.insert(key.to_string(), value);
        self
    }

    pub fn with_source(mut self, source: &str) -> Self {
        self.source = Some(source.to_string());
        self
    }

    /// Parse a JSON payload; it must be an object
    pub fn from_value(category: ObjectCategory, value: &Value) -> SceneResult<Self> {
        match value.as_object() {
            Some(fields) => Self::from_fields(category, fields),
            None => Err(SceneError::validation("object payload must be a JSON object")),
        }
    }

    /// Parse a field map, validating name and transform arrays
    pub fn from_fields(category: ObjectCategory, fields: &Map<String, Value>) -> SceneResult<Self> {
        let name = match fields.get("name") {
            Some(Value::String(name)) if !name.trim().is_empty() => name.clone(),
            _ => return Err(SceneError::validation("object requires a non-empty 'name'")),
        };

        let mut properties = match fields.get("properties") {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(props)) => props.clone(),
            Some(_) => {
                return Err(SceneError::validation(format!("'{}': properties must be an object", name)));
            }
        };

        // Pass-through attributes (color, intensity, model_path, ...)
        for (key, value) in fields {
            if !RESERVED_KEYS.contains(&key.as_str()) {
                properties.entry(key.clone()).or_insert_with(|| value.clone());
            }
        }

        let mut template = optional_string(fields, "template", &name)?;
        if template.is_none() && category == ObjectCategory::Model {
            template = ["model_path", "modelPath"]
                .iter()
                .find_map(|key| properties.get(*key).and_then(Value::as_str))
                .map(str::to_string);
        }

        Ok(Self {
            template,
            position: optional_vec3(fields, "position", &name)?,
            rotation: optional_vec3(fields, "rotation", &name)?,
            scale: optional_vec3(fields, "scale", &name)?,
            owner: optional_string(fields, "owner", &name)?,
            source: optional_string(fields, "source", &name)?,
            properties,
            name,
        })
    }

    /// Build the stored record, filling neutral defaults
    pub fn into_record(self, category: ObjectCategory, now: &str) -> ObjectRecord {
        let template = self
            .template
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| category.default_template().to_string());
        let scale = self.scale.unwrap_or(VEC3_ONE);

        ObjectRecord {
            collision_box: template::collision_box_for(category, &template, &scale),
            name: self.name,
            category,
            template,
            position: self.position.unwrap_or(VEC3_ZERO),
            rotation: self.rotation.unwrap_or(VEC3_ZERO),
            scale,
            owner: self.owner,
            properties: self.properties,
            last_move: None,
            last_rotate: None,
            created: now.to_string(),
            source: self.source,
        }
    }
}

/// Parse a transform field value as exactly three finite numbers
pub fn parse_vec3(field: &str, value: &Value) -> SceneResult<Vec3> {
    vec3_from_json(value).ok_or_else(|| {
        SceneError::validation(format!("'{}' must be an array of exactly 3 numbers, got {}", field, value))
    })
}

fn optional_vec3(fields: &Map<String, Value>, key: &str, name: &str) -> SceneResult<Option<Vec3>> {
    match fields.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => parse_vec3(key, value)
            .map(Some)
            .map_err(|e| SceneError::validation(format!("'{}': {}", name, e))),
    }
}

fn optional_string(fields: &Map<String, Value>, key: &str, name: &str) -> SceneResult<Option<String>> {
    match fields.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(SceneError::validation(format!("'{}': {} must be a string, got {}", name, key, other))),
    }
}
