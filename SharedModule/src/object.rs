//! # Shared Object System
//!
//! The object record used for every named thing in the scene. Entities,
//! models, lights and cameras all share this shape; the category only
//! changes how defaults are filled in.

use serde::{Serialize, Deserialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::types::{CollisionBox, Vec3, VEC3_ONE, VEC3_ZERO};

/// Which of the four disjoint scene maps an object lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectCategory {
    /// Interactive pieces (minis, props, dice, tiles)
    Entity,

    /// Static models loaded from an asset
    Model,

    /// Scene lights
    Light,

    /// Scene cameras
    Camera,
}

impl ObjectCategory {
    /// Resolution order used when a bare name has to be looked up
    pub const SEARCH_ORDER: [ObjectCategory; 4] = [
        ObjectCategory::Entity,
        ObjectCategory::Model,
        ObjectCategory::Light,
        ObjectCategory::Camera,
    ];

    /// Whether objects of this category take part in collision checks
    pub fn is_physical(&self) -> bool {
        matches!(self, Self::Entity | Self::Model)
    }

    /// Template used when the creator does not name one
    pub fn default_template(&self) -> &'static str {
        match self {
            Self::Entity => "cube",
            Self::Model => "model",
            Self::Light => "point_light",
            Self::Camera => "camera",
        }
    }

    /// Key of this category's map in snapshots and state files
    pub fn collection_key(&self) -> &'static str {
        match self {
            Self::Entity => "entities",
            Self::Model => "models",
            Self::Light => "lights",
            Self::Camera => "cameras",
        }
    }
}

impl fmt::Display for ObjectCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Entity => "entity",
            Self::Model => "model",
            Self::Light => "light",
            Self::Camera => "camera",
        };
        f.write_str(name)
    }
}

/// Last move or rotate applied to an object, kept for animation playback
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformHistory {
    pub from: Vec3,
    pub to: Vec3,

    /// Whether the renderer should interpolate instead of snapping
    pub animate: bool,

    /// Names of objects overlapping the destination
    #[serde(default)]
    pub collisions: Vec<String>,

    /// Whether the destination sits on the table surface
    #[serde(default = "default_true")]
    pub on_surface: bool,

    /// RFC 3339 time the change was applied
    pub timestamp: String,
}

fn default_true() -> bool {
    true
}

/// A named object in the scene
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectRecord {
    /// Globally unique name
    pub name: String,

    pub category: ObjectCategory,

    /// Template (shape or asset) the object was built from
    pub template: String,

    pub position: Vec3,

    /// Rotation in degrees around x, y, z
    pub rotation: Vec3,

    pub scale: Vec3,

    /// Derived from template and scale; absent for non-physical objects
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collision_box: Option<CollisionBox>,

    /// Owning player / DM / neutral / system tag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,

    /// Opaque attributes passed through to renderers
    #[serde(default)]
    pub properties: Map<String, Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_move: Option<TransformHistory>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_rotate: Option<TransformHistory>,

    /// RFC 3339 creation time
    pub created: String,

    /// Where the object came from ("command", "external", ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl ObjectRecord {
    /// Build a record with neutral transform values
    pub fn new(name: &str, category: ObjectCategory, created: &str) -> Self {
        Self {
            name: name.to_string(),
            category,
            template: category.default_template().to_string(),
            position: VEC3_ZERO,
            rotation: VEC3_ZERO,
            scale: VEC3_ONE,
            collision_box: None,
            owner: None,
            properties: Map::new(),
            last_move: None,
            last_rotate: None,
            created: created.to_string(),
            source: None,
        }
    }

    /// Whether this object participates in collision checks
    pub fn is_physical(&self) -> bool {
        self.collision_box.is_some()
    }
}
