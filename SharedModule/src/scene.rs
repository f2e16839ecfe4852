//! # Scene Snapshot
//!
//! A complete, self-contained copy of the scene: the four object maps
//! plus environment settings and metadata. Snapshots are what observers
//! receive on connect and after every structural change.

use serde::{Serialize, Deserialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::constants::SCHEMA_VERSION;
use crate::object::{ObjectCategory, ObjectRecord};
use crate::types::Vec3;

/// Board grid layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridSettings {
    /// "square" or "hex"
    #[serde(rename = "type")]
    pub grid_type: String,
    pub size: f64,
    pub width: u32,
    pub height: u32,
}

impl Default for GridSettings {
    fn default() -> Self {
        Self {
            grid_type: "square".to_string(),
            size: 1.0,
            width: 10,
            height: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmbientLight {
    /// RGB in 0.0..=1.0
    pub color: Vec3,
    pub intensity: f64,
}

impl Default for AmbientLight {
    fn default() -> Self {
        Self {
            color: [1.0, 1.0, 1.0],
            intensity: 0.4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShadowSettings {
    pub enabled: bool,
    #[serde(default = "default_shadow_resolution")]
    pub resolution: u32,
    #[serde(default)]
    pub softness: f64,
}

fn default_shadow_resolution() -> u32 {
    1024
}

impl Default for ShadowSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            resolution: default_shadow_resolution(),
            softness: 0.0,
        }
    }
}

/// The active camera configuration set with `set_camera`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Vec3>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<Vec3>,
    /// Orbit pitch in degrees
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "angleX")]
    pub angle_x: Option<f64>,
    /// Orbit yaw in degrees
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "angleY")]
    pub angle_y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fov: Option<f64>,
}

/// Bookkeeping attached to every snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneMetadata {
    /// RFC 3339 time of the last mutation
    pub last_modified: String,
    pub schema_version: u32,
}

impl SceneMetadata {
    pub fn new(now: &str) -> Self {
        Self {
            last_modified: now.to_string(),
            schema_version: SCHEMA_VERSION,
        }
    }
}

/// Environment-wide settings
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Environment {
    pub grid: GridSettings,
    pub ambient_light: AmbientLight,
    pub shadow_settings: ShadowSettings,
    #[serde(default)]
    pub camera: CameraSettings,
}

/// Partial environment update; absent fields leave the current value alone.
/// Accepts both camelCase and snake_case keys since state files are hand-edited.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentPatch {
    #[serde(default)]
    pub grid: Option<GridSettings>,
    #[serde(default, alias = "ambientLight", alias = "ambient_light")]
    pub ambient_light: Option<AmbientLight>,
    #[serde(default, alias = "shadowSettings", alias = "shadow_settings", alias = "shadows")]
    pub shadow_settings: Option<ShadowSettings>,
    #[serde(default)]
    pub camera: Option<CameraSettings>,
}

impl EnvironmentPatch {
    /// Read a patch out of a loose settings object, skipping keys that fail to parse
    pub fn from_settings(settings: &Map<String, Value>) -> Self {
        fn field<T: serde::de::DeserializeOwned>(settings: &Map<String, Value>, keys: &[&str]) -> Option<T> {
            keys.iter()
                .filter_map(|key| settings.get(*key))
                .find_map(|value| serde_json::from_value(value.clone()).ok())
        }

        Self {
            grid: field(settings, &["grid"]),
            ambient_light: field(settings, &["ambientLight", "ambient_light"]),
            shadow_settings: field(settings, &["shadowSettings", "shadow_settings", "shadows"]),
            camera: field(settings, &["camera"]),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.grid.is_none()
            && self.ambient_light.is_none()
            && self.shadow_settings.is_none()
            && self.camera.is_none()
    }
}

impl Environment {
    /// Apply a partial update
    pub fn apply(&mut self, patch: EnvironmentPatch) {
        if let Some(grid) = patch.grid {
            self.grid = grid;
        }
        if let Some(ambient) = patch.ambient_light {
            self.ambient_light = ambient;
        }
        if let Some(shadows) = patch.shadow_settings {
            self.shadow_settings = shadows;
        }
        if let Some(camera) = patch.camera {
            self.camera = camera;
        }
    }
}

/// Complete copy of the scene at one point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneSnapshot {
    pub entities: BTreeMap<String, ObjectRecord>,
    pub models: BTreeMap<String, ObjectRecord>,
    pub lights: BTreeMap<String, ObjectRecord>,
    pub cameras: BTreeMap<String, ObjectRecord>,
    pub grid: GridSettings,
    pub ambient_light: AmbientLight,
    pub shadow_settings: ShadowSettings,
    pub active_camera: CameraSettings,
    pub metadata: SceneMetadata,
}

impl SceneSnapshot {
    /// Empty scene with default environment
    pub fn empty(now: &str) -> Self {
        let environment = Environment::default();
        Self {
            entities: BTreeMap::new(),
            models: BTreeMap::new(),
            lights: BTreeMap::new(),
            cameras: BTreeMap::new(),
            grid: environment.grid,
            ambient_light: environment.ambient_light,
            shadow_settings: environment.shadow_settings,
            active_camera: environment.camera,
            metadata: SceneMetadata::new(now),
        }
    }

    /// Map holding the given category
    pub fn collection(&self, category: ObjectCategory) -> &BTreeMap<String, ObjectRecord> {
        match category {
            ObjectCategory::Entity => &self.entities,
            ObjectCategory::Model => &self.models,
            ObjectCategory::Light => &self.lights,
            ObjectCategory::Camera => &self.cameras,
        }
    }

    /// Total number of objects across all categories
    pub fn object_count(&self) -> usize {
        self.entities.len() + self.models.len() + self.lights.len() + self.cameras.len()
    }
}
