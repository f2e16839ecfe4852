//! # State Store
//!
//! Owns the canonical in-memory scene: four disjoint object maps (entities,
//! models, lights, cameras), environment settings and metadata. Every
//! mutation of the live scene, whether it comes from a controller command or
//! from reconciling the external state file, goes through this type.
//!
//! Collision checks run on every move but are advisory: overlaps and
//! off-surface placements are recorded in `lastMove` and logged, and the move
//! is applied regardless.

use log::{debug, info, warn};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use tabletop_shared::{
    Environment, EnvironmentPatch, ObjectCategory, ObjectRecord, SceneMetadata, SceneSnapshot,
    SurfaceBounds, TransformHistory, Vec3, VEC3_ONE, VEC3_ZERO,
};

use crate::clock::now_rfc3339;
use crate::collision::{self, PlacementReport};
use crate::error::{SceneError, SceneResult};
use crate::object::{parse_vec3, template, ObjectSpec};

pub mod index;

use index::NameIndex;

/// Result of a committed move
#[derive(Debug, Clone, PartialEq)]
pub struct MoveOutcome {
    pub from: Vec3,
    pub to: Vec3,
    pub collisions: Vec<String>,
    pub on_surface: bool,
}

/// Result of a committed rotation
#[derive(Debug, Clone, PartialEq)]
pub struct RotateOutcome {
    pub from: Vec3,
    pub to: Vec3,
}

/// One validated field of a merge update
#[derive(Debug, Clone)]
enum FieldUpdate {
    Position(Vec3),
    Rotation(Vec3),
    Scale(Vec3),
    Template(Option<String>),
    Owner(Option<String>),
    Source(Option<String>),
    Properties(Map<String, Value>),
    Property(String, Value),
}

/// The authoritative scene
#[derive(Debug, Clone)]
pub struct StateStore {
    entities: BTreeMap<String, ObjectRecord>,
    models: BTreeMap<String, ObjectRecord>,
    lights: BTreeMap<String, ObjectRecord>,
    cameras: BTreeMap<String, ObjectRecord>,
    index: NameIndex,
    environment: Environment,
    metadata: SceneMetadata,
    surface: Option<SurfaceBounds>,
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new(Some(SurfaceBounds::default()))
    }
}

impl StateStore {
    /// Empty scene resting on the given surface (`None` for unbounded)
    pub fn new(surface: Option<SurfaceBounds>) -> Self {
        Self {
            entities: BTreeMap::new(),
            models: BTreeMap::new(),
            lights: BTreeMap::new(),
            cameras: BTreeMap::new(),
            index: NameIndex::new(),
            environment: Environment::default(),
            metadata: SceneMetadata::new(&now_rfc3339()),
            surface,
        }
    }

    pub fn surface(&self) -> Option<&SurfaceBounds> {
        self.surface.as_ref()
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    pub fn metadata(&self) -> &SceneMetadata {
        &self.metadata
    }

    /// Total number of objects across all categories
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.resolve(name).is_some()
    }

    /// Category currently holding `name`
    pub fn category_of(&self, name: &str) -> Option<ObjectCategory> {
        self.index.resolve(name)
    }

    /// Look up any object by bare name
    pub fn get(&self, name: &str) -> Option<&ObjectRecord> {
        let category = self.index.resolve(name)?;
        self.collection(category).get(name)
    }

    /// All objects of one category, in name order
    pub fn collection(&self, category: ObjectCategory) -> &BTreeMap<String, ObjectRecord> {
        match category {
            ObjectCategory::Entity => &self.entities,
            ObjectCategory::Model => &self.models,
            ObjectCategory::Light => &self.lights,
            ObjectCategory::Camera => &self.cameras,
        }
    }

    fn collection_mut(&mut self, category: ObjectCategory) -> &mut BTreeMap<String, ObjectRecord> {
        match category {
            ObjectCategory::Entity => &mut self.entities,
            ObjectCategory::Model => &mut self.models,
            ObjectCategory::Light => &mut self.lights,
            ObjectCategory::Camera => &mut self.cameras,
        }
    }

    /// Every object, category by category in search order
    pub fn objects(&self) -> impl Iterator<Item = &ObjectRecord> {
        ObjectCategory::SEARCH_ORDER
            .into_iter()
            .flat_map(move |category| self.collection(category).values())
    }

    fn record_mut(&mut self, name: &str) -> SceneResult<&mut ObjectRecord> {
        let category = self
            .index
            .resolve(name)
            .ok_or_else(|| SceneError::NotFound(name.to_string()))?;
        self.collection_mut(category)
            .get_mut(name)
            .ok_or_else(|| SceneError::NotFound(name.to_string()))
    }

    fn touch(&mut self) {
        self.metadata.last_modified = now_rfc3339();
    }

    /// Create an object in `category`. Fails if the name exists in any category.
    pub fn create(&mut self, category: ObjectCategory, spec: ObjectSpec) -> SceneResult<ObjectRecord> {
        if spec.name.trim().is_empty() {
            return Err(SceneError::validation("object requires a non-empty 'name'"));
        }
        self.index.claim(&spec.name, category)?;

        let record = spec.into_record(category, &now_rfc3339());
        if category.is_physical() && !template::is_known_template(&record.template) {
            debug!("Template '{}' has no base box; using the unit box", record.template);
        }
        info!(
            "Created {} '{}' (template={}) at {:?}",
            category, record.name, record.template, record.position
        );
        self.collection_mut(category).insert(record.name.clone(), record.clone());
        self.touch();

        Ok(record)
    }

    pub fn create_entity(&mut self, spec: ObjectSpec) -> SceneResult<ObjectRecord> {
        self.create(ObjectCategory::Entity, spec)
    }

    /// Check a hypothetical placement of `name` without moving it
    pub fn check_placement(&self, name: &str, position: &Vec3) -> SceneResult<PlacementReport> {
        let subject = self.get(name).ok_or_else(|| SceneError::NotFound(name.to_string()))?;
        Ok(collision::check_placement(
            name,
            position,
            subject.collision_box.as_ref(),
            self.objects(),
            self.surface.as_ref(),
        ))
    }

    /// Nearest clear position around `preferred`, if any within `search_radius`
    pub fn find_safe_position(&self, name: &str, preferred: &Vec3, search_radius: f64) -> SceneResult<Option<Vec3>> {
        for candidate in collision::search_candidates(preferred, search_radius) {
            if self.check_placement(name, &candidate)?.is_clear() {
                return Ok(Some(candidate));
            }
        }
        debug!("No safe position for '{}' within {} of {:?}", name, search_radius, preferred);
        Ok(None)
    }

    /// Move an object. Collisions and off-surface results are recorded, not enforced.
    pub fn move_object(&mut self, name: &str, to: Vec3, animate: bool) -> SceneResult<MoveOutcome> {
        let report = self.check_placement(name, &to)?;

        if !report.collisions.is_empty() {
            warn!("Moving '{}' to {:?} overlaps: {:?}", name, to, report.collisions);
        }
        if !report.on_surface {
            warn!("Moving '{}' to {:?} leaves the table surface", name, to);
        }

        let record = self.record_mut(name)?;
        let from = record.position;
        record.position = to;
        record.last_move = Some(TransformHistory {
            from,
            to,
            animate,
            collisions: report.collisions.clone(),
            on_surface: report.on_surface,
            timestamp: now_rfc3339(),
        });
        info!("Moved '{}' from {:?} to {:?} (animate={})", name, from, to, animate);
        self.touch();

        Ok(MoveOutcome {
            from,
            to,
            collisions: report.collisions,
            on_surface: report.on_surface,
        })
    }

    /// Rotate an object to `to` (degrees around x, y, z)
    pub fn rotate_object(&mut self, name: &str, to: Vec3, animate: bool) -> SceneResult<RotateOutcome> {
        let on_surface = {
            let record = self.get(name).ok_or_else(|| SceneError::NotFound(name.to_string()))?;
            collision::within_bounds(&record.position, self.surface.as_ref())
        };

        let record = self.record_mut(name)?;
        let from = record.rotation;
        record.rotation = to;
        record.last_rotate = Some(TransformHistory {
            from,
            to,
            animate,
            collisions: Vec::new(),
            on_surface,
            timestamp: now_rfc3339(),
        });
        info!("Rotated '{}' from {:?} to {:?} (animate={})", name, from, to, animate);
        self.touch();

        Ok(RotateOutcome { from, to })
    }

    /// Remove an object from whichever category holds it
    pub fn delete_object(&mut self, name: &str) -> SceneResult<ObjectRecord> {
        let category = self
            .index
            .release(name)
            .ok_or_else(|| SceneError::NotFound(name.to_string()))?;
        let record = self
            .collection_mut(category)
            .remove(name)
            .ok_or_else(|| SceneError::NotFound(name.to_string()))?;

        info!("Deleted {} '{}'", category, name);
        self.touch();
        Ok(record)
    }

    /// Remove every object. Idempotent; returns how many were removed.
    pub fn clear_all(&mut self) -> usize {
        let removed = self.index.len();
        self.entities.clear();
        self.models.clear();
        self.lights.clear();
        self.cameras.clear();
        self.index.clear();

        if removed > 0 {
            info!("Cleared {} objects from the scene", removed);
            self.touch();
        }
        removed
    }

    /// Remove every object except those whose name equals or starts with
    /// one of `keep`
    pub fn clear_except(&mut self, keep: &[String]) -> usize {
        if keep.is_empty() {
            return self.clear_all();
        }

        let doomed: Vec<String> = self
            .objects()
            .map(|record| record.name.clone())
            .filter(|name| !keep.iter().any(|k| name == k || name.starts_with(k.as_str())))
            .collect();

        let mut removed = 0;
        for name in doomed {
            if self.delete_object(&name).is_ok() {
                removed += 1;
            }
        }
        removed
    }

    /// Merge `fields` into an existing object. Fields not mentioned are
    /// preserved. Every field is validated before anything is changed.
    /// Returns the fields that were applied.
    pub fn apply_fields(
        &mut self,
        name: &str,
        fields: &Map<String, Value>,
        animate: bool,
    ) -> SceneResult<Map<String, Value>> {
        if !self.contains(name) {
            return Err(SceneError::NotFound(name.to_string()));
        }

        let mut updates = Vec::with_capacity(fields.len());
        let mut applied = Map::new();
        for (field, value) in fields {
            if let Some(update) = parse_field(field, value)? {
                updates.push(update);
                applied.insert(field.clone(), value.clone());
            }
        }

        for update in updates {
            match update {
                FieldUpdate::Position(to) => {
                    self.move_object(name, to, animate)?;
                }
                FieldUpdate::Rotation(to) => {
                    self.rotate_object(name, to, animate)?;
                }
                FieldUpdate::Scale(scale) => {
                    let record = self.record_mut(name)?;
                    record.scale = scale;
                    record.collision_box = template::collision_box_for(record.category, &record.template, &scale);
                }
                FieldUpdate::Template(new_template) => {
                    let record = self.record_mut(name)?;
                    let category = record.category;
                    record.template = new_template
                        .filter(|t| !t.trim().is_empty())
                        .unwrap_or_else(|| category.default_template().to_string());
                    record.collision_box =
                        template::collision_box_for(record.category, &record.template, &record.scale);
                }
                FieldUpdate::Owner(owner) => self.record_mut(name)?.owner = owner,
                FieldUpdate::Source(source) => self.record_mut(name)?.source = source,
                FieldUpdate::Properties(properties) => self.record_mut(name)?.properties = properties,
                FieldUpdate::Property(key, Value::Null) => {
                    self.record_mut(name)?.properties.remove(&key);
                }
                FieldUpdate::Property(key, value) => {
                    self.record_mut(name)?.properties.insert(key, value);
                }
            }
        }

        if !applied.is_empty() {
            debug!("Updated '{}' fields: {:?}", name, applied.keys().collect::<Vec<_>>());
            self.touch();
        }
        Ok(applied)
    }

    /// Replace every camera with the given block (name -> record). Each entry
    /// is created independently; failures are returned alongside the count
    /// of cameras created.
    pub fn replace_cameras(&mut self, block: &Map<String, Value>, source: &str) -> (usize, Vec<(String, SceneError)>) {
        let existing: Vec<String> = self.cameras.keys().cloned().collect();
        for name in existing {
            self.index.release(&name);
            self.cameras.remove(&name);
        }

        let mut created = 0;
        let mut failures = Vec::new();
        for (key, value) in block {
            let result = camera_fields(key, value)
                .and_then(|fields| ObjectSpec::from_fields(ObjectCategory::Camera, &fields))
                .and_then(|spec| self.create(ObjectCategory::Camera, spec.with_source(source)));
            match result {
                Ok(_) => created += 1,
                Err(err) => failures.push((key.clone(), err)),
            }
        }

        self.touch();
        (created, failures)
    }

    /// Apply a partial environment update
    pub fn apply_environment(&mut self, patch: EnvironmentPatch) {
        if patch.is_empty() {
            return;
        }
        self.environment.apply(patch);
        self.touch();
    }

    /// Deep copy of the whole scene
    pub fn snapshot(&self) -> SceneSnapshot {
        SceneSnapshot {
            entities: self.entities.clone(),
            models: self.models.clone(),
            lights: self.lights.clone(),
            cameras: self.cameras.clone(),
            grid: self.environment.grid.clone(),
            ambient_light: self.environment.ambient_light.clone(),
            shadow_settings: self.environment.shadow_settings.clone(),
            active_camera: self.environment.camera.clone(),
            metadata: self.metadata.clone(),
        }
    }
}

/// Camera block entries may omit `name`; the key stands in for it
fn camera_fields(key: &str, value: &Value) -> SceneResult<Map<String, Value>> {
    let mut fields = value
        .as_object()
        .cloned()
        .ok_or_else(|| SceneError::validation(format!("camera '{}' must be an object", key)))?;
    fields
        .entry("name".to_string())
        .or_insert_with(|| Value::String(key.to_string()));
    Ok(fields)
}

fn optional_string_field(field: &str, value: &Value) -> SceneResult<Option<String>> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s.clone())),
        other => Err(SceneError::validation(format!("'{}' must be a string, got {}", field, other))),
    }
}

/// Validate one field of a merge update. Identity and derived fields are skipped.
fn parse_field(field: &str, value: &Value) -> SceneResult<Option<FieldUpdate>> {
    let update = match field {
        "name" | "category" | "created" | "collisionBox" | "collision_box" | "lastMove" | "lastRotate" => {
            return Ok(None);
        }
        "position" if value.is_null() => FieldUpdate::Position(VEC3_ZERO),
        "position" => FieldUpdate::Position(parse_vec3(field, value)?),
        "rotation" if value.is_null() => FieldUpdate::Rotation(VEC3_ZERO),
        "rotation" => FieldUpdate::Rotation(parse_vec3(field, value)?),
        "scale" if value.is_null() => FieldUpdate::Scale(VEC3_ONE),
        "scale" => FieldUpdate::Scale(parse_vec3(field, value)?),
        "template" => FieldUpdate::Template(optional_string_field(field, value)?),
        "owner" => FieldUpdate::Owner(optional_string_field(field, value)?),
        "source" => FieldUpdate::Source(optional_string_field(field, value)?),
        "properties" => match value {
            Value::Null => FieldUpdate::Properties(Map::new()),
            Value::Object(props) => FieldUpdate::Properties(props.clone()),
            other => {
                return Err(SceneError::validation(format!("'properties' must be an object, got {}", other)));
            }
        },
        _ => FieldUpdate::Property(field.to_string(), value.clone()),
    };
    Ok(Some(update))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tabletop_shared::CollisionBox;

    fn store() -> StateStore {
        StateStore::new(Some(SurfaceBounds::default()))
    }

    fn cube(name: &str, position: Vec3) -> ObjectSpec {
        ObjectSpec::new(name).with_template("cube").with_position(position)
    }

    #[test]
    fn duplicate_name_rejected_across_categories() {
        let mut store = store();
        store.create(ObjectCategory::Light, ObjectSpec::new("lamp")).unwrap();
        let original = store.get("lamp").cloned().unwrap();

        let err = store.create_entity(cube("lamp", [1.0, 0.5, 1.0])).unwrap_err();
        assert!(matches!(err, SceneError::DuplicateName { .. }));
        assert_eq!(store.get("lamp"), Some(&original));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn create_then_lookup_round_trips() {
        let mut store = store();
        let spec = cube("cube_1", [0.0, 0.5, 0.0])
            .with_owner("dm")
            .with_property("color", json!([1, 0, 0]));
        let created = store.create_entity(spec).unwrap();

        let found = store.get("cube_1").unwrap();
        assert_eq!(found, &created);
        assert_eq!(found.position, [0.0, 0.5, 0.0]);
        assert_eq!(found.rotation, VEC3_ZERO);
        assert_eq!(found.scale, VEC3_ONE);
        assert_eq!(found.owner.as_deref(), Some("dm"));
        assert_eq!(found.properties["color"], json!([1, 0, 0]));
        assert_eq!(found.collision_box, Some(CollisionBox::unit()));
        assert!(!found.created.is_empty());
    }

    #[test]
    fn move_into_another_box_is_advisory() {
        let mut store = store();
        store.create_entity(cube("cube_1", [3.0, 0.5, 0.0])).unwrap();
        store.create_entity(cube("cube_2", [0.0, 0.5, 0.0])).unwrap();

        let outcome = store.move_object("cube_1", [0.0, 0.5, 0.3], true).unwrap();
        assert_eq!(outcome.collisions, vec!["cube_2".to_string()]);
        assert!(outcome.on_surface);

        let moved = store.get("cube_1").unwrap();
        assert_eq!(moved.position, [0.0, 0.5, 0.3]);
        let last_move = moved.last_move.as_ref().unwrap();
        assert_eq!(last_move.from, [3.0, 0.5, 0.0]);
        assert_eq!(last_move.collisions, vec!["cube_2".to_string()]);
        assert!(last_move.animate);
    }

    #[test]
    fn move_off_table_still_applies() {
        let mut store = store();
        store.create_entity(cube("cube_1", [0.0, 0.5, 0.0])).unwrap();

        let outcome = store.move_object("cube_1", [15.0, 0.5, 15.0], false).unwrap();
        assert!(!outcome.on_surface);
        assert_eq!(store.get("cube_1").unwrap().position, [15.0, 0.5, 15.0]);
    }

    #[test]
    fn unknown_names_are_not_found() {
        let mut store = store();
        assert!(matches!(store.move_object("ghost", VEC3_ZERO, true), Err(SceneError::NotFound(_))));
        assert!(matches!(store.rotate_object("ghost", VEC3_ZERO, true), Err(SceneError::NotFound(_))));
        assert!(matches!(store.delete_object("ghost"), Err(SceneError::NotFound(_))));
    }

    #[test]
    fn rotate_records_history() {
        let mut store = store();
        store.create_entity(cube("cube_1", [0.0, 0.5, 0.0])).unwrap();

        let outcome = store.rotate_object("cube_1", [0.0, 45.0, 0.0], true).unwrap();
        assert_eq!(outcome.from, VEC3_ZERO);
        let record = store.get("cube_1").unwrap();
        assert_eq!(record.rotation, [0.0, 45.0, 0.0]);
        assert_eq!(record.last_rotate.as_ref().unwrap().to, [0.0, 45.0, 0.0]);
    }

    #[test]
    fn delete_frees_the_name() {
        let mut store = store();
        store.create_entity(cube("a", VEC3_ZERO)).unwrap();
        store.delete_object("a").unwrap();
        assert!(!store.contains("a"));
        store.create(ObjectCategory::Model, ObjectSpec::new("a")).unwrap();
        assert_eq!(store.category_of("a"), Some(ObjectCategory::Model));
    }

    #[test]
    fn clear_all_is_idempotent() {
        let mut store = store();
        store.create_entity(cube("a", VEC3_ZERO)).unwrap();
        store.create(ObjectCategory::Light, ObjectSpec::new("sun")).unwrap();

        assert_eq!(store.clear_all(), 2);
        assert_eq!(store.clear_all(), 0);
        assert!(store.is_empty());
    }

    #[test]
    fn clear_except_keeps_prefixes() {
        let mut store = store();
        for name in ["cam_main", "env_floor", "mini_orc", "prop_chest"] {
            store.create_entity(ObjectSpec::new(name)).unwrap();
        }
        let removed = store.clear_except(&["cam_".to_string(), "env_floor".to_string()]);
        assert_eq!(removed, 2);
        assert!(store.contains("cam_main"));
        assert!(store.contains("env_floor"));
    }

    #[test]
    fn merge_update_preserves_unmentioned_fields() {
        let mut store = store();
        store
            .create_entity(cube("a", [0.0, 0.5, 0.0]).with_owner("p1").with_property("color", json!("red")))
            .unwrap();

        let fields = json!({"scale": [2, 1, 1], "color": "blue"});
        let applied = store.apply_fields("a", fields.as_object().unwrap(), true).unwrap();
        assert_eq!(applied.len(), 2);

        let record = store.get("a").unwrap();
        assert_eq!(record.owner.as_deref(), Some("p1"));
        assert_eq!(record.position, [0.0, 0.5, 0.0]);
        assert_eq!(record.properties["color"], json!("blue"));
        assert_eq!(record.collision_box, Some(CollisionBox::new(2.0, 1.0, 1.0)));
    }

    #[test]
    fn merge_update_is_all_or_nothing() {
        let mut store = store();
        store.create_entity(cube("a", [0.0, 0.5, 0.0])).unwrap();

        let fields = json!({"owner": "p2", "rotation": [1, 2]});
        assert!(store.apply_fields("a", fields.as_object().unwrap(), false).is_err());
        assert_eq!(store.get("a").unwrap().owner, None);
    }

    #[test]
    fn find_safe_position_skips_occupied_spot() {
        let mut store = store();
        store.create_entity(cube("blocker", [0.0, 0.5, 0.0])).unwrap();
        store.create_entity(cube("mover", [5.0, 0.5, 5.0])).unwrap();

        let found = store.find_safe_position("mover", &[0.0, 0.5, 0.0], 2.0).unwrap().unwrap();
        assert_ne!(found, [0.0, 0.5, 0.0]);
        assert!(store.check_placement("mover", &found).unwrap().is_clear());
    }

    #[test]
    fn snapshot_is_independent_copy() {
        let mut store = store();
        store.create_entity(cube("a", VEC3_ZERO)).unwrap();
        let snapshot = store.snapshot();

        store.move_object("a", [1.0, 0.0, 1.0], false).unwrap();
        assert_eq!(snapshot.entities["a"].position, VEC3_ZERO);
    }

    #[test]
    fn replace_cameras_swaps_the_whole_block() {
        let mut store = store();
        store.create(ObjectCategory::Camera, ObjectSpec::new("old_cam")).unwrap();

        let block = json!({"main": {"position": [0, 10, 10]}, "bad": 3});
        let (created, failures) = store.replace_cameras(block.as_object().unwrap(), "external");
        assert_eq!(created, 1);
        assert_eq!(failures.len(), 1);
        assert!(!store.contains("old_cam"));
        assert_eq!(store.get("main").unwrap().position, [0.0, 10.0, 10.0]);
    }
}
