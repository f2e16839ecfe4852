//! # Command Handlers
//!
//! One function per action. Handlers validate their payload before touching
//! the store, run with the store lock held, and return the messages to send
//! once the lock is released.

use log::info;
use serde_json::{json, Map, Value};

use tabletop_shared::message::message_type;
use tabletop_shared::scene::CameraSettings;
use tabletop_shared::{BroadcastEnvelope, EnvironmentPatch, ObjectCategory, Vec3};

use crate::clock::now_millis;
use crate::connection::snapshot_message;
use crate::error::{SceneError, SceneResult};
use crate::object::{parse_vec3, ObjectSpec};
use crate::state::StateStore;

use super::{CommandOptions, CommandOutcome};

/// Source tag stamped on objects created by live commands
const COMMAND_SOURCE: &str = "command";

/// Search radius used by `find_safe_position` when none is given
const DEFAULT_SEARCH_RADIUS: f64 = 2.0;

fn payload(data: &Value) -> SceneResult<&Map<String, Value>> {
    data.as_object()
        .ok_or_else(|| SceneError::validation("command data must be a JSON object"))
}

fn required_name(fields: &Map<String, Value>) -> SceneResult<&str> {
    match fields.get("name").and_then(Value::as_str) {
        Some(name) if !name.trim().is_empty() => Ok(name),
        _ => Err(SceneError::validation("'name' is required")),
    }
}

/// First of `keys` present in the payload, as a vector
fn vec3_arg(fields: &Map<String, Value>, keys: &[&str]) -> SceneResult<Vec3> {
    keys.iter()
        .find_map(|key| fields.get(*key).map(|value| parse_vec3(key, value)))
        .unwrap_or_else(|| Err(SceneError::validation(format!("'{}' is required", keys[0]))))
}

fn animate_flag(fields: &Map<String, Value>) -> bool {
    fields.get("animate").and_then(Value::as_bool).unwrap_or(true)
}

fn optional_number(fields: &Map<String, Value>, key: &str) -> SceneResult<Option<f64>> {
    match fields.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_f64()
            .map(Some)
            .ok_or_else(|| SceneError::validation(format!("'{}' must be a number", key))),
    }
}

fn optional_count(fields: &Map<String, Value>, key: &str) -> SceneResult<Option<u32>> {
    match fields.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| SceneError::validation(format!("'{}' must be a non-negative integer", key))),
    }
}

fn full_state_update(store: &StateStore) -> SceneResult<CommandOutcome> {
    Ok(CommandOutcome::broadcast(snapshot_message(store, message_type::GAME_STATE_UPDATE)?))
}

fn create_in(category: ObjectCategory, store: &mut StateStore, data: &Value) -> SceneResult<CommandOutcome> {
    let mut spec = ObjectSpec::from_value(category, data)?;
    spec.source.get_or_insert_with(|| COMMAND_SOURCE.to_string());
    store.create(category, spec)?;
    full_state_update(store)
}

pub fn create_entity(store: &mut StateStore, data: &Value, _options: &CommandOptions) -> SceneResult<CommandOutcome> {
    create_in(ObjectCategory::Entity, store, data)
}

pub fn create_model(store: &mut StateStore, data: &Value, _options: &CommandOptions) -> SceneResult<CommandOutcome> {
    create_in(ObjectCategory::Model, store, data)
}

pub fn create_light(store: &mut StateStore, data: &Value, _options: &CommandOptions) -> SceneResult<CommandOutcome> {
    create_in(ObjectCategory::Light, store, data)
}

pub fn create_camera(store: &mut StateStore, data: &Value, _options: &CommandOptions) -> SceneResult<CommandOutcome> {
    create_in(ObjectCategory::Camera, store, data)
}

pub fn move_entity(store: &mut StateStore, data: &Value, _options: &CommandOptions) -> SceneResult<CommandOutcome> {
    let fields = payload(data)?;
    let name = required_name(fields)?;
    let to = vec3_arg(fields, &["to", "position"])?;

    store.move_object(name, to, animate_flag(fields))?;
    full_state_update(store)
}

pub fn rotate_entity(store: &mut StateStore, data: &Value, _options: &CommandOptions) -> SceneResult<CommandOutcome> {
    let fields = payload(data)?;
    let name = required_name(fields)?;
    let to = vec3_arg(fields, &["to", "rotation"])?;

    store.rotate_object(name, to, animate_flag(fields))?;
    full_state_update(store)
}

pub fn delete_entity(store: &mut StateStore, data: &Value, _options: &CommandOptions) -> SceneResult<CommandOutcome> {
    let name = required_name(payload(data)?)?;
    store.delete_object(name)?;
    full_state_update(store)
}

/// Merge update of selected fields, broadcast as a targeted property update
pub fn update_entity(store: &mut StateStore, data: &Value, options: &CommandOptions) -> SceneResult<CommandOutcome> {
    let fields = payload(data)?;
    let name = required_name(fields)?;
    let changes = fields
        .get("changes")
        .and_then(Value::as_object)
        .ok_or_else(|| SceneError::validation("'changes' must be an object"))?;
    let animate = animate_flag(fields);

    let applied = store.apply_fields(name, changes, animate)?;
    if applied.is_empty() {
        return Ok(CommandOutcome::none());
    }

    Ok(CommandOutcome::broadcast(BroadcastEnvelope::property_update(
        name,
        &applied,
        animate,
        options.animation_duration_ms,
        now_millis(),
    )))
}

pub fn get_entities(store: &mut StateStore, _data: &Value, _options: &CommandOptions) -> SceneResult<CommandOutcome> {
    let entities = serde_json::to_value(store.collection(ObjectCategory::Entity))?;
    Ok(CommandOutcome::reply(BroadcastEnvelope::new(message_type::ENTITIES, entities, now_millis())))
}

pub fn get_game_state(store: &mut StateStore, _data: &Value, _options: &CommandOptions) -> SceneResult<CommandOutcome> {
    Ok(CommandOutcome::reply(snapshot_message(store, message_type::GAME_STATE)?))
}

/// Replace the active camera configuration
pub fn set_camera(store: &mut StateStore, data: &Value, _options: &CommandOptions) -> SceneResult<CommandOutcome> {
    let settings: CameraSettings = serde_json::from_value(data.clone())
        .map_err(|e| SceneError::validation(format!("invalid camera settings: {}", e)))?;
    let message_data = serde_json::to_value(&settings)?;

    store.apply_environment(EnvironmentPatch {
        camera: Some(settings),
        ..EnvironmentPatch::default()
    });
    info!("Camera updated: {}", message_data);

    Ok(CommandOutcome::broadcast(BroadcastEnvelope::new(
        message_type::CAMERA_UPDATE,
        message_data,
        now_millis(),
    )))
}

pub fn set_ambient_light(store: &mut StateStore, data: &Value, _options: &CommandOptions) -> SceneResult<CommandOutcome> {
    let fields = payload(data)?;
    let mut ambient = store.environment().ambient_light.clone();

    if let Some(color) = fields.get("color") {
        ambient.color = parse_vec3("color", color)?;
    }
    if let Some(intensity) = optional_number(fields, "intensity")? {
        ambient.intensity = intensity;
    }

    store.apply_environment(EnvironmentPatch {
        ambient_light: Some(ambient),
        ..EnvironmentPatch::default()
    });
    full_state_update(store)
}

pub fn enable_shadows(store: &mut StateStore, data: &Value, _options: &CommandOptions) -> SceneResult<CommandOutcome> {
    let fields = payload(data)?;
    let mut shadows = store.environment().shadow_settings.clone();

    shadows.enabled = match fields.get("enabled") {
        None | Some(Value::Null) => true,
        Some(Value::Bool(enabled)) => *enabled,
        Some(_) => return Err(SceneError::validation("'enabled' must be a boolean")),
    };
    if let Some(resolution) = optional_count(fields, "resolution")? {
        shadows.resolution = resolution;
    }
    if let Some(softness) = optional_number(fields, "softness")? {
        shadows.softness = softness;
    }

    store.apply_environment(EnvironmentPatch {
        shadow_settings: Some(shadows),
        ..EnvironmentPatch::default()
    });
    full_state_update(store)
}

/// Set the board grid; fields not given keep their current values
pub fn setup_board(store: &mut StateStore, data: &Value, _options: &CommandOptions) -> SceneResult<CommandOutcome> {
    let fields = payload(data)?;
    let mut grid = store.environment().grid.clone();

    if let Some(grid_type) = fields.get("type") {
        match grid_type.as_str() {
            Some(t @ ("square" | "hex")) => grid.grid_type = t.to_string(),
            _ => return Err(SceneError::validation("'type' must be \"square\" or \"hex\"")),
        }
    }
    if let Some(size) = optional_number(fields, "size")? {
        if size <= 0.0 {
            return Err(SceneError::validation("'size' must be positive"));
        }
        grid.size = size;
    }
    if let Some(width) = optional_count(fields, "width")? {
        grid.width = width;
    }
    if let Some(height) = optional_count(fields, "height")? {
        grid.height = height;
    }

    store.apply_environment(EnvironmentPatch {
        grid: Some(grid),
        ..EnvironmentPatch::default()
    });
    full_state_update(store)
}

/// Remove everything except names matching the optional `exclude` list
pub fn clear_scene(store: &mut StateStore, data: &Value, _options: &CommandOptions) -> SceneResult<CommandOutcome> {
    let keep: Vec<String> = match data.get("exclude") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| SceneError::validation("'exclude' must be a list of strings"))
            })
            .collect::<SceneResult<_>>()?,
        Some(_) => return Err(SceneError::validation("'exclude' must be a list of strings")),
    };

    let removed = store.clear_except(&keep);
    let mut outcome = full_state_update(store)?;
    outcome.reply = Some(BroadcastEnvelope::new(
        message_type::SCENE_CLEARED,
        json!({ "removed": removed }),
        now_millis(),
    ));
    Ok(outcome)
}

/// Hypothetical placement check; nothing moves
pub fn check_collisions(store: &mut StateStore, data: &Value, _options: &CommandOptions) -> SceneResult<CommandOutcome> {
    let fields = payload(data)?;
    let name = required_name(fields)?;
    let position = vec3_arg(fields, &["position", "to"])?;

    let report = store.check_placement(name, &position)?;
    Ok(CommandOutcome::reply(BroadcastEnvelope::new(
        message_type::COLLISION_CHECK,
        json!({
            "name": name,
            "position": position,
            "collisions": report.collisions,
            "onTable": report.on_surface,
        }),
        now_millis(),
    )))
}

pub fn find_safe_position(store: &mut StateStore, data: &Value, _options: &CommandOptions) -> SceneResult<CommandOutcome> {
    let fields = payload(data)?;
    let name = required_name(fields)?;
    let preferred = vec3_arg(fields, &["position", "to"])?;
    let radius = optional_number(fields, "search_radius")?.unwrap_or(DEFAULT_SEARCH_RADIUS);

    let found = store.find_safe_position(name, &preferred, radius)?;
    Ok(CommandOutcome::reply(BroadcastEnvelope::new(
        message_type::SAFE_POSITION,
        json!({ "name": name, "position": found }),
        now_millis(),
    )))
}
