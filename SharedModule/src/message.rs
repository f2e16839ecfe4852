//! # Message Envelopes
//!
//! Inbound command envelopes and outbound broadcast envelopes exchanged
//! over the WebSocket connection.

use serde::{Serialize, Deserialize};
use serde_json::{json, Map, Value};

/// Actions a controller can send
pub mod action {
    pub const CREATE_ENTITY: &str = "create_entity";
    pub const MOVE_ENTITY: &str = "move_entity";
    pub const ROTATE_ENTITY: &str = "rotate_entity";
    pub const DELETE_ENTITY: &str = "delete_entity";
    pub const UPDATE_ENTITY: &str = "update_entity";
    pub const GET_ENTITIES: &str = "get_entities";
    pub const GET_GAME_STATE: &str = "get_game_state";
    pub const SET_CAMERA: &str = "set_camera";
    pub const CREATE_LIGHT: &str = "create_light";
    pub const CREATE_CAMERA: &str = "create_camera";
    pub const CREATE_MODEL: &str = "create_model";
    pub const SET_AMBIENT_LIGHT: &str = "set_ambient_light";
    pub const ENABLE_SHADOWS: &str = "enable_shadows";
    pub const CLEAR_SCENE: &str = "clear_scene";
    pub const CHECK_COLLISIONS: &str = "check_collisions";
    pub const FIND_SAFE_POSITION: &str = "find_safe_position";
    pub const SETUP_BOARD: &str = "setup_board";
}

/// Types of outbound messages
pub mod message_type {
    pub const GAME_STATE: &str = "game_state";
    pub const GAME_STATE_UPDATE: &str = "game_state_update";
    pub const ENTITY_PROPERTY_UPDATE: &str = "entity_property_update";
    pub const CAMERA_UPDATE: &str = "camera_update";
    pub const ENTITIES: &str = "entities";
    pub const COLLISION_CHECK: &str = "collision_check";
    pub const SAFE_POSITION: &str = "safe_position";
    pub const SCENE_CLEARED: &str = "scene_cleared";
    pub const ERROR: &str = "error";
}

/// A command sent by a controller: `{action, data}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    pub action: String,
    #[serde(default)]
    pub data: Value,
}

impl CommandEnvelope {
    pub fn new(action: &str, data: Value) -> Self {
        Self {
            action: action.to_string(),
            data,
        }
    }
}

/// A message pushed to observers: `{type, data, timestamp}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BroadcastEnvelope {
    #[serde(rename = "type")]
    pub message_type: String,
    pub data: Value,

    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
}

impl BroadcastEnvelope {
    pub fn new(message_type: &str, data: Value, timestamp: i64) -> Self {
        Self {
            message_type: message_type.to_string(),
            data,
            timestamp,
        }
    }

    /// Error addressed to the connection that issued `action`
    pub fn error(message: &str, action: Option<&str>, timestamp: i64) -> Self {
        let mut data = json!({ "message": message });
        if let Some(action) = action {
            data["action"] = Value::String(action.to_string());
        }
        Self::new(message_type::ERROR, data, timestamp)
    }

    /// Targeted per-object diff, carrying only the changed fields
    pub fn property_update(
        entity_id: &str,
        changes: &Map<String, Value>,
        animate: bool,
        duration_ms: u64,
        timestamp: i64,
    ) -> Self {
        Self::new(
            message_type::ENTITY_PROPERTY_UPDATE,
            json!({
                "entityId": entity_id,
                "changes": changes,
                "animate": animate,
                "duration_ms": duration_ms,
            }),
            timestamp,
        )
    }

    pub fn is_error(&self) -> bool {
        self.message_type == message_type::ERROR
    }
}
