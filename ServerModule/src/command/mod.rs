//! # Command Module
//!
//! Live commands from controllers:
//! - Action -> handler registry
//! - Dispatch with per-command error capture
//! - Routing of replies (sender only) and broadcasts (every observer)

use log::{debug, error, warn};
use serde_json::Value;
use std::panic::{catch_unwind, AssertUnwindSafe};

use tabletop_shared::{BroadcastEnvelope, CommandEnvelope, ConnectionId};

use crate::clock::now_millis;
use crate::context::SceneContext;
use crate::error::SceneResult;
use crate::state::StateStore;

pub mod handlers;
pub mod registry;

pub use registry::{handler_for, is_registered, registered_actions};

/// Signature shared by every command handler
pub type CommandHandler = fn(&mut StateStore, &Value, &CommandOptions) -> SceneResult<CommandOutcome>;

/// Server settings handlers may need
#[derive(Debug, Clone, Copy)]
pub struct CommandOptions {
    pub animation_duration_ms: u64,
}

/// Messages produced by one command
#[derive(Debug, Default)]
pub struct CommandOutcome {
    /// Sent to the issuing connection only
    pub reply: Option<BroadcastEnvelope>,

    /// Sent to every open connection
    pub broadcasts: Vec<BroadcastEnvelope>,
}

impl CommandOutcome {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn reply(message: BroadcastEnvelope) -> Self {
        Self {
            reply: Some(message),
            broadcasts: Vec::new(),
        }
    }

    pub fn broadcast(message: BroadcastEnvelope) -> Self {
        Self {
            reply: None,
            broadcasts: vec![message],
        }
    }

    fn error(message: &str, action: Option<&str>) -> Self {
        Self::reply(BroadcastEnvelope::error(message, action, now_millis()))
    }
}

/// Run one command against the store. Never fails: every error becomes an
/// `error` reply addressed to the sender.
pub fn dispatch(store: &mut StateStore, command: &CommandEnvelope, options: &CommandOptions) -> CommandOutcome {
    let action = command.action.as_str();

    let Some(handler) = handler_for(action) else {
        warn!("Unknown action '{}'", action);
        return CommandOutcome::error(&format!("Unknown action: {}", action), Some(action));
    };

    debug!("Dispatching '{}'", action);

    // Capture panics so one bad command cannot take the connection down
    match catch_unwind(AssertUnwindSafe(|| handler(store, &command.data, options))) {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(err)) => {
            warn!("Action '{}' failed: {}", action, err);
            CommandOutcome::error(&err.to_string(), Some(action))
        }
        Err(_) => {
            error!("Handler for '{}' panicked during execution", action);
            CommandOutcome::error(&format!("Handler for '{}' failed unexpectedly", action), Some(action))
        }
    }
}

/// Parse, dispatch and route one inbound text message from `connection`.
/// Messages are queued before the store lock is released, so every observer
/// receives them in the order the mutations were committed. Queuing only
/// pushes onto outboxes; socket writes happen in each connection's task.
pub async fn execute(ctx: &SceneContext, connection: ConnectionId, text: &str) -> CommandOutcome {
    let command = match serde_json::from_str::<CommandEnvelope>(text) {
        Ok(command) => command,
        Err(err) => {
            warn!("Observer {} sent an invalid command: {}", connection, err);
            let outcome = CommandOutcome::error(&format!("Invalid command envelope: {}", err), None);
            route(ctx, connection, &outcome);
            return outcome;
        }
    };

    let options = CommandOptions {
        animation_duration_ms: ctx.config().animation_duration_ms,
    };
    let mut store = ctx.store().lock().await;
    let outcome = dispatch(&mut store, &command, &options);
    route(ctx, connection, &outcome);
    drop(store);

    outcome
}

fn route(ctx: &SceneContext, connection: ConnectionId, outcome: &CommandOutcome) {
    for message in &outcome.broadcasts {
        ctx.broadcaster().broadcast(message);
    }
    if let Some(reply) = &outcome.reply {
        ctx.broadcaster().send_to(connection, reply);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tabletop_shared::message::{action, message_type};

    const OPTIONS: CommandOptions = CommandOptions { animation_duration_ms: 500 };

    fn run(store: &mut StateStore, action: &str, data: Value) -> CommandOutcome {
        dispatch(store, &CommandEnvelope::new(action, data), &OPTIONS)
    }

    #[test]
    fn unknown_action_replies_with_error_only() {
        let mut store = StateStore::default();
        let outcome = run(&mut store, "teleport", json!({}));

        let reply = outcome.reply.unwrap();
        assert!(reply.is_error());
        assert_eq!(reply.data["action"], json!("teleport"));
        assert!(reply.data["message"].as_str().unwrap().contains("teleport"));
        assert!(outcome.broadcasts.is_empty());
    }

    #[test]
    fn create_and_move_broadcast_full_state() {
        let mut store = StateStore::default();
        let created = run(
            &mut store,
            action::CREATE_ENTITY,
            json!({"name": "cube_1", "template": "cube", "position": [3, 0.5, 0]}),
        );
        assert_eq!(created.broadcasts[0].message_type, message_type::GAME_STATE_UPDATE);
        assert!(created.reply.is_none());

        run(
            &mut store,
            action::CREATE_ENTITY,
            json!({"name": "cube_2", "template": "cube", "position": [0, 0.5, 0]}),
        );
        let moved = run(
            &mut store,
            action::MOVE_ENTITY,
            json!({"name": "cube_1", "to": [0, 0.5, 0.3], "animate": true}),
        );

        let state = &moved.broadcasts[0].data;
        assert_eq!(state["entities"]["cube_1"]["position"], json!([0.0, 0.5, 0.3]));
        assert_eq!(state["entities"]["cube_1"]["lastMove"]["collisions"], json!(["cube_2"]));
        assert_eq!(state["entities"]["cube_1"]["lastMove"]["onSurface"], json!(true));
    }

    #[test]
    fn duplicate_create_is_reported_to_sender() {
        let mut store = StateStore::default();
        run(&mut store, action::CREATE_LIGHT, json!({"name": "sun"}));
        let outcome = run(&mut store, action::CREATE_ENTITY, json!({"name": "sun"}));

        assert!(outcome.reply.unwrap().is_error());
        assert!(outcome.broadcasts.is_empty());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn queries_reply_without_broadcasting() {
        let mut store = StateStore::default();
        run(&mut store, action::CREATE_ENTITY, json!({"name": "a"}));

        let entities = run(&mut store, action::GET_ENTITIES, Value::Null);
        let reply = entities.reply.unwrap();
        assert_eq!(reply.message_type, message_type::ENTITIES);
        assert!(reply.data["a"].is_object());
        assert!(entities.broadcasts.is_empty());

        let state = run(&mut store, action::GET_GAME_STATE, json!({}));
        assert_eq!(state.reply.unwrap().message_type, message_type::GAME_STATE);
    }

    #[test]
    fn update_entity_sends_targeted_changes() {
        let mut store = StateStore::default();
        run(&mut store, action::CREATE_ENTITY, json!({"name": "a", "color": "red"}));

        let outcome = run(
            &mut store,
            action::UPDATE_ENTITY,
            json!({"name": "a", "changes": {"color": "blue"}, "animate": false}),
        );
        let message = &outcome.broadcasts[0];
        assert_eq!(message.message_type, message_type::ENTITY_PROPERTY_UPDATE);
        assert_eq!(message.data["changes"], json!({"color": "blue"}));
        assert_eq!(message.data["animate"], json!(false));
        assert_eq!(store.get("a").unwrap().properties["color"], json!("blue"));
    }

    #[test]
    fn set_camera_broadcasts_camera_update() {
        let mut store = StateStore::default();
        let outcome = run(
            &mut store,
            action::SET_CAMERA,
            json!({"angleX": 30, "angleY": 45, "distance": 20}),
        );

        let message = &outcome.broadcasts[0];
        assert_eq!(message.message_type, message_type::CAMERA_UPDATE);
        assert_eq!(message.data["angleY"], json!(45.0));
        assert_eq!(store.environment().camera.distance, Some(20.0));
    }

    #[test]
    fn environment_commands_merge_settings() {
        let mut store = StateStore::default();
        run(&mut store, action::SET_AMBIENT_LIGHT, json!({"intensity": 0.8}));
        run(&mut store, action::ENABLE_SHADOWS, json!({"softness": 0.5}));
        run(&mut store, action::SETUP_BOARD, json!({"type": "hex", "width": 12}));

        let environment = store.environment();
        assert_eq!(environment.ambient_light.intensity, 0.8);
        assert_eq!(environment.ambient_light.color, [1.0, 1.0, 1.0]);
        assert!(environment.shadow_settings.enabled);
        assert_eq!(environment.shadow_settings.softness, 0.5);
        assert_eq!(environment.grid.grid_type, "hex");
        assert_eq!(environment.grid.width, 12);
        assert_eq!(environment.grid.height, 10);

        let bad = run(&mut store, action::SETUP_BOARD, json!({"type": "triangle"}));
        assert!(bad.reply.unwrap().is_error());
    }

    #[test]
    fn clear_scene_honours_exclusions() {
        let mut store = StateStore::default();
        for name in ["cam_top", "mini_orc", "prop_chest"] {
            run(&mut store, action::CREATE_ENTITY, json!({"name": name}));
        }

        let outcome = run(&mut store, action::CLEAR_SCENE, json!({"exclude": ["cam_"]}));
        assert_eq!(outcome.reply.unwrap().data["removed"], json!(2));
        assert_eq!(outcome.broadcasts.len(), 1);
        assert!(store.contains("cam_top"));

        let again = run(&mut store, action::CLEAR_SCENE, json!({}));
        assert_eq!(again.reply.unwrap().data["removed"], json!(1));
    }

    #[test]
    fn placement_queries() {
        let mut store = StateStore::default();
        run(&mut store, action::CREATE_ENTITY, json!({"name": "blocker", "position": [0, 0.5, 0]}));
        run(&mut store, action::CREATE_ENTITY, json!({"name": "mover", "position": [5, 0.5, 5]}));

        let check = run(
            &mut store,
            action::CHECK_COLLISIONS,
            json!({"name": "mover", "position": [0, 0.5, 0.2]}),
        );
        let data = check.reply.unwrap().data;
        assert_eq!(data["collisions"], json!(["blocker"]));
        assert_eq!(data["onTable"], json!(true));
        assert_eq!(store.get("mover").unwrap().position, [5.0, 0.5, 5.0]);

        let safe = run(
            &mut store,
            action::FIND_SAFE_POSITION,
            json!({"name": "mover", "position": [0, 0.5, 0]}),
        );
        assert!(safe.reply.unwrap().data["position"].is_array());

        let none = run(
            &mut store,
            action::FIND_SAFE_POSITION,
            json!({"name": "mover", "position": [0, 0.5, 0], "search_radius": 0.0}),
        );
        assert!(none.reply.unwrap().data["position"].is_null());
    }

    #[test]
    fn malformed_payload_is_validation_error() {
        let mut store = StateStore::default();
        run(&mut store, action::CREATE_ENTITY, json!({"name": "a"}));
        let outcome = run(&mut store, action::MOVE_ENTITY, json!({"name": "a", "to": [1, 2]}));
        assert!(outcome.reply.unwrap().is_error());
        assert_eq!(store.get("a").unwrap().position, [0.0, 0.0, 0.0]);
    }
}
