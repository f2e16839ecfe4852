//! # Command Registry
//!
//! Flat action -> handler lookup table, built once on first use.

use log::debug;
use once_cell::sync::Lazy;
use std::collections::HashMap;

use tabletop_shared::message::action;

use super::handlers;
use super::CommandHandler;

/// Every action the gateway understands
static COMMAND_REGISTRY: Lazy<HashMap<&'static str, CommandHandler>> = Lazy::new(|| {
    let entries: [(&'static str, CommandHandler); 17] = [
        (action::CREATE_ENTITY, handlers::create_entity),
        (action::MOVE_ENTITY, handlers::move_entity),
        (action::ROTATE_ENTITY, handlers::rotate_entity),
        (action::DELETE_ENTITY, handlers::delete_entity),
        (action::UPDATE_ENTITY, handlers::update_entity),
        (action::GET_ENTITIES, handlers::get_entities),
        (action::GET_GAME_STATE, handlers::get_game_state),
        (action::SET_CAMERA, handlers::set_camera),
        (action::CREATE_LIGHT, handlers::create_light),
        (action::CREATE_CAMERA, handlers::create_camera),
        (action::CREATE_MODEL, handlers::create_model),
        (action::SET_AMBIENT_LIGHT, handlers::set_ambient_light),
        (action::ENABLE_SHADOWS, handlers::enable_shadows),
        (action::CLEAR_SCENE, handlers::clear_scene),
        (action::CHECK_COLLISIONS, handlers::check_collisions),
        (action::FIND_SAFE_POSITION, handlers::find_safe_position),
        (action::SETUP_BOARD, handlers::setup_board),
    ];

    let registry: HashMap<_, _> = entries.into_iter().collect();
    debug!("Registered {} command handlers", registry.len());
    registry
});

/// Look up the handler for an action
pub fn handler_for(action: &str) -> Option<CommandHandler> {
    COMMAND_REGISTRY.get(action).copied()
}

pub fn is_registered(action: &str) -> bool {
    COMMAND_REGISTRY.contains_key(action)
}

/// All registered actions, sorted
pub fn registered_actions() -> Vec<&'static str> {
    let mut actions: Vec<_> = COMMAND_REGISTRY.keys().copied().collect();
    actions.sort_unstable();
    actions
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_actions_are_registered() {
        for name in [
            "create_entity",
            "move_entity",
            "rotate_entity",
            "delete_entity",
            "get_entities",
            "get_game_state",
            "set_camera",
            "create_light",
            "create_camera",
            "create_model",
            "set_ambient_light",
            "enable_shadows",
        ] {
            assert!(is_registered(name), "missing {}", name);
        }
        assert!(!is_registered("fly"));
        assert_eq!(registered_actions().len(), 17);
    }
}
