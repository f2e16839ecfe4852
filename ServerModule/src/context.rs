//! # Scene Context
//!
//! The one shared object every component is handed at construction: config,
//! the state store behind its mutation lock, and the broadcaster. There are
//! no ambient singletons; whoever needs the scene gets an `Arc<SceneContext>`.

use tokio::sync::Mutex;

use crate::config::ServerConfig;
use crate::connection::Broadcaster;
use crate::state::StateStore;

pub struct SceneContext {
    config: ServerConfig,

    /// Every mutation of the live scene happens under this lock. It is never
    /// held across file I/O or socket writes.
    store: Mutex<StateStore>,

    broadcaster: Broadcaster,
}

impl SceneContext {
    pub fn new(config: ServerConfig) -> Self {
        let store = StateStore::new(config.surface);
        Self {
            config,
            store: Mutex::new(store),
            broadcaster: Broadcaster::new(),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn store(&self) -> &Mutex<StateStore> {
        &self.store
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }
}
