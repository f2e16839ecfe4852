//! # Tabletop Scene Server
//!
//! Authoritative scene-state synchronization for a live 3D tabletop. The
//! server owns the canonical scene, applies live commands from controllers,
//! keeps the scene reconciled with an externally edited state file, and fans
//! every change out to connected observers.
//!
//! The system is organized into several sub-modules:
//! - `state`: the state store and its name index
//! - `collision`: advisory placement checks
//! - `object`: creation payloads and template collision boxes
//! - `sync`: state file parsing, diffing, reconciliation and polling
//! - `connection`: observer registry, broadcast and socket handling
//! - `command`: live command registry and dispatch
//! - `http`: axum router

use log::{error, info};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;

// Module declarations
pub mod clock;
pub mod collision;
pub mod command;
pub mod config;
pub mod connection;
pub mod context;
pub mod error;
pub mod http;
pub mod object;
pub mod state;
pub mod sync;

// Re-export commonly used items
pub use config::{RetryPolicy, ServerConfig};
pub use connection::Broadcaster;
pub use context::SceneContext;
pub use error::{SceneError, SceneResult};
pub use state::StateStore;
pub use sync::{ChangeWatcher, ReconciliationEngine, ScanOutcome};

/// Cloneable trigger for stopping a running server
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    sender: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    pub fn trigger(&self) {
        self.sender.send_replace(true);
    }
}

/// Resolves once shutdown has been requested (or the sender is gone)
async fn shutdown_requested(mut receiver: watch::Receiver<bool>) {
    while !*receiver.borrow_and_update() {
        if receiver.changed().await.is_err() {
            break;
        }
    }
}

/// Process lifecycle: `init` builds the context, `run` serves and polls until
/// shutdown is triggered.
pub struct SceneServer {
    ctx: Arc<SceneContext>,
    watcher: Arc<ChangeWatcher>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl SceneServer {
    /// Validate the config and build every component
    pub fn init(config: ServerConfig) -> SceneResult<Self> {
        config.validate()?;

        let watcher = Arc::new(ChangeWatcher::new(&config));
        let (shutdown, _) = watch::channel(false);

        info!(
            "Scene server initialized (state file {}, poll every {} ms)",
            config.state_file.display(),
            config.poll_interval_ms
        );

        Ok(Self {
            ctx: Arc::new(SceneContext::new(config)),
            watcher,
            shutdown: Arc::new(shutdown),
        })
    }

    pub fn context(&self) -> Arc<SceneContext> {
        Arc::clone(&self.ctx)
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            sender: Arc::clone(&self.shutdown),
        }
    }

    /// Serve WebSocket/HTTP and poll the state file until shutdown
    pub async fn run(self) -> SceneResult<()> {
        let bind = self.ctx.config().bind;
        let listener = TcpListener::bind(bind).await?;
        info!("Listening on {}", listener.local_addr().unwrap_or(bind));

        let watcher_task = tokio::spawn(
            Arc::clone(&self.watcher).run(Arc::clone(&self.ctx), self.shutdown.subscribe()),
        );

        axum::serve(listener, http::router(Arc::clone(&self.ctx)))
            .with_graceful_shutdown(shutdown_requested(self.shutdown.subscribe()))
            .await?;

        // The listener can also stop on its own; make sure polling stops with it
        self.shutdown.send_replace(true);
        if let Err(err) = watcher_task.await {
            error!("Change watcher task ended abnormally: {}", err);
        }

        info!("Scene server stopped");
        Ok(())
    }
}
