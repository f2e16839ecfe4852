//! # SharedModule
//!
//! Shared types used by the tabletop scene server and by anything that talks
//! to it. This crate holds the object and snapshot model, the change records
//! produced by reconciliation, and the command/broadcast envelopes, so both
//! sides of the WebSocket agree on one wire format.

// Export module structure
pub mod types;
pub mod object;
pub mod scene;
pub mod change;
pub mod message;
pub mod connection;
pub mod constants;

// Re-export commonly used items for convenience
pub use types::*;
pub use object::{ObjectCategory, ObjectRecord, TransformHistory};
pub use scene::{SceneSnapshot, SceneMetadata, Environment, EnvironmentPatch};
pub use change::{ChangeRecord, ChangeSet, ChangeType};
pub use message::{BroadcastEnvelope, CommandEnvelope};
pub use connection::{ConnectionId, ConnectionState, DisconnectReason};
