//! # Connection Handlers
//!
//! Drives one observer socket from connect to disconnect: register, deliver
//! the baseline snapshot, then interleave inbound commands with outbound
//! broadcasts until either side goes away.

use axum::extract::ws::{Message, WebSocket};
use log::{debug, error, warn};
use std::sync::Arc;

use tabletop_shared::message::message_type;
use tabletop_shared::{ConnectionId, DisconnectReason};

use crate::command;
use crate::connection::snapshot_message;
use crate::context::SceneContext;

/// Queue the full `game_state` snapshot for a new connection and open it
/// for broadcasts. Returns false if the snapshot could not be delivered.
///
/// Both steps happen under the store lock, so the first broadcast the
/// connection receives describes a mutation made after its snapshot.
pub async fn greet(ctx: &SceneContext, id: ConnectionId) -> bool {
    let store = ctx.store().lock().await;
    let snapshot = snapshot_message(&store, message_type::GAME_STATE);

    match snapshot {
        Ok(message) => {
            let queued = ctx.broadcaster().send_to(id, &message);
            if queued {
                ctx.broadcaster().open(id);
            }
            queued
        }
        Err(err) => {
            error!("Failed to build snapshot for observer {}: {}", id, err);
            false
        }
    }
}

/// Serve one WebSocket until it closes
pub async fn handle_socket(mut socket: WebSocket, ctx: Arc<SceneContext>) {
    let (id, mut outbox) = ctx.broadcaster().register();

    // The snapshot is queued before any inbound message is read
    if !greet(&ctx, id).await {
        ctx.broadcaster().unregister(id, DisconnectReason::SendFailed);
        return;
    }

    let reason = loop {
        tokio::select! {
            outbound = outbox.recv() => {
                let Some(payload) = outbound else {
                    break DisconnectReason::ServerShutdown;
                };
                if let Err(err) = socket.send(Message::Text(payload)).await {
                    debug!("Send to observer {} failed: {}", id, err);
                    break DisconnectReason::SendFailed;
                }
            }
            inbound = socket.recv() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        command::execute(&ctx, id, &text).await;
                    }
                    Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                        Ok(text) => {
                            command::execute(&ctx, id, &text).await;
                        }
                        Err(_) => warn!("Observer {} sent a non-UTF-8 binary frame", id),
                    },
                    Some(Ok(Message::Close(_))) | None => break DisconnectReason::ClientRequest,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => break DisconnectReason::NetworkError(err.to_string()),
                }
            }
        }
    };

    ctx.broadcaster().unregister(id, reason);
}
