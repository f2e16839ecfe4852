//! # Connection Types
//!
//! Observer connection state shared by the server's broadcaster and any
//! client-side tooling that mirrors it.

use serde::{Serialize, Deserialize};

/// Identifier assigned to each observer connection
pub type ConnectionId = u64;

/// State of an observer connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// Handshake done, baseline snapshot not yet delivered
    Connecting,

    /// Receiving broadcasts
    Open,

    /// Close requested, no further sends
    Closing,

    /// Gone
    Closed,
}

impl ConnectionState {
    /// Whether broadcasts may be delivered on this connection
    pub fn accepts_broadcasts(&self) -> bool {
        matches!(self, Self::Open)
    }
}

/// Why an observer went away
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisconnectReason {
    /// Peer sent a close frame or dropped the socket
    ClientRequest,

    /// Server shutting down
    ServerShutdown,

    /// Socket error
    NetworkError(String),

    /// Outbox closed while sending
    SendFailed,
}
