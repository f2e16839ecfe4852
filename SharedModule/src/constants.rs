//! # Shared Constants
//!
//! Constants used by the server and by controller tooling.

/// Version of the scene wire format
pub const SCHEMA_VERSION: u32 = 1;

/// Network constants
pub mod network {
    /// Default WebSocket / HTTP bind address
    pub const DEFAULT_BIND: &str = "127.0.0.1:8080";
}

/// External state file constants
pub mod state_file {
    /// Default state file path
    pub const DEFAULT_PATH: &str = "game_state.json";

    /// Default polling interval in milliseconds
    pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

    /// Attempts for each read/parse/validate step
    pub const MAX_READ_ATTEMPTS: u32 = 3;

    /// Delay between attempts in milliseconds
    pub const RETRY_DELAY_MS: u64 = 200;

    /// Key rewritten after every successful reconciliation
    pub const LAST_MODIFIED_KEY: &str = "last_modified";
}

/// Animation constants
pub mod animation {
    /// Suggested interpolation time for targeted property updates
    pub const DEFAULT_DURATION_MS: u64 = 500;
}

/// Base collision boxes (width, height, depth) per template at unit scale.
/// Templates not listed use the unit box.
pub const TEMPLATE_BOXES: &[(&str, [f64; 3])] = &[
    ("cube", [1.0, 1.0, 1.0]),
    ("sphere", [1.0, 1.0, 1.0]),
    ("cylinder", [1.0, 1.0, 1.0]),
    ("cone", [1.0, 1.0, 1.0]),
    ("mini", [0.6, 1.2, 0.6]),
    ("warrior", [0.6, 1.2, 0.6]),
    ("wizard", [0.6, 1.2, 0.6]),
    ("rogue", [0.6, 1.2, 0.6]),
    ("cleric", [0.6, 1.2, 0.6]),
    ("token", [0.8, 0.1, 0.8]),
    ("tile", [1.0, 0.1, 1.0]),
    ("d6", [0.5, 0.5, 0.5]),
    ("d20", [0.6, 0.6, 0.6]),
    ("wall", [1.0, 2.0, 0.2]),
    ("table", [20.0, 1.0, 20.0]),
];
