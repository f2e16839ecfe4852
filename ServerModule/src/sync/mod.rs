//! # State File Synchronization
//!
//! Keeps the live scene reconciled with the externally edited state file:
//! parsing and schema checks, per-object diffing, change application and
//! the polling watcher that ties them together.

pub mod document;
pub mod diff;
pub mod reconcile;
pub mod watcher;

pub use document::SceneDocument;
pub use diff::{diff, wholesale};
pub use reconcile::{ReconcileReport, ReconciliationEngine};
pub use watcher::{ChangeWatcher, ScanOutcome};
