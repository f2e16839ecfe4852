//! # Reconciliation Engine
//!
//! Applies a change set to the state store one object at a time. A failure
//! on one object is logged and counted, never allowed to abort the rest of
//! the batch. The notifications describing what was applied are returned to
//! the caller, which queues them before releasing the store lock.

use log::{error, info, warn};
use serde_json::{json, Value};

use tabletop_shared::message::message_type;
use tabletop_shared::{BroadcastEnvelope, ChangeRecord, ChangeSet, ChangeType, EnvironmentPatch};

use crate::clock::now_millis;
use crate::connection::snapshot_message;
use crate::error::{SceneError, SceneResult};
use crate::object::ObjectSpec;
use crate::state::StateStore;

/// Source tag stamped on objects created from the state file
pub const EXTERNAL_SOURCE: &str = "external";

/// What a reconciliation pass did
#[derive(Debug, Default)]
pub struct ReconcileReport {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,

    /// Objects (or blocks) that could not be applied, with the cause
    pub failures: Vec<(String, SceneError)>,

    /// Messages to fan out, in order
    pub notifications: Vec<BroadcastEnvelope>,
}

impl ReconcileReport {
    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    /// Whether any object was added or removed
    pub fn is_structural(&self) -> bool {
        self.created > 0 || self.deleted > 0
    }
}

/// Applies change sets to the store
#[derive(Debug, Clone)]
pub struct ReconciliationEngine {
    animation_duration_ms: u64,
}

impl ReconciliationEngine {
    pub fn new(animation_duration_ms: u64) -> Self {
        Self { animation_duration_ms }
    }

    /// Apply every record, then the camera and settings blocks
    pub fn apply(&self, changes: &ChangeSet, store: &mut StateStore) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        let mut environment_changed = false;

        for record in &changes.records {
            match self.apply_record(record, store) {
                Ok(Some(notification)) => {
                    report.updated += 1;
                    report.notifications.push(notification);
                }
                Ok(None) => match record.change_type {
                    ChangeType::Create => report.created += 1,
                    ChangeType::Delete => report.deleted += 1,
                    ChangeType::Update => report.updated += 1,
                },
                Err(err) => {
                    warn!("Failed to apply {:?} of {} '{}': {}", record.change_type, record.category, record.name, err);
                    report.failures.push((record.name.clone(), err));
                }
            }
        }

        if let Some(cameras) = &changes.cameras {
            let (created, failures) = store.replace_cameras(cameras, EXTERNAL_SOURCE);
            for (name, err) in failures {
                warn!("Failed to apply camera '{}': {}", name, err);
                report.failures.push((name, err));
            }
            info!("Camera block replaced ({} cameras)", created);
            report.notifications.push(BroadcastEnvelope::new(
                message_type::CAMERA_UPDATE,
                json!({ "cameras": Value::Object(cameras.clone()) }),
                now_millis(),
            ));
        }

        if let Some(settings) = &changes.settings {
            let patch = EnvironmentPatch::from_settings(settings);
            if patch.is_empty() {
                warn!("Settings block changed but held no recognised environment settings");
            } else {
                store.apply_environment(patch);
                environment_changed = true;
            }
        }

        if report.is_structural() || environment_changed {
            match snapshot_message(store, message_type::GAME_STATE_UPDATE) {
                Ok(message) => report.notifications.push(message),
                Err(err) => error!("Failed to serialize scene snapshot: {}", err),
            }
        }

        info!(
            "Reconciled external state: {} created, {} updated, {} deleted, {} failed",
            report.created,
            report.updated,
            report.deleted,
            report.failed()
        );

        report
    }

    /// Apply one record. Updates return their targeted notification.
    fn apply_record(&self, record: &ChangeRecord, store: &mut StateStore) -> SceneResult<Option<BroadcastEnvelope>> {
        match record.change_type {
            ChangeType::Create => {
                let mut spec = ObjectSpec::from_fields(record.category, &record.changed_fields)?;
                spec.source.get_or_insert_with(|| EXTERNAL_SOURCE.to_string());
                store.create(record.category, spec)?;
                Ok(None)
            }
            ChangeType::Update => {
                let applied = store.apply_fields(&record.name, &record.changed_fields, true)?;
                if applied.is_empty() {
                    return Ok(None);
                }
                Ok(Some(BroadcastEnvelope::property_update(
                    &record.name,
                    &applied,
                    true,
                    self.animation_duration_ms,
                    now_millis(),
                )))
            }
            ChangeType::Delete => {
                store.delete_object(&record.name)?;
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::diff::{diff, wholesale};
    use crate::sync::document::SceneDocument;
    use serde_json::json;
    use tabletop_shared::{ObjectCategory, SurfaceBounds};

    fn engine() -> ReconciliationEngine {
        ReconciliationEngine::new(500)
    }

    fn doc(value: Value) -> SceneDocument {
        SceneDocument::from_value(value).unwrap()
    }

    fn entity(name: &str, position: Value) -> Value {
        json!({"name": name, "template": "cube", "position": position})
    }

    #[test]
    fn one_bad_entity_does_not_abort_the_batch() {
        let mut store = StateStore::new(Some(SurfaceBounds::default()));
        let file = doc(json!({
            "entities": {
                "a": entity("a", json!([0, 0.5, 0])),
                "b": entity("b", json!([2, 0.5, 0])),
                "c": entity("c", json!(["left", 0.5, 0])),
                "d": entity("d", json!([4, 0.5, 0])),
                "e": entity("e", json!([6, 0.5, 0]))
            },
            "settings": {}
        }));

        let report = engine().apply(&wholesale(&file), &mut store);
        assert_eq!(report.created, 4);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.failures[0].0, "c");
        assert!(!store.contains("c"));
        assert_eq!(store.get("a").unwrap().source.as_deref(), Some(EXTERNAL_SOURCE));
    }

    #[test]
    fn update_emits_targeted_property_message() {
        let mut store = StateStore::default();
        let first = doc(json!({"entities": {"a": entity("a", json!([0, 0.5, 0]))}, "settings": {}}));
        engine().apply(&wholesale(&first), &mut store);

        let second = doc(json!({"entities": {"a": entity("a", json!([1, 0.5, 0]))}, "settings": {}}));
        let report = engine().apply(&diff(&first, &second), &mut store);

        assert_eq!(report.updated, 1);
        assert_eq!(report.notifications.len(), 1);
        let message = &report.notifications[0];
        assert_eq!(message.message_type, message_type::ENTITY_PROPERTY_UPDATE);
        assert_eq!(message.data["entityId"], json!("a"));
        assert_eq!(message.data["changes"], json!({"position": [1, 0.5, 0]}));
        assert_eq!(message.data["animate"], json!(true));
        assert_eq!(message.data["duration_ms"], json!(500));

        let record = store.get("a").unwrap();
        assert_eq!(record.position, [1.0, 0.5, 0.0]);
        assert!(record.last_move.as_ref().unwrap().animate);
    }

    #[test]
    fn category_move_leaves_object_in_new_category() {
        let mut store = StateStore::default();
        let first = doc(json!({"entities": {"statue": entity("statue", json!([0, 0.5, 0]))}, "settings": {}}));
        engine().apply(&wholesale(&first), &mut store);

        let second = doc(json!({
            "entities": {},
            "models": {"statue": {"name": "statue", "model_path": "statue.glb"}},
            "settings": {}
        }));
        let report = engine().apply(&diff(&first, &second), &mut store);

        assert_eq!((report.deleted, report.created, report.failed()), (1, 1, 0));
        assert_eq!(store.category_of("statue"), Some(ObjectCategory::Model));
        assert_eq!(store.len(), 1);
        assert_eq!(
            report.notifications.last().unwrap().message_type,
            message_type::GAME_STATE_UPDATE
        );
    }

    #[test]
    fn update_to_missing_object_is_counted_as_failure() {
        let mut store = StateStore::default();
        let first = doc(json!({"entities": {"a": entity("a", json!([0, 0.5, 0]))}, "settings": {}}));
        engine().apply(&wholesale(&first), &mut store);
        store.delete_object("a").unwrap();

        let second = doc(json!({"entities": {"a": entity("a", json!([1, 0.5, 0]))}, "settings": {}}));
        let report = engine().apply(&diff(&first, &second), &mut store);
        assert_eq!(report.failed(), 1);
        assert!(matches!(report.failures[0].1, SceneError::NotFound(_)));
    }

    #[test]
    fn settings_and_camera_blocks_notify() {
        let mut store = StateStore::default();
        let changes = wholesale(&doc(json!({
            "entities": {},
            "cameras": {"main": {"position": [0, 10, 10]}},
            "settings": {"ambientLight": {"color": [1, 0.9, 0.8], "intensity": 0.7}}
        })));

        let report = engine().apply(&changes, &mut store);
        let kinds: Vec<_> = report.notifications.iter().map(|n| n.message_type.as_str()).collect();
        assert_eq!(kinds, vec![message_type::CAMERA_UPDATE, message_type::GAME_STATE_UPDATE]);
        assert_eq!(store.environment().ambient_light.intensity, 0.7);
        assert_eq!(store.category_of("main"), Some(ObjectCategory::Camera));
    }
}
