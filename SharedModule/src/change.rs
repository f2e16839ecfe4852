//! # Change Records
//!
//! Per-object descriptions of how one scene differs from another. A change
//! set is produced fresh on every reconciliation pass and discarded once it
//! has been applied and broadcast.

use serde::{Serialize, Deserialize};
use serde_json::{Map, Value};

use crate::object::ObjectCategory;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Create,
    Update,
    Delete,
}

/// One object's change between two snapshots
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRecord {
    pub name: String,
    pub category: ObjectCategory,
    pub change_type: ChangeType,

    /// Full record for creates, only the differing fields for updates,
    /// empty for deletes
    pub changed_fields: Map<String, Value>,
}

impl ChangeRecord {
    pub fn create(name: &str, category: ObjectCategory, fields: Map<String, Value>) -> Self {
        Self {
            name: name.to_string(),
            category,
            change_type: ChangeType::Create,
            changed_fields: fields,
        }
    }

    pub fn update(name: &str, category: ObjectCategory, fields: Map<String, Value>) -> Self {
        Self {
            name: name.to_string(),
            category,
            change_type: ChangeType::Update,
            changed_fields: fields,
        }
    }

    pub fn delete(name: &str, category: ObjectCategory) -> Self {
        Self {
            name: name.to_string(),
            category,
            change_type: ChangeType::Delete,
            changed_fields: Map::new(),
        }
    }
}

/// Everything that changed between two scene documents
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeSet {
    /// Object changes, ordered deletes, then updates, then creates
    pub records: Vec<ChangeRecord>,

    /// New camera block when it differs (compared wholesale)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cameras: Option<Map<String, Value>>,

    /// New settings block when it differs (compared wholesale)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<Map<String, Value>>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty() && self.cameras.is_none() && self.settings.is_none()
    }

    /// Number of records of the given kind
    pub fn count(&self, change_type: ChangeType) -> usize {
        self.records.iter().filter(|r| r.change_type == change_type).count()
    }
}
