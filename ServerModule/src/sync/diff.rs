//! # Scene Diff
//!
//! Computes the minimal per-object change set between two state file
//! documents. Objects are compared field by field so an update only carries
//! what actually changed; the camera and settings blocks are compared as a
//! whole.

use serde_json::{Map, Value};

use tabletop_shared::{ChangeRecord, ChangeSet, ObjectCategory};

use super::document::{ObjectFields, SceneDocument};

/// Structural equality where JSON numbers compare by value (`1 == 1.0`)
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => maps_equal(xs, ys),
        _ => a == b,
    }
}

fn maps_equal(a: &Map<String, Value>, b: &Map<String, Value>) -> bool {
    a.len() == b.len()
        && a
            .iter()
            .all(|(key, value)| b.get(key).map(|other| values_equal(value, other)).unwrap_or(false))
}

/// Fields of `new` that differ from `old`. A field dropped from `new`
/// appears as `null` so the update can clear it.
pub fn changed_fields(old: &Map<String, Value>, new: &Map<String, Value>) -> Map<String, Value> {
    let mut changes = Map::new();

    for (key, value) in new {
        let unchanged = old.get(key).map(|prev| values_equal(prev, value)).unwrap_or(false);
        if !unchanged {
            changes.insert(key.clone(), value.clone());
        }
    }

    for key in old.keys() {
        if !new.contains_key(key) {
            changes.insert(key.clone(), Value::Null);
        }
    }

    changes
}

/// Change set taking `old` to `new`. Records are ordered deletes, then
/// updates, then creates, so an object moving between categories frees its
/// name before it is claimed again.
pub fn diff(old: &SceneDocument, new: &SceneDocument) -> ChangeSet {
    let mut deletes = Vec::new();
    let mut updates = Vec::new();
    let mut creates = Vec::new();

    for ((category, old_objects), (_, new_objects)) in old.collections().into_iter().zip(new.collections()) {
        diff_collection(category, old_objects, new_objects, &mut deletes, &mut updates, &mut creates);
    }

    let mut records = deletes;
    records.append(&mut updates);
    records.append(&mut creates);

    ChangeSet {
        records,
        cameras: (!maps_equal(&old.cameras, &new.cameras)).then(|| new.cameras.clone()),
        settings: (!maps_equal(&old.settings, &new.settings)).then(|| new.settings.clone()),
    }
}

fn diff_collection(
    category: ObjectCategory,
    old: &ObjectFields,
    new: &ObjectFields,
    deletes: &mut Vec<ChangeRecord>,
    updates: &mut Vec<ChangeRecord>,
    creates: &mut Vec<ChangeRecord>,
) {
    for name in old.keys() {
        if !new.contains_key(name) {
            deletes.push(ChangeRecord::delete(name, category));
        }
    }

    for (name, fields) in new {
        match old.get(name) {
            None => creates.push(ChangeRecord::create(name, category, fields.clone())),
            Some(previous) => {
                let changes = changed_fields(previous, fields);
                if !changes.is_empty() {
                    updates.push(ChangeRecord::update(name, category, changes));
                }
            }
        }
    }
}

/// First-load change set: every object is a create, every non-empty block is new
pub fn wholesale(doc: &SceneDocument) -> ChangeSet {
    let records = doc
        .collections()
        .into_iter()
        .flat_map(|(category, objects)| {
            objects
                .iter()
                .map(move |(name, fields)| ChangeRecord::create(name, category, fields.clone()))
        })
        .collect();

    ChangeSet {
        records,
        cameras: (!doc.cameras.is_empty()).then(|| doc.cameras.clone()),
        settings: (!doc.settings.is_empty()).then(|| doc.settings.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tabletop_shared::ChangeType;

    fn doc(value: Value) -> SceneDocument {
        SceneDocument::from_value(value).unwrap()
    }

    fn base() -> Value {
        json!({
            "entities": {
                "cube_1": {"name": "cube_1", "template": "cube", "position": [0, 0.5, 0], "color": "red"},
                "cube_2": {"name": "cube_2", "template": "cube", "position": [3, 0.5, 0]}
            },
            "settings": {"grid": {"type": "square", "size": 1, "width": 10, "height": 10}}
        })
    }

    #[test]
    fn position_change_is_a_single_minimal_update() {
        let old = doc(base());
        let mut moved = base();
        moved["entities"]["cube_1"]["position"] = json!([1, 0.5, 0]);

        let changes = diff(&old, &doc(moved));
        assert_eq!(changes.records.len(), 1);
        let record = &changes.records[0];
        assert_eq!(record.name, "cube_1");
        assert_eq!(record.change_type, ChangeType::Update);
        assert_eq!(record.changed_fields.len(), 1);
        assert_eq!(record.changed_fields["position"], json!([1, 0.5, 0]));
        assert!(changes.cameras.is_none());
        assert!(changes.settings.is_none());
    }

    #[test]
    fn identical_documents_diff_empty() {
        let a = doc(base());
        let b = doc(base());
        assert!(diff(&a, &b).is_empty());
    }

    #[test]
    fn integer_and_float_compare_equal() {
        let old = doc(base());
        let mut same = base();
        same["entities"]["cube_2"]["position"] = json!([3.0, 0.5, 0.0]);
        assert!(diff(&old, &doc(same)).is_empty());
    }

    #[test]
    fn creates_deletes_and_dropped_fields() {
        let old = doc(base());
        let mut next = base();
        next["entities"].as_object_mut().unwrap().remove("cube_2");
        next["entities"]["cube_1"].as_object_mut().unwrap().remove("color");
        next["entities"]["orc"] = json!({"name": "orc", "template": "mini", "position": [2, 0, 2]});

        let changes = diff(&old, &doc(next));
        let kinds: Vec<_> = changes.records.iter().map(|r| (r.name.as_str(), r.change_type)).collect();
        assert_eq!(
            kinds,
            vec![("cube_2", ChangeType::Delete), ("cube_1", ChangeType::Update), ("orc", ChangeType::Create)]
        );
        assert_eq!(changes.records[1].changed_fields["color"], Value::Null);
        assert_eq!(changes.records[2].changed_fields["template"], json!("mini"));
    }

    #[test]
    fn category_move_is_delete_plus_create() {
        let old = doc(base());
        let mut next = base();
        let cube = next["entities"].as_object_mut().unwrap().remove("cube_2").unwrap();
        next["models"] = json!({ "cube_2": cube });

        let changes = diff(&old, &doc(next));
        assert_eq!(changes.count(ChangeType::Delete), 1);
        assert_eq!(changes.count(ChangeType::Create), 1);
        assert_eq!(changes.records[0].category, ObjectCategory::Entity);
        assert_eq!(changes.records[1].category, ObjectCategory::Model);
    }

    #[test]
    fn settings_and_cameras_compare_wholesale() {
        let old = doc(base());
        let mut next = base();
        next["settings"]["grid"]["width"] = json!(12);
        next["cameras"] = json!({"main": {"position": [0, 10, 10]}});

        let changes = diff(&old, &doc(next));
        assert!(changes.records.is_empty());
        assert_eq!(changes.settings.unwrap()["grid"]["width"], json!(12));
        assert!(changes.cameras.unwrap().contains_key("main"));
    }

    #[test]
    fn wholesale_of_empty_scene_has_no_records() {
        let changes = wholesale(&doc(json!({"entities": {}, "settings": {}})));
        assert!(changes.is_empty());
    }
}
