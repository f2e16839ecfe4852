//! # Name Index
//!
//! Single name -> category index kept alongside the four object maps. Every
//! create and delete goes through it, which is what makes names unique
//! across categories.

use std::collections::HashMap;

use tabletop_shared::ObjectCategory;

use crate::error::{SceneError, SceneResult};

#[derive(Debug, Clone, Default)]
pub struct NameIndex {
    entries: HashMap<String, ObjectCategory>,
}

impl NameIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a name for a category, failing if any category holds it
    pub fn claim(&mut self, name: &str, category: ObjectCategory) -> SceneResult<()> {
        if let Some(existing) = self.entries.get(name) {
            return Err(SceneError::DuplicateName {
                name: name.to_string(),
                existing: *existing,
            });
        }
        self.entries.insert(name.to_string(), category);
        Ok(())
    }

    /// Release a name, returning the category it belonged to
    pub fn release(&mut self, name: &str) -> Option<ObjectCategory> {
        self.entries.remove(name)
    }

    pub fn resolve(&self, name: &str) -> Option<ObjectCategory> {
        self.entries.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
