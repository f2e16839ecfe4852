//! # Template Boxes
//!
//! Lookup from template name to base collision box. A record's collision box
//! is the base box scaled element-wise by the record's scale, and is
//! recomputed whenever either changes.

use once_cell::sync::Lazy;
use std::collections::HashMap;

use tabletop_shared::constants::TEMPLATE_BOXES;
use tabletop_shared::{CollisionBox, ObjectCategory, Vec3};

/// Registry of base boxes keyed by lowercase template name
static TEMPLATE_REGISTRY: Lazy<HashMap<&'static str, CollisionBox>> = Lazy::new(|| {
    TEMPLATE_BOXES
        .iter()
        .map(|(name, [w, h, d])| (*name, CollisionBox::new(*w, *h, *d)))
        .collect()
});

/// Base box for a template, falling back to the unit box
pub fn base_box(template: &str) -> CollisionBox {
    let key = template.trim().to_ascii_lowercase();
    TEMPLATE_REGISTRY
        .get(key.as_str())
        .copied()
        .unwrap_or_else(CollisionBox::unit)
}

/// Whether the template has its own registered box
pub fn is_known_template(template: &str) -> bool {
    TEMPLATE_REGISTRY.contains_key(template.trim().to_ascii_lowercase().as_str())
}

/// Collision box for an object of this category, template and scale.
/// Non-physical categories have none.
pub fn collision_box_for(category: ObjectCategory, template: &str, scale: &Vec3) -> Option<CollisionBox> {
    if !category.is_physical() {
        return None;
    }
    Some(base_box(template).scaled(scale))
}
