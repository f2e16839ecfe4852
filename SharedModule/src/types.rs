//! # Common Types
//!
//! Geometric primitives used across the scene model. Vectors are plain
//! `[f64; 3]` arrays so they serialize as the `[x, y, z]` triples that
//! controllers and the external state file already use.

use serde::{Serialize, Deserialize};

/// Three-component vector (position, rotation in degrees, or scale)
pub type Vec3 = [f64; 3];

/// Neutral position / rotation
pub const VEC3_ZERO: Vec3 = [0.0, 0.0, 0.0];

/// Neutral scale
pub const VEC3_ONE: Vec3 = [1.0, 1.0, 1.0];

/// Axis-aligned extents of an object, already multiplied by its scale
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CollisionBox {
    pub width: f64,
    pub height: f64,
    pub depth: f64,
}

impl CollisionBox {
    pub fn new(width: f64, height: f64, depth: f64) -> Self {
        Self { width, height, depth }
    }

    /// Unit box, used for templates without a registered base box
    pub fn unit() -> Self {
        Self { width: 1.0, height: 1.0, depth: 1.0 }
    }

    /// Scale the box element-wise
    pub fn scaled(&self, scale: &Vec3) -> Self {
        Self {
            width: self.width * scale[0].abs(),
            height: self.height * scale[1].abs(),
            depth: self.depth * scale[2].abs(),
        }
    }

    /// Half extents along x, y, z
    pub fn half_extents(&self) -> Vec3 {
        [self.width / 2.0, self.height / 2.0, self.depth / 2.0]
    }
}

/// Rectangular surface that objects rest on (the table)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurfaceBounds {
    /// Centre of the surface footprint on the ground plane
    pub center: Vec3,

    /// Extent along x
    pub width: f64,

    /// Extent along z
    pub depth: f64,

    /// Height of the top face
    pub top: f64,
}

impl SurfaceBounds {
    pub fn new(center: Vec3, width: f64, depth: f64, top: f64) -> Self {
        Self { center, width, depth, top }
    }
}

impl Default for SurfaceBounds {
    fn default() -> Self {
        Self {
            center: VEC3_ZERO,
            width: 20.0,
            depth: 20.0,
            top: 0.0,
        }
    }
}

/// Try to read a JSON value as exactly three finite numbers
pub fn vec3_from_json(value: &serde_json::Value) -> Option<Vec3> {
    let items = value.as_array()?;
    if items.len() != 3 {
        return None;
    }

    let mut out = VEC3_ZERO;
    for (slot, item) in out.iter_mut().zip(items) {
        let n = item.as_f64()?;
        if !n.is_finite() {
            return None;
        }
        *slot = n;
    }
    Some(out)
}
