//! # Collision Validation
//!
//! Pure geometry checks used to annotate placements: axis-aligned box
//! overlap between objects and containment on the table surface. Nothing
//! here holds state, and nothing here blocks a move.

use tabletop_shared::{CollisionBox, ObjectRecord, SurfaceBounds, Vec3};

/// Ring radii tried when looking for a free spot near a preferred position
const SEARCH_RADII: [f64; 4] = [0.5, 1.0, 1.5, 2.0];

/// Angular step between candidates on each ring, in degrees
const SEARCH_STEP_DEGREES: usize = 30;

/// Outcome of checking a proposed placement
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlacementReport {
    /// Names of overlapped objects, in name order
    pub collisions: Vec<String>,

    /// Whether the position rests on (or above) the surface footprint
    pub on_surface: bool,
}

impl PlacementReport {
    /// Free of collisions and on the surface
    pub fn is_clear(&self) -> bool {
        self.collisions.is_empty() && self.on_surface
    }
}

/// Standard AABB test on box centres. Boxes that merely touch do not overlap.
pub fn boxes_overlap(a_center: &Vec3, a_box: &CollisionBox, b_center: &Vec3, b_box: &CollisionBox) -> bool {
    let a_half = a_box.half_extents();
    let b_half = b_box.half_extents();

    (0..3).all(|axis| (a_center[axis] - b_center[axis]).abs() < a_half[axis] + b_half[axis])
}

/// Whether two objects overlap. Objects without a box are non-physical and never collide.
pub fn overlaps(a: &ObjectRecord, b: &ObjectRecord) -> bool {
    match (&a.collision_box, &b.collision_box) {
        (Some(a_box), Some(b_box)) => boxes_overlap(&a.position, a_box, &b.position, b_box),
        _ => false,
    }
}

/// Whether a position lies over the surface footprint (x and z) and at or
/// above its top face. No surface means an unbounded scene.
pub fn within_bounds(position: &Vec3, bounds: Option<&SurfaceBounds>) -> bool {
    let Some(bounds) = bounds else {
        return true;
    };

    let half_width = bounds.width / 2.0;
    let half_depth = bounds.depth / 2.0;

    (position[0] - bounds.center[0]).abs() <= half_width
        && (position[2] - bounds.center[2]).abs() <= half_depth
        && position[1] >= bounds.top
}

/// Check a hypothetical placement of `subject` against every other object
pub fn check_placement<'a, I>(
    subject: &str,
    position: &Vec3,
    subject_box: Option<&CollisionBox>,
    others: I,
    bounds: Option<&SurfaceBounds>,
) -> PlacementReport
where
    I: IntoIterator<Item = &'a ObjectRecord>,
{
    let mut collisions: Vec<String> = match subject_box {
        Some(subject_box) => others
            .into_iter()
            .filter(|other| other.name != subject)
            .filter(|other| {
                other
                    .collision_box
                    .as_ref()
                    .map(|other_box| boxes_overlap(position, subject_box, &other.position, other_box))
                    .unwrap_or(false)
            })
            .map(|other| other.name.clone())
            .collect(),
        None => Vec::new(),
    };
    collisions.sort();

    PlacementReport {
        collisions,
        on_surface: within_bounds(position, bounds),
    }
}

/// Candidate positions around `preferred`, nearest ring first. The preferred
/// position itself is the first candidate.
pub fn search_candidates(preferred: &Vec3, search_radius: f64) -> Vec<Vec3> {
    let mut candidates = vec![*preferred];

    for radius in SEARCH_RADII.iter().copied().filter(|r| *r <= search_radius) {
        for angle in (0..360).step_by(SEARCH_STEP_DEGREES) {
            let radians = (angle as f64).to_radians();
            candidates.push([
                preferred[0] + radius * radians.cos(),
                preferred[1],
                preferred[2] + radius * radians.sin(),
            ]);
        }
    }

    candidates
}
