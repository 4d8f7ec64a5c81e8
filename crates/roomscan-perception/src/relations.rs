//! RelationshipAnalyzer – pairwise proximity between detected objects.
//!
//! Object centres go into an [`Octree`]; each object only looks at the
//! objects whose centres could possibly be nearby or touching, and pairs
//! that are neither are left out of the report.

use roomscan_types::{
    Accessibility, DetectedObject, Point3, RelationshipKind, RoomDimensions, SpatialRelationship,
};
use tracing::{debug, info, instrument};

use crate::config::RelationConfig;
use crate::octree::Octree;

/// Relationships of every object pair that is adjacent or nearby, sorted by
/// `(object_a, object_b)`.
#[instrument(skip_all, fields(objects = objects.len()))]
pub fn analyze_relationships(
    objects: &[DetectedObject],
    config: &RelationConfig,
) -> Vec<SpatialRelationship> {
    if objects.len() < 2 {
        return Vec::new();
    }

    let centres: Vec<Point3> = objects.iter().map(|o| o.position).collect();
    let tree = Octree::from_points(&centres);

    // Two boxes can touch while their centres are up to the sum of their
    // half-diagonals apart.
    let max_half_diagonal = objects
        .iter()
        .map(|o| Point3::from(o.dimensions).norm() * 0.5)
        .fold(0.0f32, f32::max);
    let reach = config.nearby_threshold.max(config.adjacent_threshold) + 2.0 * max_half_diagonal;

    let mut relationships = Vec::new();
    for (i, a) in objects.iter().enumerate() {
        for hit in tree.within_radius(a.position, reach) {
            if hit.index <= i {
                continue;
            }
            let rel = relate(a, &objects[hit.index], config);
            if rel.kind != RelationshipKind::None {
                debug!(
                    a = %rel.object_a,
                    b = %rel.object_b,
                    kind = ?rel.kind,
                    clearance = rel.clearance,
                    "relationship"
                );
                relationships.push(rel);
            }
        }
    }

    relationships.sort_by_key(|r| (r.object_a, r.object_b));
    info!(relationships = relationships.len(), "relationship analysis complete");
    relationships
}

/// Distance, clearance and kind of one pair, ids ordered so `a < b`.
pub fn relate(
    a: &DetectedObject,
    b: &DetectedObject,
    config: &RelationConfig,
) -> SpatialRelationship {
    let (a, b) = if a.id <= b.id { (a, b) } else { (b, a) };
    let offset = b.position.sub(a.position);
    let distance = offset.norm();
    let axis = offset.normalized().unwrap_or(Point3::new(1.0, 0.0, 0.0));
    let clearance = distance - half_extent_along(a, axis) - half_extent_along(b, axis);

    let kind = if clearance < config.adjacent_threshold {
        RelationshipKind::Adjacent
    } else if distance < config.nearby_threshold {
        RelationshipKind::Nearby
    } else {
        RelationshipKind::None
    };

    SpatialRelationship {
        object_a: a.id,
        object_b: b.id,
        distance,
        clearance,
        kind,
    }
}

/// Projection of the object's half extents onto `axis`.
fn half_extent_along(o: &DetectedObject, axis: Point3) -> f32 {
    let [x, y, z] = o.dimensions;
    0.5 * (x * axis.x.abs() + y * axis.y.abs() + z * axis.z.abs())
}

/// Free floor space left by the objects' footprints.
pub fn assess_accessibility(
    objects: &[DetectedObject],
    dimensions: &RoomDimensions,
    config: &RelationConfig,
) -> Accessibility {
    let floor_area = dimensions.length * dimensions.width;
    let occupied: f32 = objects.iter().map(|o| o.dimensions[0] * o.dimensions[1]).sum();
    let free_space_ratio = if floor_area > 0.0 {
        (1.0 - occupied / floor_area).clamp(0.0, 1.0)
    } else {
        1.0
    };

    Accessibility {
        free_space_ratio,
        occupied_floor_area: occupied,
        min_pathway_width: config.min_pathway_width,
        has_clear_pathways: free_space_ratio > config.clear_pathway_ratio,
    }
}
