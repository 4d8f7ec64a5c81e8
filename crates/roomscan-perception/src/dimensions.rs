//! DimensionEstimator – room length, width and height from labelled planes.
//!
//! Height is the distance between floor and ceiling.  Length and width come
//! from pairs of parallel walls; when the walls do not provide two
//! near-orthogonal pairs the estimator degrades to the bounding box of the
//! wall points and lowers its confidence.  Degradation is never an error.
//!
//! The cloud must already have passed [`PointCloud::validate`], so its
//! bounding box spans at least [`MIN_EXTENT`] along every axis.  Any measured
//! dimension shorter than that is replaced by the matching cloud extent.

use roomscan_types::{
    DimensionAccuracy, DimensionMethod, MIN_EXTENT, Plane, PlaneRole, Point3, PointCloud,
    RoomDimensions,
};
use tracing::{debug, info, instrument, warn};

use crate::config::DimensionConfig;

/// Two parallel walls and the distance between them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WallPair {
    /// Normal of the first wall of the pair.
    pub normal: Point3,
    pub separation: f32,
    /// Separation weighted by the combined inlier support of both walls.
    pub score: f32,
}

/// Estimate the room size from `planes` detected in `cloud`.
#[instrument(skip_all, fields(planes = planes.len()))]
pub fn estimate_dimensions(
    planes: &[Plane],
    cloud: &PointCloud,
    config: &DimensionConfig,
) -> RoomDimensions {
    let floor = planes.iter().find(|p| p.role == PlaneRole::Floor);
    let ceiling = planes.iter().find(|p| p.role == PlaneRole::Ceiling);
    let cloud_extent = cloud.bounds().map(|b| b.extent()).unwrap_or_default();

    let measured = floor
        .zip(ceiling)
        .map(|(f, c)| f.normal().dot(c.centroid.sub(f.centroid)).abs())
        .filter(|&h| h >= MIN_EXTENT);
    let height_measured = measured.is_some();
    if !height_measured {
        warn!(
            floor = floor.is_some(),
            ceiling = ceiling.is_some(),
            "no floor-to-ceiling distance, height from vertical extent"
        );
    }
    // Never taller than the scan itself.
    let height = measured.map_or(cloud_extent.z, |h| h.min(cloud_extent.z));

    let walls: Vec<&Plane> = planes.iter().filter(|p| p.role == PlaneRole::Wall).collect();
    let pairs = wall_pairs(&walls, config);
    let first = pairs.first().copied();
    let second = first.and_then(|a| {
        pairs
            .iter()
            .skip(1)
            .find(|b| a.normal.dot(b.normal).abs() <= config.orthogonal_tolerance)
            .copied()
    });

    let (a, b, method, confidence) = match (first, second) {
        (Some(p), Some(q)) => (
            p.separation,
            q.separation,
            DimensionMethod::WallPairs,
            config.wall_pair_confidence,
        ),
        (Some(p), None) => {
            let support = structural_points(planes, cloud);
            let across = horizontal_perpendicular(p.normal, floor);
            let mut spread = spread_along(&support, across);
            if spread < MIN_EXTENT {
                spread = spread_along(&cloud.points, across);
            }
            (
                p.separation,
                spread,
                DimensionMethod::PartialWallPairs,
                config.partial_confidence,
            )
        }
        _ => {
            warn!(
                walls = walls.len(),
                pairs = pairs.len(),
                "insufficient wall pairs, using bounding box"
            );
            let support = structural_points(planes, cloud);
            let mut extent = bounding_extent(&support);
            if extent.x.min(extent.y) < MIN_EXTENT {
                debug!("wall points span no area, using the whole cloud");
                extent = cloud_extent;
            }
            (
                extent.x,
                extent.y,
                DimensionMethod::BoundingBox,
                config.fallback_confidence,
            )
        }
    };

    let confidence = if height_measured {
        confidence
    } else {
        confidence - config.missing_height_penalty
    };

    let dims = RoomDimensions {
        length: a.max(b),
        width: a.min(b),
        height,
        accuracy: match method {
            DimensionMethod::WallPairs => DimensionAccuracy::WallPlanes,
            _ => DimensionAccuracy::BoundingBox,
        },
        confidence: confidence.clamp(0.0, 1.0),
        method,
    };
    info!(
        length = dims.length,
        width = dims.width,
        height = dims.height,
        method = ?dims.method,
        confidence = dims.confidence,
        "room dimensions"
    );
    dims
}

/// Parallel wall pairs, best score first.  Pairs closer than
/// `min_wall_separation` are ignored.
pub fn wall_pairs(walls: &[&Plane], config: &DimensionConfig) -> Vec<WallPair> {
    let mut pairs = Vec::new();
    for (i, a) in walls.iter().enumerate() {
        for b in &walls[i + 1..] {
            let alignment = a.normal().dot(b.normal()).abs();
            if alignment < config.parallel_tolerance {
                continue;
            }
            let separation = a.normal().dot(b.centroid.sub(a.centroid)).abs();
            if separation < config.min_wall_separation {
                debug!(separation, "wall pair too close, ignored");
                continue;
            }
            let support = (a.inlier_count() + b.inlier_count()) as f32;
            pairs.push(WallPair {
                normal: a.normal(),
                separation,
                score: separation * support,
            });
        }
    }
    // Stable: equal scores keep discovery order.
    pairs.sort_by(|x, y| y.score.total_cmp(&x.score));
    pairs
}

/// Inlier points of every plane that is neither floor nor ceiling; the whole
/// cloud when there are none.
fn structural_points(planes: &[Plane], cloud: &PointCloud) -> Vec<Point3> {
    let pts: Vec<Point3> = planes
        .iter()
        .filter(|p| !matches!(p.role, PlaneRole::Floor | PlaneRole::Ceiling))
        .flat_map(|p| p.inliers.iter().map(|&i| cloud.points[i]))
        .collect();
    if pts.is_empty() { cloud.points.clone() } else { pts }
}

/// Horizontal direction perpendicular to a wall normal.
fn horizontal_perpendicular(wall_normal: Point3, floor: Option<&Plane>) -> Point3 {
    let up = floor.map_or(Point3::new(0.0, 0.0, 1.0), |f| f.normal());
    up.cross(wall_normal)
        .normalized()
        .unwrap_or(Point3::new(0.0, 1.0, 0.0))
}

fn spread_along(points: &[Point3], dir: Point3) -> f32 {
    let (lo, hi) = points
        .iter()
        .map(|p| p.dot(dir))
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), t| {
            (lo.min(t), hi.max(t))
        });
    if hi >= lo { hi - lo } else { 0.0 }
}

fn bounding_extent(points: &[Point3]) -> Point3 {
    roomscan_types::Aabb::from_points(points.iter().copied())
        .map(|b| b.extent())
        .unwrap_or_default()
}
