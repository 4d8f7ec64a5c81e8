//! PlaneDetector – iterative RANSAC extraction of the dominant planes.
//!
//! Each round samples three distinct points from the points not yet assigned
//! to a plane, fits the plane through them and counts the points within
//! `distance_threshold`.  The model with the most inliers wins (ties go to
//! the earliest iteration), is refined by a least-squares fit over its
//! inliers, and its inliers are removed before the next round.
//!
//! Roles are assigned once, after extraction:
//!
//! | `|n·up|`             | Role |
//! |----------------------|------|
//! | > `horizontal_tilt`  | Floor (lowest) / Ceiling (highest) |
//! | < `vertical_tilt`    | Wall |
//! | otherwise            | Unclassified |

use rand::Rng;
use rand::seq::index;
use roomscan_types::{Plane, PlaneRole, Point3, PointCloud};
use tracing::{debug, info, instrument};

use crate::config::PlaneConfig;
use crate::preprocess::{centroid, fit_normal};

/// Unit normal plus offset: `normal·p + d = 0`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct PlaneModel {
    normal: Point3,
    d: f32,
}

impl PlaneModel {
    /// Plane through three points; `None` when they are (nearly) collinear.
    fn through(a: Point3, b: Point3, c: Point3) -> Option<Self> {
        let normal = b.sub(a).cross(c.sub(a)).normalized()?;
        Some(Self {
            normal,
            d: -normal.dot(a),
        })
    }

    fn distance(&self, p: Point3) -> f32 {
        (self.normal.dot(p) + self.d).abs()
    }

    fn flipped(self) -> Self {
        Self {
            normal: self.normal.scale(-1.0),
            d: -self.d,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Detection
// ────────────────────────────────────────────────────────────────────────────

/// Extract at most `config.max_planes` planes from `cloud`.
///
/// Every returned plane has at least [`PlaneConfig::min_support`] inliers,
/// measured against the points that were still unassigned when it was found.
/// Inlier sets of different planes are disjoint.
#[instrument(skip_all, fields(points = cloud.len(), max_planes = config.max_planes))]
pub fn detect_planes(cloud: &PointCloud, config: &PlaneConfig, rng: &mut impl Rng) -> Vec<Plane> {
    let points = &cloud.points;
    let mut remaining: Vec<usize> = (0..points.len()).collect();
    let mut found: Vec<(PlaneModel, Vec<usize>)> = Vec::new();
    let min_remaining = config.min_remaining_points.max(3);

    while found.len() < config.max_planes {
        if remaining.len() < min_remaining {
            debug!(remaining = remaining.len(), "too few points left for another plane");
            break;
        }
        let min_support = config.min_support(remaining.len());

        let Some(model) = best_model(points, &remaining, config, rng) else {
            debug!(remaining = remaining.len(), "no non-degenerate sample found");
            break;
        };
        let (model, inliers) = refine(points, &remaining, model, config.distance_threshold);
        if inliers.len() < min_support {
            debug!(
                inliers = inliers.len(),
                min_support, "best plane below minimum support"
            );
            break;
        }

        debug!(
            plane = found.len(),
            inliers = inliers.len(),
            normal = ?model.normal,
            "plane extracted"
        );
        remaining = subtract_sorted(&remaining, &inliers);
        found.push((model, inliers));
    }

    let planes = assign_roles(found, points, config);
    info!(
        planes = planes.len(),
        unassigned = remaining.len(),
        "plane detection complete"
    );
    planes
}

/// The RANSAC winner over `remaining`, or `None` if every sample was
/// degenerate.
fn best_model(
    points: &[Point3],
    remaining: &[usize],
    config: &PlaneConfig,
    rng: &mut impl Rng,
) -> Option<PlaneModel> {
    let samples = (0..config.num_iterations).map(|_| {
        let sample = index::sample(rng, remaining.len(), 3);
        [0, 1, 2].map(|k| remaining[sample.index(k)])
    });
    best_of(points, remaining, config.distance_threshold, samples)
}

/// Score the planes through each index triple in order and keep the one
/// with the most inliers among `remaining`.  Collinear triples are skipped.
fn best_of(
    points: &[Point3],
    remaining: &[usize],
    threshold: f32,
    samples: impl IntoIterator<Item = [usize; 3]>,
) -> Option<PlaneModel> {
    let mut best: Option<(PlaneModel, usize)> = None;

    for [a, b, c] in samples {
        let Some(model) = PlaneModel::through(points[a], points[b], points[c]) else {
            continue;
        };

        let count = remaining
            .iter()
            .filter(|&&i| model.distance(points[i]) < threshold)
            .count();
        // Strictly greater: ties keep the earliest model.
        if best.is_none_or(|(_, best_count)| count > best_count) {
            best = Some((model, count));
        }
    }

    best.map(|(model, _)| model)
}

/// Refit `model` over its inliers and recount once; the refit is kept when it
/// explains at least as many points.
fn refine(
    points: &[Point3],
    remaining: &[usize],
    model: PlaneModel,
    threshold: f32,
) -> (PlaneModel, Vec<usize>) {
    let inliers_of = |m: &PlaneModel| -> Vec<usize> {
        remaining
            .iter()
            .copied()
            .filter(|&i| m.distance(points[i]) < threshold)
            .collect()
    };

    let inliers = inliers_of(&model);
    let support: Vec<Point3> = inliers.iter().map(|&i| points[i]).collect();
    let Some(normal) = fit_normal(&support) else {
        return (model, inliers);
    };
    let normal = if normal.dot(model.normal) < 0.0 {
        normal.scale(-1.0)
    } else {
        normal
    };
    let refit = PlaneModel {
        normal,
        d: -normal.dot(centroid(&support)),
    };

    let refit_inliers = inliers_of(&refit);
    if refit_inliers.len() >= inliers.len() {
        (refit, refit_inliers)
    } else {
        (model, inliers)
    }
}

/// `a` minus `b`; both ascending.
fn subtract_sorted(a: &[usize], b: &[usize]) -> Vec<usize> {
    let mut out = Vec::with_capacity(a.len().saturating_sub(b.len()));
    let mut j = 0;
    for &x in a {
        while j < b.len() && b[j] < x {
            j += 1;
        }
        if j < b.len() && b[j] == x {
            continue;
        }
        out.push(x);
    }
    out
}

// ────────────────────────────────────────────────────────────────────────────
// Roles
// ────────────────────────────────────────────────────────────────────────────

/// Label every plane once.  Floor and ceiling normals are flipped to face
/// into the room.
fn assign_roles(
    found: Vec<(PlaneModel, Vec<usize>)>,
    points: &[Point3],
    config: &PlaneConfig,
) -> Vec<Plane> {
    let up = config.up.normalized().unwrap_or(Point3::new(0.0, 0.0, 1.0));
    let centroids: Vec<Point3> = found
        .iter()
        .map(|(_, inliers)| {
            let support: Vec<Point3> = inliers.iter().map(|&i| points[i]).collect();
            centroid(&support)
        })
        .collect();

    let horizontal: Vec<usize> = found
        .iter()
        .enumerate()
        .filter(|(_, (m, _))| m.normal.dot(up).abs() > config.horizontal_tilt)
        .map(|(i, _)| i)
        .collect();
    let elevation = |i: usize| centroids[i].dot(up);

    let mut floor = None;
    let mut ceiling = None;
    for &i in &horizontal {
        if floor.is_none_or(|f| elevation(i) < elevation(f)) {
            floor = Some(i);
        }
        if ceiling.is_none_or(|c| elevation(i) >= elevation(c)) {
            ceiling = Some(i);
        }
    }
    if horizontal.len() < 2 {
        ceiling = None;
    }

    found
        .into_iter()
        .enumerate()
        .map(|(i, (model, inliers))| {
            let tilt = model.normal.dot(up).abs();
            let (role, model) = if Some(i) == floor {
                let m = if model.normal.dot(up) < 0.0 { model.flipped() } else { model };
                (PlaneRole::Floor, m)
            } else if Some(i) == ceiling {
                let m = if model.normal.dot(up) > 0.0 { model.flipped() } else { model };
                (PlaneRole::Ceiling, m)
            } else if tilt < config.vertical_tilt {
                (PlaneRole::Wall, model)
            } else {
                (PlaneRole::Unclassified, model)
            };
            Plane {
                coefficients: [model.normal.x, model.normal.y, model.normal.z, model.d],
                inliers,
                role,
                centroid: centroids[i],
            }
        })
        .collect()
}
