//! Preprocessor – cleans and normalises a raw scan.
//!
//! Three passes, each consuming the previous one's output:
//!
//! 1. **Statistical outlier removal** – every point's mean distance to its
//!    `k` nearest neighbours is compared with the cloud-wide distribution;
//!    points beyond `mean + ratio·std` are discarded.
//! 2. **Voxel-grid downsampling** – each occupied voxel collapses to the
//!    centroid of its points (normals and colours are averaged).  Voxels are
//!    emitted in key order so the output order never depends on hashing.
//! 3. **Normal estimation** – PCA over the neighbourhood of every point; the
//!    eigenvector of the smallest eigenvalue is the surface normal.

use std::collections::BTreeMap;

use nalgebra::{Matrix3, Vector3};
use roomscan_types::{Point3, PointCloud, ScanError, Stage};
use tracing::{debug, info, instrument, warn};

use crate::config::PreprocessConfig;
use crate::octree::Octree;

/// Minimum neighbourhood size that defines a plane.
const MIN_NORMAL_NEIGHBORS: usize = 3;

/// The cleaned cloud plus the counts reported in the scan provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessOutcome {
    pub cloud: PointCloud,
    pub original_count: usize,
    pub outliers_removed: usize,
}

/// Run outlier removal, downsampling and normal estimation on `cloud`.
#[instrument(skip_all, fields(points = cloud.len()))]
pub fn preprocess(
    cloud: &PointCloud,
    config: &PreprocessConfig,
) -> Result<PreprocessOutcome, ScanError> {
    cloud.validate(Stage::Preprocess)?;
    let original_count = cloud.len();
    if original_count < config.low_point_warning {
        warn!(
            points = original_count,
            threshold = config.low_point_warning,
            "low point count, scan may be incomplete"
        );
    }

    let kept = remove_statistical_outliers(
        &cloud.points,
        config.outlier_neighbors,
        config.outlier_std_ratio,
    );
    if kept.is_empty() {
        return Err(ScanError::AllPointsRemoved {
            stage: Stage::Preprocess,
            input_size: original_count,
        });
    }
    let outliers_removed = original_count - kept.len();
    info!(
        removed = outliers_removed,
        kept = kept.len(),
        "statistical outlier removal"
    );
    let clean = cloud.select(&kept);

    let mut down = voxel_downsample(&clean, config.voxel_size);
    info!(
        voxel_size = config.voxel_size,
        points = down.len(),
        "voxel downsampling"
    );
    // Downsampling can collapse a small scan onto a point or a sheet.
    if down.is_degenerate() {
        return Err(ScanError::DegenerateCloud {
            stage: Stage::Preprocess,
            input_size: original_count,
        });
    }

    let normals = estimate_normals(
        &down.points,
        down.normals.as_deref(),
        config.normal_radius,
        config.normal_max_neighbors,
        config.viewpoint,
    );
    down.normals = Some(normals);
    debug!(points = down.len(), "normal estimation complete");

    Ok(PreprocessOutcome {
        cloud: down,
        original_count,
        outliers_removed,
    })
}

// ────────────────────────────────────────────────────────────────────────────
// Statistical outlier removal
// ────────────────────────────────────────────────────────────────────────────

/// Indices of the points that survive statistical outlier removal, ascending.
///
/// Clouds too small to have any neighbour are returned unchanged.
pub fn remove_statistical_outliers(points: &[Point3], k: usize, std_ratio: f32) -> Vec<usize> {
    let n = points.len();
    let k = k.min(n.saturating_sub(1));
    if k == 0 {
        return (0..n).collect();
    }

    let tree = Octree::from_points(points);
    let mean_distances: Vec<f64> = points
        .iter()
        .enumerate()
        .map(|(i, &p)| {
            let sum: f64 = tree
                .nearest(p, k + 1)
                .iter()
                .filter(|nb| nb.index != i)
                .take(k)
                .map(|nb| f64::from(nb.distance_squared).sqrt())
                .sum();
            sum / k as f64
        })
        .collect();

    let mean = mean_distances.iter().sum::<f64>() / n as f64;
    let variance = mean_distances
        .iter()
        .map(|d| (d - mean) * (d - mean))
        .sum::<f64>()
        / n as f64;
    let threshold = mean + f64::from(std_ratio) * variance.sqrt();

    mean_distances
        .iter()
        .enumerate()
        .filter(|(_, d)| **d <= threshold)
        .map(|(i, _)| i)
        .collect()
}

// ────────────────────────────────────────────────────────────────────────────
// Voxel downsampling
// ────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct VoxelAccumulator {
    count: usize,
    position: [f64; 3],
    normal: [f64; 3],
    color: [f64; 3],
}

fn accumulate(sum: &mut [f64; 3], v: [f32; 3]) {
    for (s, x) in sum.iter_mut().zip(v) {
        *s += f64::from(x);
    }
}

fn mean(sum: [f64; 3], count: usize) -> [f32; 3] {
    sum.map(|s| (s / count as f64) as f32)
}

/// Replace every occupied voxel of edge `voxel_size` by the centroid of its
/// points.  Output is ordered by voxel key.
pub fn voxel_downsample(cloud: &PointCloud, voxel_size: f32) -> PointCloud {
    let inv = 1.0 / f64::from(voxel_size);
    let key = |p: Point3| -> (i64, i64, i64) {
        (
            (f64::from(p.x) * inv).floor() as i64,
            (f64::from(p.y) * inv).floor() as i64,
            (f64::from(p.z) * inv).floor() as i64,
        )
    };

    let mut grid: BTreeMap<(i64, i64, i64), VoxelAccumulator> = BTreeMap::new();
    for (i, &p) in cloud.points.iter().enumerate() {
        let acc = grid.entry(key(p)).or_default();
        acc.count += 1;
        accumulate(&mut acc.position, p.to_array());
        if let Some(normals) = &cloud.normals {
            accumulate(&mut acc.normal, normals[i].to_array());
        }
        if let Some(colors) = &cloud.colors {
            accumulate(&mut acc.color, colors[i]);
        }
    }

    let points = grid
        .values()
        .map(|acc| Point3::from(mean(acc.position, acc.count)))
        .collect();
    let normals = cloud.normals.as_ref().map(|_| {
        grid.values()
            .map(|acc| {
                let avg = Point3::from(mean(acc.normal, acc.count));
                avg.normalized().unwrap_or(avg)
            })
            .collect()
    });
    let colors = cloud
        .colors
        .as_ref()
        .map(|_| grid.values().map(|acc| mean(acc.color, acc.count)).collect());

    PointCloud {
        points,
        normals,
        colors,
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Normal estimation
// ────────────────────────────────────────────────────────────────────────────

/// PCA normal of every point over at most `max_neighbors` neighbours within
/// `radius`.
///
/// Orientation: when `prior` normals are given (e.g. averaged scanner
/// normals) each estimate is flipped to agree with its prior; otherwise it is
/// flipped to face `viewpoint`, or the cloud centroid when that is unset.
/// Points with fewer than three neighbours get the `+z` axis.
pub fn estimate_normals(
    points: &[Point3],
    prior: Option<&[Point3]>,
    radius: f32,
    max_neighbors: usize,
    viewpoint: Option<Point3>,
) -> Vec<Point3> {
    if points.is_empty() {
        return Vec::new();
    }
    let tree = Octree::from_points(points);
    let target = viewpoint.unwrap_or_else(|| centroid(points));

    points
        .iter()
        .enumerate()
        .map(|(i, &p)| {
            let mut hits = tree.within_radius(p, radius);
            if hits.len() > max_neighbors {
                hits.sort_by(|a, b| {
                    a.distance_squared
                        .total_cmp(&b.distance_squared)
                        .then(a.index.cmp(&b.index))
                });
                hits.truncate(max_neighbors);
            }
            if hits.len() < MIN_NORMAL_NEIGHBORS {
                return Point3::new(0.0, 0.0, 1.0);
            }
            let neighbourhood: Vec<Point3> = hits.iter().map(|h| points[h.index]).collect();
            let Some(normal) = fit_normal(&neighbourhood) else {
                return Point3::new(0.0, 0.0, 1.0);
            };

            let reference = match prior {
                Some(prior) => prior[i],
                None => target.sub(p),
            };
            if normal.dot(reference) < 0.0 {
                normal.scale(-1.0)
            } else {
                normal
            }
        })
        .collect()
}

/// Arithmetic mean of `points` (origin for an empty slice).
pub fn centroid(points: &[Point3]) -> Point3 {
    if points.is_empty() {
        return Point3::zero();
    }
    let mut sum = [0.0f64; 3];
    for p in points {
        accumulate(&mut sum, p.to_array());
    }
    Point3::from(mean(sum, points.len()))
}

/// Least-squares plane normal of `points`: the eigenvector of the smallest
/// eigenvalue of their covariance.  `None` for fewer than three points.
pub fn fit_normal(points: &[Point3]) -> Option<Point3> {
    if points.len() < MIN_NORMAL_NEIGHBORS {
        return None;
    }
    let c = centroid(points);
    let c = Vector3::new(f64::from(c.x), f64::from(c.y), f64::from(c.z));

    let mut cov = Matrix3::<f64>::zeros();
    for p in points {
        let d = Vector3::new(f64::from(p.x), f64::from(p.y), f64::from(p.z)) - c;
        cov += d * d.transpose();
    }
    cov /= points.len() as f64;

    let eigen = cov.symmetric_eigen();
    let (smallest, _) = eigen
        .eigenvalues
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.total_cmp(b.1))?;
    let v = eigen.eigenvectors.column(smallest);
    Point3::new(v[0] as f32, v[1] as f32, v[2] as f32).normalized()
}
