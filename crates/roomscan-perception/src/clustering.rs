//! ObjectClusterer – DBSCAN over the points no plane claimed.
//!
//! A point is *core* when at least `min_points` other points lie within
//! `eps`.  Clusters grow transitively from core points through their
//! neighbourhoods; non-core points reached from a core point join as border
//! points, everything else is noise.  Seeds are visited in ascending index
//! order, so labels are deterministic for a given cloud.

use std::collections::{BTreeMap, VecDeque};
use std::f32::consts::PI;

use roomscan_types::{ClusterStats, PointCloud};
use tracing::{debug, info, instrument};

use crate::config::ClusterConfig;
use crate::octree::Octree;

/// Result of one clustering run.
#[derive(Debug, Clone, PartialEq)]
pub struct Clustering {
    /// Cluster label per point; `None` marks noise.
    pub labels: Vec<Option<usize>>,
    pub stats: ClusterStats,
}

impl Clustering {
    pub fn num_clusters(&self) -> usize {
        self.stats.num_clusters
    }

    /// Indices of the points carrying `label`, ascending.
    pub fn members(&self, label: usize) -> Vec<usize> {
        self.labels
            .iter()
            .enumerate()
            .filter(|(_, l)| **l == Some(label))
            .map(|(i, _)| i)
            .collect()
    }
}

/// The `(eps, min_points)` a run on `n` points actually uses.
///
/// In adaptive mode `eps` grows to 2.5 voxel edges (within 5–15 cm) and
/// `min_points` follows the cloud size: `max(10, n/4)` below 200 points,
/// `max(20, 15% of n)` below 1000, the configured value above.  It is then
/// capped at half of what a voxel-sampled surface can offer inside `eps`, so
/// downsampled clouds can still form clusters.
pub fn effective_parameters(n: usize, config: &ClusterConfig, voxel_size: f32) -> (f32, usize) {
    if !config.adaptive {
        return (config.eps, config.min_points);
    }

    let eps = config.eps.max((voxel_size * 2.5).clamp(0.05, 0.15));
    let by_size = if n < 200 {
        10.max(n / 4)
    } else if n < 1000 {
        20.max(n * 15 / 100)
    } else {
        config.min_points
    };
    let by_size = by_size.min(10.max(n.saturating_sub(5)));
    let surface_cap = ((0.5 * PI * eps * eps / (voxel_size * voxel_size)).floor() as usize).max(4);

    (eps, by_size.min(surface_cap).max(1))
}

/// Label every point of `cloud` with a cluster or as noise.
#[instrument(skip_all, fields(points = cloud.len()))]
pub fn cluster_points(cloud: &PointCloud, config: &ClusterConfig, voxel_size: f32) -> Clustering {
    let n = cloud.len();
    let (eps, min_points) = effective_parameters(n, config, voxel_size);
    debug!(eps, min_points, "dbscan parameters");

    let tree = Octree::from_points(&cloud.points);
    let region = |i: usize| -> Vec<usize> {
        let mut nbrs: Vec<usize> = tree
            .within_radius(cloud.points[i], eps)
            .into_iter()
            .map(|nb| nb.index)
            .filter(|&j| j != i)
            .collect();
        nbrs.sort_unstable();
        nbrs
    };

    let mut labels: Vec<Option<usize>> = vec![None; n];
    let mut visited = vec![false; n];
    let mut next_label = 0;

    for seed in 0..n {
        if visited[seed] {
            continue;
        }
        visited[seed] = true;
        let nbrs = region(seed);
        if nbrs.len() < min_points {
            continue;
        }

        let label = next_label;
        next_label += 1;
        labels[seed] = Some(label);

        let mut queue: VecDeque<usize> = nbrs.into();
        while let Some(j) = queue.pop_front() {
            if labels[j].is_none() {
                labels[j] = Some(label);
            }
            if visited[j] {
                continue;
            }
            visited[j] = true;
            let reach = region(j);
            if reach.len() >= min_points {
                queue.extend(reach);
            }
        }
    }

    let stats = summarize(&labels, next_label, eps, min_points);
    info!(
        clusters = stats.num_clusters,
        noise = stats.noise_points,
        "clustering complete"
    );
    Clustering { labels, stats }
}

fn summarize(
    labels: &[Option<usize>],
    num_clusters: usize,
    eps: f32,
    min_points: usize,
) -> ClusterStats {
    let mut cluster_sizes = BTreeMap::new();
    for label in labels.iter().flatten() {
        *cluster_sizes.entry(*label).or_insert(0) += 1;
    }
    let noise_points = labels.iter().filter(|l| l.is_none()).count();
    ClusterStats {
        total_points: labels.len(),
        num_clusters,
        noise_points,
        noise_ratio: if labels.is_empty() {
            0.0
        } else {
            noise_points as f32 / labels.len() as f32
        },
        eps_used: eps,
        min_points_used: min_points,
        cluster_sizes,
    }
}
