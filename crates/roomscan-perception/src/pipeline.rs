//! [`RoomPipeline`] – runs every stage over one scan.
//!
//! ```text
//! PointCloud ─► preprocess ─► detect_planes ─────────► estimate_dimensions
//!                                  │                           ▲
//!                           residual points              wall remnants
//!                                  ▼                           │
//!                           cluster_points ────────────────────┤
//!                                                              ▼
//!                             classify_clusters ─► analyze_relationships
//! ```
//!
//! When the detector runs out of plane budget before every wall is found, a
//! leftover wall shows up as a residual cluster.  It is handed to the
//! dimension estimator as a wall and kept out of the object list.
//!
//! The pipeline owns nothing but its validated configuration, so one
//! instance can serve any number of scans from any number of threads.  Each
//! run seeds a fresh RNG from `config.seed`: the same cloud always yields the
//! same report.

use rand::SeedableRng;
use rand::rngs::StdRng;
use roomscan_types::{
    ConfigError, Plane, PlaneRole, Point3, PointCloud, RoomReport, ScanError, ScanProvenance,
    Stage,
};
use schemars::schema::RootSchema;
use tracing::{debug, info, instrument};

use crate::classify::{ObjectFeatures, classify_clusters, is_structural};
use crate::clustering::{Clustering, cluster_points};
use crate::config::{ClassifierConfig, PipelineConfig};
use crate::dimensions::estimate_dimensions;
use crate::planes::detect_planes;
use crate::preprocess::{centroid, fit_normal, preprocess};
use crate::quality::assess_scan_quality;
use crate::relations::{analyze_relationships, assess_accessibility};

#[derive(Debug, Clone)]
pub struct RoomPipeline {
    config: PipelineConfig,
}

impl RoomPipeline {
    /// Validate `config` and build a pipeline around it.
    pub fn new(config: PipelineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Analyse one scan.
    ///
    /// Fails only on unusable input (empty, non-finite or degenerate clouds);
    /// weak geometry degrades the confidence of the report instead.
    #[instrument(skip_all, fields(points = cloud.len(), seed = self.config.seed))]
    pub fn run(&self, cloud: &PointCloud) -> Result<RoomReport, ScanError> {
        cloud.validate(Stage::Input)?;
        let scan_quality = assess_scan_quality(cloud);
        info!(score = scan_quality.score, rating = ?scan_quality.rating, "scan quality");

        let pre = preprocess(cloud, &self.config.preprocess)?;
        let processed = &pre.cloud;

        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let planes = detect_planes(processed, &self.config.planes, &mut rng);

        let residual_idx = residual_indices(processed.len(), &planes);
        let residual = processed.select(&residual_idx);
        let clustering = cluster_points(
            &residual,
            &self.config.clustering,
            self.config.preprocess.voxel_size,
        );

        let vertical_extent = processed.bounds().map_or(0.0, |b| b.extent().z);
        let remnants = wall_remnants(
            &residual,
            &residual_idx,
            &clustering,
            vertical_extent,
            &self.config.classifier,
        );
        let structure: Vec<Plane> = planes.iter().cloned().chain(remnants).collect();
        let dimensions = estimate_dimensions(&structure, processed, &self.config.dimensions);
        let objects = classify_clusters(
            &residual,
            &clustering,
            &self.config.classifier,
            dimensions.height,
        );
        let relationships = analyze_relationships(&objects, &self.config.relations);
        let accessibility = assess_accessibility(&objects, &dimensions, &self.config.relations);

        info!(
            objects = objects.len(),
            relationships = relationships.len(),
            "room analysis complete"
        );
        Ok(RoomReport {
            dimensions,
            objects,
            relationships,
            accessibility,
            cluster_stats: clustering.stats,
            provenance: ScanProvenance {
                original_point_count: pre.original_count,
                processed_point_count: processed.len(),
                scan_quality,
            },
        })
    }
}

/// Indices `0..n` claimed by none of `planes`, ascending.
pub fn residual_indices(n: usize, planes: &[Plane]) -> Vec<usize> {
    let mut claimed = vec![false; n];
    for &i in planes.iter().flat_map(|p| p.inliers.iter()) {
        if let Some(slot) = claimed.get_mut(i) {
            *slot = true;
        }
    }
    (0..n).filter(|&i| !claimed[i]).collect()
}

/// Residual clusters that are walls the detector had no plane left for (see
/// [`is_structural`]), as wall planes whose inliers index the processed
/// cloud through `residual_idx`.
pub fn wall_remnants(
    residual: &PointCloud,
    residual_idx: &[usize],
    clustering: &Clustering,
    room_height: f32,
    config: &ClassifierConfig,
) -> Vec<Plane> {
    let mut walls = Vec::new();
    for label in 0..clustering.num_clusters() {
        let members = clustering.members(label);
        if members.len() < config.min_cluster_points {
            continue;
        }
        let points: Vec<Point3> = members.iter().map(|&i| residual.points[i]).collect();
        let Some(features) = ObjectFeatures::from_points(&points) else {
            continue;
        };
        if !is_structural(&points, &features, room_height, config) {
            continue;
        }
        let Some(n) = fit_normal(&points) else {
            continue;
        };
        let c = centroid(&points);
        debug!(label, points = points.len(), "residual cluster recovered as wall");
        walls.push(Plane {
            coefficients: [n.x, n.y, n.z, -n.dot(c)],
            inliers: members.iter().map(|&i| residual_idx[i]).collect(),
            role: PlaneRole::Wall,
            centroid: c,
        });
    }
    if !walls.is_empty() {
        info!(walls = walls.len(), "walls recovered from residual clusters");
    }
    walls
}

/// JSON Schema of [`RoomReport`], for consumers that persist or serve it.
pub fn report_schema() -> RootSchema {
    schemars::schema_for!(RoomReport)
}

#[cfg(test)]
mod tests {
    use super::*;
    use roomscan_types::ClusterStats;

    #[test]
    fn invalid_config_is_rejected_at_construction() {
        let mut cfg = PipelineConfig::default();
        cfg.clustering.eps = 0.0;
        let err = RoomPipeline::new(cfg).unwrap_err();
        assert!(err.to_string().contains("clustering.eps"));
    }

    #[test]
    fn empty_cloud_fails_at_input() {
        let pipeline = RoomPipeline::new(PipelineConfig::default()).unwrap();
        let err = pipeline.run(&PointCloud::default()).unwrap_err();
        assert_eq!(err, ScanError::EmptyCloud { stage: Stage::Input });
    }

    #[test]
    fn mismatched_colors_fail_at_input() {
        let pipeline = RoomPipeline::new(PipelineConfig::default()).unwrap();
        let cloud = PointCloud::new(vec![Point3::zero(); 3]).with_colors(vec![[0.0; 3]; 2]);
        let err = pipeline.run(&cloud).unwrap_err();
        assert_eq!(err.stage(), Some(Stage::Input));
    }

    #[test]
    fn degenerate_scans_fail_at_input() {
        let pipeline = RoomPipeline::new(PipelineConfig::default()).unwrap();
        let flat: Vec<Point3> = (0..2500)
            .map(|i| Point3::new((i % 50) as f32 * 0.05, (i / 50) as f32 * 0.05, 0.0))
            .collect();
        let line: Vec<Point3> = (0..100)
            .map(|i| Point3::new(i as f32 * 0.05, 0.0, 0.0))
            .collect();
        let cases = [
            (flat, 2500),
            (vec![Point3::new(1.0, 1.0, 1.0)], 1),
            (line, 100),
        ];
        for (points, n) in cases {
            let err = pipeline.run(&PointCloud::new(points)).unwrap_err();
            assert_eq!(
                err,
                ScanError::DegenerateCloud {
                    stage: Stage::Input,
                    input_size: n
                }
            );
        }
    }

    #[test]
    fn residual_excludes_every_inlier() {
        let plane = |inliers: Vec<usize>| Plane {
            coefficients: [0.0, 0.0, 1.0, 0.0],
            inliers,
            role: PlaneRole::Unclassified,
            centroid: Point3::zero(),
        };
        let planes = [plane(vec![0, 2]), plane(vec![3, 9])];
        assert_eq!(residual_indices(6, &planes), vec![1, 4, 5]);
    }

    #[test]
    fn wall_cluster_becomes_a_wall_plane() {
        // 3 m x 2.4 m sheet at x = 4 followed by a small block.
        let mut pts: Vec<Point3> = (0..61 * 49)
            .map(|k| Point3::new(4.0, (k % 61) as f32 * 0.05, (k / 61) as f32 * 0.05))
            .collect();
        let sheet = pts.len();
        pts.extend((0..64).map(|k| {
            Point3::new(
                1.0 + (k % 4) as f32 * 0.1,
                1.0 + (k / 4 % 4) as f32 * 0.1,
                (k / 16) as f32 * 0.1,
            )
        }));
        let mut labels = vec![Some(0); sheet];
        labels.extend(vec![Some(1); 64]);
        let clustering = Clustering {
            stats: ClusterStats {
                total_points: labels.len(),
                num_clusters: 2,
                ..ClusterStats::default()
            },
            labels,
        };
        let residual_idx: Vec<usize> = (0..pts.len()).map(|i| 1000 + 2 * i).collect();

        let walls = wall_remnants(
            &PointCloud::new(pts),
            &residual_idx,
            &clustering,
            2.5,
            &ClassifierConfig::default(),
        );
        assert_eq!(walls.len(), 1);
        let wall = &walls[0];
        assert_eq!(wall.role, PlaneRole::Wall);
        assert_eq!(wall.inlier_count(), sheet);
        assert_eq!(wall.inliers[0], 1000);
        assert!(wall.normal().x.abs() > 0.99);
        assert!(wall.signed_distance(Point3::new(4.0, 0.0, 0.0)).abs() < 1e-4);
    }

    #[test]
    fn schema_describes_the_report() {
        let schema = serde_json::to_string(&report_schema()).unwrap();
        for field in ["dimensions", "objects", "relationships", "provenance"] {
            assert!(schema.contains(field), "{field}");
        }
    }

    #[test]
    fn pipeline_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<RoomPipeline>();
    }
}
