//! Invariants that hold for every scan, checked over a handful of seeds and
//! room shapes.

use rand::SeedableRng;
use rand::rngs::StdRng;
use roomscan_perception::clustering::cluster_points;
use roomscan_perception::config::{ClusterConfig, PlaneConfig, PreprocessConfig};
use roomscan_perception::planes::detect_planes;
use roomscan_perception::preprocess::preprocess;
use roomscan_perception::synthetic::SyntheticRoom;
use roomscan_perception::{PipelineConfig, RoomPipeline};
use roomscan_types::{ObjectType, Point3, PointCloud};

fn coarse_config() -> PipelineConfig {
    let mut cfg = PipelineConfig::default();
    cfg.preprocess.voxel_size = 0.04;
    cfg.preprocess.low_point_warning = 0;
    cfg.planes.max_planes = 6;
    cfg.planes.distance_threshold = 0.02;
    cfg.planes.num_iterations = 200;
    cfg.clustering = ClusterConfig {
        eps: 0.15,
        min_points: 10,
        adaptive: false,
    };
    cfg
}

fn scenes() -> Vec<SyntheticRoom> {
    [1u64, 2, 3]
        .into_iter()
        .flat_map(|seed| {
            [
                SyntheticRoom::new(3.0, 2.5, 2.4).with_spacing(0.05).with_seed(seed),
                SyntheticRoom::new(5.0, 4.0, 2.7)
                    .with_spacing(0.05)
                    .with_seed(seed)
                    .with_box(Point3::new(1.0, 1.0, 0.0), Point3::new(2.0, 1.6, 0.75))
                    .with_box(Point3::new(3.5, 0.5, 0.0), Point3::new(4.5, 1.0, 1.8)),
                SyntheticRoom::new(4.0, 3.0, 2.5)
                    .with_spacing(0.05)
                    .with_seed(seed)
                    .without_walls(),
            ]
        })
        .collect()
}

fn z_extent(cloud: &PointCloud) -> f32 {
    cloud.bounds().map_or(0.0, |b| b.extent().z)
}

#[test]
fn reports_respect_their_bounds() {
    let pipeline = RoomPipeline::new(coarse_config()).unwrap();
    for scene in scenes() {
        let cloud = scene.build();
        let report = pipeline.run(&cloud).unwrap();

        let d = &report.dimensions;
        assert!(d.length > 0.0 && d.width > 0.0 && d.height > 0.0, "{d:?}");
        assert!(d.length >= d.width, "{d:?}");
        assert!(d.height <= z_extent(&cloud) + 1e-4, "{d:?}");
        assert!((0.0..=1.0).contains(&d.confidence));

        for obj in &report.objects {
            assert!((0.0..=1.0).contains(&obj.confidence), "{obj:?}");
            assert_eq!(obj.object_type == ObjectType::Unknown, obj.rule.is_none(), "{obj:?}");
        }
        for (i, obj) in report.objects.iter().enumerate() {
            assert_eq!(obj.id.0 as usize, i);
        }

        for rel in &report.relationships {
            assert!(rel.object_a < rel.object_b);
        }
        let a = &report.accessibility;
        assert!((0.0..=1.0).contains(&a.free_space_ratio));
        assert!(a.occupied_floor_area >= 0.0);
    }
}

#[test]
fn planes_never_exceed_limits() {
    let config = PlaneConfig {
        max_planes: 4,
        distance_threshold: 0.02,
        num_iterations: 200,
        ..PlaneConfig::default()
    };
    for scene in scenes() {
        let cloud = preprocess(&scene.build(), &PreprocessConfig {
            voxel_size: 0.04,
            low_point_warning: 0,
            ..PreprocessConfig::default()
        })
        .unwrap()
        .cloud;
        let mut rng = StdRng::seed_from_u64(42);
        let planes = detect_planes(&cloud, &config, &mut rng);

        assert!(planes.len() <= config.max_planes);
        let mut seen = vec![false; cloud.len()];
        for plane in &planes {
            assert!(plane.inlier_count() >= config.min_plane_inliers);
            for &i in &plane.inliers {
                assert!(!seen[i], "point {i} claimed twice");
                seen[i] = true;
            }
        }
    }
}

#[test]
fn every_point_is_clustered_or_noise() {
    let cfg = coarse_config();
    for scene in scenes() {
        let cloud = scene.build();
        let clustering = cluster_points(&cloud, &cfg.clustering, cfg.preprocess.voxel_size);
        let stats = &clustering.stats;

        assert_eq!(clustering.labels.len(), cloud.len());
        let clustered: usize = stats.cluster_sizes.values().sum();
        assert_eq!(clustered + stats.noise_points, stats.total_points);
        assert_eq!(stats.cluster_sizes.len(), stats.num_clusters);
        for (&label, &size) in &stats.cluster_sizes {
            assert_eq!(clustering.members(label).len(), size);
        }
    }
}
