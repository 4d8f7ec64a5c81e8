//! Pipeline configuration.
//!
//! All tunable thresholds live in one immutable [`PipelineConfig`] that is
//! validated once, when the [`RoomPipeline`][crate::pipeline::RoomPipeline]
//! is constructed.  No stage reads ambient or global state.
//!
//! Every section deserialises with `#[serde(default)]`, so a TOML file only
//! needs to name the values it changes:
//!
//! ```toml
//! seed = 7
//!
//! [preprocess]
//! voxel_size = 0.04
//!
//! [clustering]
//! eps = 0.08
//! ```

use roomscan_types::{ConfigError, ObjectType, Point3};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// ────────────────────────────────────────────────────────────────────────────
// PipelineConfig
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct PipelineConfig {
    /// Seed of the RANSAC random-number generator.
    pub seed: u64,
    pub preprocess: PreprocessConfig,
    pub planes: PlaneConfig,
    pub dimensions: DimensionConfig,
    pub clustering: ClusterConfig,
    pub classifier: ClassifierConfig,
    pub relations: RelationConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            preprocess: PreprocessConfig::default(),
            planes: PlaneConfig::default(),
            dimensions: DimensionConfig::default(),
            clustering: ClusterConfig::default(),
            classifier: ClassifierConfig::default(),
            relations: RelationConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Reject non-positive sizes and out-of-range thresholds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.preprocess.validate()?;
        self.planes.validate()?;
        self.dimensions.validate()?;
        self.clustering.validate()?;
        self.classifier.validate()?;
        self.relations.validate()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Sections
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct PreprocessConfig {
    /// Neighbours used by statistical outlier removal.
    pub outlier_neighbors: usize,
    /// Points further than `mean + ratio·std` are discarded.
    pub outlier_std_ratio: f32,
    /// Edge length of a downsampling voxel (metres).
    pub voxel_size: f32,
    pub normal_radius: f32,
    pub normal_max_neighbors: usize,
    /// Normals are flipped to face this point; the cloud centroid when unset.
    pub viewpoint: Option<Point3>,
    /// Inputs smaller than this are logged as a probably incomplete scan.
    pub low_point_warning: usize,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            outlier_neighbors: 20,
            outlier_std_ratio: 2.0,
            voxel_size: 0.05,
            normal_radius: 0.1,
            normal_max_neighbors: 30,
            viewpoint: None,
            low_point_warning: 100_000,
        }
    }
}

impl PreprocessConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        non_zero("preprocess.outlier_neighbors", self.outlier_neighbors)?;
        non_negative("preprocess.outlier_std_ratio", self.outlier_std_ratio)?;
        positive("preprocess.voxel_size", self.voxel_size)?;
        positive("preprocess.normal_radius", self.normal_radius)?;
        non_zero("preprocess.normal_max_neighbors", self.normal_max_neighbors)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct PlaneConfig {
    pub max_planes: usize,
    /// Inlier tolerance: perpendicular distance to the plane (metres).
    pub distance_threshold: f32,
    pub num_iterations: usize,
    /// Absolute floor of the minimum support of a plane.
    pub min_plane_inliers: usize,
    /// Minimum support as a fraction of the points still unassigned.
    pub min_plane_fraction: f32,
    /// Detection stops once fewer points than this remain.
    pub min_remaining_points: usize,
    /// `|n·up|` above this makes a plane horizontal.
    pub horizontal_tilt: f32,
    /// `|n·up|` below this makes a plane a wall.
    pub vertical_tilt: f32,
    pub up: Point3,
}

impl Default for PlaneConfig {
    fn default() -> Self {
        Self {
            max_planes: 5,
            distance_threshold: 0.01,
            num_iterations: 1000,
            min_plane_inliers: 500,
            min_plane_fraction: 0.01,
            min_remaining_points: 100,
            horizontal_tilt: 0.9,
            vertical_tilt: 0.2,
            up: Point3::new(0.0, 0.0, 1.0),
        }
    }
}

impl PlaneConfig {
    /// Minimum inlier count a plane needs while `remaining` points are left.
    pub fn min_support(&self, remaining: usize) -> usize {
        let relative = (remaining as f32 * self.min_plane_fraction) as usize;
        self.min_plane_inliers.max(relative).max(3)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        positive("planes.distance_threshold", self.distance_threshold)?;
        non_zero("planes.num_iterations", self.num_iterations)?;
        in_range("planes.min_plane_fraction", self.min_plane_fraction, 0.0, 1.0)?;
        in_range("planes.horizontal_tilt", self.horizontal_tilt, 0.0, 1.0)?;
        in_range("planes.vertical_tilt", self.vertical_tilt, 0.0, 1.0)?;
        if self.up.normalized().is_none() {
            return Err(ConfigError::NonPositive {
                field: "planes.up (length)".to_string(),
                value: f64::from(self.up.norm()),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct DimensionConfig {
    /// `|dot|` of two wall normals at or above this makes them a pair.
    pub parallel_tolerance: f32,
    /// `|dot|` between the two pair normals at or below this makes them
    /// near-orthogonal.
    pub orthogonal_tolerance: f32,
    /// Wall pairs closer than this are ignored (metres).
    pub min_wall_separation: f32,
    pub wall_pair_confidence: f32,
    pub partial_confidence: f32,
    pub fallback_confidence: f32,
    /// Subtracted when floor or ceiling is missing.
    pub missing_height_penalty: f32,
}

impl Default for DimensionConfig {
    fn default() -> Self {
        Self {
            parallel_tolerance: 0.85,
            orthogonal_tolerance: 0.3,
            min_wall_separation: 0.1,
            wall_pair_confidence: 0.9,
            partial_confidence: 0.7,
            fallback_confidence: 0.5,
            missing_height_penalty: 0.2,
        }
    }
}

impl DimensionConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        in_range("dimensions.parallel_tolerance", self.parallel_tolerance, 0.0, 1.0)?;
        in_range("dimensions.orthogonal_tolerance", self.orthogonal_tolerance, 0.0, 1.0)?;
        non_negative("dimensions.min_wall_separation", self.min_wall_separation)?;
        in_range("dimensions.wall_pair_confidence", self.wall_pair_confidence, 0.0, 1.0)?;
        in_range("dimensions.partial_confidence", self.partial_confidence, 0.0, 1.0)?;
        in_range("dimensions.fallback_confidence", self.fallback_confidence, 0.0, 1.0)?;
        in_range("dimensions.missing_height_penalty", self.missing_height_penalty, 0.0, 1.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ClusterConfig {
    /// Neighbourhood radius (metres).
    pub eps: f32,
    /// Neighbours (excluding the point itself) a core point needs.
    ///
    /// Used verbatim only when `adaptive` is off.  Adaptive mode rescales
    /// it to the cloud size and caps it at half the neighbours a
    /// voxel-sampled surface offers within `eps`.  With the default 5 cm
    /// voxels `eps` widens to 12.5 cm and the cap is 9, so the default of 50
    /// only applies when `adaptive` is off.
    /// See [`effective_parameters`](crate::clustering::effective_parameters).
    pub min_points: usize,
    /// Scale `min_points` to the cloud size and sampling density.
    pub adaptive: bool,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            eps: 0.1,
            min_points: 50,
            adaptive: true,
        }
    }
}

impl ClusterConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        positive("clustering.eps", self.eps)?;
        non_zero("clustering.min_points", self.min_points)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Clusters with fewer points are discarded as noise.
    pub min_cluster_points: usize,
    pub unknown_confidence: f32,
    /// Evaluated in order; the first match wins.
    pub rules: Vec<ClassificationRule>,
    /// A vertical sheet at least this fraction of the room height tall is
    /// a wall no plane claimed, not furniture.
    pub structural_height_fraction: f32,
    /// Distance to the cluster's own best-fit plane that still counts as on
    /// the sheet (metres).
    pub structural_tolerance: f32,
    /// Share of cluster points that must lie on the sheet.
    pub structural_inlier_fraction: f32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            min_cluster_points: 50,
            unknown_confidence: 0.3,
            rules: default_rules(),
            structural_height_fraction: 0.8,
            structural_tolerance: 0.03,
            structural_inlier_fraction: 0.8,
        }
    }
}

impl ClassifierConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        non_zero("classifier.min_cluster_points", self.min_cluster_points)?;
        in_range("classifier.unknown_confidence", self.unknown_confidence, 0.0, 1.0)?;
        in_range(
            "classifier.structural_height_fraction",
            self.structural_height_fraction,
            0.0,
            1.0,
        )?;
        positive("classifier.structural_tolerance", self.structural_tolerance)?;
        in_range(
            "classifier.structural_inlier_fraction",
            self.structural_inlier_fraction,
            0.0,
            1.0,
        )?;
        for rule in &self.rules {
            in_range(
                &format!("classifier.rules[{}].confidence", rule.name),
                rule.confidence,
                0.0,
                1.0,
            )?;
        }
        Ok(())
    }
}

/// One row of the geometric rule table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ClassificationRule {
    pub name: String,
    /// Inclusive lower bound of the object height (metres).
    pub min_height: f32,
    /// Inclusive upper bound; `None` for open-ended.
    pub max_height: Option<f32>,
    pub condition: RuleCondition,
    pub object_type: ObjectType,
    pub confidence: f32,
}

/// Extra geometric condition of a rule, on top of its height range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "feature", content = "value", rename_all = "snake_case")]
pub enum RuleCondition {
    VolumeBelow(f32),
    VolumeAbove(f32),
    AspectAbove(f32),
    AspectBelow(f32),
    LongestExtentAbove(f32),
    ShortestExtentBelow(f32),
    Always,
}

fn rule(
    name: &str,
    min_height: f32,
    max_height: Option<f32>,
    condition: RuleCondition,
    object_type: ObjectType,
    confidence: f32,
) -> ClassificationRule {
    ClassificationRule {
        name: name.to_string(),
        min_height,
        max_height,
        condition,
        object_type,
        confidence,
    }
}

/// The built-in furniture rule table.
pub fn default_rules() -> Vec<ClassificationRule> {
    use RuleCondition::*;
    vec![
        rule("chair", 0.4, Some(0.5), VolumeBelow(0.3), ObjectType::Chair, 0.72),
        rule("table", 0.6, Some(0.8), AspectAbove(0.5), ObjectType::Table, 0.78),
        rule("desk", 0.7, Some(0.8), AspectAbove(1.2), ObjectType::Desk, 0.75),
        rule("bed", 0.4, Some(0.6), VolumeAbove(2.0), ObjectType::Bed, 0.80),
        rule("sofa", 0.7, Some(0.9), LongestExtentAbove(1.5), ObjectType::Sofa, 0.78),
        rule("cabinet", 1.2, None, VolumeAbove(0.5), ObjectType::Cabinet, 0.75),
        rule("bookshelf", 1.5, None, ShortestExtentBelow(0.45), ObjectType::Bookshelf, 0.65),
    ]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct RelationConfig {
    /// Clearance below this makes a pair adjacent (metres).
    pub adjacent_threshold: f32,
    /// Centroid distance below this makes a pair nearby (metres).
    pub nearby_threshold: f32,
    /// Narrowest walkway considered passable (metres).
    pub min_pathway_width: f32,
    /// Free floor ratio above which the room counts as having clear pathways.
    pub clear_pathway_ratio: f32,
}

impl Default for RelationConfig {
    fn default() -> Self {
        Self {
            adjacent_threshold: 0.1,
            nearby_threshold: 1.0,
            min_pathway_width: 0.6,
            clear_pathway_ratio: 0.3,
        }
    }
}

impl RelationConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        positive("relations.adjacent_threshold", self.adjacent_threshold)?;
        positive("relations.nearby_threshold", self.nearby_threshold)?;
        positive("relations.min_pathway_width", self.min_pathway_width)?;
        in_range("relations.clear_pathway_ratio", self.clear_pathway_ratio, 0.0, 1.0)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Validation helpers
// ────────────────────────────────────────────────────────────────────────────

fn positive(field: &str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NonPositive {
            field: field.to_string(),
            value: f64::from(value),
        })
    }
}

fn non_negative(field: &str, value: f32) -> Result<(), ConfigError> {
    in_range(field, value, 0.0, f32::MAX)
}

fn non_zero(field: &str, value: usize) -> Result<(), ConfigError> {
    if value == 0 {
        Err(ConfigError::Zero {
            field: field.to_string(),
        })
    } else {
        Ok(())
    }
}

fn in_range(field: &str, value: f32, min: f32, max: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value >= min && value <= max {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field: field.to_string(),
            value: f64::from(value),
            min: f64::from(min),
            max: f64::from(max),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn defaults_match_documented_values() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.preprocess.outlier_neighbors, 20);
        assert!((cfg.preprocess.voxel_size - 0.05).abs() < 1e-6);
        assert_eq!(cfg.planes.max_planes, 5);
        assert_eq!(cfg.planes.num_iterations, 1000);
        assert!((cfg.planes.distance_threshold - 0.01).abs() < 1e-6);
        assert_eq!(cfg.clustering.min_points, 50);
        assert!((cfg.clustering.eps - 0.1).abs() < 1e-6);
    }

    #[test]
    fn zero_voxel_size_is_rejected() {
        let mut cfg = PipelineConfig::default();
        cfg.preprocess.voxel_size = 0.0;
        let err = cfg.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::NonPositive { ref field, .. } if field == "preprocess.voxel_size"
        ));
    }

    #[test]
    fn negative_eps_is_rejected() {
        let mut cfg = PipelineConfig::default();
        cfg.clustering.eps = -0.1;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn nan_distance_threshold_is_rejected() {
        let mut cfg = PipelineConfig::default();
        cfg.planes.distance_threshold = f32::NAN;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rule_confidence_above_one_is_rejected() {
        let mut cfg = PipelineConfig::default();
        cfg.classifier.rules[0].confidence = 1.5;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("chair"));
    }

    #[test]
    fn zero_up_vector_is_rejected() {
        let mut cfg = PipelineConfig::default();
        cfg.planes.up = Point3::zero();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn min_support_is_adaptive() {
        let cfg = PlaneConfig::default();
        assert_eq!(cfg.min_support(10_000), 500);
        assert_eq!(cfg.min_support(200_000), 2_000);
    }

    #[test]
    fn partial_json_uses_defaults() {
        let cfg: PipelineConfig =
            serde_json::from_str(r#"{"seed": 9, "clustering": {"eps": 0.2}}"#).unwrap();
        assert_eq!(cfg.seed, 9);
        assert!((cfg.clustering.eps - 0.2).abs() < 1e-6);
        assert_eq!(cfg.clustering.min_points, 50);
        assert_eq!(cfg.classifier.rules.len(), 7);
    }

    #[test]
    fn rule_condition_serialises_tagged() {
        let json = serde_json::to_string(&RuleCondition::VolumeBelow(0.3)).unwrap();
        assert_eq!(json, r#"{"feature":"volume_below","value":0.3}"#);
    }
}
