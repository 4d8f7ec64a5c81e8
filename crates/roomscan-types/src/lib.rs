//! `roomscan-types` – shared value types for the room analysis pipeline.
//!
//! Everything the pipeline produces is an immutable, flat record that can be
//! handed verbatim to a persistence or API layer: no entity holds a reference
//! to another except through an [`ObjectId`].

use std::collections::BTreeMap;
use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ────────────────────────────────────────────────────────────────────────────
// Geometry primitives
// ────────────────────────────────────────────────────────────────────────────

/// A point (or direction) in 3-D space, in metres.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct Point3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Point3 {
    /// Create a new point.
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    /// True when all three coordinates are finite.
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    pub fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }

    pub fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }

    pub fn scale(self, s: f32) -> Self {
        Self::new(self.x * s, self.y * s, self.z * s)
    }

    pub fn dot(self, rhs: Self) -> f32 {
        self.x * rhs.x + self.y * rhs.y + self.z * rhs.z
    }

    pub fn cross(self, rhs: Self) -> Self {
        Self::new(
            self.y * rhs.z - self.z * rhs.y,
            self.z * rhs.x - self.x * rhs.z,
            self.x * rhs.y - self.y * rhs.x,
        )
    }

    /// Euclidean length.
    pub fn norm(self) -> f32 {
        self.dot(self).sqrt()
    }

    /// Squared Euclidean distance to `other`.
    pub fn distance_squared(self, other: Self) -> f32 {
        let d = self.sub(other);
        d.dot(d)
    }

    pub fn distance(self, other: Self) -> f32 {
        self.distance_squared(other).sqrt()
    }

    /// Unit vector in the same direction, or `None` for a (near-)zero vector.
    pub fn normalized(self) -> Option<Self> {
        let n = self.norm();
        if n > 1e-9 && n.is_finite() {
            Some(self.scale(1.0 / n))
        } else {
            None
        }
    }

    pub fn to_array(self) -> [f32; 3] {
        [self.x, self.y, self.z]
    }
}

impl From<[f32; 3]> for Point3 {
    fn from(a: [f32; 3]) -> Self {
        Self::new(a[0], a[1], a[2])
    }
}

/// An axis-aligned bounding box, defined by its minimum and maximum corners.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Aabb {
    pub min: Point3,
    pub max: Point3,
}

impl Aabb {
    /// Create a bounding box from its two opposite corners.
    ///
    /// The constructor normalises the corners so that `min ≤ max` per axis.
    pub fn new(a: Point3, b: Point3) -> Self {
        Self {
            min: Point3::new(a.x.min(b.x), a.y.min(b.y), a.z.min(b.z)),
            max: Point3::new(a.x.max(b.x), a.y.max(b.y), a.z.max(b.z)),
        }
    }

    /// Tightest box around `points`, or `None` when the iterator is empty.
    pub fn from_points<I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = Point3>,
    {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let mut bounds = Self { min: first, max: first };
        for p in iter {
            bounds.expand(p);
        }
        Some(bounds)
    }

    /// Grow the box so it contains `p`.
    pub fn expand(&mut self, p: Point3) {
        self.min = Point3::new(self.min.x.min(p.x), self.min.y.min(p.y), self.min.z.min(p.z));
        self.max = Point3::new(self.max.x.max(p.x), self.max.y.max(p.y), self.max.z.max(p.z));
    }

    /// Return the centre point of the box.
    pub fn centre(&self) -> Point3 {
        Point3::new(
            (self.min.x + self.max.x) * 0.5,
            (self.min.y + self.max.y) * 0.5,
            (self.min.z + self.max.z) * 0.5,
        )
    }

    /// Edge lengths along x, y and z.
    pub fn extent(&self) -> Point3 {
        self.max.sub(self.min)
    }

    pub fn volume(&self) -> f32 {
        let e = self.extent();
        e.x * e.y * e.z
    }

    /// True when the point lies inside or on the boundary of the box.
    pub fn contains_point(&self, p: Point3) -> bool {
        p.x >= self.min.x
            && p.x <= self.max.x
            && p.y >= self.min.y
            && p.y <= self.max.y
            && p.z >= self.min.z
            && p.z <= self.max.z
    }

    /// Squared distance from `p` to the closest point of the box (zero inside).
    pub fn distance_squared_to(&self, p: Point3) -> f32 {
        let dx = (self.min.x - p.x).max(0.0).max(p.x - self.max.x);
        let dy = (self.min.y - p.y).max(0.0).max(p.y - self.max.y);
        let dz = (self.min.z - p.z).max(0.0).max(p.z - self.max.z);
        dx * dx + dy * dy + dz * dz
    }
}

// ────────────────────────────────────────────────────────────────────────────
// PointCloud
// ────────────────────────────────────────────────────────────────────────────

/// Smallest bounding-box edge (metres) a cloud needs along every axis to
/// describe a room.
pub const MIN_EXTENT: f32 = 0.01;

/// An ordered set of 3-D points with optional per-point normals and colours.
///
/// `normals` and `colors`, when present, are parallel to `points`.
/// [`PointCloud::validate`] enforces that and rejects non-finite coordinates
/// and clouds that are not volumetric.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct PointCloud {
    pub points: Vec<Point3>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normals: Option<Vec<Point3>>,
    /// RGB in `[0, 1]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub colors: Option<Vec<[f32; 3]>>,
}

impl PointCloud {
    pub fn new(points: Vec<Point3>) -> Self {
        Self {
            points,
            normals: None,
            colors: None,
        }
    }

    pub fn with_normals(mut self, normals: Vec<Point3>) -> Self {
        self.normals = Some(normals);
        self
    }

    pub fn with_colors(mut self, colors: Vec<[f32; 3]>) -> Self {
        self.colors = Some(colors);
        self
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn has_normals(&self) -> bool {
        self.normals.is_some()
    }

    pub fn has_colors(&self) -> bool {
        self.colors.is_some()
    }

    /// Bounding box of all points, `None` for an empty cloud.
    pub fn bounds(&self) -> Option<Aabb> {
        Aabb::from_points(self.points.iter().copied())
    }

    /// Fewer than three points, or flat along some axis: a point, a line or
    /// a single sheet.
    pub fn is_degenerate(&self) -> bool {
        if self.points.len() < 3 {
            return true;
        }
        self.bounds().is_none_or(|b| {
            let e = b.extent();
            e.x < MIN_EXTENT || e.y < MIN_EXTENT || e.z < MIN_EXTENT
        })
    }

    /// Check the structural invariants of the cloud on behalf of `stage`.
    pub fn validate(&self, stage: Stage) -> Result<(), ScanError> {
        if self.points.is_empty() {
            return Err(ScanError::EmptyCloud { stage });
        }
        if let Some(normals) = &self.normals
            && normals.len() != self.points.len()
        {
            return Err(ScanError::MismatchedAttributes {
                stage,
                attribute: "normals".to_string(),
                expected: self.points.len(),
                found: normals.len(),
            });
        }
        if let Some(colors) = &self.colors
            && colors.len() != self.points.len()
        {
            return Err(ScanError::MismatchedAttributes {
                stage,
                attribute: "colors".to_string(),
                expected: self.points.len(),
                found: colors.len(),
            });
        }
        if let Some(index) = self.points.iter().position(|p| !p.is_finite()) {
            return Err(ScanError::NonFiniteCoordinate { stage, index });
        }
        if self.is_degenerate() {
            return Err(ScanError::DegenerateCloud {
                stage,
                input_size: self.len(),
            });
        }
        Ok(())
    }

    /// Copy the points at `indices` (and their attributes) into a new cloud.
    ///
    /// Indices must be in range; order is preserved.
    pub fn select(&self, indices: &[usize]) -> PointCloud {
        PointCloud {
            points: indices.iter().map(|&i| self.points[i]).collect(),
            normals: self
                .normals
                .as_ref()
                .map(|n| indices.iter().map(|&i| n[i]).collect()),
            colors: self
                .colors
                .as_ref()
                .map(|c| indices.iter().map(|&i| c[i]).collect()),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Planes
// ────────────────────────────────────────────────────────────────────────────

/// The structural role of a detected plane, assigned once by the detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum PlaneRole {
    Floor,
    Ceiling,
    Wall,
    Unclassified,
}

/// A planar surface `ax + by + cz + d = 0` with unit normal `(a, b, c)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Plane {
    pub coefficients: [f32; 4],
    /// Indices into the cloud the plane was detected in.
    pub inliers: Vec<usize>,
    pub role: PlaneRole,
    /// Mean of the inlier points.
    pub centroid: Point3,
}

impl Plane {
    pub fn normal(&self) -> Point3 {
        Point3::new(self.coefficients[0], self.coefficients[1], self.coefficients[2])
    }

    /// Signed distance from `p` to the plane (positive on the normal side).
    pub fn signed_distance(&self, p: Point3) -> f32 {
        self.normal().dot(p) + self.coefficients[3]
    }

    pub fn inlier_count(&self) -> usize {
        self.inliers.len()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Room dimensions
// ────────────────────────────────────────────────────────────────────────────

/// Qualitative error bound attached to a dimension estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum DimensionAccuracy {
    /// Opposing wall planes were measured directly.
    WallPlanes,
    /// Falls back at least partly on the bounding box of the scan.
    BoundingBox,
}

impl DimensionAccuracy {
    pub fn label(&self) -> &'static str {
        match self {
            DimensionAccuracy::WallPlanes => "±2-5cm",
            DimensionAccuracy::BoundingBox => "±10-20cm",
        }
    }
}

impl fmt::Display for DimensionAccuracy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// How length and width were derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum DimensionMethod {
    /// Two wall pairs, one per horizontal axis.
    WallPairs,
    /// One wall pair plus the bounding box for the other axis.
    PartialWallPairs,
    /// Bounding box of the wall (or whole-cloud) points.
    BoundingBox,
}

/// Room size in metres.  `length` is the longer horizontal axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RoomDimensions {
    pub length: f32,
    pub width: f32,
    pub height: f32,
    pub accuracy: DimensionAccuracy,
    /// Confidence in `[0.0, 1.0]`.
    pub confidence: f32,
    pub method: DimensionMethod,
}

// ────────────────────────────────────────────────────────────────────────────
// Objects
// ────────────────────────────────────────────────────────────────────────────

/// Identifier of a detected object, unique within one report.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
pub struct ObjectId(pub u32);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "obj-{}", self.0)
    }
}

/// Semantic furniture category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ObjectType {
    Chair,
    Table,
    Desk,
    Bed,
    Sofa,
    Cabinet,
    Bookshelf,
    Unknown,
}

impl ObjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectType::Chair => "chair",
            ObjectType::Table => "table",
            ObjectType::Desk => "desk",
            ObjectType::Bed => "bed",
            ObjectType::Sofa => "sofa",
            ObjectType::Cabinet => "cabinet",
            ObjectType::Bookshelf => "bookshelf",
            ObjectType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How an object's type was decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationMethod {
    /// A rule of the geometric rule table matched.
    GeometricRule,
    /// No rule matched; the type is `unknown`.
    NoRuleMatched,
}

/// A furniture object extracted from one point cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DetectedObject {
    pub id: ObjectId,
    pub object_type: ObjectType,
    /// Centre of the axis-aligned bounding box.
    pub position: Point3,
    /// Bounding box extents along x, y and z (metres).
    pub dimensions: [f32; 3],
    /// Bounding box volume (m³).
    pub volume: f32,
    /// Confidence in `[0.0, 1.0]`.
    pub confidence: f32,
    pub method: ClassificationMethod,
    /// Name of the matching rule, absent for `unknown`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,
    pub point_count: usize,
    pub cluster_label: usize,
}

impl DetectedObject {
    pub fn bounds(&self) -> Aabb {
        let half = Point3::from(self.dimensions).scale(0.5);
        Aabb::new(self.position.sub(half), self.position.add(half))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Relationships
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipKind {
    Adjacent,
    Nearby,
    None,
}

/// Spatial relation between two objects; `object_a < object_b`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SpatialRelationship {
    pub object_a: ObjectId,
    pub object_b: ObjectId,
    /// Centroid-to-centroid distance (metres).
    pub distance: f32,
    /// Gap between the bounding extents along the connecting axis (metres,
    /// negative when the boxes interpenetrate).
    pub clearance: f32,
    pub kind: RelationshipKind,
}

/// Coarse free-floor-space analysis of the room.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Accessibility {
    pub free_space_ratio: f32,
    pub occupied_floor_area: f32,
    pub min_pathway_width: f32,
    pub has_clear_pathways: bool,
}

// ────────────────────────────────────────────────────────────────────────────
// Provenance & report
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum QualityRating {
    Excellent,
    Good,
    Acceptable,
    Poor,
}

/// Scan-quality metrics of the raw input cloud.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ScanQuality {
    /// Score in `[0.0, 1.0]`.
    pub score: f32,
    pub rating: QualityRating,
    /// Points per cubic metre of bounding-box volume.
    pub point_density: f32,
    pub bbox_volume: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ScanProvenance {
    pub original_point_count: usize,
    pub processed_point_count: usize,
    pub scan_quality: ScanQuality,
}

/// Summary of one clustering run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct ClusterStats {
    pub total_points: usize,
    pub num_clusters: usize,
    pub noise_points: usize,
    pub noise_ratio: f32,
    pub eps_used: f32,
    pub min_points_used: usize,
    /// Point count per cluster label.
    pub cluster_sizes: BTreeMap<usize, usize>,
}

/// Everything one pipeline run produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RoomReport {
    pub dimensions: RoomDimensions,
    pub objects: Vec<DetectedObject>,
    pub relationships: Vec<SpatialRelationship>,
    pub accessibility: Accessibility,
    pub cluster_stats: ClusterStats,
    pub provenance: ScanProvenance,
}

// ────────────────────────────────────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────────────────────────────────────

/// Pipeline stage named in error messages and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Input,
    Preprocess,
    PlaneDetection,
    DimensionEstimation,
    Clustering,
    Classification,
    Relationships,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Input => "input",
            Stage::Preprocess => "preprocess",
            Stage::PlaneDetection => "plane_detection",
            Stage::DimensionEstimation => "dimension_estimation",
            Stage::Clustering => "clustering",
            Stage::Classification => "classification",
            Stage::Relationships => "relationships",
        };
        f.write_str(name)
    }
}

/// Rejected configuration value, raised before any stage runs.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConfigError {
    #[error("{field} must be positive and finite, got {value}")]
    NonPositive { field: String, value: f64 },

    #[error("{field} must be at least 1")]
    Zero { field: String },

    #[error("{field} = {value} is outside [{min}, {max}]")]
    OutOfRange {
        field: String,
        value: f64,
        min: f64,
        max: f64,
    },
}

/// Fatal pipeline error.  Degraded results are never reported through here.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScanError {
    #[error("[{stage}] point cloud is empty")]
    EmptyCloud { stage: Stage },

    #[error("[{stage}] point {index} has a non-finite coordinate")]
    NonFiniteCoordinate { stage: Stage, index: usize },

    #[error("[{stage}] {attribute} has {found} entries, expected {expected}")]
    MismatchedAttributes {
        stage: Stage,
        attribute: String,
        expected: usize,
        found: usize,
    },

    #[error("[{stage}] point cloud of {input_size} points spans no volume")]
    DegenerateCloud { stage: Stage, input_size: usize },

    #[error("[{stage}] all {input_size} points were discarded as outliers")]
    AllPointsRemoved { stage: Stage, input_size: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),
}

impl ScanError {
    /// The stage the error was raised in, if any.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            ScanError::EmptyCloud { stage }
            | ScanError::NonFiniteCoordinate { stage, .. }
            | ScanError::MismatchedAttributes { stage, .. }
            | ScanError::DegenerateCloud { stage, .. }
            | ScanError::AllPointsRemoved { stage, .. } => Some(*stage),
            ScanError::InvalidConfig(_) => None,
        }
    }
}
