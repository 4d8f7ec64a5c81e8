//! ObjectClassifier – geometric rule table over cluster bounding boxes.
//!
//! Every cluster large enough to be an object is reduced to its
//! [`ObjectFeatures`] and passed through a [`RuleTable`].  Rules are
//! evaluated in order; the first one that matches decides the type and the
//! confidence.  When none matches the object is `unknown`.
//!
//! The built-in rules are plain data ([`ClassificationRule`]); custom
//! [`Rule`] implementations can be appended with [`RuleTable::add_rule`].
//!
//! Clusters that are really part of the room shell (a wall the plane
//! detector ran out of planes for) are dropped before the rules run.

use roomscan_types::{
    Aabb, ClassificationMethod, DetectedObject, ObjectId, ObjectType, Point3, PointCloud,
};
use tracing::{debug, info, instrument};

use crate::clustering::Clustering;
use crate::config::{ClassificationRule, ClassifierConfig, RuleCondition};
use crate::preprocess::{centroid, fit_normal};

/// Horizontal extents below this are treated as zero when forming ratios.
const MIN_EXTENT: f32 = 1e-6;

/// `|n·z|` below this makes a sheet vertical.
const MAX_WALL_TILT: f32 = 0.2;

// ────────────────────────────────────────────────────────────────────────────
// Features
// ────────────────────────────────────────────────────────────────────────────

/// Geometric summary of one cluster.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObjectFeatures {
    pub bounds: Aabb,
    /// z extent.
    pub height: f32,
    /// Bounding box volume.
    pub volume: f32,
    /// Longer over shorter horizontal extent (≥ 1).
    pub aspect_ratio: f32,
    pub longest_extent: f32,
    pub shortest_extent: f32,
}

impl ObjectFeatures {
    pub fn from_bounds(bounds: Aabb) -> Self {
        let e = bounds.extent();
        let longest = e.x.max(e.y);
        let shortest = e.x.min(e.y);
        Self {
            bounds,
            height: e.z,
            volume: bounds.volume(),
            aspect_ratio: longest / shortest.max(MIN_EXTENT),
            longest_extent: longest,
            shortest_extent: shortest,
        }
    }

    pub fn from_points(points: &[Point3]) -> Option<Self> {
        Aabb::from_points(points.iter().copied()).map(Self::from_bounds)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Rule trait
// ────────────────────────────────────────────────────────────────────────────

/// One row of the classification table.
pub trait Rule: Send + Sync {
    /// Name recorded on the objects this rule classifies.
    fn name(&self) -> &str;

    /// The type and confidence this rule assigns, or `None` when it does not
    /// apply to `features`.
    fn evaluate(&self, features: &ObjectFeatures) -> Option<(ObjectType, f32)>;
}

impl RuleCondition {
    pub fn holds(&self, f: &ObjectFeatures) -> bool {
        match *self {
            RuleCondition::VolumeBelow(v) => f.volume < v,
            RuleCondition::VolumeAbove(v) => f.volume > v,
            RuleCondition::AspectAbove(v) => f.aspect_ratio > v,
            RuleCondition::AspectBelow(v) => f.aspect_ratio < v,
            RuleCondition::LongestExtentAbove(v) => f.longest_extent > v,
            RuleCondition::ShortestExtentBelow(v) => f.shortest_extent < v,
            RuleCondition::Always => true,
        }
    }
}

impl Rule for ClassificationRule {
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(&self, f: &ObjectFeatures) -> Option<(ObjectType, f32)> {
        let in_height =
            f.height >= self.min_height && self.max_height.is_none_or(|max| f.height <= max);
        (in_height && self.condition.holds(f)).then_some((self.object_type, self.confidence))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// RuleTable
// ────────────────────────────────────────────────────────────────────────────

/// Outcome of classifying one feature set.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub object_type: ObjectType,
    pub confidence: f32,
    pub method: ClassificationMethod,
    pub rule: Option<String>,
}

/// Ordered rule engine; the first matching rule wins.
///
/// # Example
///
/// ```
/// use roomscan_perception::classify::{ObjectFeatures, RuleTable};
/// use roomscan_perception::config::ClassifierConfig;
/// use roomscan_types::{Aabb, ObjectType, Point3};
///
/// let table = RuleTable::from_config(&ClassifierConfig::default());
/// let tabletop = Aabb::new(Point3::new(0.0, 0.0, 0.0), Point3::new(1.2, 0.8, 0.75));
/// let verdict = table.classify(&ObjectFeatures::from_bounds(tabletop));
/// assert_eq!(verdict.object_type, ObjectType::Table);
/// ```
pub struct RuleTable {
    rules: Vec<Box<dyn Rule>>,
    unknown_confidence: f32,
}

impl RuleTable {
    /// An empty table: everything is `unknown`.
    pub fn new(unknown_confidence: f32) -> Self {
        Self {
            rules: Vec::new(),
            unknown_confidence,
        }
    }

    /// The configured rules, in configuration order.
    pub fn from_config(config: &ClassifierConfig) -> Self {
        let mut table = Self::new(config.unknown_confidence);
        for rule in &config.rules {
            table.add_rule(Box::new(rule.clone()));
        }
        table
    }

    /// Append a rule; it is evaluated after every rule already present.
    pub fn add_rule(&mut self, rule: Box<dyn Rule>) {
        self.rules.push(rule);
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn classify(&self, features: &ObjectFeatures) -> Verdict {
        for rule in &self.rules {
            if let Some((object_type, confidence)) = rule.evaluate(features) {
                return Verdict {
                    object_type,
                    confidence: confidence.clamp(0.0, 1.0),
                    method: ClassificationMethod::GeometricRule,
                    rule: Some(rule.name().to_string()),
                };
            }
        }
        Verdict {
            object_type: ObjectType::Unknown,
            confidence: self.unknown_confidence.clamp(0.0, 1.0),
            method: ClassificationMethod::NoRuleMatched,
            rule: None,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Classification
// ────────────────────────────────────────────────────────────────────────────

/// One [`DetectedObject`] per cluster with at least
/// `config.min_cluster_points` points that is not part of the room shell
/// (see [`is_structural`]).  Ids are sequential in label order.
#[instrument(skip_all, fields(clusters = clustering.num_clusters(), room_height = room_height))]
pub fn classify_clusters(
    cloud: &PointCloud,
    clustering: &Clustering,
    config: &ClassifierConfig,
    room_height: f32,
) -> Vec<DetectedObject> {
    let table = RuleTable::from_config(config);

    let mut members: Vec<Vec<Point3>> = vec![Vec::new(); clustering.num_clusters()];
    for (i, label) in clustering.labels.iter().enumerate() {
        if let Some(l) = label
            && let Some(bucket) = members.get_mut(*l)
        {
            bucket.push(cloud.points[i]);
        }
    }

    let mut objects = Vec::new();
    for (label, points) in members.iter().enumerate() {
        if points.len() < config.min_cluster_points {
            debug!(label, points = points.len(), "cluster too small, discarded");
            continue;
        }
        let Some(features) = ObjectFeatures::from_points(points) else {
            continue;
        };
        if is_structural(points, &features, room_height, config) {
            debug!(
                label,
                points = points.len(),
                height = features.height,
                "wall remnant, not an object"
            );
            continue;
        }
        let verdict = table.classify(&features);
        let e = features.bounds.extent();
        let object = DetectedObject {
            id: ObjectId(objects.len() as u32),
            object_type: verdict.object_type,
            position: features.bounds.centre(),
            dimensions: e.to_array(),
            volume: features.volume.max(0.0),
            confidence: verdict.confidence,
            method: verdict.method,
            rule: verdict.rule,
            point_count: points.len(),
            cluster_label: label,
        };
        debug!(
            id = %object.id,
            object_type = %object.object_type,
            height = features.height,
            volume = features.volume,
            aspect = features.aspect_ratio,
            "object classified"
        );
        objects.push(object);
    }

    info!(objects = objects.len(), "classification complete");
    objects
}

/// A leftover wall: a vertical sheet spanning most of the room height, with
/// nearly all of its points on its own best-fit plane.  Furniture boxes
/// have points on several faces and fail the last test.
pub fn is_structural(
    points: &[Point3],
    features: &ObjectFeatures,
    room_height: f32,
    config: &ClassifierConfig,
) -> bool {
    if room_height <= 0.0 || features.height < config.structural_height_fraction * room_height {
        return false;
    }
    let Some(normal) = fit_normal(points) else {
        return false;
    };
    if normal.z.abs() >= MAX_WALL_TILT {
        return false;
    }
    let c = centroid(points);
    let on_sheet = points
        .iter()
        .filter(|p| normal.dot(p.sub(c)).abs() <= config.structural_tolerance)
        .count();
    on_sheet as f32 >= config.structural_inlier_fraction * points.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_rules;
    use roomscan_types::ClusterStats;

    fn features(x: f32, y: f32, z: f32) -> ObjectFeatures {
        ObjectFeatures::from_bounds(Aabb::new(Point3::zero(), Point3::new(x, y, z)))
    }

    fn default_table() -> RuleTable {
        RuleTable::from_config(&ClassifierConfig::default())
    }

    fn kind(x: f32, y: f32, z: f32) -> ObjectType {
        default_table().classify(&features(x, y, z)).object_type
    }

    // ── Rule table, rule by rule ─────────────────────────────────────────────

    #[test]
    fn chair_rule() {
        let v = default_table().classify(&features(0.5, 0.5, 0.45));
        assert_eq!(v.object_type, ObjectType::Chair);
        assert!((v.confidence - 0.72).abs() < 1e-6);
        assert_eq!(v.rule.as_deref(), Some("chair"));
    }

    #[test]
    fn table_rule() {
        let v = default_table().classify(&features(1.2, 0.8, 0.75));
        assert_eq!(v.object_type, ObjectType::Table);
        assert!((v.confidence - 0.78).abs() < 1e-6);
    }

    #[test]
    fn table_precedes_desk() {
        // Satisfies both; the earlier row wins.
        assert_eq!(kind(1.6, 0.7, 0.75), ObjectType::Table);
    }

    #[test]
    fn desk_rule_without_table_row() {
        let mut cfg = ClassifierConfig::default();
        cfg.rules.retain(|r| r.name != "table");
        let v = RuleTable::from_config(&cfg).classify(&features(1.6, 0.7, 0.75));
        assert_eq!(v.object_type, ObjectType::Desk);
        assert!((v.confidence - 0.75).abs() < 1e-6);
    }

    #[test]
    fn bed_rule() {
        assert_eq!(kind(2.0, 2.2, 0.5), ObjectType::Bed);
    }

    #[test]
    fn sofa_rule() {
        assert_eq!(kind(2.0, 0.9, 0.85), ObjectType::Sofa);
    }

    #[test]
    fn cabinet_rule() {
        assert_eq!(kind(1.0, 0.5, 1.8), ObjectType::Cabinet);
    }

    #[test]
    fn bookshelf_rule() {
        // Too small for a cabinet, shallow enough for a bookshelf.
        assert_eq!(kind(0.8, 0.3, 1.8), ObjectType::Bookshelf);
    }

    #[test]
    fn no_match_is_unknown() {
        let v = default_table().classify(&features(0.3, 0.3, 0.2));
        assert_eq!(v.object_type, ObjectType::Unknown);
        assert_eq!(v.method, ClassificationMethod::NoRuleMatched);
        assert!((v.confidence - 0.3).abs() < 1e-6);
        assert!(v.rule.is_none());
    }

    #[test]
    fn height_bounds_are_inclusive() {
        assert_eq!(kind(0.5, 0.5, 0.4), ObjectType::Chair);
        assert_eq!(kind(1.2, 0.8, 0.8), ObjectType::Table);
    }

    #[test]
    fn custom_rule_runs_after_built_ins() {
        struct Lamp;
        impl Rule for Lamp {
            fn name(&self) -> &str {
                "lamp"
            }
            fn evaluate(&self, f: &ObjectFeatures) -> Option<(ObjectType, f32)> {
                (f.height > 1.2 && f.longest_extent < 0.4).then_some((ObjectType::Unknown, 0.4))
            }
        }
        let mut table = RuleTable::new(0.3);
        table.add_rule(Box::new(Lamp));
        let v = table.classify(&features(0.3, 0.3, 1.6));
        assert_eq!(v.rule.as_deref(), Some("lamp"));
        assert_eq!(v.method, ClassificationMethod::GeometricRule);
    }

    #[test]
    fn every_default_rule_confidence_is_bounded() {
        for rule in default_rules() {
            assert!((0.0..=1.0).contains(&rule.confidence), "{}", rule.name);
        }
    }

    // ── Clusters → objects ───────────────────────────────────────────────────

    fn clustering(labels: Vec<Option<usize>>, num_clusters: usize) -> Clustering {
        Clustering {
            stats: ClusterStats {
                total_points: labels.len(),
                num_clusters,
                ..ClusterStats::default()
            },
            labels,
        }
    }

    /// `n` points spread over the box `[0,x]×[0,y]×[0,z]` shifted by `dx`.
    fn box_points(n: usize, dx: f32, x: f32, y: f32, z: f32) -> Vec<Point3> {
        (0..n)
            .map(|k| {
                let t = k as f32 / (n - 1) as f32;
                // Alternate between the two extreme corners and a diagonal.
                match k % 3 {
                    0 => Point3::new(dx, 0.0, 0.0),
                    1 => Point3::new(dx + x, y, z),
                    _ => Point3::new(dx + t * x, t * y, t * z),
                }
            })
            .collect()
    }

    #[test]
    fn small_clusters_are_discarded_and_ids_are_sequential() {
        let mut pts = box_points(60, 0.0, 1.2, 0.8, 0.75);
        pts.extend(box_points(10, 5.0, 0.2, 0.2, 0.2));
        pts.extend(box_points(60, 10.0, 0.5, 0.5, 0.45));
        let mut labels = vec![Some(0); 60];
        labels.extend(vec![Some(1); 10]);
        labels.extend(vec![Some(2); 60]);

        let objects = classify_clusters(
            &PointCloud::new(pts),
            &clustering(labels, 3),
            &ClassifierConfig::default(),
            2.5,
        );
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[0].id, ObjectId(0));
        assert_eq!(objects[0].object_type, ObjectType::Table);
        assert_eq!(objects[0].cluster_label, 0);
        assert_eq!(objects[1].id, ObjectId(1));
        assert_eq!(objects[1].object_type, ObjectType::Chair);
        assert_eq!(objects[1].cluster_label, 2);

        let t = &objects[0];
        assert!((t.dimensions[0] - 1.2).abs() < 1e-5);
        assert!((t.position.x - 0.6).abs() < 1e-5);
        assert!((t.volume - 1.2 * 0.8 * 0.75).abs() < 1e-4);
        assert_eq!(t.point_count, 60);
    }

    /// Vertical sheet at `x = x0`, `w` wide and `h` tall, sampled every 5 cm.
    fn wall_sheet(x0: f32, w: f32, h: f32) -> Vec<Point3> {
        let (ny, nz) = ((w / 0.05) as usize + 1, (h / 0.05) as usize + 1);
        (0..ny * nz)
            .map(|k| Point3::new(x0, (k % ny) as f32 * 0.05, (k / ny) as f32 * 0.05))
            .collect()
    }

    #[test]
    fn wall_remnant_is_not_an_object() {
        let pts = wall_sheet(4.0, 3.0, 2.5);
        let n = pts.len();
        let objects = classify_clusters(
            &PointCloud::new(pts),
            &clustering(vec![Some(0); n], 1),
            &ClassifierConfig::default(),
            2.5,
        );
        assert!(objects.is_empty());
    }

    #[test]
    fn short_or_bulky_clusters_are_not_structural() {
        let config = ClassifierConfig::default();
        // Half-height panel.
        let panel = wall_sheet(0.0, 1.0, 1.0);
        let f = ObjectFeatures::from_points(&panel).unwrap();
        assert!(!is_structural(&panel, &f, 2.5, &config));
        assert!(is_structural(&panel, &f, 1.1, &config));

        // Floor-to-ceiling wardrobe: front and back faces 0.6 m apart.
        let mut wardrobe = wall_sheet(0.0, 1.0, 2.4);
        wardrobe.extend(wall_sheet(0.6, 1.0, 2.4));
        let f = ObjectFeatures::from_points(&wardrobe).unwrap();
        assert!(!is_structural(&wardrobe, &f, 2.5, &config));
    }

    #[test]
    fn noise_never_becomes_an_object() {
        let pts = box_points(80, 0.0, 1.0, 1.0, 1.0);
        let objects = classify_clusters(
            &PointCloud::new(pts),
            &clustering(vec![None; 80], 0),
            &ClassifierConfig::default(),
            2.5,
        );
        assert!(objects.is_empty());
    }
}
