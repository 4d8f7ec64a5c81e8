//! Scan-quality scoring of the raw input cloud.
//!
//! The score adds up fixed credits for point count, point density (points
//! per cubic metre of bounding box) and the presence of normals and colours.

use roomscan_types::{PointCloud, QualityRating, ScanQuality};

/// `(more than N points, credit)`, best first; only the first hit counts.
const COUNT_CREDITS: [(usize, f32); 3] = [(1_000_000, 0.4), (500_000, 0.3), (100_000, 0.2)];
/// `(density above D points/m³, credit)`, best first.
const DENSITY_CREDITS: [(f32, f32); 2] = [(50_000.0, 0.3), (20_000.0, 0.2)];
const NORMALS_CREDIT: f32 = 0.15;
const COLORS_CREDIT: f32 = 0.15;

pub fn assess_scan_quality(cloud: &PointCloud) -> ScanQuality {
    let count = cloud.len();
    let bbox_volume = cloud.bounds().map_or(0.0, |b| b.volume());
    let point_density = if bbox_volume > 0.0 {
        count as f32 / bbox_volume
    } else {
        0.0
    };

    let mut score: f32 = 0.0;
    score += COUNT_CREDITS
        .iter()
        .find(|(min, _)| count > *min)
        .map_or(0.0, |(_, credit)| *credit);
    score += DENSITY_CREDITS
        .iter()
        .find(|(min, _)| point_density > *min)
        .map_or(0.0, |(_, credit)| *credit);
    if cloud.has_normals() {
        score += NORMALS_CREDIT;
    }
    if cloud.has_colors() {
        score += COLORS_CREDIT;
    }
    let score = score.clamp(0.0, 1.0);

    ScanQuality {
        score,
        rating: rating(score),
        point_density,
        bbox_volume,
    }
}

pub fn rating(score: f32) -> QualityRating {
    if score > 0.8 {
        QualityRating::Excellent
    } else if score > 0.6 {
        QualityRating::Good
    } else if score > 0.4 {
        QualityRating::Acceptable
    } else {
        QualityRating::Poor
    }
}
