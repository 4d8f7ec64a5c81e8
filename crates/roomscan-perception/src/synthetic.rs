//! Synthetic scans for tests, demos and CI without a scanner.
//!
//! [`SyntheticRoom`] samples the inside of an axis-aligned room on a regular
//! grid, optionally furnished with boxes, and perturbs every coordinate with
//! seeded Gaussian noise.  The same builder always produces the same cloud.
//!
//! # Example
//!
//! ```rust
//! use roomscan_perception::synthetic::SyntheticRoom;
//! use roomscan_types::Point3;
//!
//! let cloud = SyntheticRoom::new(4.0, 3.0, 2.5)
//!     .with_spacing(0.1)
//!     .with_box(Point3::new(1.4, 1.1, 0.0), Point3::new(2.6, 1.9, 0.75))
//!     .build();
//!
//! assert!(cloud.len() > 6_000);
//! ```

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};
use roomscan_types::{Aabb, Point3, PointCloud};

/// A rectangular room spanning `[0, length] × [0, width] × [0, height]`.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticRoom {
    length: f32,
    width: f32,
    height: f32,
    spacing: f32,
    noise_sigma: f32,
    seed: u64,
    walls: bool,
    ceiling: bool,
    boxes: Vec<Aabb>,
}

impl SyntheticRoom {
    /// An empty room sampled every 3 cm (> 1000 points/m²) with 5 mm noise.
    pub fn new(length: f32, width: f32, height: f32) -> Self {
        Self {
            length,
            width,
            height,
            spacing: 0.03,
            noise_sigma: 0.005,
            seed: 42,
            walls: true,
            ceiling: true,
            boxes: Vec::new(),
        }
    }

    /// Maximum distance between neighbouring samples (metres).
    pub fn with_spacing(mut self, spacing: f32) -> Self {
        self.spacing = spacing;
        self
    }

    /// Standard deviation of the per-coordinate noise; `0.0` disables it.
    pub fn with_noise(mut self, sigma: f32) -> Self {
        self.noise_sigma = sigma;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Leave out the four walls (floor and ceiling only).
    pub fn without_walls(mut self) -> Self {
        self.walls = false;
        self
    }

    pub fn without_ceiling(mut self) -> Self {
        self.ceiling = false;
        self
    }

    /// Add an axis-aligned box between two opposite corners.  Its top and
    /// four sides are sampled; the bottom rests unseen on the floor.
    pub fn with_box(mut self, a: Point3, b: Point3) -> Self {
        self.boxes.push(Aabb::new(a, b));
        self
    }

    /// Ground-truth `(length, width, height)`.
    pub fn dimensions(&self) -> (f32, f32, f32) {
        (self.length, self.width, self.height)
    }

    pub fn build(&self) -> PointCloud {
        let x = Point3::new(1.0, 0.0, 0.0);
        let y = Point3::new(0.0, 1.0, 0.0);
        let z = Point3::new(0.0, 0.0, 1.0);
        let (l, w, h) = (self.length, self.width, self.height);
        let s = self.spacing;

        let mut points = Vec::new();
        sample_rect(Point3::zero(), x, l, y, w, s, &mut points);
        if self.ceiling {
            sample_rect(Point3::new(0.0, 0.0, h), x, l, y, w, s, &mut points);
        }
        if self.walls {
            sample_rect(Point3::zero(), y, w, z, h, s, &mut points);
            sample_rect(Point3::new(l, 0.0, 0.0), y, w, z, h, s, &mut points);
            sample_rect(Point3::zero(), x, l, z, h, s, &mut points);
            sample_rect(Point3::new(0.0, w, 0.0), x, l, z, h, s, &mut points);
        }

        for b in &self.boxes {
            let e = b.extent();
            let (lo, hi) = (b.min, b.max);
            sample_rect(Point3::new(lo.x, lo.y, hi.z), x, e.x, y, e.y, s, &mut points);
            sample_rect(lo, y, e.y, z, e.z, s, &mut points);
            sample_rect(Point3::new(hi.x, lo.y, lo.z), y, e.y, z, e.z, s, &mut points);
            sample_rect(lo, x, e.x, z, e.z, s, &mut points);
            sample_rect(Point3::new(lo.x, hi.y, lo.z), x, e.x, z, e.z, s, &mut points);
        }

        if let Ok(noise) = Normal::new(0.0f32, self.noise_sigma)
            && self.noise_sigma > 0.0
        {
            let mut rng = StdRng::seed_from_u64(self.seed);
            for p in &mut points {
                *p = Point3::new(
                    p.x + noise.sample(&mut rng),
                    p.y + noise.sample(&mut rng),
                    p.z + noise.sample(&mut rng),
                );
            }
        }

        PointCloud::new(points)
    }
}

/// Grid over the rectangle `origin + a·u + b·v` for `a ∈ [0, u_len]`,
/// `b ∈ [0, v_len]`, edges included, no gap wider than `spacing`.
fn sample_rect(
    origin: Point3,
    u: Point3,
    u_len: f32,
    v: Point3,
    v_len: f32,
    spacing: f32,
    out: &mut Vec<Point3>,
) {
    let steps = |len: f32| -> usize { ((len / spacing).ceil() as usize).max(1) };
    let (nu, nv) = (steps(u_len), steps(v_len));
    for j in 0..=nv {
        let b = v_len * j as f32 / nv as f32;
        for i in 0..=nu {
            let a = u_len * i as f32 / nu as f32;
            out.push(origin.add(u.scale(a)).add(v.scale(b)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noiseless_room_lies_on_its_faces() {
        let cloud = SyntheticRoom::new(4.0, 3.0, 2.5)
            .with_spacing(0.1)
            .with_noise(0.0)
            .build();
        let b = cloud.bounds().unwrap();
        assert_eq!(b.min, Point3::zero());
        assert!((b.max.x - 4.0).abs() < 1e-5);
        assert!((b.max.y - 3.0).abs() < 1e-5);
        assert!((b.max.z - 2.5).abs() < 1e-5);
        // Every sample touches one of the six faces.
        let on_face = |p: &Point3| {
            p.x.abs() < 1e-5
                || (p.x - 4.0).abs() < 1e-5
                || p.y.abs() < 1e-5
                || (p.y - 3.0).abs() < 1e-5
                || p.z.abs() < 1e-5
                || (p.z - 2.5).abs() < 1e-5
        };
        assert!(cloud.points.iter().all(on_face));
    }

    #[test]
    fn default_density_exceeds_a_thousand_per_square_metre() {
        let cloud = SyntheticRoom::new(1.0, 1.0, 1.0)
            .without_walls()
            .without_ceiling()
            .build();
        assert!(cloud.len() >= 1_000);
    }

    #[test]
    fn same_seed_same_cloud() {
        let a = SyntheticRoom::new(2.0, 2.0, 2.0).with_spacing(0.1).build();
        let b = SyntheticRoom::new(2.0, 2.0, 2.0).with_spacing(0.1).build();
        let c = SyntheticRoom::new(2.0, 2.0, 2.0)
            .with_spacing(0.1)
            .with_seed(7)
            .build();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn box_adds_five_faces() {
        let room = SyntheticRoom::new(4.0, 3.0, 2.5)
            .with_spacing(0.1)
            .with_noise(0.0);
        let empty = room.clone().build().len();
        let furnished = room
            .with_box(Point3::new(1.0, 1.0, 0.0), Point3::new(2.0, 1.5, 0.5))
            .build()
            .len();
        // top 11×6, x-sides 6×6 ×2, y-sides 11×6 ×2
        assert_eq!(furnished - empty, 66 + 72 + 132);
    }
}
