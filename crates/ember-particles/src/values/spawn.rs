//! Spawn shapes: where a new particle appears relative to its emitter

use super::{RangedNumericValue, ScaledNumericValue};
use crate::rand::ParticleRng;
use ember_core::Result;
use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::f32::consts::{PI, TAU};

/// Primitive spawn volume
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpawnShape {
    /// The point (width, height, depth)
    #[default]
    Point,
    /// Segment from the origin to (width, height, depth)
    Line,
    /// Box centered on the origin
    Rectangle,
    /// Ellipsoid centered on the origin
    Ellipse,
    /// Y-aligned cylinder centered on the origin
    Cylinder,
}

/// Which half of an ellipse to spawn on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EllipseSide {
    #[default]
    Both,
    Top,
    Bottom,
}

/// Spawn shape with dimensions that may change over the emitter's duration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpawnShapeValue {
    pub shape: SpawnShape,
    pub width: ScaledNumericValue,
    pub height: ScaledNumericValue,
    pub depth: ScaledNumericValue,
    /// Spawn on the surface/edges instead of inside the volume
    pub edges: bool,
    pub side: EllipseSide,
    pub x_offset: RangedNumericValue,
    pub y_offset: RangedNumericValue,
    pub z_offset: RangedNumericValue,
    /// (start, diff) per dimension, sampled by `start()`
    #[serde(skip)]
    sampled: [(f32, f32); 3],
}

impl Default for SpawnShapeValue {
    fn default() -> Self {
        Self {
            shape: SpawnShape::Point,
            width: ScaledNumericValue::constant(0.0),
            height: ScaledNumericValue::constant(0.0),
            depth: ScaledNumericValue::constant(0.0),
            edges: false,
            side: EllipseSide::Both,
            x_offset: RangedNumericValue::inactive(),
            y_offset: RangedNumericValue::inactive(),
            z_offset: RangedNumericValue::inactive(),
            sampled: [(0.0, 0.0); 3],
        }
    }
}

impl SpawnShapeValue {
    pub fn new(shape: SpawnShape, width: f32, height: f32, depth: f32) -> Self {
        Self {
            shape,
            width: ScaledNumericValue::constant(width),
            height: ScaledNumericValue::constant(height),
            depth: ScaledNumericValue::constant(depth),
            ..Default::default()
        }
    }

    pub fn point(position: Vec3) -> Self {
        Self::new(SpawnShape::Point, position.x, position.y, position.z)
    }

    pub fn with_edges(mut self, edges: bool) -> Self {
        self.edges = edges;
        self
    }

    pub fn with_side(mut self, side: EllipseSide) -> Self {
        self.side = side;
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.width.validate("spawn width")?;
        self.height.validate("spawn height")?;
        self.depth.validate("spawn depth")
    }

    /// Sample this emission cycle's dimensions
    pub fn start(&mut self, rng: &mut ParticleRng) {
        self.sampled = [
            self.width.sample_pair(rng),
            self.height.sample_pair(rng),
            self.depth.sample_pair(rng),
        ];
    }

    fn dimensions(&self, percent: f32) -> Vec3 {
        let [(ws, wd), (hs, hd), (ds, dd)] = self.sampled;
        Vec3::new(
            self.width.interpolate(ws, wd, percent),
            self.height.interpolate(hs, hd, percent),
            self.depth.interpolate(ds, dd, percent),
        )
    }

    /// Sample a local-space spawn point. `percent` is the emitter's duration percent.
    pub fn spawn(&self, rng: &mut ParticleRng, percent: f32) -> Vec3 {
        let dims = self.dimensions(percent);
        let mut point = match self.shape {
            SpawnShape::Point => dims,
            SpawnShape::Line => dims * rng.next_f32(),
            SpawnShape::Rectangle => self.spawn_rectangle(rng, dims),
            SpawnShape::Ellipse => self.spawn_ellipse(rng, dims),
            SpawnShape::Cylinder => self.spawn_cylinder(rng, dims),
        };
        if self.x_offset.active {
            point.x += self.x_offset.new_low_value(rng);
        }
        if self.y_offset.active {
            point.y += self.y_offset.new_low_value(rng);
        }
        if self.z_offset.active {
            point.z += self.z_offset.new_low_value(rng);
        }
        point
    }

    fn spawn_rectangle(&self, rng: &mut ParticleRng, dims: Vec3) -> Vec3 {
        let half = dims * 0.5;
        if !self.edges {
            return Vec3::new(
                rng.range(-half.x, half.x),
                rng.range(-half.y, half.y),
                rng.range(-half.z, half.z),
            );
        }
        // One of the 12 edges: free along `axis`, pinned to a corner on the other two
        let axis = rng.index(3);
        let mut point = Vec3::ZERO;
        for i in 0..3 {
            point[i] = if i == axis {
                rng.range(-half[i], half[i])
            } else if rng.next_bool() {
                half[i]
            } else {
                -half[i]
            };
        }
        point
    }

    fn spawn_ellipse(&self, rng: &mut ParticleRng, dims: Vec3) -> Vec3 {
        let max_t = match self.side {
            EllipseSide::Both => TAU,
            EllipseSide::Top => PI,
            EllipseSide::Bottom => -PI,
        };
        let t = rng.range(0.0, max_t);
        let (sin_t, cos_t) = t.sin_cos();
        let half = dims * 0.5;
        let radius = if self.edges {
            // Flat ellipses spawn on their outline
            if dims.x == 0.0 {
                return Vec3::new(0.0, half.y * sin_t, half.z * cos_t);
            }
            if dims.y == 0.0 {
                return Vec3::new(half.x * cos_t, 0.0, half.z * sin_t);
            }
            if dims.z == 0.0 {
                return Vec3::new(half.x * cos_t, half.y * sin_t, 0.0);
            }
            half
        } else {
            Vec3::new(
                rng.range(0.0, half.x),
                rng.range(0.0, half.y),
                rng.range(0.0, half.z),
            )
        };
        let z = rng.range(-1.0, 1.0);
        let r = (1.0 - z * z).sqrt();
        Vec3::new(radius.x * r * cos_t, radius.y * r * sin_t, radius.z * z)
    }

    fn spawn_cylinder(&self, rng: &mut ParticleRng, dims: Vec3) -> Vec3 {
        let half = dims * 0.5;
        let y = rng.range(-half.y, half.y);
        let (radius_x, radius_z) = if self.edges {
            (half.x, half.z)
        } else {
            (rng.range(0.0, dims.x) * 0.5, rng.range(0.0, dims.z) * 0.5)
        };
        let theta: f32 = match (radius_x == 0.0, radius_z == 0.0) {
            (true, _) => {
                if rng.next_bool() {
                    -90.0
                } else {
                    90.0
                }
            }
            (false, true) => {
                if rng.next_bool() {
                    0.0
                } else {
                    180.0
                }
            }
            (false, false) => rng.range(0.0, 360.0),
        };
        let (sin, cos) = theta.to_radians().sin_cos();
        Vec3::new(radius_x * cos, y, radius_z * sin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_spawns_at_its_dimensions() {
        let mut rng = ParticleRng::new(3);
        let mut shape = SpawnShapeValue::point(Vec3::new(1.0, 2.0, 3.0));
        shape.start(&mut rng);
        assert_eq!(shape.spawn(&mut rng, 0.0), Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn default_point_is_origin() {
        let mut rng = ParticleRng::new(3);
        let mut shape = SpawnShapeValue::default();
        shape.start(&mut rng);
        assert_eq!(shape.spawn(&mut rng, 0.5), Vec3::ZERO);
    }

    #[test]
    fn rectangle_volume_stays_inside() {
        let mut rng = ParticleRng::new(11);
        let mut shape = SpawnShapeValue::new(SpawnShape::Rectangle, 2.0, 4.0, 6.0);
        shape.start(&mut rng);
        for _ in 0..200 {
            let p = shape.spawn(&mut rng, 0.0);
            assert!(p.x.abs() <= 1.0 && p.y.abs() <= 2.0 && p.z.abs() <= 3.0);
        }
    }

    #[test]
    fn rectangle_edges_pin_two_axes() {
        let mut rng = ParticleRng::new(12);
        let mut shape = SpawnShapeValue::new(SpawnShape::Rectangle, 2.0, 2.0, 2.0).with_edges(true);
        shape.start(&mut rng);
        for _ in 0..100 {
            let p = shape.spawn(&mut rng, 0.0);
            let pinned = p.to_array().iter().filter(|c| (c.abs() - 1.0).abs() < 1e-6).count();
            assert!(pinned >= 2);
        }
    }

    #[test]
    fn ellipse_surface_on_unit_sphere() {
        let mut rng = ParticleRng::new(13);
        let mut shape = SpawnShapeValue::new(SpawnShape::Ellipse, 2.0, 2.0, 2.0).with_edges(true);
        shape.start(&mut rng);
        for _ in 0..100 {
            let p = shape.spawn(&mut rng, 0.0);
            assert!((p.length() - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn ellipse_top_half_has_non_negative_y() {
        let mut rng = ParticleRng::new(14);
        let mut shape = SpawnShapeValue::new(SpawnShape::Ellipse, 2.0, 2.0, 2.0)
            .with_edges(true)
            .with_side(EllipseSide::Top);
        shape.start(&mut rng);
        for _ in 0..100 {
            assert!(shape.spawn(&mut rng, 0.0).y >= -1e-6);
        }
    }

    #[test]
    fn cylinder_edges_on_rim() {
        let mut rng = ParticleRng::new(15);
        let mut shape = SpawnShapeValue::new(SpawnShape::Cylinder, 2.0, 4.0, 2.0).with_edges(true);
        shape.start(&mut rng);
        for _ in 0..100 {
            let p = shape.spawn(&mut rng, 0.0);
            assert!(((p.x * p.x + p.z * p.z).sqrt() - 1.0).abs() < 1e-4);
            assert!(p.y.abs() <= 2.0);
        }
    }

    #[test]
    fn offsets_apply_when_active() {
        let mut rng = ParticleRng::new(16);
        let mut shape = SpawnShapeValue {
            y_offset: RangedNumericValue::constant(5.0),
            ..Default::default()
        };
        shape.start(&mut rng);
        assert_eq!(shape.spawn(&mut rng, 0.0), Vec3::new(0.0, 5.0, 0.0));
    }

    #[test]
    fn parse_from_toml() {
        let toml_str = r#"
shape = "cylinder"
edges = true
width = { low_min = 1.0, low_max = 1.0, high_min = 1.0, high_max = 1.0 }
"#;
        let shape: SpawnShapeValue = toml::from_str(toml_str).unwrap();
        assert_eq!(shape.shape, SpawnShape::Cylinder);
        assert!(shape.edges);
        assert!(!shape.x_offset.active);
    }
}
