//! Axis-preserving linear transformations.
//!
//! Layout geometry usually arrives in database units or micrometres, while the
//! assembled coefficients are wanted in SI units. [`Transform`] is the
//! diagonal scale needed for that; rotations are absent because every region
//! must stay axis-aligned.

use nalgebra::{Matrix3, Vector3};

use crate::bounds::Aabb;

/// A scale about the origin.
#[derive(Debug, Clone)]
pub struct Transform {
    /// Diagonal scale matrix.
    pub matrix: Matrix3<f64>,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            matrix: Matrix3::identity(),
        }
    }
}

impl Transform {
    /// Create a uniform scale about the origin, e.g. `1e-6` for µm → m.
    pub fn uniform_scale(factor: f64) -> Self {
        Self {
            matrix: Matrix3::identity() * factor,
        }
    }

    /// Apply this transformation to a 3D point.
    pub fn apply(&self, point: &[f64; 3]) -> [f64; 3] {
        let v = self.matrix * Vector3::new(point[0], point[1], point[2]);
        [v.x, v.y, v.z]
    }

    /// Apply this transformation to a box. Negative scales swap the corners.
    pub fn apply_box(&self, bounds: &Aabb) -> Aabb {
        Aabb::from_corners(self.apply(&bounds.min), self.apply(&bounds.max))
    }

    /// Largest absolute axis scale, used to rescale length tolerances.
    pub fn scale_factor(&self) -> f64 {
        self.matrix.diagonal().iter().fold(0.0_f64, |acc, s| acc.max(s.abs()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_transform() {
        let t = Transform::default();
        let result = t.apply(&[1.0, 2.0, 3.0]);
        assert!((result[0] - 1.0).abs() < 1e-12);
        assert!((result[1] - 2.0).abs() < 1e-12);
        assert!((result[2] - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_unit_scale() {
        let t = Transform::uniform_scale(1e-6);
        let result = t.apply(&[2.0, 0.5, 3.0]);
        assert!((result[0] - 2e-6).abs() < 1e-18);
        assert!((result[1] - 0.5e-6).abs() < 1e-18);
        assert!((result[2] - 3e-6).abs() < 1e-18);
        assert!((t.scale_factor() - 1e-6).abs() < 1e-18);
    }

    #[test]
    fn test_mirror_keeps_box_ordered() {
        let t = Transform::uniform_scale(-1.0);
        let b = t.apply_box(&Aabb::new([1.0, 0.0, 0.0], [2.0, 1.0, 1.0]));
        assert_eq!(b.min, [-2.0, -1.0, -1.0]);
        assert_eq!(b.max, [-1.0, 0.0, 0.0]);
        assert!(b.is_well_formed());
        assert_eq!(t.scale_factor(), 1.0);
    }
}
