//! Axis-aligned bounding boxes.
//!
//! Every region in an interconnect stack is an axis-aligned box, so the whole
//! pipeline works with [`Aabb`] rather than general solids.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One of the three Cartesian axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    /// Position of this axis in a coordinate triple.
    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }

    /// The two remaining axes, in ascending order.
    pub fn others(self) -> (Axis, Axis) {
        match self {
            Axis::X => (Axis::Y, Axis::Z),
            Axis::Y => (Axis::X, Axis::Z),
            Axis::Z => (Axis::X, Axis::Y),
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Axis::X => "x",
            Axis::Y => "y",
            Axis::Z => "z",
        };
        f.write_str(name)
    }
}

/// An axis-aligned box given by its minimum and maximum corners.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    /// Minimum corner (x, y, z).
    pub min: [f64; 3],
    /// Maximum corner (x, y, z).
    pub max: [f64; 3],
}

impl Aabb {
    pub fn new(min: [f64; 3], max: [f64; 3]) -> Self {
        Self { min, max }
    }

    /// Build a box from two arbitrary opposite corners.
    pub fn from_corners(a: [f64; 3], b: [f64; 3]) -> Self {
        let mut min = [0.0; 3];
        let mut max = [0.0; 3];
        for i in 0..3 {
            min[i] = a[i].min(b[i]);
            max[i] = a[i].max(b[i]);
        }
        Self { min, max }
    }

    /// Lower and upper bound along one axis.
    pub fn interval(&self, axis: Axis) -> (f64, f64) {
        (self.min[axis.index()], self.max[axis.index()])
    }

    /// Edge length along one axis.
    pub fn extent(&self, axis: Axis) -> f64 {
        let (lo, hi) = self.interval(axis);
        hi - lo
    }

    /// Whether the corners are finite and ordered (`min <= max` on every axis).
    pub fn is_well_formed(&self) -> bool {
        (0..3).all(|i| {
            self.min[i].is_finite() && self.max[i].is_finite() && self.min[i] <= self.max[i]
        })
    }

    /// Check whether a point lies inside the box, boundary included, with a
    /// slack of `tolerance` on every face.
    pub fn contains(&self, point: &[f64; 3], tolerance: f64) -> bool {
        (0..3).all(|i| point[i] >= self.min[i] - tolerance && point[i] <= self.max[i] + tolerance)
    }

    /// Smallest box enclosing both `self` and `other`.
    pub fn union(&self, other: &Aabb) -> Aabb {
        let mut min = self.min;
        let mut max = self.max;
        for i in 0..3 {
            min[i] = min[i].min(other.min[i]);
            max[i] = max[i].max(other.max[i]);
        }
        Aabb { min, max }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_corners_orders_bounds() {
        let b = Aabb::from_corners([2.0, 0.0, 5.0], [1.0, 3.0, 4.0]);
        assert_eq!(b.min, [1.0, 0.0, 4.0]);
        assert_eq!(b.max, [2.0, 3.0, 5.0]);
        assert!(b.is_well_formed());
    }

    #[test]
    fn test_contains_with_tolerance() {
        let b = Aabb::new([0.0, 0.0, 0.0], [1.0, 1.0, 1.0]);
        assert!(b.contains(&[1.0, 0.5, 0.0], 0.0));
        assert!(!b.contains(&[1.001, 0.5, 0.5], 0.0));
        assert!(b.contains(&[1.001, 0.5, 0.5], 0.01));
    }

    #[test]
    fn test_inverted_box_is_malformed() {
        let b = Aabb::new([1.0, 0.0, 0.0], [0.0, 1.0, 1.0]);
        assert!(!b.is_well_formed());
        let nan = Aabb::new([f64::NAN, 0.0, 0.0], [1.0, 1.0, 1.0]);
        assert!(!nan.is_well_formed());
    }

    #[test]
    fn test_union_and_extent() {
        let a = Aabb::new([0.0, 0.0, 0.0], [1.0, 1.0, 1.0]);
        let b = Aabb::new([-1.0, 0.5, 0.0], [0.5, 3.0, 2.0]);
        let u = a.union(&b);
        assert_eq!(u.min, [-1.0, 0.0, 0.0]);
        assert_eq!(u.max, [1.0, 3.0, 2.0]);
        assert_eq!(u.extent(Axis::Y), 3.0);
        assert_eq!(Axis::Z.others(), (Axis::X, Axis::Y));
    }
}
