//! Contact data produced by narrow-phase tests.

use crate::BodyId;
use nalgebra::{Point3, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Result of intersecting two shapes.
///
/// The normal is unit length and points from the first shape toward the
/// second.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ContactManifold {
    /// Representative contact point in world coordinates.
    pub point: Point3<f64>,
    /// Unit normal from the first shape toward the second.
    pub normal: Vector3<f64>,
    /// Penetration depth along the normal (>= 0).
    pub depth: f64,
}

impl ContactManifold {
    /// Create a manifold.
    #[must_use]
    pub const fn new(point: Point3<f64>, normal: Vector3<f64>, depth: f64) -> Self {
        Self {
            point,
            normal,
            depth,
        }
    }

    /// The same manifold seen from the second shape.
    #[must_use]
    pub fn flip(self) -> Self {
        Self {
            normal: -self.normal,
            ..self
        }
    }

    /// Attach the manifold to a body, producing a contact entry for it.
    #[must_use]
    pub fn with_other(self, other: BodyId) -> Contact {
        Contact {
            other,
            point: self.point,
            normal: self.normal,
        }
    }
}

/// An entry in a body's per-frame contact list.
///
/// The owning body would come to rest on `other`. The normal points from
/// the owning body toward `other`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Contact {
    /// The body being touched.
    pub other: BodyId,
    /// Contact point in world coordinates.
    pub point: Point3<f64>,
    /// Unit normal from the owning body toward `other`.
    pub normal: Vector3<f64>,
}

impl Contact {
    /// Create a contact entry.
    #[must_use]
    pub const fn new(other: BodyId, point: Point3<f64>, normal: Vector3<f64>) -> Self {
        Self {
            other,
            point,
            normal,
        }
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn test_flip_reverses_normal_only() {
        let m = ContactManifold::new(Point3::new(1.0, 2.0, 3.0), Vector3::z(), 0.25);
        let f = m.flip();
        assert_eq!(f.normal, -Vector3::z());
        assert_eq!(f.point, m.point);
        assert_eq!(f.depth, 0.25);
        assert_eq!(f.flip(), m);
    }

    #[test]
    fn test_with_other() {
        let m = ContactManifold::new(Point3::origin(), -Vector3::z(), 0.01);
        let c = m.with_other(BodyId::new(4));
        assert_eq!(c.other, BodyId::new(4));
        assert_eq!(c.normal, -Vector3::z());
    }
}
