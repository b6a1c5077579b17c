//! Geometric primitives attached to rigid bodies.
//!
//! Shapes are described in body-local coordinates, centered on the body's
//! center of mass. A [`Pose`] places them in the world.

use nalgebra::{Point3, Vector3};
use stacksim_types::{MassProperties, Pose};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Geometry of a rigid body.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Shape {
    /// Oriented box with half-extents along the local axes.
    Cuboid {
        /// Half-extents of the box in each axis.
        half_extents: Vector3<f64>,
    },
    /// Sphere with given radius.
    Sphere {
        /// Sphere radius in meters.
        radius: f64,
    },
    /// Half-space whose boundary passes through the body origin.
    ///
    /// The solid side lies opposite the normal. Planes have no finite mass
    /// and can only belong to immovable bodies.
    Plane {
        /// Outward normal in local coordinates.
        normal: Vector3<f64>,
    },
}

impl Shape {
    /// Create a box from half-extents.
    #[must_use]
    pub fn cuboid(half_extents: Vector3<f64>) -> Self {
        Self::Cuboid { half_extents }
    }

    /// Create a box from its full edge lengths.
    #[must_use]
    pub fn cuboid_from_size(size: Vector3<f64>) -> Self {
        Self::Cuboid {
            half_extents: size * 0.5,
        }
    }

    /// Create a cube with the given edge length.
    #[must_use]
    pub fn cube(edge: f64) -> Self {
        Self::cuboid(Vector3::repeat(edge * 0.5))
    }

    /// Create a sphere.
    #[must_use]
    pub fn sphere(radius: f64) -> Self {
        Self::Sphere { radius }
    }

    /// Create a plane with the given local normal.
    #[must_use]
    pub fn plane(normal: Vector3<f64>) -> Self {
        Self::Plane { normal }
    }

    /// Create a Z-up ground plane.
    #[must_use]
    pub fn ground_plane() -> Self {
        Self::Plane {
            normal: Vector3::z(),
        }
    }

    /// Radius of a sphere around the origin enclosing the shape.
    ///
    /// Planes are unbounded.
    #[must_use]
    pub fn bounding_radius(&self) -> f64 {
        match self {
            Self::Cuboid { half_extents } => half_extents.norm(),
            Self::Sphere { radius } => *radius,
            Self::Plane { .. } => f64::INFINITY,
        }
    }

    /// Mass properties of a uniform solid of this shape.
    ///
    /// A plane has no inertia; giving it a non-zero inverse mass yields a
    /// singular tensor.
    #[must_use]
    pub fn mass_properties(&self, inverse_mass: f64) -> MassProperties {
        match self {
            Self::Cuboid { half_extents } => MassProperties::box_shape(inverse_mass, *half_extents),
            Self::Sphere { radius } => MassProperties::sphere(inverse_mass, *radius),
            Self::Plane { .. } => MassProperties {
                inverse_mass,
                inertia: nalgebra::Matrix3::zeros(),
            },
        }
    }

    /// Farthest point of the shape along a world direction.
    ///
    /// Returns `None` for planes, whose extent is unbounded.
    #[must_use]
    pub fn support_point(&self, pose: &Pose, direction: &Vector3<f64>) -> Option<Point3<f64>> {
        match self {
            Self::Cuboid { half_extents } => {
                let local = pose.inverse_transform_vector(direction);
                let corner = Vector3::new(
                    half_extents.x.copysign(local.x),
                    half_extents.y.copysign(local.y),
                    half_extents.z.copysign(local.z),
                );
                Some(pose.transform_point(&Point3::from(corner)))
            }
            Self::Sphere { radius } => {
                let offset = direction
                    .try_normalize(f64::EPSILON)
                    .map_or_else(Vector3::zeros, |d| d * *radius);
                Some(pose.position + offset)
            }
            Self::Plane { .. } => None,
        }
    }

    /// Whether the shape has sensible dimensions.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        match self {
            Self::Cuboid { half_extents } => half_extents.iter().all(|h| h.is_finite() && *h > 0.0),
            Self::Sphere { radius } => radius.is_finite() && *radius > 0.0,
            Self::Plane { normal } => {
                normal.iter().all(|x| x.is_finite()) && normal.norm_squared() > f64::EPSILON
            }
        }
    }

    /// Short name of the variant, for logging.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Cuboid { .. } => "cuboid",
            Self::Sphere { .. } => "sphere",
            Self::Plane { .. } => "plane",
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_bounding_radius() {
        assert_relative_eq!(Shape::cube(2.0).bounding_radius(), 3.0_f64.sqrt());
        assert_relative_eq!(Shape::sphere(0.3).bounding_radius(), 0.3);
        assert!(Shape::ground_plane().bounding_radius().is_infinite());
    }

    #[test]
    fn test_box_inertia_from_size() {
        // Unit cube, unit mass: I = (1/12)(1 + 1) = 1/6
        let props = Shape::cuboid_from_size(Vector3::new(1.0, 1.0, 1.0)).mass_properties(1.0);
        assert_relative_eq!(props.inertia[(0, 0)], 1.0 / 6.0, epsilon = 1e-12);
        assert_relative_eq!(props.inertia[(2, 2)], 1.0 / 6.0, epsilon = 1e-12);
        assert!(props.inverse_inertia().is_some());
    }

    #[test]
    fn test_plane_has_no_inertia() {
        assert!(Shape::ground_plane().mass_properties(1.0).inverse_inertia().is_none());
        assert!(Shape::ground_plane().mass_properties(0.0).is_static());
    }

    #[test]
    fn test_box_support_point() {
        let shape = Shape::cube(1.0);
        let pose = Pose::from_position(Point3::new(0.0, 0.0, 2.0));
        let p = shape
            .support_point(&pose, &Vector3::new(1.0, -1.0, 1.0))
            .unwrap();
        assert_relative_eq!(p.coords, Vector3::new(0.5, -0.5, 2.5), epsilon = 1e-12);
    }

    #[test]
    fn test_rotated_box_support_point() {
        let shape = Shape::cube(2.0);
        let pose = Pose::from_axis_angle(
            Point3::origin(),
            Vector3::z(),
            std::f64::consts::FRAC_PI_4,
        );
        let p = shape.support_point(&pose, &Vector3::x()).unwrap();
        assert_relative_eq!(p.x, 2.0_f64.sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn test_sphere_support_point() {
        let shape = Shape::sphere(0.5);
        let pose = Pose::from_position(Point3::new(1.0, 0.0, 0.0));
        let p = shape.support_point(&pose, &Vector3::new(0.0, 0.0, -3.0)).unwrap();
        assert_relative_eq!(p.coords, Vector3::new(1.0, 0.0, -0.5), epsilon = 1e-12);
        assert!(Shape::ground_plane().support_point(&pose, &Vector3::z()).is_none());
    }

    #[test]
    fn test_validity() {
        assert!(Shape::cube(1.0).is_valid());
        assert!(!Shape::cube(0.0).is_valid());
        assert!(!Shape::sphere(-1.0).is_valid());
        assert!(!Shape::plane(Vector3::zeros()).is_valid());
        assert_eq!(Shape::ground_plane().kind(), "plane");
    }
}
