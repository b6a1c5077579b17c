//! Impulse-based resolution of a single contact point with Coulomb friction.
//!
//! Both collisions and resting contacts go through [`resolve`]. The impulse
//! is expressed as acting on the second body; the first receives its
//! negation.

use nalgebra::{Matrix3, Vector3};
use stacksim_types::{Material, Twist};

/// Below this, a denominator or tangent length is treated as zero.
const EPSILON: f64 = 1e-12;

/// One side of a contact as the resolver sees it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactSide {
    /// Effective inverse mass (zero for immovable or frozen bodies).
    pub inverse_mass: f64,
    /// Effective world inverse inertia.
    pub inverse_inertia: Matrix3<f64>,
    /// Contact point relative to the body's center of mass.
    pub offset: Vector3<f64>,
}

impl ContactSide {
    /// A side that can move.
    #[must_use]
    pub fn new(inverse_mass: f64, inverse_inertia: Matrix3<f64>, offset: Vector3<f64>) -> Self {
        Self {
            inverse_mass,
            inverse_inertia,
            offset,
        }
    }

    /// A side that behaves as infinitely heavy.
    #[must_use]
    pub fn immovable(offset: Vector3<f64>) -> Self {
        Self {
            inverse_mass: 0.0,
            inverse_inertia: Matrix3::zeros(),
            offset,
        }
    }

    /// Whether an impulse would move this side at all.
    #[must_use]
    pub fn is_immovable(&self) -> bool {
        self.inverse_mass == 0.0 && self.inverse_inertia == Matrix3::zeros()
    }

    /// Velocities after receiving `impulse` at the contact point.
    #[must_use]
    pub fn kick(&self, twist: &Twist, impulse: &Vector3<f64>) -> Twist {
        Twist::new(
            twist.linear + impulse * self.inverse_mass,
            twist.angular + self.inverse_inertia * self.offset.cross(impulse),
        )
    }

    /// Collision matrix: velocity change at the contact point per unit
    /// impulse.
    ///
    /// K = m⁻¹ I - [r]× I⁻¹ [r]×
    #[must_use]
    pub fn collision_matrix(&self) -> Matrix3<f64> {
        let r = self.offset.cross_matrix();
        Matrix3::identity() * self.inverse_mass - r * self.inverse_inertia * r
    }
}

/// Compute the impulse on `b` that resolves the relative velocity
/// `v_rel = v_b - v_a` at a contact with unit normal `normal` (from `a`
/// toward `b`).
///
/// Restitution and friction come from `material`. The sticking impulse,
/// which cancels tangential motion and reflects the normal velocity by the
/// restitution, is used when it lies inside the friction cone; otherwise a
/// sliding impulse along the tangent is used. Returns `None` when both sides
/// are immovable, the system is singular, or the result is not finite.
#[must_use]
pub fn resolve(
    a: &ContactSide,
    b: &ContactSide,
    normal: &Vector3<f64>,
    v_rel: &Vector3<f64>,
    material: &Material,
) -> Option<Vector3<f64>> {
    if a.is_immovable() && b.is_immovable() {
        return None;
    }

    let k = a.collision_matrix() + b.collision_matrix();
    let e = material.restitution;
    let mu = material.friction;
    let vn = normal.dot(v_rel);

    // Sticking: bring the tangential velocity to zero
    if let Some(k_inv) = k.try_inverse() {
        let j = k_inv * (-e * vn * normal - v_rel);
        let jn = j.dot(normal);
        let jt = j - normal * jn;
        if jn >= 0.0 && jt.norm() <= mu * jn {
            return finite(j);
        }
    }

    // Sliding: friction opposes the tangential velocity
    let tangent_velocity = v_rel - normal * vn;
    let tangent = tangent_velocity
        .try_normalize(EPSILON)
        .unwrap_or_else(Vector3::zeros);
    let direction = normal - tangent * mu;
    let denominator = normal.dot(&(k * direction));
    if denominator.abs() < EPSILON {
        return None;
    }
    let jn = -(1.0 + e) * vn / denominator;
    finite(direction * jn)
}

fn finite(j: Vector3<f64>) -> Option<Vector3<f64>> {
    j.iter().all(|x| x.is_finite()).then_some(j)
}
