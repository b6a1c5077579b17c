//! Rigid bodies: state, mass, material, force accumulators and contacts.

use nalgebra::{Matrix3, Point3, UnitQuaternion, Vector3};
use stacksim_types::{Contact, ContactManifold, MassProperties, Material, Pose, Twist};

use crate::narrow_phase;
use crate::shape::Shape;

/// A rigid body.
///
/// Velocity and momentum are kept consistent: setting one re-derives the
/// other. The rotation matrices and world inverse inertia are refreshed
/// whenever the orientation changes.
#[derive(Debug, Clone)]
pub struct Body {
    initial_pose: Pose,
    initial_inverse_mass: f64,

    pose: Pose,
    rotation: Matrix3<f64>,
    rotation_t: Matrix3<f64>,

    linear_velocity: Vector3<f64>,
    angular_velocity: Vector3<f64>,
    linear_momentum: Vector3<f64>,
    angular_momentum: Vector3<f64>,

    mass_props: MassProperties,
    inverse_inertia_body: Matrix3<f64>,
    inverse_inertia_world: Matrix3<f64>,

    material: Material,
    shape: Shape,

    force: Vector3<f64>,
    torque: Vector3<f64>,

    contacts: Vec<Contact>,
}

impl Body {
    /// Create a body from its inverse mass. Zero makes it immovable.
    ///
    /// Inertia is computed from the shape. Whether the result is usable
    /// (finite mass, invertible inertia, valid material) is checked when the
    /// body is handed to a [`System`](crate::System).
    #[must_use]
    pub fn new(pose: Pose, shape: Shape, inverse_mass: f64, material: Material) -> Self {
        let mass_props = shape.mass_properties(inverse_mass);
        let inverse_inertia_body = mass_props.inverse_inertia().unwrap_or_else(Matrix3::zeros);

        let mut body = Self {
            initial_pose: pose,
            initial_inverse_mass: inverse_mass,
            pose,
            rotation: Matrix3::identity(),
            rotation_t: Matrix3::identity(),
            linear_velocity: Vector3::zeros(),
            angular_velocity: Vector3::zeros(),
            linear_momentum: Vector3::zeros(),
            angular_momentum: Vector3::zeros(),
            mass_props,
            inverse_inertia_body,
            inverse_inertia_world: Matrix3::zeros(),
            material,
            shape,
            force: Vector3::zeros(),
            torque: Vector3::zeros(),
            contacts: Vec::new(),
        };
        body.refresh_orientation();
        body
    }

    /// Create a movable body from its mass.
    #[must_use]
    pub fn dynamic(pose: Pose, shape: Shape, mass: f64, material: Material) -> Self {
        let inverse_mass = if mass.is_infinite() { 0.0 } else { 1.0 / mass };
        Self::new(pose, shape, inverse_mass, material)
    }

    /// Create an immovable body.
    #[must_use]
    pub fn fixed(pose: Pose, shape: Shape, material: Material) -> Self {
        Self::new(pose, shape, 0.0, material)
    }

    /// Give the body an initial velocity.
    ///
    /// Ignored for immovable bodies. [`reset`](Self::reset) brings the body
    /// back to rest.
    #[must_use]
    pub fn with_velocity(mut self, twist: Twist) -> Self {
        self.set_twist(twist);
        self
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Current pose.
    #[must_use]
    pub fn pose(&self) -> &Pose {
        &self.pose
    }

    /// Pose the body was constructed with.
    #[must_use]
    pub fn initial_pose(&self) -> &Pose {
        &self.initial_pose
    }

    /// Position of the center of mass.
    #[must_use]
    pub fn position(&self) -> Point3<f64> {
        self.pose.position
    }

    /// Orientation.
    #[must_use]
    pub fn orientation(&self) -> UnitQuaternion<f64> {
        self.pose.rotation
    }

    /// Rotation matrix of the current orientation.
    #[must_use]
    pub fn rotation_matrix(&self) -> &Matrix3<f64> {
        &self.rotation
    }

    /// Transpose of the rotation matrix (world to body).
    #[must_use]
    pub fn rotation_matrix_transpose(&self) -> &Matrix3<f64> {
        &self.rotation_t
    }

    /// Linear velocity (m/s).
    #[must_use]
    pub fn linear_velocity(&self) -> Vector3<f64> {
        self.linear_velocity
    }

    /// Angular velocity (rad/s).
    #[must_use]
    pub fn angular_velocity(&self) -> Vector3<f64> {
        self.angular_velocity
    }

    /// Linear and angular velocity.
    #[must_use]
    pub fn twist(&self) -> Twist {
        Twist::new(self.linear_velocity, self.angular_velocity)
    }

    /// Linear momentum.
    #[must_use]
    pub fn linear_momentum(&self) -> Vector3<f64> {
        self.linear_momentum
    }

    /// Angular momentum about the center of mass.
    #[must_use]
    pub fn angular_momentum(&self) -> Vector3<f64> {
        self.angular_momentum
    }

    /// Geometry.
    #[must_use]
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Surface material.
    #[must_use]
    pub fn material(&self) -> &Material {
        &self.material
    }

    /// Mass properties in body coordinates.
    #[must_use]
    pub fn mass_properties(&self) -> &MassProperties {
        &self.mass_props
    }

    /// Inverse mass (zero for immovable bodies).
    #[must_use]
    pub fn inverse_mass(&self) -> f64 {
        self.mass_props.inverse_mass
    }

    /// Mass in kg (infinite for immovable bodies).
    #[must_use]
    pub fn mass(&self) -> f64 {
        self.mass_props.mass()
    }

    /// Whether the body is immovable.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.mass_props.is_static()
    }

    /// Inverse inertia tensor in world coordinates.
    #[must_use]
    pub fn inverse_inertia_world(&self) -> &Matrix3<f64> {
        &self.inverse_inertia_world
    }

    /// Inertia tensor in world coordinates.
    #[must_use]
    pub fn inertia_world(&self) -> Matrix3<f64> {
        self.rotation * self.mass_props.inertia * self.rotation_t
    }

    /// Accumulated force.
    #[must_use]
    pub fn force(&self) -> Vector3<f64> {
        self.force
    }

    /// Accumulated torque about the center of mass.
    #[must_use]
    pub fn torque(&self) -> Vector3<f64> {
        self.torque
    }

    /// Contacts found for this body in the current frame.
    #[must_use]
    pub fn contacts(&self) -> &[Contact] {
        &self.contacts
    }

    /// Velocity of the material point currently at `point`.
    #[must_use]
    pub fn velocity_at_point(&self, point: &Point3<f64>) -> Vector3<f64> {
        self.twist().velocity_at_point(&(point - self.pose.position))
    }

    /// Kinetic energy: 0.5 * m * v² + 0.5 * ωᵀ I ω
    #[must_use]
    pub fn kinetic_energy(&self) -> f64 {
        if self.is_static() {
            return 0.0;
        }
        let linear = 0.5 * self.mass() * self.linear_velocity.norm_squared();
        let angular = 0.5 * self.angular_velocity.dot(&self.angular_momentum);
        linear + angular
    }

    /// Test this body's shape against another's at their current poses.
    ///
    /// The normal points from `self` toward `other`.
    #[must_use]
    pub fn intersection_test(&self, other: &Self) -> Option<ContactManifold> {
        narrow_phase::intersect(&self.shape, &self.pose, &other.shape, &other.pose)
    }

    /// Whether the bounding spheres of the two bodies overlap.
    #[must_use]
    pub fn bounds_overlap(&self, other: &Self) -> bool {
        let reach = self.shape.bounding_radius() + other.shape.bounding_radius();
        reach.is_infinite() || (other.pose.position - self.pose.position).norm() <= reach
    }

    // ------------------------------------------------------------------
    // Forces
    // ------------------------------------------------------------------

    /// Apply a force at a world point, adding the induced torque.
    pub fn add_force(&mut self, force: Vector3<f64>, point: Point3<f64>) {
        self.force += force;
        self.torque += (point - self.pose.position).cross(&force);
    }

    /// Apply a force at the center of mass.
    pub fn add_force_at_com(&mut self, force: Vector3<f64>) {
        self.force += force;
    }

    /// Apply a torque about the center of mass.
    pub fn add_torque(&mut self, torque: Vector3<f64>) {
        self.torque += torque;
    }

    /// Clear the force and torque accumulators.
    pub fn zero_forces(&mut self) {
        self.force = Vector3::zeros();
        self.torque = Vector3::zeros();
    }

    // ------------------------------------------------------------------
    // State mutation
    // ------------------------------------------------------------------

    /// Place the body. Velocities are kept; angular momentum follows the new
    /// orientation.
    pub fn set_pose(&mut self, pose: Pose) {
        self.pose = pose;
        self.refresh_orientation();
        self.angular_momentum = self.inertia_world() * self.angular_velocity;
    }

    /// Place the body keeping its momentum; angular velocity follows the new
    /// orientation.
    pub fn set_pose_conserving_momentum(&mut self, pose: Pose) {
        self.pose = pose;
        self.refresh_orientation();
        if !self.is_static() {
            self.angular_velocity = self.inverse_inertia_world * self.angular_momentum;
        }
    }

    /// Set linear and angular velocity, re-deriving momentum.
    ///
    /// Immovable bodies stay at rest.
    pub fn set_twist(&mut self, twist: Twist) {
        if self.is_static() {
            return;
        }
        self.linear_velocity = twist.linear;
        self.angular_velocity = twist.angular;
        self.linear_momentum = twist.linear * self.mass();
        self.angular_momentum = self.inertia_world() * twist.angular;
    }

    /// Set linear and angular momentum, re-deriving velocity.
    pub fn set_momentum(&mut self, linear: Vector3<f64>, angular: Vector3<f64>) {
        if self.is_static() {
            return;
        }
        self.linear_momentum = linear;
        self.angular_momentum = angular;
        self.linear_velocity = linear * self.inverse_mass();
        self.angular_velocity = self.inverse_inertia_world * angular;
    }

    /// Apply an impulse at a world point.
    pub fn apply_impulse(&mut self, impulse: Vector3<f64>, point: Point3<f64>) {
        if self.is_static() {
            return;
        }
        let r = point - self.pose.position;
        self.set_momentum(
            self.linear_momentum + impulse,
            self.angular_momentum + r.cross(&impulse),
        );
    }

    /// Change the inverse mass, recomputing inertia from the shape.
    ///
    /// The body comes to rest. [`reset`](Self::reset) restores the inverse
    /// mass given at construction.
    pub fn set_inverse_mass(&mut self, inverse_mass: f64) {
        self.assign_mass(inverse_mass);
        self.linear_velocity = Vector3::zeros();
        self.angular_velocity = Vector3::zeros();
        self.linear_momentum = Vector3::zeros();
        self.angular_momentum = Vector3::zeros();
        self.refresh_orientation();
    }

    /// Return to the construction state: initial pose, at rest, no forces,
    /// no contacts.
    pub fn reset(&mut self) {
        self.pose = self.initial_pose;
        self.assign_mass(self.initial_inverse_mass);
        self.linear_velocity = Vector3::zeros();
        self.angular_velocity = Vector3::zeros();
        self.linear_momentum = Vector3::zeros();
        self.angular_momentum = Vector3::zeros();
        self.zero_forces();
        self.contacts.clear();
        self.refresh_orientation();
    }

    pub(crate) fn clear_contacts(&mut self) {
        self.contacts.clear();
    }

    pub(crate) fn push_contact(&mut self, contact: Contact) {
        self.contacts.push(contact);
    }

    fn assign_mass(&mut self, inverse_mass: f64) {
        self.mass_props = self.shape.mass_properties(inverse_mass);
        self.inverse_inertia_body = self
            .mass_props
            .inverse_inertia()
            .unwrap_or_else(Matrix3::zeros);
    }

    fn refresh_orientation(&mut self) {
        self.rotation = self.pose.rotation.to_rotation_matrix().into_inner();
        self.rotation_t = self.rotation.transpose();
        self.inverse_inertia_world = self.rotation * self.inverse_inertia_body * self.rotation_t;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn unit_box_at(z: f64) -> Body {
        Body::dynamic(
            Pose::from_position(Point3::new(0.0, 0.0, z)),
            Shape::cube(1.0),
            1.0,
            Material::default(),
        )
    }

    #[test]
    fn test_static_body() {
        let floor = Body::fixed(Pose::identity(), Shape::ground_plane(), Material::default());
        assert!(floor.is_static());
        assert!(floor.mass().is_infinite());
        assert_eq!(*floor.inverse_inertia_world(), Matrix3::zeros());
    }

    #[test]
    fn test_static_body_ignores_impulses() {
        let mut floor = Body::fixed(Pose::identity(), Shape::cube(10.0), Material::default());
        floor.apply_impulse(Vector3::new(0.0, 0.0, 100.0), Point3::new(1.0, 0.0, 0.0));
        floor.set_twist(Twist::linear(Vector3::x()));
        assert_eq!(floor.linear_velocity(), Vector3::zeros());
        assert_eq!(floor.angular_velocity(), Vector3::zeros());
    }

    #[test]
    fn test_force_at_point_adds_torque() {
        let mut body = unit_box_at(0.0);
        body.add_force(Vector3::new(0.0, 1.0, 0.0), Point3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(body.force(), Vector3::new(0.0, 1.0, 0.0));
        // r × f = (1,0,0) × (0,1,0) = (0,0,1)
        assert_relative_eq!(body.torque(), Vector3::new(0.0, 0.0, 1.0));

        body.add_force_at_com(Vector3::new(1.0, 0.0, 0.0));
        body.add_torque(Vector3::new(0.0, 0.0, 1.0));
        assert_relative_eq!(body.force(), Vector3::new(1.0, 1.0, 0.0));
        assert_relative_eq!(body.torque(), Vector3::new(0.0, 0.0, 2.0));

        body.zero_forces();
        assert_eq!(body.force(), Vector3::zeros());
        assert_eq!(body.torque(), Vector3::zeros());
    }

    #[test]
    fn test_impulse_changes_velocity() {
        let mut body = unit_box_at(0.0);
        body.apply_impulse(Vector3::new(2.0, 0.0, 0.0), Point3::origin());
        assert_relative_eq!(body.linear_velocity().x, 2.0, epsilon = 1e-12);
        assert_relative_eq!(body.angular_velocity().norm(), 0.0, epsilon = 1e-12);

        // Off-center impulse spins the body: ω = I⁻¹ (r × j)
        let mut body = unit_box_at(0.0);
        body.apply_impulse(Vector3::new(0.0, 1.0, 0.0), Point3::new(0.5, 0.0, 0.0));
        assert_relative_eq!(body.angular_velocity().z, 0.5 * 6.0, epsilon = 1e-12);
    }

    #[test]
    fn test_twist_momentum_consistency() {
        let body = unit_box_at(0.0).with_velocity(Twist::new(
            Vector3::new(1.0, 2.0, 3.0),
            Vector3::new(0.0, 0.0, 6.0),
        ));
        assert_relative_eq!(body.linear_momentum(), Vector3::new(1.0, 2.0, 3.0));
        assert_relative_eq!(body.angular_momentum().z, 1.0, epsilon = 1e-12);

        let mut body = body;
        body.set_momentum(Vector3::new(0.0, 0.0, -1.0), Vector3::zeros());
        assert_relative_eq!(body.linear_velocity().z, -1.0);
        assert_eq!(body.angular_velocity(), Vector3::zeros());
    }

    #[test]
    fn test_world_inertia_follows_rotation() {
        let mut body = Body::dynamic(
            Pose::identity(),
            Shape::cuboid(Vector3::new(2.0, 0.5, 0.5)),
            1.0,
            Material::default(),
        );
        let before = body.inertia_world();
        body.set_pose(Pose::from_axis_angle(
            Point3::origin(),
            Vector3::z(),
            std::f64::consts::FRAC_PI_2,
        ));
        let after = body.inertia_world();
        assert_relative_eq!(after[(0, 0)], before[(1, 1)], epsilon = 1e-10);
        assert_relative_eq!(after[(1, 1)], before[(0, 0)], epsilon = 1e-10);

        let product = body.inverse_inertia_world() * after;
        assert_relative_eq!(product, Matrix3::identity(), epsilon = 1e-10);
        assert_relative_eq!(
            body.rotation_matrix() * body.rotation_matrix_transpose(),
            Matrix3::identity(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_reset_restores_construction_state() {
        let mut body = unit_box_at(3.0);
        let initial = *body.pose();

        body.set_pose(Pose::from_axis_angle(Point3::new(1.0, 2.0, 0.0), Vector3::y(), 0.4));
        body.set_twist(Twist::new(Vector3::x(), Vector3::y()));
        body.add_force_at_com(Vector3::z());
        body.push_contact(Contact::new(
            stacksim_types::BodyId::new(1),
            Point3::origin(),
            -Vector3::z(),
        ));

        body.reset();
        assert_eq!(*body.pose(), initial);
        assert_eq!(body.twist(), Twist::zero());
        assert_eq!(body.linear_momentum(), Vector3::zeros());
        assert_eq!(body.force(), Vector3::zeros());
        assert!(body.contacts().is_empty());

        let once = body.clone();
        body.reset();
        assert_eq!(*body.pose(), *once.pose());
        assert_eq!(*body.rotation_matrix(), *once.rotation_matrix());
    }

    #[test]
    fn test_reset_restores_inverse_mass() {
        let mut body = unit_box_at(1.0);
        body.set_inverse_mass(0.0);
        assert!(body.is_static());
        assert_eq!(*body.inverse_inertia_world(), Matrix3::zeros());

        body.reset();
        assert_relative_eq!(body.inverse_mass(), 1.0);
        assert_relative_eq!(body.inverse_inertia_world()[(0, 0)], 6.0, epsilon = 1e-12);
    }

    #[test]
    fn test_intersection_test_is_symmetric() {
        let floor = Body::fixed(
            Pose::from_position(Point3::new(0.0, 0.0, -0.5)),
            Shape::cuboid_from_size(Vector3::new(200.0, 200.0, 1.0)),
            Material::new(0.3, 0.5),
        );
        let cube = unit_box_at(0.49);

        let down = cube.intersection_test(&floor).unwrap();
        let up = floor.intersection_test(&cube).unwrap();
        assert_relative_eq!(down.normal, -Vector3::z(), epsilon = 1e-12);
        assert_relative_eq!(up.normal, Vector3::z(), epsilon = 1e-12);

        let apart = unit_box_at(2.0);
        assert!(apart.intersection_test(&floor).is_none());
        assert!(floor.intersection_test(&apart).is_none());
    }

    #[test]
    fn test_bounds_overlap() {
        let a = unit_box_at(0.0);
        let b = unit_box_at(1.5);
        let c = unit_box_at(5.0);
        assert!(a.bounds_overlap(&b));
        assert!(!a.bounds_overlap(&c));

        let plane = Body::fixed(Pose::identity(), Shape::ground_plane(), Material::default());
        assert!(plane.bounds_overlap(&c));
    }

    #[test]
    fn test_kinetic_energy() {
        let body = unit_box_at(0.0).with_velocity(Twist::linear(Vector3::new(2.0, 0.0, 0.0)));
        assert_relative_eq!(body.kinetic_energy(), 2.0, epsilon = 1e-12);

        let spinning = unit_box_at(0.0).with_velocity(Twist::angular(Vector3::new(0.0, 0.0, 6.0)));
        // 0.5 * (1/6) * 36 = 3
        assert_relative_eq!(spinning.kinetic_energy(), 3.0, epsilon = 1e-12);
    }
}
