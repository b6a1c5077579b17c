//! The simulated system: bodies, configuration and the per-frame passes.
//!
//! [`System`] owns every [`Body`] in a canonical vector addressed by
//! [`BodyId`], plus a separate processing order that the frame driver
//! reshuffles and then sorts supports-first each frame. The passes that make
//! up a frame (`collision_detect`, `build_contact_graph`, `contact_detect`,
//! `topological_tarjan`) live here; [`Stepper`](crate::Stepper) sequences
//! them.
//!
//! # Flattened state
//!
//! Per body, positions use a stride of [`POS_STATE_SIZE`]
//! (`px py pz qw qx qy qz`) and velocities a stride of [`VEL_STATE_SIZE`]
//! (`vx vy vz wx wy wz`), both in world coordinates. Body `i` occupies
//! `buf[i * stride..(i + 1) * stride]`.

use nalgebra::{Point3, Quaternion, UnitQuaternion, Vector3};
use rand::seq::SliceRandom;
use rand::Rng;
use stacksim_types::{BodyId, Contact, Material, Pose, Result, SimError, SimulationConfig, Twist};
use tracing::{trace, warn};

use crate::body::Body;
use crate::contact_graph::{self, ContactOrdering};
use crate::impulse::{self, ContactSide};
use crate::integrators::Integrator;

/// Number of scalars describing one body's position and orientation.
pub const POS_STATE_SIZE: usize = 7;

/// Number of scalars describing one body's linear and angular velocity.
pub const VEL_STATE_SIZE: usize = 6;

/// Quaternions this close to unit length are taken as-is when read back
/// from a state buffer.
const UNIT_TOLERANCE: f64 = 1e-12;

/// A collection of rigid bodies stepped together.
#[derive(Debug, Clone)]
pub struct System {
    config: SimulationConfig,
    bodies: Vec<Body>,
    ordering: ContactOrdering,
    time: f64,
    frame_count: u64,
}

impl System {
    /// Create a system from its bodies.
    ///
    /// # Errors
    ///
    /// - [`SimError::EmptySystem`] if `bodies` is empty
    /// - any error from [`SimulationConfig::validate`]
    /// - [`SimError::InvalidMassProperties`] for a negative or non-finite
    ///   inverse mass
    /// - [`SimError::DegenerateInertia`] for a movable body whose inertia
    ///   cannot be inverted (including planes)
    /// - [`SimError::InvalidGeometry`] for non-positive or non-finite shape
    ///   dimensions, a zero plane normal, or a non-finite initial pose
    /// - [`SimError::InvalidMaterial`] for restitution outside `[0, 1]` or
    ///   negative friction
    pub fn new(bodies: Vec<Body>, config: SimulationConfig) -> Result<Self> {
        if bodies.is_empty() {
            warn!("rejecting system with no bodies");
            return Err(SimError::EmptySystem);
        }
        if let Err(err) = config.validate() {
            warn!(%err, "rejecting simulation config");
            return Err(err);
        }

        for (index, body) in bodies.iter().enumerate() {
            if !body.shape().is_valid() {
                warn!(body = index, shape = body.shape().kind(), "invalid shape dimensions");
                return Err(SimError::invalid_geometry(
                    index,
                    format!("{} has non-positive or non-finite dimensions", body.shape().kind()),
                ));
            }
            if !body.pose().is_finite() {
                warn!(body = index, "non-finite initial pose");
                return Err(SimError::invalid_geometry(index, "initial pose is not finite"));
            }
            let props = body.mass_properties();
            if !props.inverse_mass.is_finite() || props.inverse_mass < 0.0 {
                warn!(body = index, inverse_mass = props.inverse_mass, "invalid inverse mass");
                return Err(SimError::invalid_mass(format!(
                    "body {index} has inverse mass {}",
                    props.inverse_mass
                )));
            }
            if !body.is_static() && (props.validate().is_err() || props.inverse_inertia().is_none())
            {
                warn!(body = index, shape = body.shape().kind(), "degenerate inertia");
                return Err(SimError::DegenerateInertia { body: index });
            }
            if let Err(reason) = body.material().check() {
                warn!(body = index, reason, "invalid material");
                return Err(SimError::invalid_material(index, reason));
            }
        }

        let order = (0..bodies.len()).map(BodyId::new).collect();
        Ok(Self {
            config,
            bodies,
            ordering: ContactOrdering::singletons(order),
            time: 0.0,
            frame_count: 0,
        })
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Number of bodies.
    #[must_use]
    pub fn num_bodies(&self) -> usize {
        self.bodies.len()
    }

    /// Length of a buffer holding every body's position state.
    #[must_use]
    pub fn size_pos(&self) -> usize {
        self.bodies.len() * POS_STATE_SIZE
    }

    /// Length of a buffer holding every body's velocity state.
    #[must_use]
    pub fn size_vel(&self) -> usize {
        self.bodies.len() * VEL_STATE_SIZE
    }

    /// Get a body by id.
    #[must_use]
    pub fn body(&self, id: BodyId) -> Option<&Body> {
        self.bodies.get(id.index())
    }

    /// Get a mutable body by id.
    #[must_use]
    pub fn body_mut(&mut self, id: BodyId) -> Option<&mut Body> {
        self.bodies.get_mut(id.index())
    }

    /// All bodies in canonical (construction) order.
    #[must_use]
    pub fn bodies(&self) -> &[Body] {
        &self.bodies
    }

    /// Body ids in the current processing order.
    #[must_use]
    pub fn processing_order(&self) -> &[BodyId] {
        &self.ordering.order
    }

    /// Bodies in the current processing order.
    pub fn ordered_bodies(&self) -> impl Iterator<Item = &Body> + '_ {
        self.ordering
            .order
            .iter()
            .filter_map(move |id| self.bodies.get(id.index()))
    }

    /// The most recent contact ordering.
    #[must_use]
    pub fn contact_ordering(&self) -> &ContactOrdering {
        &self.ordering
    }

    /// Simulation configuration.
    #[must_use]
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Frame duration in seconds.
    #[must_use]
    pub fn timestep(&self) -> f64 {
        self.config.timestep
    }

    /// Simulated time in seconds.
    #[must_use]
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Number of completed frames.
    #[must_use]
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Total number of contacts found by the last contact-graph build.
    #[must_use]
    pub fn contact_count(&self) -> usize {
        self.bodies.iter().map(|b| b.contacts().len()).sum()
    }

    // =========================================================================
    // Flattened State
    // =========================================================================

    /// Copy a body's position state into its stride of `buf`.
    ///
    /// # Errors
    ///
    /// [`SimError::InvalidBodyId`] if the id is unknown or `buf` has no room
    /// for it.
    pub fn get_state_pos(&self, buf: &mut [f64], id: BodyId) -> Result<()> {
        let body = self.body(id).ok_or(SimError::InvalidBodyId(id.index()))?;
        stride_mut(buf, id, POS_STATE_SIZE)?.copy_from_slice(&pos_state(body));
        Ok(())
    }

    /// Copy a body's velocity state into its stride of `buf`.
    ///
    /// # Errors
    ///
    /// [`SimError::InvalidBodyId`] if the id is unknown or `buf` has no room
    /// for it.
    pub fn get_state_vel(&self, buf: &mut [f64], id: BodyId) -> Result<()> {
        let body = self.body(id).ok_or(SimError::InvalidBodyId(id.index()))?;
        stride_mut(buf, id, VEL_STATE_SIZE)?.copy_from_slice(&vel_state(body));
        Ok(())
    }

    /// Set a body's position and orientation from its stride of `buf`.
    ///
    /// Velocities are kept; rotation and world inertia are re-derived.
    ///
    /// # Errors
    ///
    /// [`SimError::InvalidBodyId`] for an unknown id or short buffer,
    /// [`SimError::Diverged`] if the stored quaternion cannot be normalized.
    pub fn set_state_pos(&mut self, buf: &[f64], id: BodyId) -> Result<()> {
        let slot = stride(buf, id, POS_STATE_SIZE)?;
        let pose = pose_from_state(slot)?;
        let body = self
            .bodies
            .get_mut(id.index())
            .ok_or(SimError::InvalidBodyId(id.index()))?;
        body.set_pose(pose);
        Ok(())
    }

    /// Set a body's velocities from its stride of `buf`.
    ///
    /// Momentum is re-derived. Immovable bodies ignore this.
    ///
    /// # Errors
    ///
    /// [`SimError::InvalidBodyId`] for an unknown id or short buffer.
    pub fn set_state_vel(&mut self, buf: &[f64], id: BodyId) -> Result<()> {
        let slot = stride(buf, id, VEL_STATE_SIZE)?;
        let twist = Twist::new(
            Vector3::new(slot[0], slot[1], slot[2]),
            Vector3::new(slot[3], slot[4], slot[5]),
        );
        let body = self
            .bodies
            .get_mut(id.index())
            .ok_or(SimError::InvalidBodyId(id.index()))?;
        body.set_twist(twist);
        Ok(())
    }

    // =========================================================================
    // Force Application
    // =========================================================================

    /// Clear force and torque accumulators on every body.
    pub fn zero_forces(&mut self) {
        for body in &mut self.bodies {
            body.zero_forces();
        }
    }

    /// Add `mass * g` at the center of mass of every movable body.
    pub fn add_gravity(&mut self) {
        let gravity = self.config.gravity;
        for body in &mut self.bodies {
            if body.is_static() {
                continue;
            }
            let force = gravity.force_on_mass(body.mass());
            body.add_force_at_com(force);
        }
    }

    // =========================================================================
    // Collision and Contact Passes
    // =========================================================================

    /// Resolve collisions between bodies at their predicted poses.
    ///
    /// Every unordered pair is tested at the current (predicted) poses. For
    /// an overlapping pair whose velocities in `snapshot` approach along the
    /// contact normal faster than the collision threshold, a collision
    /// impulse is computed with the combined material and applied to the
    /// snapshot velocities. Separating or slowly approaching pairs are left
    /// to contact resolution.
    ///
    /// Returns `true` if any impulse was applied.
    pub fn collision_detect(&self, snapshot: &mut StateSnapshot) -> bool {
        let threshold = self.config.solver.collision_velocity_threshold;
        let order = &self.ordering.order;
        let mut applied = false;

        for (n, &a_id) in order.iter().enumerate() {
            for &b_id in &order[n + 1..] {
                let (Some(a), Some(b)) = (self.bodies.get(a_id.index()), self.bodies.get(b_id.index()))
                else {
                    continue;
                };
                if (a.is_static() && b.is_static()) || !a.bounds_overlap(b) {
                    continue;
                }
                let Some(manifold) = a.intersection_test(b) else {
                    continue;
                };
                let (Some(va), Some(vb)) = (snapshot.twist(a_id), snapshot.twist(b_id)) else {
                    continue;
                };

                let ra = manifold.point - a.position();
                let rb = manifold.point - b.position();
                let v_rel = vb.velocity_at_point(&rb) - va.velocity_at_point(&ra);
                let vn = manifold.normal.dot(&v_rel);
                if vn >= -threshold {
                    continue;
                }

                let side_a = contact_side(a, ra, false);
                let side_b = contact_side(b, rb, false);
                let material = a.material().combine(b.material());
                let Some(j) = impulse::resolve(&side_a, &side_b, &manifold.normal, &v_rel, &material)
                else {
                    continue;
                };

                trace!(a = %a_id, b = %b_id, vn, depth = manifold.depth, "collision impulse");
                snapshot.set_twist(a_id, side_a.kick(&va, &-j));
                snapshot.set_twist(b_id, side_b.kick(&vb, &j));
                applied = true;
            }
        }
        applied
    }

    /// One pass of resting-contact resolution over the processing order.
    ///
    /// Each body's contacts are resolved with zero restitution when the
    /// bodies approach along the normal. With `shock_propagation`, every
    /// strongly connected component is treated as immovable once its own
    /// contacts are processed, so bodies higher in a stack cannot push it
    /// back down. The freeze lasts only for this pass. `iteration` is used
    /// for tracing.
    ///
    /// Returns `true` if any contact needed an impulse.
    pub fn contact_detect(&mut self, iteration: usize, shock_propagation: bool) -> bool {
        let threshold = self.config.solver.contact_velocity_threshold;
        let components: Vec<Vec<BodyId>> = self
            .ordering
            .components()
            .into_iter()
            .map(<[BodyId]>::to_vec)
            .collect();
        let mut frozen = vec![false; self.bodies.len()];
        let mut impulses = 0usize;

        for component in &components {
            for &id in component {
                let contacts = match self.bodies.get(id.index()) {
                    Some(body) => body.contacts().to_vec(),
                    None => continue,
                };
                for contact in &contacts {
                    if self.resolve_contact(id, contact, &frozen, threshold) {
                        impulses += 1;
                    }
                }
            }
            if shock_propagation {
                if component.first().is_some_and(|&id| self.ordering.is_in_cycle(id)) {
                    trace!(iteration, size = component.len(), "freezing mutually supporting bodies");
                }
                for id in component {
                    if let Some(flag) = frozen.get_mut(id.index()) {
                        *flag = true;
                    }
                }
            }
        }

        trace!(iteration, shock_propagation, impulses, "contact pass");
        impulses > 0
    }

    fn resolve_contact(
        &mut self,
        owner: BodyId,
        contact: &Contact,
        frozen: &[bool],
        threshold: f64,
    ) -> bool {
        let (i, k) = (owner.index(), contact.other.index());
        if i == k {
            return false;
        }
        let (Some(a), Some(b)) = (self.bodies.get(i), self.bodies.get(k)) else {
            return false;
        };

        let v_rel = b.velocity_at_point(&contact.point) - a.velocity_at_point(&contact.point);
        if contact.normal.dot(&v_rel) >= -threshold {
            return false;
        }

        let frozen_a = frozen.get(i).copied().unwrap_or(false);
        let frozen_b = frozen.get(k).copied().unwrap_or(false);
        let side_a = contact_side(a, contact.point - a.position(), frozen_a);
        let side_b = contact_side(b, contact.point - b.position(), frozen_b);
        let material = Material::new(0.0, a.material().combine(b.material()).friction);

        let Some(j) = impulse::resolve(&side_a, &side_b, &contact.normal, &v_rel, &material) else {
            return false;
        };
        if !frozen_b {
            self.bodies[k].apply_impulse(j, contact.point);
        }
        if !frozen_a {
            self.bodies[i].apply_impulse(-j, contact.point);
        }
        true
    }

    /// Rebuild every body's contact list and re-sort the processing order.
    ///
    /// Each movable body is advanced alone by one timestep (velocity first
    /// only when `is_initial`), tested against every other body, and put
    /// back exactly as it was. Overlaps found at the advanced pose become its
    /// contacts, with normals pointing toward the other body. The contact
    /// graph is then ordered with [`topological_tarjan`](Self::topological_tarjan).
    pub fn build_contact_graph(
        &mut self,
        integrator: &dyn Integrator,
        is_initial: bool,
    ) -> &ContactOrdering {
        let dt = self.config.timestep;
        for body in &mut self.bodies {
            body.clear_contacts();
        }

        for i in 0..self.bodies.len() {
            if self.bodies[i].is_static() {
                continue;
            }
            let mut predicted = self.bodies[i].clone();
            if is_initial {
                integrator.integrate_body_vel(&mut predicted, dt);
            }
            integrator.integrate_body_pos(&mut predicted, dt);

            let found: Vec<_> = self
                .bodies
                .iter()
                .enumerate()
                .filter(|&(k, other)| k != i && predicted.bounds_overlap(other))
                .filter_map(|(k, other)| {
                    predicted
                        .intersection_test(other)
                        .map(|m| m.with_other(BodyId::new(k)))
                })
                .collect();
            for contact in found {
                self.bodies[i].push_contact(contact);
            }
        }

        self.topological_tarjan()
    }

    /// Order the bodies supports-first from their contact lists.
    ///
    /// An edge `i → k` exists for every contact with `k` in body `i`'s
    /// list. The resulting order becomes the processing order.
    pub fn topological_tarjan(&mut self) -> &ContactOrdering {
        let adjacency: Vec<Vec<usize>> = self
            .bodies
            .iter()
            .map(|b| b.contacts().iter().map(|c| c.other.index()).collect())
            .collect();
        self.ordering = contact_graph::topological_order(&self.ordering.order, &adjacency);
        trace!(components = self.ordering.component_count, "contact graph ordered");
        &self.ordering
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Randomly permute the processing order.
    pub fn shuffle_order<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let mut order = std::mem::take(&mut self.ordering.order);
        order.shuffle(rng);
        self.ordering = ContactOrdering::singletons(order);
    }

    /// Return every body to its construction state and restart the clock.
    pub fn reset(&mut self) {
        for body in &mut self.bodies {
            body.reset();
        }
        self.ordering = ContactOrdering::singletons((0..self.bodies.len()).map(BodyId::new).collect());
        self.time = 0.0;
        self.frame_count = 0;
    }

    pub(crate) fn advance_time(&mut self, dt: f64) {
        self.time += dt;
        self.frame_count += 1;
    }

    // =========================================================================
    // Diagnostics
    // =========================================================================

    /// Total kinetic energy of all bodies.
    #[must_use]
    pub fn total_kinetic_energy(&self) -> f64 {
        self.bodies.iter().map(Body::kinetic_energy).sum()
    }

    /// Total linear momentum of the movable bodies.
    #[must_use]
    pub fn total_linear_momentum(&self) -> Vector3<f64> {
        self.bodies
            .iter()
            .filter(|b| !b.is_static())
            .fold(Vector3::zeros(), |acc, b| acc + b.linear_momentum())
    }

    /// Mass-weighted center of the movable bodies, `None` if there are none.
    #[must_use]
    pub fn center_of_mass(&self) -> Option<Point3<f64>> {
        let (total_mass, weighted) = self
            .bodies
            .iter()
            .filter(|b| !b.is_static())
            .fold((0.0, Vector3::zeros()), |(m, sum), b| {
                (m + b.mass(), sum + b.position().coords * b.mass())
            });
        (total_mass > 0.0).then(|| Point3::from(weighted / total_mass))
    }

    /// Check that the configuration is valid and every body has finite
    /// state.
    ///
    /// # Errors
    ///
    /// Returns the configuration error, or [`SimError::Diverged`] naming
    /// the first body with a non-finite pose or velocity.
    pub fn validate(&self) -> Result<()> {
        self.config.validate()?;
        for (index, body) in self.bodies.iter().enumerate() {
            if !body.pose().is_finite() || !body.twist().is_finite() {
                return Err(SimError::diverged(format!(
                    "body {} has non-finite state",
                    BodyId::new(index)
                )));
            }
        }
        Ok(())
    }
}

// =============================================================================
// State Snapshot
// =============================================================================

/// Saved positions and velocities of every body in a system.
///
/// Buffers use the strides of [`System::get_state_pos`] and
/// [`System::get_state_vel`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StateSnapshot {
    positions: Vec<f64>,
    velocities: Vec<f64>,
}

impl StateSnapshot {
    /// Capture the state of every body.
    #[must_use]
    pub fn capture(system: &System) -> Self {
        let mut positions = Vec::with_capacity(system.size_pos());
        let mut velocities = Vec::with_capacity(system.size_vel());
        for body in system.bodies() {
            positions.extend_from_slice(&pos_state(body));
            velocities.extend_from_slice(&vel_state(body));
        }
        Self {
            positions,
            velocities,
        }
    }

    /// Write the saved state back into every body.
    ///
    /// # Errors
    ///
    /// Fails if the snapshot was taken from a system with fewer bodies or
    /// holds a degenerate orientation.
    pub fn restore(&self, system: &mut System) -> Result<()> {
        for index in 0..system.num_bodies() {
            self.restore_body(system, BodyId::new(index))?;
        }
        Ok(())
    }

    /// Re-capture a single body.
    ///
    /// # Errors
    ///
    /// [`SimError::InvalidBodyId`] if the body is unknown to either side.
    pub fn capture_body(&mut self, system: &System, id: BodyId) -> Result<()> {
        system.get_state_pos(&mut self.positions, id)?;
        system.get_state_vel(&mut self.velocities, id)
    }

    /// Write a single body's saved state back.
    ///
    /// # Errors
    ///
    /// See [`restore`](Self::restore).
    pub fn restore_body(&self, system: &mut System, id: BodyId) -> Result<()> {
        system.set_state_pos(&self.positions, id)?;
        system.set_state_vel(&self.velocities, id)
    }

    /// Saved velocities of a body.
    #[must_use]
    pub fn twist(&self, id: BodyId) -> Option<Twist> {
        let slot = stride(&self.velocities, id, VEL_STATE_SIZE).ok()?;
        Some(Twist::new(
            Vector3::new(slot[0], slot[1], slot[2]),
            Vector3::new(slot[3], slot[4], slot[5]),
        ))
    }

    /// Overwrite the saved velocities of a body. Unknown ids are ignored.
    pub fn set_twist(&mut self, id: BodyId, twist: Twist) {
        if let Ok(slot) = stride_mut(&mut self.velocities, id, VEL_STATE_SIZE) {
            slot[..3].copy_from_slice(twist.linear.as_slice());
            slot[3..].copy_from_slice(twist.angular.as_slice());
        }
    }

    /// Saved pose of a body.
    #[must_use]
    pub fn pose(&self, id: BodyId) -> Option<Pose> {
        stride(&self.positions, id, POS_STATE_SIZE)
            .ok()
            .and_then(|slot| pose_from_state(slot).ok())
    }

    /// Flattened positions.
    #[must_use]
    pub fn positions(&self) -> &[f64] {
        &self.positions
    }

    /// Flattened velocities.
    #[must_use]
    pub fn velocities(&self) -> &[f64] {
        &self.velocities
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn stride(buf: &[f64], id: BodyId, size: usize) -> Result<&[f64]> {
    let start = id.index() * size;
    buf.get(start..start + size)
        .ok_or(SimError::InvalidBodyId(id.index()))
}

fn stride_mut(buf: &mut [f64], id: BodyId, size: usize) -> Result<&mut [f64]> {
    let start = id.index() * size;
    buf.get_mut(start..start + size)
        .ok_or(SimError::InvalidBodyId(id.index()))
}

fn pos_state(body: &Body) -> [f64; POS_STATE_SIZE] {
    let p = body.position();
    // coords are stored as (i, j, k, w)
    let q = body.orientation().into_inner().coords;
    [p.x, p.y, p.z, q[3], q[0], q[1], q[2]]
}

fn vel_state(body: &Body) -> [f64; VEL_STATE_SIZE] {
    let v = body.linear_velocity();
    let w = body.angular_velocity();
    [v.x, v.y, v.z, w.x, w.y, w.z]
}

fn pose_from_state(slot: &[f64]) -> Result<Pose> {
    let position = Point3::new(slot[0], slot[1], slot[2]);
    let q = Quaternion::new(slot[3], slot[4], slot[5], slot[6]);
    let norm = q.norm();
    if !norm.is_finite() || norm < f64::EPSILON {
        return Err(SimError::diverged(format!(
            "orientation {q:?} cannot be normalized"
        )));
    }
    let rotation = if (norm - 1.0).abs() <= UNIT_TOLERANCE {
        UnitQuaternion::new_unchecked(q)
    } else {
        UnitQuaternion::new_normalize(q)
    };
    Ok(Pose::from_position_rotation(position, rotation))
}

/// How a body takes part in an impulse exchange.
fn contact_side(body: &Body, offset: Vector3<f64>, frozen: bool) -> ContactSide {
    if frozen || body.is_static() {
        ContactSide::immovable(offset)
    } else {
        ContactSide::new(body.inverse_mass(), *body.inverse_inertia_world(), offset)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::integrators::SemiImplicitEuler;
    use crate::shape::Shape;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use stacksim_types::MassProperties;

    fn floor() -> Body {
        Body::fixed(
            Pose::from_position(Point3::new(0.0, 0.0, -0.5)),
            Shape::cuboid_from_size(Vector3::new(20.0, 20.0, 1.0)),
            Material::new(0.3, 0.5),
        )
    }

    fn cube_at(z: f64) -> Body {
        Body::dynamic(
            Pose::from_position(Point3::new(0.0, 0.0, z)),
            Shape::cube(1.0),
            1.0,
            Material::new(0.4, 0.5),
        )
    }

    /// Floor plus `n` unit cubes stacked with small gaps.
    fn stack(n: usize) -> System {
        let mut bodies = vec![floor()];
        for level in 0..n {
            bodies.push(cube_at(0.5 + level as f64 * 1.00001 + 1e-5));
        }
        System::new(bodies, SimulationConfig::default()).unwrap()
    }

    #[test]
    fn test_construction_rejects() {
        let err = System::new(vec![], SimulationConfig::default()).unwrap_err();
        assert!(matches!(err, SimError::EmptySystem));

        let plane = Body::new(Pose::identity(), Shape::ground_plane(), 1.0, Material::default());
        let err = System::new(vec![plane], SimulationConfig::default()).unwrap_err();
        assert!(matches!(err, SimError::DegenerateInertia { body: 0 }));

        let bouncy = Body::dynamic(Pose::identity(), Shape::cube(1.0), 1.0, Material::new(1.5, 0.5));
        let err = System::new(vec![floor(), bouncy], SimulationConfig::default()).unwrap_err();
        assert!(matches!(err, SimError::InvalidMaterial { body: 1, .. }));

        let negative = Body::new(Pose::identity(), Shape::cube(1.0), -1.0, Material::default());
        let err = System::new(vec![negative], SimulationConfig::default()).unwrap_err();
        assert!(matches!(err, SimError::InvalidMassProperties { .. }));

        let inverted = Body::fixed(Pose::identity(), Shape::cube(-1.0), Material::default());
        let err = System::new(vec![inverted], SimulationConfig::default()).unwrap_err();
        assert!(matches!(err, SimError::InvalidGeometry { body: 0, .. }));

        let ball = Body::fixed(Pose::identity(), Shape::sphere(f64::NAN), Material::default());
        let err = System::new(vec![floor(), ball], SimulationConfig::default()).unwrap_err();
        assert!(matches!(err, SimError::InvalidGeometry { body: 1, .. }));

        let flat = Body::fixed(Pose::identity(), Shape::plane(Vector3::zeros()), Material::default());
        let err = System::new(vec![flat], SimulationConfig::default()).unwrap_err();
        assert!(matches!(err, SimError::InvalidGeometry { body: 0, .. }));

        let lost = Body::dynamic(
            Pose::from_position(Point3::new(f64::INFINITY, 0.0, 0.0)),
            Shape::cube(1.0),
            1.0,
            Material::default(),
        );
        let err = System::new(vec![floor(), lost], SimulationConfig::default()).unwrap_err();
        assert!(matches!(err, SimError::InvalidGeometry { body: 1, .. }));

        let err = System::new(vec![floor()], SimulationConfig::with_timestep(0.0))
            .unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_static_planes_are_accepted() {
        let ground = Body::fixed(Pose::identity(), Shape::ground_plane(), Material::default());
        let system = System::new(vec![ground, cube_at(2.0)], SimulationConfig::default()).unwrap();
        assert_eq!(system.num_bodies(), 2);
        assert_eq!(system.size_pos(), 14);
        assert_eq!(system.size_vel(), 12);
        assert_eq!(system.body(BodyId::new(0)).unwrap().mass_properties(), &MassProperties::immovable());
    }

    #[test]
    fn test_state_round_trip() {
        let mut system = stack(2);
        let id = BodyId::new(2);
        system
            .body_mut(id)
            .unwrap()
            .set_twist(Twist::new(Vector3::new(1.0, 2.0, 3.0), Vector3::new(0.1, 0.2, 0.3)));

        let mut pos = vec![0.0; system.size_pos()];
        let mut vel = vec![0.0; system.size_vel()];
        system.get_state_pos(&mut pos, id).unwrap();
        system.get_state_vel(&mut vel, id).unwrap();

        assert_eq!(&pos[14..21], &[0.0, 0.0, system.body(id).unwrap().position().z, 1.0, 0.0, 0.0, 0.0]);
        assert_eq!(&vel[12..18], &[1.0, 2.0, 3.0, 0.1, 0.2, 0.3]);

        pos[16] = 7.0;
        vel[14] = -1.0;
        system.set_state_pos(&pos, id).unwrap();
        system.set_state_vel(&vel, id).unwrap();
        let body = system.body(id).unwrap();
        assert_eq!(body.position().z, 7.0);
        assert_eq!(body.linear_velocity().z, -1.0);
        assert_relative_eq!(body.linear_momentum().z, -1.0);
    }

    #[test]
    fn test_state_errors() {
        let mut system = stack(1);
        let mut short = vec![0.0; 3];
        assert!(matches!(
            system.get_state_pos(&mut short, BodyId::new(0)),
            Err(SimError::InvalidBodyId(0))
        ));
        let mut pos = vec![0.0; system.size_pos()];
        assert!(system.get_state_pos(&mut pos, BodyId::new(5)).is_err());

        // All-zero quaternion
        let err = system.set_state_pos(&[0.0; 14], BodyId::new(1)).unwrap_err();
        assert!(err.is_diverged());
    }

    #[test]
    fn test_snapshot_restore() {
        let mut system = stack(1);
        let snapshot = StateSnapshot::capture(&system);
        let id = BodyId::new(1);

        system.add_gravity();
        for _ in 0..10 {
            SemiImplicitEuler.integrate_vel(&mut system, 0.01, id);
            SemiImplicitEuler.integrate_pos(&mut system, 0.01, id);
        }
        assert!(system.body(id).unwrap().position().z < 0.5);

        snapshot.restore(&mut system).unwrap();
        assert_eq!(StateSnapshot::capture(&system), snapshot);
        assert_eq!(snapshot.pose(id).unwrap(), *system.body(id).unwrap().pose());
    }

    #[test]
    fn test_gravity_skips_static() {
        let mut system = stack(1);
        system.add_gravity();
        assert_eq!(system.bodies()[0].force(), Vector3::zeros());
        assert_relative_eq!(system.bodies()[1].force().z, -9.81);
        system.zero_forces();
        assert_eq!(system.bodies()[1].force(), Vector3::zeros());
    }

    #[test]
    fn test_tarjan_orders_vertical_chain() {
        let mut system = stack(4);
        let mut rng = StdRng::seed_from_u64(7);
        system.shuffle_order(&mut rng);

        system.add_gravity();
        let ordering = system.build_contact_graph(&SemiImplicitEuler, true);

        // Floor first, then each cube above the one it rests on
        assert_eq!(ordering.order, (0..5).map(BodyId::new).collect::<Vec<_>>());
        assert_eq!(ordering.component_count, 5);
        assert_eq!(system.processing_order()[0], BodyId::new(0));
        assert_eq!(system.contact_count(), 4);

        let heights: Vec<f64> = system.ordered_bodies().map(|b| b.position().z).collect();
        assert!(heights.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_contact_normals_point_to_support() {
        let mut system = stack(1);
        system.add_gravity();
        system.build_contact_graph(&SemiImplicitEuler, true);

        let contacts = system.bodies()[1].contacts();
        assert_eq!(contacts.len(), 1);
        assert_eq!(contacts[0].other, BodyId::new(0));
        assert_relative_eq!(contacts[0].normal, -Vector3::z(), epsilon = 1e-9);
        // Building the graph leaves the body where it was
        assert_eq!(system.bodies()[1].position().z, 0.5 + 1e-5);
        assert!(system.bodies()[0].contacts().is_empty());
    }

    #[test]
    fn test_contact_pass_stops_resting_box() {
        let mut system = stack(1);
        let id = BodyId::new(1);
        system.add_gravity();
        system.build_contact_graph(&SemiImplicitEuler, true);
        let dt = system.timestep();
        SemiImplicitEuler.integrate_vel(&mut system, dt, id);
        assert!(system.body(id).unwrap().linear_velocity().z < 0.0);

        assert!(system.contact_detect(0, false));
        assert_relative_eq!(system.body(id).unwrap().linear_velocity().z, 0.0, epsilon = 1e-12);
        assert!(!system.contact_detect(1, false));
    }

    #[test]
    fn test_shock_pass_freezes_supports() {
        let mut system = stack(2);
        system.add_gravity();
        system.build_contact_graph(&SemiImplicitEuler, true);
        let dt = system.timestep();
        for index in 0..system.num_bodies() {
            SemiImplicitEuler.integrate_vel(&mut system, dt, BodyId::new(index));
        }

        assert!(system.contact_detect(0, true));
        // The lower box is resolved against the floor, then frozen; the upper
        // box is stopped against it without pushing it down again.
        let lower = system.bodies()[1].linear_velocity().z;
        let upper = system.bodies()[2].linear_velocity().z;
        assert_relative_eq!(lower, 0.0, epsilon = 1e-12);
        assert_relative_eq!(upper, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_collision_updates_snapshot_only() {
        let mut system = stack(1);
        let id = BodyId::new(1);
        system
            .body_mut(id)
            .unwrap()
            .set_twist(Twist::linear(Vector3::new(0.0, 0.0, -2.0)));
        let mut snapshot = StateSnapshot::capture(&system);

        // Predict the box into the floor
        SemiImplicitEuler.integrate_pos(&mut system, 0.01, id);
        assert!(system.collision_detect(&mut snapshot));

        // Restitution is the smaller of 0.4 and 0.3
        let after = snapshot.twist(id).unwrap();
        assert_relative_eq!(after.linear.z, 0.6, epsilon = 1e-9);
        assert_eq!(system.body(id).unwrap().linear_velocity().z, -2.0);
    }

    #[test]
    fn test_reset_restores_construction_state() {
        let mut system = stack(2);
        let initial = StateSnapshot::capture(&system);
        system
            .body_mut(BodyId::new(2))
            .unwrap()
            .set_twist(Twist::linear(Vector3::new(1.0, 0.0, 0.0)));
        SemiImplicitEuler.integrate_pos(&mut system, 0.5, BodyId::new(2));
        system.shuffle_order(&mut StdRng::seed_from_u64(3));
        system.advance_time(0.5);

        system.reset();
        assert_eq!(StateSnapshot::capture(&system), initial);
        assert_eq!(system.time(), 0.0);
        assert_eq!(system.frame_count(), 0);
        assert_eq!(system.processing_order(), &[BodyId::new(0), BodyId::new(1), BodyId::new(2)]);
    }

    #[test]
    fn test_diagnostics() {
        let mut system = stack(2);
        assert_eq!(system.total_kinetic_energy(), 0.0);
        system
            .body_mut(BodyId::new(1))
            .unwrap()
            .set_twist(Twist::linear(Vector3::new(2.0, 0.0, 0.0)));
        assert_relative_eq!(system.total_kinetic_energy(), 2.0);
        assert_relative_eq!(system.total_linear_momentum().x, 2.0);
        let com = system.center_of_mass().unwrap();
        assert_relative_eq!(com.z, (0.5 + 1e-5 + 1.50002) / 2.0, epsilon = 1e-12);
        assert!(system.validate().is_ok());

        system
            .body_mut(BodyId::new(1))
            .unwrap()
            .set_twist(Twist::linear(Vector3::new(f64::NAN, 0.0, 0.0)));
        assert!(system.validate().unwrap_err().is_diverged());
    }
}
