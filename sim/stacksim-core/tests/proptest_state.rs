//! Property-based tests for flattened state and snapshots.
//!
//! Run with: cargo test -p stacksim-core -- proptest

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]

use nalgebra::{Point3, Vector3};
use proptest::prelude::*;
use stacksim_core::{
    Body, BodyId, Material, Pose, Shape, SimulationConfig, StateSnapshot, Stepper, System, Twist,
    POS_STATE_SIZE, VEL_STATE_SIZE,
};

// =============================================================================
// Strategies
// =============================================================================

fn arb_vector(range: f64) -> impl Strategy<Value = Vector3<f64>> {
    prop::array::uniform3(-range..range).prop_map(|[x, y, z]| Vector3::new(x, y, z))
}

fn arb_pose() -> impl Strategy<Value = Pose> {
    (arb_vector(50.0), arb_vector(1.0), -3.0..3.0f64).prop_map(|(p, axis, angle)| {
        Pose::from_axis_angle(Point3::from(p), axis, angle)
    })
}

fn arb_twist() -> impl Strategy<Value = Twist> {
    (arb_vector(10.0), arb_vector(5.0)).prop_map(|(v, w)| Twist::new(v, w))
}

fn arb_body() -> impl Strategy<Value = Body> {
    (arb_pose(), arb_twist(), 0.1..10.0f64, prop::bool::ANY).prop_map(
        |(pose, twist, mass, sphere)| {
            let shape = if sphere {
                Shape::sphere(0.5)
            } else {
                Shape::cube(1.0)
            };
            Body::dynamic(pose, shape, mass, Material::default()).with_velocity(twist)
        },
    )
}

fn arb_system() -> impl Strategy<Value = System> {
    prop::collection::vec(arb_body(), 1..8)
        .prop_map(|bodies| System::new(bodies, SimulationConfig::default()).unwrap())
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #[test]
    fn proptest_state_buffers_round_trip(mut system in arb_system(), poses in prop::collection::vec((arb_pose(), arb_twist()), 8)) {
        let n = system.num_bodies();
        let mut pos = vec![0.0; system.size_pos()];
        let mut vel = vec![0.0; system.size_vel()];
        for (index, (pose, twist)) in poses.iter().take(n).enumerate() {
            let q = pose.rotation.into_inner().coords;
            pos[index * POS_STATE_SIZE..(index + 1) * POS_STATE_SIZE].copy_from_slice(&[
                pose.position.x, pose.position.y, pose.position.z, q[3], q[0], q[1], q[2],
            ]);
            vel[index * VEL_STATE_SIZE..(index + 1) * VEL_STATE_SIZE]
                .copy_from_slice(&[twist.linear.x, twist.linear.y, twist.linear.z,
                    twist.angular.x, twist.angular.y, twist.angular.z]);
        }

        for index in 0..n {
            system.set_state_pos(&pos, BodyId::new(index)).unwrap();
            system.set_state_vel(&vel, BodyId::new(index)).unwrap();
        }

        let mut pos_out = vec![0.0; system.size_pos()];
        let mut vel_out = vec![0.0; system.size_vel()];
        for index in 0..n {
            system.get_state_pos(&mut pos_out, BodyId::new(index)).unwrap();
            system.get_state_vel(&mut vel_out, BodyId::new(index)).unwrap();
        }
        prop_assert_eq!(pos_out, pos);
        prop_assert_eq!(vel_out, vel);
    }

    #[test]
    fn proptest_snapshot_restore_is_exact(mut system in arb_system(), frames in 1u64..5) {
        let snapshot = StateSnapshot::capture(&system);

        Stepper::new().run(&mut system, frames).unwrap();
        snapshot.restore(&mut system).unwrap();

        prop_assert_eq!(StateSnapshot::capture(&system), snapshot);
    }

    #[test]
    fn proptest_restored_orientation_is_unit(system in arb_system()) {
        let snapshot = StateSnapshot::capture(&system);
        for index in 0..system.num_bodies() {
            let pose = snapshot.pose(BodyId::new(index)).unwrap();
            let norm = pose.rotation.into_inner().norm();
            prop_assert!((norm - 1.0).abs() < 1e-12);
        }
    }
}
