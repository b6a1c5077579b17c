//! Exact intersection tests between pairs of shapes.
//!
//! Every test returns a [`ContactManifold`] whose normal points from the
//! first shape toward the second. Touching without overlap is not an
//! intersection. Degenerate configurations (coincident centers, zero-length
//! normals) report no contact rather than an arbitrary normal.

use nalgebra::{Matrix3, Point3, Vector3};
use stacksim_types::{ContactManifold, Pose};

use crate::shape::Shape;

/// Threshold for rejecting near-zero lengths.
const GEOM_EPSILON: f64 = 1e-10;

/// Slack used when deciding whether a vertex lies inside a box.
const INSIDE_TOLERANCE: f64 = 1e-9;

/// Intersect two posed shapes.
///
/// Dispatches on the pair of variants; reversed pairs reuse the forward test
/// and flip the result.
#[must_use]
pub fn intersect(
    shape_a: &Shape,
    pose_a: &Pose,
    shape_b: &Shape,
    pose_b: &Pose,
) -> Option<ContactManifold> {
    match (shape_a, shape_b) {
        (Shape::Cuboid { half_extents: he_a }, Shape::Cuboid { half_extents: he_b }) => {
            box_box(pose_a, he_a, pose_b, he_b)
        }

        (Shape::Cuboid { half_extents }, Shape::Sphere { radius }) => {
            box_sphere(pose_a, half_extents, &pose_b.position, *radius)
        }
        (Shape::Sphere { radius }, Shape::Cuboid { half_extents }) => {
            box_sphere(pose_b, half_extents, &pose_a.position, *radius).map(ContactManifold::flip)
        }

        (Shape::Sphere { radius: r_a }, Shape::Sphere { radius: r_b }) => {
            sphere_sphere(&pose_a.position, *r_a, &pose_b.position, *r_b)
        }

        (Shape::Plane { normal }, Shape::Cuboid { half_extents }) => {
            plane_box(pose_a, normal, pose_b, half_extents)
        }
        (Shape::Cuboid { half_extents }, Shape::Plane { normal }) => {
            plane_box(pose_b, normal, pose_a, half_extents).map(ContactManifold::flip)
        }

        (Shape::Plane { normal }, Shape::Sphere { radius }) => {
            plane_sphere(pose_a, normal, &pose_b.position, *radius)
        }
        (Shape::Sphere { radius }, Shape::Plane { normal }) => {
            plane_sphere(pose_b, normal, &pose_a.position, *radius).map(ContactManifold::flip)
        }

        (Shape::Plane { .. }, Shape::Plane { .. }) => None,
    }
}

/// Box-box intersection using the separating axis theorem.
///
/// Tests 15 axes: 3 face normals of each box and the 9 edge-edge cross
/// products. The contact normal is the axis of least penetration.
#[must_use]
pub fn box_box(
    pose_a: &Pose,
    half_a: &Vector3<f64>,
    pose_b: &Pose,
    half_b: &Vector3<f64>,
) -> Option<ContactManifold> {
    let rot_a = pose_a.rotation.to_rotation_matrix().into_inner();
    let rot_b = pose_b.rotation.to_rotation_matrix().into_inner();
    let axes_a = columns(&rot_a);
    let axes_b = columns(&rot_b);

    let center_diff = pose_b.position - pose_a.position;

    let mut min_pen = f64::MAX;
    let mut best_axis = Vector3::x();

    for axis in axes_a.iter().chain(axes_b.iter()) {
        let pen = test_sat_axis(axis, &center_diff, &axes_a, half_a, &axes_b, half_b);
        if pen <= 0.0 {
            return None;
        }
        if pen < min_pen {
            min_pen = pen;
            best_axis = *axis;
        }
    }

    for edge_a in &axes_a {
        for edge_b in &axes_b {
            let axis = edge_a.cross(edge_b);
            let len = axis.norm();
            if len < GEOM_EPSILON {
                continue; // Parallel edges
            }
            let axis = axis / len;

            let pen = test_sat_axis(&axis, &center_diff, &axes_a, half_a, &axes_b, half_b);
            if pen <= 0.0 {
                return None;
            }
            // Edge axes only when clearly better than a face axis
            if pen < min_pen * 0.95 {
                min_pen = pen;
                best_axis = axis;
            }
        }
    }

    if center_diff.norm() < GEOM_EPSILON {
        return None; // Coincident centers: no meaningful direction
    }
    if best_axis.dot(&center_diff) < 0.0 {
        best_axis = -best_axis;
    }

    let point = overlap_centroid(pose_a, half_a, pose_b, half_b).unwrap_or_else(|| {
        let on_a = box_support(pose_a, &rot_a, half_a, &best_axis);
        let on_b = box_support(pose_b, &rot_b, half_b, &-best_axis);
        Point3::from((on_a.coords + on_b.coords) * 0.5)
    });

    Some(ContactManifold::new(point, best_axis, min_pen))
}

/// Penetration along one axis (negative or zero means separated).
#[inline]
fn test_sat_axis(
    axis: &Vector3<f64>,
    center_diff: &Vector3<f64>,
    axes_a: &[Vector3<f64>; 3],
    half_a: &Vector3<f64>,
    axes_b: &[Vector3<f64>; 3],
    half_b: &Vector3<f64>,
) -> f64 {
    let r_a = project_extent(axis, axes_a, half_a);
    let r_b = project_extent(axis, axes_b, half_b);
    let dist = axis.dot(center_diff).abs();
    r_a + r_b - dist
}

#[inline]
fn project_extent(axis: &Vector3<f64>, axes: &[Vector3<f64>; 3], half: &Vector3<f64>) -> f64 {
    half.x * axis.dot(&axes[0]).abs()
        + half.y * axis.dot(&axes[1]).abs()
        + half.z * axis.dot(&axes[2]).abs()
}

fn columns(m: &Matrix3<f64>) -> [Vector3<f64>; 3] {
    [
        m.column(0).into_owned(),
        m.column(1).into_owned(),
        m.column(2).into_owned(),
    ]
}

fn box_support(
    pose: &Pose,
    rot: &Matrix3<f64>,
    half: &Vector3<f64>,
    dir: &Vector3<f64>,
) -> Point3<f64> {
    let local = rot.transpose() * dir;
    let corner = Vector3::new(
        half.x.copysign(local.x),
        half.y.copysign(local.y),
        half.z.copysign(local.z),
    );
    pose.position + rot * corner
}

/// Centroid of every vertex of either box lying inside the other.
fn overlap_centroid(
    pose_a: &Pose,
    half_a: &Vector3<f64>,
    pose_b: &Pose,
    half_b: &Vector3<f64>,
) -> Option<Point3<f64>> {
    let mut sum = Vector3::zeros();
    let mut count = 0usize;

    let mut collect = |owner: &Pose, owner_half: &Vector3<f64>, host: &Pose, host_half: &Vector3<f64>| {
        for vertex in box_corners(owner, owner_half) {
            if point_in_box(host, host_half, &vertex) {
                sum += vertex.coords;
                count += 1;
            }
        }
    };
    collect(pose_a, half_a, pose_b, half_b);
    collect(pose_b, half_b, pose_a, half_a);

    if count == 0 {
        return None;
    }
    #[allow(clippy::cast_precision_loss)]
    let n = count as f64;
    Some(Point3::from(sum / n))
}

/// World-space corners of a posed box.
pub(crate) fn box_corners(pose: &Pose, half: &Vector3<f64>) -> [Point3<f64>; 8] {
    let mut out = [Point3::origin(); 8];
    for (i, v) in out.iter_mut().enumerate() {
        let local = Point3::new(
            if i & 1 == 0 { -half.x } else { half.x },
            if i & 2 == 0 { -half.y } else { half.y },
            if i & 4 == 0 { -half.z } else { half.z },
        );
        *v = pose.transform_point(&local);
    }
    out
}

fn point_in_box(pose: &Pose, half: &Vector3<f64>, point: &Point3<f64>) -> bool {
    let local = pose.inverse_transform_point(point);
    local.x.abs() <= half.x + INSIDE_TOLERANCE
        && local.y.abs() <= half.y + INSIDE_TOLERANCE
        && local.z.abs() <= half.z + INSIDE_TOLERANCE
}

/// Box-sphere intersection. Normal points from the box toward the sphere.
#[must_use]
pub fn box_sphere(
    box_pose: &Pose,
    half: &Vector3<f64>,
    center: &Point3<f64>,
    radius: f64,
) -> Option<ContactManifold> {
    let local = box_pose.inverse_transform_point(center);
    let closest = Point3::new(
        local.x.clamp(-half.x, half.x),
        local.y.clamp(-half.y, half.y),
        local.z.clamp(-half.z, half.z),
    );
    let diff = local - closest;
    let dist = diff.norm();

    if dist > GEOM_EPSILON {
        if dist >= radius {
            return None;
        }
        let normal = box_pose.transform_vector(&(diff / dist));
        return Some(ContactManifold::new(
            box_pose.transform_point(&closest),
            normal,
            radius - dist,
        ));
    }

    // Center inside the box: push out through the nearest face.
    let gaps = Vector3::new(
        half.x - local.x.abs(),
        half.y - local.y.abs(),
        half.z - local.z.abs(),
    );
    let axis = gaps.imin();
    let sign = if local[axis] < 0.0 { -1.0 } else { 1.0 };
    let mut local_normal = Vector3::zeros();
    local_normal[axis] = sign;
    let mut surface = local;
    surface[axis] = sign * half[axis];

    Some(ContactManifold::new(
        box_pose.transform_point(&surface),
        box_pose.transform_vector(&local_normal),
        gaps[axis] + radius,
    ))
}

/// Sphere-sphere intersection. Normal points from A toward B.
#[must_use]
pub fn sphere_sphere(
    center_a: &Point3<f64>,
    radius_a: f64,
    center_b: &Point3<f64>,
    radius_b: f64,
) -> Option<ContactManifold> {
    let diff = center_b - center_a;
    let dist = diff.norm();
    let depth = radius_a + radius_b - dist;
    if depth <= 0.0 || dist < GEOM_EPSILON {
        return None;
    }
    let normal = diff / dist;
    let point = center_a + normal * (radius_a - depth * 0.5);
    Some(ContactManifold::new(point, normal, depth))
}

/// World-space outward normal of a posed plane, `None` if degenerate.
fn plane_normal(plane_pose: &Pose, local_normal: &Vector3<f64>) -> Option<Vector3<f64>> {
    plane_pose
        .transform_vector(local_normal)
        .try_normalize(GEOM_EPSILON)
}

/// Plane-box intersection. Normal points from the plane toward the box.
///
/// The contact point is the centroid of the box vertices below the plane.
#[must_use]
pub fn plane_box(
    plane_pose: &Pose,
    local_normal: &Vector3<f64>,
    box_pose: &Pose,
    half: &Vector3<f64>,
) -> Option<ContactManifold> {
    let normal = plane_normal(plane_pose, local_normal)?;

    let mut deepest = 0.0_f64;
    let mut sum = Vector3::zeros();
    let mut count = 0usize;
    for vertex in box_corners(box_pose, half) {
        let signed = normal.dot(&(vertex - plane_pose.position));
        if signed < 0.0 {
            deepest = deepest.max(-signed);
            sum += vertex.coords;
            count += 1;
        }
    }

    if count == 0 {
        return None;
    }
    #[allow(clippy::cast_precision_loss)]
    let n = count as f64;
    Some(ContactManifold::new(Point3::from(sum / n), normal, deepest))
}

/// Plane-sphere intersection. Normal points from the plane toward the sphere.
#[must_use]
pub fn plane_sphere(
    plane_pose: &Pose,
    local_normal: &Vector3<f64>,
    center: &Point3<f64>,
    radius: f64,
) -> Option<ContactManifold> {
    let normal = plane_normal(plane_pose, local_normal)?;
    let distance = normal.dot(&(center - plane_pose.position));
    let depth = radius - distance;
    if depth <= 0.0 {
        return None;
    }
    Some(ContactManifold::new(center - normal * radius, normal, depth))
}
