//! Analytic narrow phase between primitive shapes.
//!
//! Every test returns closest-point pairs with a signed distance (negative
//! when the shapes overlap) and the unit normal pointing from shape B toward
//! shape A. Pairs without an analytic test return nothing.

use nalgebra::{Point3, Vector3};
use smallvec::SmallVec;
use sim_types::Pose;

use super::shape::{CollisionShape, box_corner};

/// Closest-point pair between two shapes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactPoint {
    /// Point on the surface of A.
    pub point_on_a: Point3<f64>,
    /// Point on the surface of B.
    pub point_on_b: Point3<f64>,
    /// Unit normal from B toward A.
    pub normal: Vector3<f64>,
    /// Surface distance, negative when penetrating.
    pub signed_distance: f64,
}

impl ContactPoint {
    fn flipped(self) -> Self {
        Self {
            point_on_a: self.point_on_b,
            point_on_b: self.point_on_a,
            normal: -self.normal,
            signed_distance: self.signed_distance,
        }
    }
}

/// Contact points of a shape pair, up to one per box corner.
pub type ContactPoints = SmallVec<[ContactPoint; 8]>;

/// Closest points between `a` at `pose_a` and `b` at `pose_b`.
#[must_use]
pub fn collide(
    a: &CollisionShape,
    pose_a: &Pose,
    b: &CollisionShape,
    pose_b: &Pose,
) -> ContactPoints {
    use CollisionShape::{Box, Capsule, HalfSpace, Sphere};

    let mut points = ContactPoints::new();
    match (a, b) {
        (Sphere { radius: ra }, Sphere { radius: rb }) => {
            points.push(sphere_sphere(&pose_a.position, *ra, &pose_b.position, *rb));
        }
        (Sphere { radius }, HalfSpace) => {
            points.push(sphere_half_space(&pose_a.position, *radius, pose_b));
        }
        (Sphere { radius }, Box { half_extents }) => {
            points.push(sphere_box(&pose_a.position, *radius, half_extents, pose_b));
        }
        (Sphere { radius }, Capsule { half_length, radius: rc }) => {
            let (p0, p1) = capsule_segment(pose_b, *half_length);
            let closest = closest_point_on_segment(&pose_a.position, &p0, &p1);
            points.push(sphere_sphere(&pose_a.position, *radius, &closest, *rc));
        }
        (Capsule { half_length: la, radius: ra }, Capsule { half_length: lb, radius: rb }) => {
            let (a0, a1) = capsule_segment(pose_a, *la);
            let (b0, b1) = capsule_segment(pose_b, *lb);
            let (ca, cb) = closest_points_between_segments(&a0, &a1, &b0, &b1);
            points.push(sphere_sphere(&ca, *ra, &cb, *rb));
        }
        (Capsule { half_length, radius }, HalfSpace) => {
            let (p0, p1) = capsule_segment(pose_a, *half_length);
            points.push(sphere_half_space(&p0, *radius, pose_b));
            points.push(sphere_half_space(&p1, *radius, pose_b));
        }
        (Box { half_extents }, HalfSpace) => {
            for k in 0..8 {
                let corner = pose_a.transform_point(&Point3::from(box_corner(half_extents, k)));
                points.push(sphere_half_space(&corner, 0.0, pose_b));
            }
        }
        (HalfSpace | Box { .. } | Capsule { .. }, Sphere { .. })
        | (HalfSpace, Box { .. } | Capsule { .. }) => {
            points = collide(b, pose_b, a, pose_a)
                .into_iter()
                .map(ContactPoint::flipped)
                .collect();
        }
        _ => {}
    }
    points
}

fn sphere_sphere(
    center_a: &Point3<f64>,
    radius_a: f64,
    center_b: &Point3<f64>,
    radius_b: f64,
) -> ContactPoint {
    let delta = center_a - center_b;
    let distance = delta.norm();
    let normal = if distance > 1e-12 {
        delta / distance
    } else {
        Vector3::z()
    };
    ContactPoint {
        point_on_a: center_a - normal * radius_a,
        point_on_b: center_b + normal * radius_b,
        normal,
        signed_distance: distance - radius_a - radius_b,
    }
}

fn sphere_half_space(center: &Point3<f64>, radius: f64, plane: &Pose) -> ContactPoint {
    let normal = plane.rotation * Vector3::z();
    let height = normal.dot(&(center - plane.position));
    ContactPoint {
        point_on_a: center - normal * radius,
        point_on_b: center - normal * height,
        normal,
        signed_distance: height - radius,
    }
}

fn sphere_box(
    center: &Point3<f64>,
    radius: f64,
    half_extents: &Vector3<f64>,
    box_pose: &Pose,
) -> ContactPoint {
    let local = box_pose.inverse_transform_point(center);
    let clamped = Point3::new(
        local.x.clamp(-half_extents.x, half_extents.x),
        local.y.clamp(-half_extents.y, half_extents.y),
        local.z.clamp(-half_extents.z, half_extents.z),
    );

    if clamped != local {
        let on_box = box_pose.transform_point(&clamped);
        let delta = center - on_box;
        let distance = delta.norm();
        let normal = delta / distance;
        return ContactPoint {
            point_on_a: center - normal * radius,
            point_on_b: on_box,
            normal,
            signed_distance: distance - radius,
        };
    }

    // Center inside the box: push out through the nearest face.
    let mut axis = 0;
    let mut depth = f64::INFINITY;
    for k in 0..3 {
        let d = half_extents[k] - local[k].abs();
        if d < depth {
            depth = d;
            axis = k;
        }
    }
    let sign = if local[axis] >= 0.0 { 1.0 } else { -1.0 };
    let mut local_normal = Vector3::zeros();
    local_normal[axis] = sign;
    let mut on_face = local;
    on_face[axis] = sign * half_extents[axis];

    let normal = box_pose.rotation * local_normal;
    ContactPoint {
        point_on_a: center - normal * radius,
        point_on_b: box_pose.transform_point(&on_face),
        normal,
        signed_distance: -depth - radius,
    }
}

fn capsule_segment(pose: &Pose, half_length: f64) -> (Point3<f64>, Point3<f64>) {
    let axis = pose.rotation * Vector3::new(0.0, 0.0, half_length);
    (pose.position - axis, pose.position + axis)
}

fn closest_point_on_segment(p: &Point3<f64>, a: &Point3<f64>, b: &Point3<f64>) -> Point3<f64> {
    let ab = b - a;
    let length_squared = ab.norm_squared();
    if length_squared < 1e-24 {
        return *a;
    }
    let t = ((p - a).dot(&ab) / length_squared).clamp(0.0, 1.0);
    a + ab * t
}

/// Closest points between segments `p0 p1` and `q0 q1`.
fn closest_points_between_segments(
    p0: &Point3<f64>,
    p1: &Point3<f64>,
    q0: &Point3<f64>,
    q1: &Point3<f64>,
) -> (Point3<f64>, Point3<f64>) {
    let d1 = p1 - p0;
    let d2 = q1 - q0;
    let r = p0 - q0;
    let a = d1.norm_squared();
    let e = d2.norm_squared();
    let f = d2.dot(&r);

    if a < 1e-24 && e < 1e-24 {
        return (*p0, *q0);
    }
    let (s, t) = if a < 1e-24 {
        (0.0, (f / e).clamp(0.0, 1.0))
    } else {
        let c = d1.dot(&r);
        if e < 1e-24 {
            ((-c / a).clamp(0.0, 1.0), 0.0)
        } else {
            let b = d1.dot(&d2);
            let denom = a * e - b * b;
            let mut s = if denom > 1e-24 {
                ((b * f - c * e) / denom).clamp(0.0, 1.0)
            } else {
                0.0
            };
            let mut t = (b * s + f) / e;
            if t < 0.0 {
                t = 0.0;
                s = (-c / a).clamp(0.0, 1.0);
            } else if t > 1.0 {
                t = 1.0;
                s = ((b - c) / a).clamp(0.0, 1.0);
            }
            (s, t)
        }
    };
    (p0 + d1 * s, q0 + d2 * t)
}
