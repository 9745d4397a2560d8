//! Spatial algebra utilities for 6D motion and force vectors.
//!
//! Every spatial quantity in this crate is expressed in world coordinates and
//! taken about the world origin. Motion vectors are `[ω; v_O]`, where `v_O` is
//! the velocity of the body-fixed point currently at the world origin. Force
//! vectors are `[τ_O; f]`, the moment about the world origin and the force.
//! Because every body shares the same frame, no spatial transforms are needed
//! when propagating quantities along the tree.

use nalgebra::{Matrix3, Matrix6, Point3, Vector3, Vector6};

/// 6D spatial vector: [angular (3), linear (3)].
pub type SpatialVector = Vector6<f64>;

/// Build a spatial vector from its angular and linear parts.
#[inline]
#[must_use]
pub fn spatial(angular: &Vector3<f64>, linear: &Vector3<f64>) -> SpatialVector {
    SpatialVector::new(
        angular.x, angular.y, angular.z, linear.x, linear.y, linear.z,
    )
}

/// Angular part of a spatial vector.
#[inline]
#[must_use]
pub fn angular_part(v: &SpatialVector) -> Vector3<f64> {
    Vector3::new(v[0], v[1], v[2])
}

/// Linear part of a spatial vector.
#[inline]
#[must_use]
pub fn linear_part(v: &SpatialVector) -> Vector3<f64> {
    Vector3::new(v[3], v[4], v[5])
}

/// Spatial cross product for motion vectors: v × s.
#[allow(clippy::inline_always)] // Hot path in both the ABA and the impulse response
#[inline(always)]
#[must_use]
pub fn spatial_cross_motion(v: &SpatialVector, s: &SpatialVector) -> SpatialVector {
    let w = angular_part(v);
    let v_lin = linear_part(v);
    let s_ang = angular_part(s);
    let s_lin = linear_part(s);

    spatial(&w.cross(&s_ang), &(w.cross(&s_lin) + v_lin.cross(&s_ang)))
}

/// Spatial cross product for force vectors: v ×* f.
#[allow(clippy::inline_always)] // Hot path in the ABA bias computation
#[inline(always)]
#[must_use]
pub fn spatial_cross_force(v: &SpatialVector, f: &SpatialVector) -> SpatialVector {
    let w = angular_part(v);
    let v_lin = linear_part(v);
    let f_ang = angular_part(f);
    let f_lin = linear_part(f);

    spatial(&(w.cross(&f_ang) + v_lin.cross(&f_lin)), &w.cross(&f_lin))
}

/// Skew-symmetric matrix `[a]×` such that `[a]× b = a × b`.
#[must_use]
pub fn skew(a: &Vector3<f64>) -> Matrix3<f64> {
    Matrix3::new(0.0, -a.z, a.y, a.z, 0.0, -a.x, -a.y, a.x, 0.0)
}

/// Spatial inertia of a body about the world origin.
///
/// - `mass`: body mass
/// - `com`: center of mass in world coordinates
/// - `inertia_com`: rotational inertia about the center of mass, world axes
///
/// ```text
/// I = [I_c + m*(c·c*1 - c⊗c),  m*[c]×  ]
///     [m*[c]×ᵀ,                m*1     ]
/// ```
#[must_use]
pub fn spatial_inertia(mass: f64, com: &Point3<f64>, inertia_com: &Matrix3<f64>) -> Matrix6<f64> {
    let c = com.coords;
    let c_skew = skew(&c);
    let rotational =
        inertia_com + mass * (Matrix3::identity() * c.dot(&c) - c * c.transpose());

    let mut inertia = Matrix6::zeros();
    inertia.fixed_view_mut::<3, 3>(0, 0).copy_from(&rotational);
    inertia
        .fixed_view_mut::<3, 3>(0, 3)
        .copy_from(&(c_skew * mass));
    inertia
        .fixed_view_mut::<3, 3>(3, 0)
        .copy_from(&(c_skew.transpose() * mass));
    inertia
        .fixed_view_mut::<3, 3>(3, 3)
        .copy_from(&(Matrix3::identity() * mass));
    inertia
}

/// Linear velocity of the body-fixed point `point` for a spatial motion vector.
#[inline]
#[must_use]
pub fn velocity_at_point(v: &SpatialVector, point: &Point3<f64>) -> Vector3<f64> {
    linear_part(v) + angular_part(v).cross(&point.coords)
}

/// Spatial motion vector of a frame moving with `angular` and with its origin
/// at `origin` moving at `linear`.
#[inline]
#[must_use]
pub fn motion_from_point_velocity(
    angular: &Vector3<f64>,
    linear: &Vector3<f64>,
    origin: &Point3<f64>,
) -> SpatialVector {
    spatial(angular, &(linear - angular.cross(&origin.coords)))
}

/// Spatial force of a pure `force` applied at `point` plus a free `moment`.
#[inline]
#[must_use]
pub fn force_at_point(
    moment: &Vector3<f64>,
    force: &Vector3<f64>,
    point: &Point3<f64>,
) -> SpatialVector {
    spatial(&(moment + point.coords.cross(force)), force)
}

/// Kinetic energy `0.5 vᵀ I v` of a body.
#[inline]
#[must_use]
pub fn kinetic_energy(inertia: &Matrix6<f64>, v: &SpatialVector) -> f64 {
    0.5 * v.dot(&(inertia * v))
}
