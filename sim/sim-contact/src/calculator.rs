//! Impulse resolution of a single contact.
//!
//! The contact is solved in a local frame whose Z axis is the contact normal
//! (pointing from B toward A). The relative velocity at the contact responds
//! linearly to an impulse `λ` applied on A (and `-λ` on B):
//!
//! ```text
//! v = v0 + W · λ
//! ```
//!
//! `W` is the inverse apparent inertia, built column by column from the robots'
//! responses to unit impulses. The impulse is then chosen among three regimes:
//!
//! - separating: `λ = 0` when the contact is not closing,
//! - sticking: `λ = W⁻¹ (v_target - v0)` when it lies inside the friction cone,
//! - slipping: `λ = λz · (μ·f, 1)` with `f` opposing the post-impulse slip.

use nalgebra::{DMatrix, DVector, Matrix3, Point3, Vector2, Vector3};
use smallvec::{SmallVec, smallvec};
use sim_core::collision::{CollisionResult, ContactBody};
use sim_core::constraint::{
    ConstraintTarget, DeltaTwistRegistry, ImpulseBasedConstraintCalculator, TwistCoupling,
};
use sim_core::dynamics::spatial::{force_at_point, velocity_at_point};
use sim_core::{ImpulseBasedRobot, ImpulseResponse, RigidBodyImpulseRegistry, SpatialVector};
use sim_types::{BodyId, RobotId};

use crate::friction::FrictionCone;
use crate::params::ContactParameters;

/// Default tolerance on the relative normal velocity.
pub const DEFAULT_CONTACT_TOLERANCE: f64 = 1.0e-6;

const MAX_SLIP_ITERATIONS: usize = 32;

/// Outcome of solving one contact in isolation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactSolution {
    /// Contact-frame impulse on A.
    pub impulse: Vector3<f64>,
    /// Whether the friction impulse lies on the cone boundary.
    pub slipping: bool,
}

impl ContactSolution {
    fn separating() -> Self {
        Self {
            impulse: Vector3::zeros(),
            slipping: false,
        }
    }
}

/// Solve one contact given its inverse apparent inertia and the relative
/// velocity `velocity` it would have without its own impulse.
///
/// The returned impulse always lies inside `cone`.
#[must_use]
pub fn solve_contact(
    inverse_inertia: &Matrix3<f64>,
    velocity: &Vector3<f64>,
    target_normal_velocity: f64,
    cone: &FrictionCone,
    tolerance: f64,
) -> ContactSolution {
    if velocity.z >= target_normal_velocity - tolerance {
        return ContactSolution::separating();
    }

    let desired = Vector3::new(0.0, 0.0, target_normal_velocity) - velocity;
    let eps = 1e-9 * inverse_inertia.norm().max(f64::MIN_POSITIVE);
    let stick = inverse_inertia
        .pseudo_inverse(eps)
        .map_or_else(|_| Vector3::zeros(), |inverse| inverse * desired);

    let reachable = (inverse_inertia * stick - desired).norm() <= 1e-8 * (1.0 + desired.norm());
    if reachable && stick.z > 0.0 && cone.contains(&stick) {
        return ContactSolution {
            impulse: stick,
            slipping: false,
        };
    }

    // Friction direction, opposing the slip.
    let mut friction = if stick.xy().norm() > 1e-12 {
        stick.xy().normalize()
    } else if velocity.xy().norm() > 1e-12 {
        -velocity.xy().normalize()
    } else {
        Vector2::zeros()
    };
    if cone.mu <= 0.0 {
        friction = Vector2::zeros();
    }

    let mut impulse = Vector3::zeros();
    for _ in 0..MAX_SLIP_ITERATIONS {
        let direction = Vector3::new(cone.mu * friction.x, cone.mu * friction.y, 1.0);
        let denominator = (inverse_inertia * direction).z;
        if denominator <= 1e-12 {
            break;
        }
        let normal = (target_normal_velocity - velocity.z) / denominator;
        if normal <= 0.0 {
            break;
        }
        impulse = direction * normal;

        if cone.mu <= 0.0 {
            break;
        }
        let slip = (velocity + inverse_inertia * impulse).xy();
        let speed = slip.norm();
        if speed < 1e-12 {
            break;
        }
        let next = -slip / speed;
        let blended = friction + next;
        let next = if blended.norm() > 1e-12 {
            blended.normalize()
        } else {
            next
        };
        let change = (next - friction).norm();
        friction = next;
        if change < 1e-10 {
            break;
        }
    }

    if impulse.z <= 0.0 && stick.z > 0.0 {
        impulse = stick;
    }
    ContactSolution {
        impulse: cone.project_impulse(&impulse),
        slipping: cone.mu > 0.0,
    }
}

/// Orthonormal contact frame; rows are the two tangents and the normal.
fn contact_frame(normal: &Vector3<f64>) -> Matrix3<f64> {
    let n = normal.normalize();
    let helper = if n.x.abs() < 0.9 {
        Vector3::x()
    } else {
        Vector3::y()
    };
    let t1 = helper.cross(&n).normalize();
    let t2 = n.cross(&t1);
    Matrix3::from_rows(&[t1.transpose(), t2.transpose(), n.transpose()])
}

/// Resolves one contact between a robot body and either another body (of the
/// same or another robot) or the static environment.
#[derive(Debug, Clone)]
pub struct SingleContactImpulseCalculator {
    parameters: ContactParameters,
    tolerance: f64,
    collision: Option<CollisionResult>,
    frame: Matrix3<f64>,
    robot_a: RobotId,
    body_a: BodyId,
    body_b: Option<ContactBody>,
    point_a: Point3<f64>,
    point_b: Point3<f64>,

    valid: bool,
    free_velocity_a: SpatialVector,
    free_velocity_b: SpatialVector,
    target_normal_velocity: f64,

    owner: usize,
    slot_a: usize,
    slot_b: Option<usize>,

    inverse_inertia: Matrix3<f64>,
    coupling: TwistCoupling,
    joint_response_a: DMatrix<f64>,
    joint_response_b: DMatrix<f64>,

    impulse: Vector3<f64>,
    published_impulse: Vector3<f64>,
    velocity_solution: Vector3<f64>,
    impulse_update: f64,
    velocity_update: f64,
    first_update: bool,
    closing: bool,
    slipping: bool,
    active: bool,

    joint_velocity_change_a: DVector<f64>,
    joint_velocity_change_b: DVector<f64>,
    body_impulse_a: SpatialVector,
    body_impulse_b: SpatialVector,
}

impl Default for SingleContactImpulseCalculator {
    fn default() -> Self {
        Self::new(ContactParameters::default())
    }
}

impl SingleContactImpulseCalculator {
    /// Calculator with no collision assigned yet.
    #[must_use]
    pub fn new(parameters: ContactParameters) -> Self {
        Self {
            parameters,
            tolerance: DEFAULT_CONTACT_TOLERANCE,
            collision: None,
            frame: Matrix3::identity(),
            robot_a: RobotId(0),
            body_a: BodyId::ROOT,
            body_b: None,
            point_a: Point3::origin(),
            point_b: Point3::origin(),
            valid: false,
            free_velocity_a: SpatialVector::zeros(),
            free_velocity_b: SpatialVector::zeros(),
            target_normal_velocity: 0.0,
            owner: 0,
            slot_a: 0,
            slot_b: None,
            inverse_inertia: Matrix3::zeros(),
            coupling: TwistCoupling::default(),
            joint_response_a: DMatrix::zeros(0, 3),
            joint_response_b: DMatrix::zeros(0, 3),
            impulse: Vector3::zeros(),
            published_impulse: Vector3::zeros(),
            velocity_solution: Vector3::zeros(),
            impulse_update: 0.0,
            velocity_update: 0.0,
            first_update: true,
            closing: false,
            slipping: false,
            active: false,
            joint_velocity_change_a: DVector::zeros(0),
            joint_velocity_change_b: DVector::zeros(0),
            body_impulse_a: SpatialVector::zeros(),
            body_impulse_b: SpatialVector::zeros(),
        }
    }

    /// Assign the contact to resolve. Clears every result of a previous tick.
    pub fn set_collision(&mut self, collision: CollisionResult) {
        self.frame = contact_frame(&collision.normal);
        self.robot_a = collision.body_a.robot;
        self.body_a = collision.body_a.body;
        self.body_b = collision.body_b;
        self.point_a = collision.point_on_a;
        self.point_b = collision.point_on_b;
        self.collision = Some(collision);
        self.clear_results();
    }

    fn clear_results(&mut self) {
        self.valid = false;
        self.coupling.clear();
        self.impulse = Vector3::zeros();
        self.published_impulse = Vector3::zeros();
        self.velocity_solution = Vector3::zeros();
        self.impulse_update = 0.0;
        self.velocity_update = 0.0;
        self.first_update = true;
        self.closing = false;
        self.slipping = false;
        self.active = false;
        self.joint_velocity_change_a.fill(0.0);
        self.joint_velocity_change_b.fill(0.0);
        self.body_impulse_a = SpatialVector::zeros();
        self.body_impulse_b = SpatialVector::zeros();
    }

    /// Set the contact parameters.
    pub fn set_contact_parameters(&mut self, parameters: ContactParameters) {
        self.parameters = parameters;
    }

    /// Set the tolerance on the relative normal velocity.
    pub fn set_tolerance(&mut self, tolerance: f64) {
        self.tolerance = tolerance;
    }

    /// Contact parameters in use.
    #[must_use]
    pub fn contact_parameters(&self) -> &ContactParameters {
        &self.parameters
    }

    /// The contact being resolved.
    #[must_use]
    pub fn collision(&self) -> Option<&CollisionResult> {
        self.collision.as_ref()
    }

    /// World-to-contact rotation; rows are tangent, tangent, normal.
    #[must_use]
    pub fn contact_frame(&self) -> &Matrix3<f64> {
        &self.frame
    }

    /// Inverse apparent inertia at the contact, contact frame.
    #[must_use]
    pub fn inverse_apparent_inertia(&self) -> &Matrix3<f64> {
        &self.inverse_inertia
    }

    /// Current impulse on A, contact frame.
    #[must_use]
    pub fn impulse(&self) -> &Vector3<f64> {
        &self.impulse
    }

    /// Current impulse on A, world frame.
    #[must_use]
    pub fn impulse_world(&self) -> Vector3<f64> {
        self.frame.transpose() * self.impulse
    }

    /// Spatial impulse applied to body A by the finalized solution.
    #[must_use]
    pub fn impulse_a(&self) -> &SpatialVector {
        &self.body_impulse_a
    }

    /// Spatial impulse applied to body B by the finalized solution.
    #[must_use]
    pub fn impulse_b(&self) -> &SpatialVector {
        &self.body_impulse_b
    }

    /// Relative velocity at the contact after the current impulse, contact frame.
    #[must_use]
    pub fn velocity_solution(&self) -> &Vector3<f64> {
        &self.velocity_solution
    }

    /// Relative contact velocity without any impulse from this tick.
    #[must_use]
    pub fn free_velocity(&self) -> Vector3<f64> {
        self.relative_velocity(&SpatialVector::zeros(), &SpatialVector::zeros())
    }

    /// Whether the contact was approaching in the last update.
    #[must_use]
    pub fn is_contact_closing(&self) -> bool {
        self.closing
    }

    /// Whether the friction impulse saturated in the last update.
    #[must_use]
    pub fn is_contact_slipping(&self) -> bool {
        self.slipping
    }

    /// The bodies in contact.
    #[must_use]
    pub fn rigid_body_targets(&self) -> SmallVec<[ContactBody; 2]> {
        let mut targets = smallvec![ContactBody {
            robot: self.robot_a,
            body: self.body_a,
        }];
        targets.extend(self.body_b);
        targets
    }

    fn other_robot(&self) -> Option<ContactBody> {
        self.body_b.filter(|b| b.robot != self.robot_a)
    }

    fn relative_velocity(&self, delta_a: &SpatialVector, delta_b: &SpatialVector) -> Vector3<f64> {
        let velocity_a = velocity_at_point(&(self.free_velocity_a + delta_a), &self.point_a);
        let velocity_b = if self.body_b.is_some() {
            velocity_at_point(&(self.free_velocity_b + delta_b), &self.point_b)
        } else {
            Vector3::zeros()
        };
        self.frame * (velocity_a - velocity_b)
    }

    /// Relative contact velocity including the other calculators' impulses.
    fn current_velocity(&self, registry: &DeltaTwistRegistry) -> Vector3<f64> {
        let delta_a = registry.rigid_body_delta(self.slot_a);
        let delta_b = self
            .slot_b
            .map_or_else(SpatialVector::zeros, |slot| registry.rigid_body_delta(slot));
        self.relative_velocity(&delta_a, &delta_b)
    }

    fn body_impulses(&self, force: &Vector3<f64>) -> (SpatialVector, SpatialVector) {
        let zero = Vector3::zeros();
        (
            force_at_point(&zero, force, &self.point_a),
            -force_at_point(&zero, force, &self.point_b),
        )
    }

    fn solve(&mut self, alpha: f64, registry: &DeltaTwistRegistry) -> ContactSolution {
        let velocity = self.current_velocity(registry);
        self.closing = velocity.z < -self.tolerance;
        if !self.valid {
            return ContactSolution::separating();
        }

        let solution = solve_contact(
            &self.inverse_inertia,
            &velocity,
            self.target_normal_velocity,
            &FrictionCone::new(self.parameters.coefficient_of_friction),
            self.tolerance,
        );
        let impulse = if self.first_update {
            solution.impulse
        } else {
            solution.impulse * alpha + self.impulse * (1.0 - alpha)
        };
        self.first_update = false;

        let velocity_solution = velocity + self.inverse_inertia * impulse;
        self.impulse_update = (impulse - self.impulse).norm();
        self.velocity_update = (velocity_solution - self.velocity_solution).norm();
        self.impulse = impulse;
        self.velocity_solution = velocity_solution;
        self.slipping = solution.slipping && impulse.z > 0.0;
        self.active = impulse.z > 0.0;
        solution
    }
}

impl ImpulseBasedConstraintCalculator for SingleContactImpulseCalculator {
    fn initialize(&mut self, dt: f64, robots: &[ImpulseBasedRobot]) {
        self.clear_results();
        let Some(signed_distance) = self.collision.as_ref().map(|c| c.signed_distance) else {
            return;
        };
        let Some(robot_a) = robots.get(self.robot_a.0) else {
            return;
        };
        self.free_velocity_a = robot_a.predicted_body_velocity(self.body_a, dt);
        self.free_velocity_b = match self.body_b {
            Some(b) => match robots.get(b.robot.0) {
                Some(robot_b) => robot_b.predicted_body_velocity(b.body, dt),
                None => return,
            },
            None => SpatialVector::zeros(),
        };

        let velocity = self.free_velocity();
        self.target_normal_velocity =
            self.parameters
                .target_normal_velocity(velocity.z, signed_distance, dt);
        self.closing = velocity.z < -self.tolerance;
        self.velocity_solution = velocity;
        self.valid = true;
    }

    fn register_targets(&mut self, owner: usize, registry: &mut DeltaTwistRegistry) {
        self.owner = owner;
        self.slot_a = registry.register(owner, ConstraintTarget::RigidBody {
            robot: self.robot_a,
            body: self.body_a,
        });
        self.slot_b = self.body_b.map(|b| {
            registry.register(owner, ConstraintTarget::RigidBody {
                robot: b.robot,
                body: b.body,
            })
        });
    }

    fn update_inertia(&mut self, robots: &[ImpulseBasedRobot], registry: &DeltaTwistRegistry) {
        self.coupling.clear();
        self.inverse_inertia = Matrix3::zeros();
        if !self.valid {
            return;
        }
        let Some(robot_a) = robots.get(self.robot_a.0) else {
            self.valid = false;
            return;
        };
        let self_contact = self.body_b.filter(|b| b.robot == self.robot_a);
        let other = self.other_robot().and_then(|b| Some((b, robots.get(b.robot.0)?)));

        let mut response_a = ImpulseResponse::new(robot_a.robot());
        let mut response_b = other.map(|(_, robot)| ImpulseResponse::new(robot.robot()));
        self.joint_response_a = DMatrix::zeros(robot_a.robot().dof(), 3);
        self.joint_response_b =
            DMatrix::zeros(other.map_or(0, |(_, robot)| robot.robot().dof()), 3);

        for k in 0..3 {
            let direction: Vector3<f64> = self.frame.row(k).transpose();
            let (impulse_a, impulse_b) = self.body_impulses(&direction);

            match self_contact {
                Some(b) => robot_a.impulse_response(
                    &[(self.body_a, impulse_a), (b.body, impulse_b)],
                    &[],
                    &mut response_a,
                ),
                None => robot_a.impulse_response(&[(self.body_a, impulse_a)], &[], &mut response_a),
            }
            let delta_a = response_a.body_velocity_change(self.body_a);
            let delta_b = match (self_contact, other, response_b.as_mut()) {
                (Some(b), _, _) => response_a.body_velocity_change(b.body),
                (None, Some((b, robot_b)), Some(response)) => {
                    robot_b.impulse_response(&[(b.body, impulse_b)], &[], response);
                    response.body_velocity_change(b.body)
                }
                _ => SpatialVector::zeros(),
            };

            let column = self.relative_velocity(&delta_a, &delta_b) - self.free_velocity();
            self.inverse_inertia.set_column(k, &column);

            self.joint_response_a
                .set_column(k, response_a.joint_velocity_change());
            self.coupling
                .record(self.owner, registry, self.robot_a, &response_a, k, 3);
            if let (Some((b, _)), Some(response)) = (other, response_b.as_ref()) {
                self.joint_response_b
                    .set_column(k, response.joint_velocity_change());
                self.coupling.record(self.owner, registry, b.robot, response, k, 3);
            }
        }
    }

    fn compute_impulse(&mut self, _dt: f64, registry: &DeltaTwistRegistry) {
        self.first_update = true;
        self.solve(1.0, registry);
    }

    fn update_impulse(&mut self, _dt: f64, alpha: f64, verbose: bool, registry: &DeltaTwistRegistry) {
        self.solve(alpha, registry);
        if verbose {
            tracing::debug!(
                robot = %self.robot_a,
                body = %self.body_a,
                alpha,
                active = self.active,
                closing = self.closing,
                slipping = self.slipping,
                impulse_update = self.impulse_update,
                velocity_update = self.velocity_update,
                "contact update"
            );
        }
    }

    fn update_twist_modifiers(&mut self, registry: &mut DeltaTwistRegistry) {
        let change = self.impulse - self.published_impulse;
        if change.norm() > 0.0 {
            self.coupling
                .publish(registry, &DVector::from_column_slice(change.as_slice()));
        }
        self.published_impulse = self.impulse;
    }

    fn finalize_impulse(&mut self) {
        let impulse = DVector::from_column_slice(self.impulse.as_slice());
        self.joint_velocity_change_a = &self.joint_response_a * &impulse;
        self.joint_velocity_change_b = &self.joint_response_b * &impulse;
        let (impulse_a, impulse_b) = self.body_impulses(&self.impulse_world());
        self.body_impulse_a = impulse_a;
        self.body_impulse_b = if self.body_b.is_some() {
            impulse_b
        } else {
            SpatialVector::zeros()
        };
        self.active = self.impulse.z > 0.0;
    }

    fn impulse_update(&self) -> f64 {
        self.impulse_update
    }

    fn velocity_update(&self) -> f64 {
        self.velocity_update
    }

    fn is_constraint_active(&self) -> bool {
        self.active
    }

    fn is_closing(&self, registry: &DeltaTwistRegistry) -> bool {
        if !self.valid {
            return false;
        }
        let velocity = self.current_velocity(registry) + self.inverse_inertia * self.impulse;
        velocity.z < -self.tolerance
    }

    fn robots(&self) -> SmallVec<[RobotId; 2]> {
        let mut robots = smallvec![self.robot_a];
        robots.extend(self.other_robot().map(|b| b.robot));
        robots
    }

    fn joint_velocity_change(&self, robot: RobotId) -> Option<&DVector<f64>> {
        if robot == self.robot_a {
            Some(&self.joint_velocity_change_a)
        } else if self.other_robot().is_some_and(|b| b.robot == robot) {
            Some(&self.joint_velocity_change_b)
        } else {
            None
        }
    }

    fn write_impulses(&self, robot: RobotId, registry: &mut RigidBodyImpulseRegistry) {
        if !self.active {
            return;
        }
        if robot == self.robot_a {
            registry.add(self.body_a, &self.body_impulse_a);
        }
        if let Some(b) = self.body_b.filter(|b| b.robot == robot) {
            registry.add(b.body, &self.body_impulse_b);
        }
    }
}
