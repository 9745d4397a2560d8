//! The impulse-based physics engine.
//!
//! Each call to [`ImpulseBasedPhysicsEngine::simulate`] runs the stages below
//! in order:
//!
//! 1. **Controllers**: reset per-tick accumulators, run controllers, write
//!    their efforts and save the pre-physics snapshot.
//! 2. **Forward dynamics**: unconstrained pass (wrench points included), then
//!    place the collidables at their predicted poses.
//! 3. **Collision detection** against the other robots and the environment.
//! 4. **Grouping**: robots touching each other form a group; the joint limits
//!    of robots outside every group are solved on their own.
//! 5. **Impulses**: one [`MultiContactImpulseCalculator`] per group.
//! 6. **Integration**: write accelerations and velocity changes back,
//!    integrate, refresh frames and sensors.

use std::fmt;

use nalgebra::Vector3;
use sim_constraint::{
    CollisionGrouping, ConstraintParameters, MultiContactImpulseCalculator,
    RobotJointLimitImpulseBasedCalculator,
};
use sim_contact::ContactParameters;
use sim_core::{
    Collidable, CollisionDetector, CollisionResult, DeltaTwistRegistry, ImpulseBasedConstraintCalculator,
    ImpulseBasedRobot, SimpleCollisionDetection,
};
use sim_types::{Result, RobotId, SimError, SimulationConfig};

use crate::controller::{ControllerManager, RobotController};
use crate::parameters::{ContactParameterTable, ContactPartner};
use crate::telemetry::PhysicsEngineTimers;

/// Lifecycle of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineState {
    /// No tick has run yet.
    #[default]
    Uninitialized,
    /// Ticking.
    Running,
    /// Paused; the next tick resumes.
    Paused,
}

/// Advances articulated robots and their contacts with impulses.
pub struct ImpulseBasedPhysicsEngine {
    config: SimulationConfig,
    state: EngineState,
    time: f64,

    robots: Vec<ImpulseBasedRobot>,
    controllers: Vec<ControllerManager>,
    environment: Vec<Collidable>,
    detector: Box<dyn CollisionDetector>,

    contact_parameters: ContactParameterTable,
    constraint_parameters: ConstraintParameters,

    collisions: Vec<CollisionResult>,
    grouping: CollisionGrouping,
    solvers: Vec<MultiContactImpulseCalculator>,
    active_solvers: usize,
    standalone_limits: Vec<RobotJointLimitImpulseBasedCalculator>,
    limit_registry: DeltaTwistRegistry,

    timers: PhysicsEngineTimers,
}

impl fmt::Debug for ImpulseBasedPhysicsEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImpulseBasedPhysicsEngine")
            .field("config", &self.config)
            .field("state", &self.state)
            .field("time", &self.time)
            .field("robots", &self.robots.len())
            .field("environment", &self.environment.len())
            .field("collisions", &self.collisions.len())
            .finish_non_exhaustive()
    }
}

impl Default for ImpulseBasedPhysicsEngine {
    fn default() -> Self {
        Self::from_valid_config(SimulationConfig::default())
    }
}

impl ImpulseBasedPhysicsEngine {
    /// Engine with the given configuration and the built-in collision detection.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: SimulationConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_valid_config(config))
    }

    fn from_valid_config(config: SimulationConfig) -> Self {
        let timers = PhysicsEngineTimers::new(config.real_time_rate_window);
        Self {
            config,
            state: EngineState::Uninitialized,
            time: 0.0,
            robots: Vec::new(),
            controllers: Vec::new(),
            environment: Vec::new(),
            detector: Box::new(SimpleCollisionDetection::new()),
            contact_parameters: ContactParameterTable::default(),
            constraint_parameters: ConstraintParameters::default(),
            collisions: Vec::new(),
            grouping: CollisionGrouping::default(),
            solvers: Vec::new(),
            active_solvers: 0,
            standalone_limits: Vec::new(),
            limit_registry: DeltaTwistRegistry::new(),
            timers,
        }
    }

    /// Replace the collision detection.
    #[must_use]
    pub fn with_collision_detector(mut self, detector: impl CollisionDetector + 'static) -> Self {
        self.detector = Box::new(detector);
        self
    }

    /// Simulation configuration.
    #[must_use]
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Lifecycle state.
    #[must_use]
    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Simulated time of the last tick.
    #[must_use]
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Add a robot.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InertialFrameMismatch`] if the robot is expressed in
    /// another frame than the engine.
    pub fn add_robot(&mut self, robot: ImpulseBasedRobot) -> Result<RobotId> {
        let frame = robot.robot().inertial_frame();
        if frame != self.config.inertial_frame {
            return Err(SimError::frame_mismatch(
                self.config.inertial_frame.clone(),
                frame,
            ));
        }
        let id = RobotId::new(self.robots.len());
        tracing::debug!(robot = %id, name = robot.robot().name(), dof = robot.robot().dof(), "add robot");
        self.robots.push(robot);
        self.controllers.push(ControllerManager::new());
        self.standalone_limits.push(RobotJointLimitImpulseBasedCalculator::new(
            id,
            self.constraint_parameters,
        ));
        Ok(id)
    }

    /// Add a controller to a robot.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InvalidRobotId`] for an unknown robot.
    pub fn add_controller(
        &mut self,
        robot: RobotId,
        controller: impl RobotController + 'static,
    ) -> Result<()> {
        let manager = self
            .controllers
            .get_mut(robot.0)
            .ok_or(SimError::InvalidRobotId(robot.0))?;
        manager.add_controller(controller);
        Ok(())
    }

    /// Add a static environment shape.
    pub fn add_environment_collidable(&mut self, collidable: Collidable) {
        self.environment.push(collidable);
    }

    /// Static environment shapes.
    #[must_use]
    pub fn environment(&self) -> &[Collidable] {
        &self.environment
    }

    /// All robots, indexed by [`RobotId`].
    #[must_use]
    pub fn robots(&self) -> &[ImpulseBasedRobot] {
        &self.robots
    }

    /// One robot.
    #[must_use]
    pub fn robot(&self, id: RobotId) -> Option<&ImpulseBasedRobot> {
        self.robots.get(id.0)
    }

    /// One robot, mutably.
    pub fn robot_mut(&mut self, id: RobotId) -> Option<&mut ImpulseBasedRobot> {
        self.robots.get_mut(id.0)
    }

    /// Controllers of one robot.
    #[must_use]
    pub fn controller_manager(&self, id: RobotId) -> Option<&ControllerManager> {
        self.controllers.get(id.0)
    }

    /// Contact parameters, global and per pair.
    #[must_use]
    pub fn contact_parameters(&self) -> &ContactParameterTable {
        &self.contact_parameters
    }

    /// Replace the global contact parameters.
    ///
    /// # Errors
    ///
    /// Returns an error if the parameters are invalid.
    pub fn set_contact_parameters(&mut self, parameters: ContactParameters) -> Result<()> {
        self.contact_parameters.set_default(parameters)
    }

    /// Override the contact parameters between two robots, or a robot and the
    /// environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the parameters are invalid.
    pub fn set_pair_contact_parameters(
        &mut self,
        a: RobotId,
        b: ContactPartner,
        parameters: ContactParameters,
    ) -> Result<()> {
        self.contact_parameters.set_pair(a, b, parameters)
    }

    /// Joint-limit parameters.
    #[must_use]
    pub fn constraint_parameters(&self) -> &ConstraintParameters {
        &self.constraint_parameters
    }

    /// Replace the joint-limit parameters.
    ///
    /// # Errors
    ///
    /// Returns an error if the parameters are invalid.
    pub fn set_constraint_parameters(&mut self, parameters: ConstraintParameters) -> Result<()> {
        parameters.validate()?;
        self.constraint_parameters = parameters;
        Ok(())
    }

    /// Collisions detected by the last tick.
    #[must_use]
    pub fn collisions(&self) -> &[CollisionResult] {
        &self.collisions
    }

    /// Collision grouping of the last tick.
    #[must_use]
    pub fn collision_grouping(&self) -> &CollisionGrouping {
        &self.grouping
    }

    /// Group solvers used by the last tick, in group order.
    #[must_use]
    pub fn multi_contact_calculators(&self) -> &[MultiContactImpulseCalculator] {
        &self.solvers[..self.active_solvers]
    }

    /// Stage timings of the last tick.
    #[must_use]
    pub fn timers(&self) -> &PhysicsEngineTimers {
        &self.timers
    }

    /// Compute the initial accelerations and sensor readings and initialize
    /// the controllers.
    ///
    /// Returns `true` only on the first call.
    pub fn initialize(&mut self, gravity: &Vector3<f64>) -> bool {
        if self.state != EngineState::Uninitialized {
            return false;
        }
        let dt = self.config.timestep;
        for (robot, controllers) in self.robots.iter_mut().zip(&mut self.controllers) {
            robot.reset_calculators();
            robot.update_frames();
            robot.do_forward_dynamics(gravity);
            robot.write_joint_accelerations(dt);
            robot.update_sensors(gravity);
            controllers.initialize(robot.robot());
        }
        self.state = EngineState::Running;
        tracing::debug!(robots = self.robots.len(), "physics engine initialized");
        true
    }

    /// Pause the engine and every controller.
    pub fn pause(&mut self) {
        if self.state == EngineState::Paused {
            return;
        }
        for controllers in &mut self.controllers {
            controllers.pause();
        }
        self.state = EngineState::Paused;
    }

    /// Advance one tick of the configured timestep and gravity.
    ///
    /// # Errors
    ///
    /// See [`simulate`](Self::simulate).
    pub fn step(&mut self) -> Result<()> {
        let dt = self.config.timestep;
        let gravity = self.config.gravity.acceleration;
        self.simulate(self.time + dt, dt, &gravity)
    }

    /// Advance every robot by `dt`.
    ///
    /// On an uninitialized engine the first call only initializes it and
    /// records `current_time`; physics starts with the next call. A paused
    /// engine resumes.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InvalidTimestep`] if `dt` is not positive and
    /// finite, and [`SimError::Diverged`] if a robot state is no longer finite
    /// after the tick.
    pub fn simulate(&mut self, current_time: f64, dt: f64, gravity: &Vector3<f64>) -> Result<()> {
        if !dt.is_finite() || dt <= 0.0 {
            return Err(SimError::InvalidTimestep(dt));
        }
        if self.initialize(gravity) {
            self.time = current_time;
            return Ok(());
        }
        self.state = EngineState::Running;
        self.timers.start_tick();

        self.initial_phase(current_time, dt, gravity);
        self.timers.initial_phase = self.timers.lap();

        self.detect_collisions();
        self.timers.detect_collisions = self.timers.lap();

        self.configure_collision_handlers();
        self.timers.configure_collision_handlers = self.timers.lap();

        self.handle_collisions(dt);
        self.timers.handle_collisions = self.timers.lap();

        let result = self.final_phase(dt, gravity);
        self.timers.final_phase = self.timers.lap();
        self.timers.end_tick(dt);
        self.time = current_time;

        tracing::debug!(
            time = current_time,
            collisions = self.collisions.len(),
            groups = self.active_solvers,
            iterations = ?self
                .multi_contact_calculators()
                .iter()
                .map(MultiContactImpulseCalculator::number_of_iterations)
                .collect::<Vec<_>>(),
            "physics tick"
        );
        result
    }

    fn initial_phase(&mut self, current_time: f64, dt: f64, gravity: &Vector3<f64>) {
        for (robot, controllers) in self.robots.iter_mut().zip(&mut self.controllers) {
            robot.reset_calculators();
            controllers.update(current_time, robot.robot());
            controllers.write_efforts(robot.robot_mut());
            robot.save_snapshot();
        }
        for robot in &mut self.robots {
            robot.do_forward_dynamics(gravity);
            robot.update_collidables(dt);
        }
    }

    fn detect_collisions(&mut self) {
        self.collisions.clear();
        let threshold = self.contact_parameters.detection_threshold();
        self.detector
            .detect_collisions(&self.robots, &self.environment, threshold, &mut self.collisions);
        let table = &self.contact_parameters;
        self.collisions
            .retain(|c| c.signed_distance < table.for_collision(c).minimum_penetration);
    }

    fn configure_collision_handlers(&mut self) {
        let groups = self.grouping.build(self.robots.len(), &self.collisions);

        while self.solvers.len() < groups.len() {
            self.solvers
                .push(MultiContactImpulseCalculator::new(self.config.solver.clone()));
        }
        self.active_solvers = groups.len();

        let table = &self.contact_parameters;
        for (solver, group) in self.solvers.iter_mut().zip(groups) {
            solver.set_config(self.config.solver.clone());
            solver.set_constraint_parameters(self.constraint_parameters);
            solver.configure_with(group, |collision| table.for_collision(collision));
        }
    }

    fn handle_collisions(&mut self, dt: f64) {
        for &robot in self.grouping.ungrouped_robots() {
            let Some(limits) = self.standalone_limits.get_mut(robot.0) else {
                continue;
            };
            limits.reset(robot, self.constraint_parameters);
            limits.initialize(dt, &self.robots);
            if limits.active_limits().is_empty() {
                continue;
            }
            self.limit_registry.clear();
            limits.register_targets(0, &mut self.limit_registry);
            limits.update_inertia(&self.robots, &self.limit_registry);
            limits.compute_impulse(dt, &self.limit_registry);
            limits.finalize_impulse();
            if !limits.is_constraint_active() {
                continue;
            }
            if let (Some(change), Some(target)) =
                (limits.joint_velocity_change(robot), self.robots.get_mut(robot.0))
            {
                target.add_joint_velocity_change(change);
            }
        }

        for solver in &mut self.solvers[..self.active_solvers] {
            solver.compute_impulses(dt, &self.robots);
        }
        for solver in &self.solvers[..self.active_solvers] {
            solver.write_joint_delta_velocities(&mut self.robots);
            solver.write_impulses(&mut self.robots);
        }
    }

    fn final_phase(&mut self, dt: f64, gravity: &Vector3<f64>) -> Result<()> {
        let mut diverged = None;
        for (index, robot) in self.robots.iter_mut().enumerate() {
            robot.write_joint_accelerations(dt);
            robot.integrate_state(dt);
            robot.update_frames();
            robot.update_sensors(gravity);
            if diverged.is_none() && !robot.robot().is_finite() {
                diverged = Some(index);
            }
        }
        match diverged {
            Some(index) => Err(SimError::diverged(format!(
                "robot {} has a non-finite state",
                RobotId::new(index)
            ))),
            None => Ok(()),
        }
    }
}
