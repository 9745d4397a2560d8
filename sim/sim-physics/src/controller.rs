//! Robot controllers and the per-robot manager that writes their efforts.

use std::fmt;

use nalgebra::DVector;
use sim_core::Robot;

/// A controller producing joint efforts for one robot.
///
/// Efforts are accumulated: every controller of a robot adds its output to
/// the same effort vector, which starts at zero each tick.
pub trait RobotController {
    /// Called once, after the initial forward dynamics.
    fn initialize(&mut self, _robot: &Robot) {}

    /// Add this tick's efforts for `robot` at `time` to `efforts`.
    fn update(&mut self, time: f64, robot: &Robot, efforts: &mut DVector<f64>);

    /// Called when the engine is paused.
    fn pause(&mut self) {}
}

/// Controllers of one robot.
#[derive(Default)]
pub struct ControllerManager {
    controllers: Vec<Box<dyn RobotController>>,
    efforts: DVector<f64>,
    initialized: bool,
}

impl fmt::Debug for ControllerManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControllerManager")
            .field("controllers", &self.controllers.len())
            .field("efforts", &self.efforts)
            .field("initialized", &self.initialized)
            .finish()
    }
}

impl ControllerManager {
    /// Manager with no controllers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a controller; it runs after the ones already added.
    pub fn add_controller(&mut self, controller: impl RobotController + 'static) {
        self.controllers.push(Box::new(controller));
    }

    /// Number of controllers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.controllers.len()
    }

    /// Whether the robot has no controller.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.controllers.is_empty()
    }

    /// Efforts produced by the last [`update`](Self::update).
    #[must_use]
    pub fn efforts(&self) -> &DVector<f64> {
        &self.efforts
    }

    /// Initialize every controller once.
    pub fn initialize(&mut self, robot: &Robot) {
        if self.initialized {
            return;
        }
        self.initialized = true;
        for controller in &mut self.controllers {
            controller.initialize(robot);
        }
    }

    /// Run every controller.
    pub fn update(&mut self, time: f64, robot: &Robot) {
        if self.efforts.len() == robot.dof() {
            self.efforts.fill(0.0);
        } else {
            self.efforts = DVector::zeros(robot.dof());
        }
        for controller in &mut self.controllers {
            controller.update(time, robot, &mut self.efforts);
        }
    }

    /// Write the efforts into the robot.
    ///
    /// A robot without controllers keeps the efforts set on it directly.
    pub fn write_efforts(&self, robot: &mut Robot) {
        if self.controllers.is_empty() || self.efforts.len() != robot.dof() {
            return;
        }
        robot.efforts_mut().copy_from(&self.efforts);
    }

    /// Pause every controller.
    pub fn pause(&mut self) {
        for controller in &mut self.controllers {
            controller.pause();
        }
    }
}
