//! Body-mounted sensors refreshed at the end of every tick.

use nalgebra::{Point3, UnitQuaternion, Vector3};
use sim_types::{BodyId, Pose};

use crate::dynamics::spatial::{SpatialVector, angular_part, linear_part, velocity_at_point};

/// Inertial measurement unit rigidly attached to a body.
///
/// Readings are expressed in the sensor frame. The linear acceleration is the
/// specific force, so a sensor at rest in gravity reads `-g`.
#[derive(Debug, Clone, PartialEq)]
pub struct ImuSensor {
    /// Sensor name.
    pub name: String,
    /// Body carrying the sensor.
    pub body: BodyId,
    /// Mounting pose in the body frame.
    pub mount: Pose,
    orientation: UnitQuaternion<f64>,
    angular_velocity: Vector3<f64>,
    linear_acceleration: Vector3<f64>,
}

impl ImuSensor {
    /// Sensor mounted on `body` at `mount`.
    #[must_use]
    pub fn new(name: impl Into<String>, body: BodyId, mount: Pose) -> Self {
        Self {
            name: name.into(),
            body,
            mount,
            orientation: UnitQuaternion::identity(),
            angular_velocity: Vector3::zeros(),
            linear_acceleration: Vector3::zeros(),
        }
    }

    /// World orientation of the sensor frame.
    #[must_use]
    pub fn orientation(&self) -> &UnitQuaternion<f64> {
        &self.orientation
    }

    /// Angular velocity in the sensor frame.
    #[must_use]
    pub fn angular_velocity(&self) -> &Vector3<f64> {
        &self.angular_velocity
    }

    /// Specific force in the sensor frame.
    #[must_use]
    pub fn linear_acceleration(&self) -> &Vector3<f64> {
        &self.linear_acceleration
    }

    /// Refresh the readings.
    ///
    /// `velocity` and `acceleration` are the body's spatial velocity and
    /// spatial acceleration (true acceleration, not specific force), world frame at the world origin.
    pub fn update(
        &mut self,
        body_pose: &Pose,
        velocity: &SpatialVector,
        acceleration: &SpatialVector,
        gravity: &Vector3<f64>,
    ) {
        let sensor = body_pose.compose(&self.mount);
        let point: Point3<f64> = sensor.position;
        let omega = angular_part(velocity);

        let point_acceleration = linear_part(acceleration)
            + angular_part(acceleration).cross(&point.coords)
            + omega.cross(&velocity_at_point(velocity, &point));

        self.orientation = sensor.rotation;
        self.angular_velocity = sensor.rotation.inverse_transform_vector(&omega);
        self.linear_acceleration = sensor
            .rotation
            .inverse_transform_vector(&(point_acceleration - gravity));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamics::spatial::spatial;
    use approx::assert_relative_eq;

    #[test]
    fn test_at_rest_reads_minus_gravity() {
        let mut imu = ImuSensor::new("imu", BodyId::new(1), Pose::identity());
        imu.update(
            &Pose::identity(),
            &SpatialVector::zeros(),
            &SpatialVector::zeros(),
            &Vector3::new(0.0, 0.0, -9.81),
        );
        assert_relative_eq!(*imu.linear_acceleration(), Vector3::new(0.0, 0.0, 9.81));
    }

    #[test]
    fn test_centripetal_acceleration() {
        // Sensor 1 m from a vertical spin axis at 2 rad/s, no angular acceleration.
        let mut imu = ImuSensor::new(
            "imu",
            BodyId::new(1),
            Pose::from_position(Point3::new(1.0, 0.0, 0.0)),
        );
        let omega = Vector3::new(0.0, 0.0, 2.0);
        let velocity = spatial(&omega, &Vector3::zeros());
        // Spatial acceleration of a steady spin about the origin is zero.
        imu.update(&Pose::identity(), &velocity, &SpatialVector::zeros(), &Vector3::zeros());

        assert_relative_eq!(*imu.linear_acceleration(), Vector3::new(-4.0, 0.0, 0.0), epsilon = 1e-12);
        assert_relative_eq!(*imu.angular_velocity(), omega);
    }
}
