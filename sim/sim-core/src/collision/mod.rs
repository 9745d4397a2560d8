//! Collision geometry and detection.
//!
//! - [`broad_phase`] culls pairs by bounding box.
//! - [`narrow_phase`] computes closest points between primitive shapes.
//! - [`SimpleCollisionDetection`] ties both to the robots and the environment.

pub mod broad_phase;
mod detector;
pub mod narrow_phase;
mod shape;

pub use broad_phase::{Aabb, Axis, BroadPhase, BroadPhaseProxy, BruteForce, SweepAndPrune};
pub use detector::{CollisionDetector, CollisionResult, ContactBody, SimpleCollisionDetection};
pub use narrow_phase::{ContactPoint, ContactPoints, collide};
pub use shape::{Collidable, CollisionShape};
