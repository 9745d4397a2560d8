//! Spatial algebra, forward dynamics and impulse response.

pub mod spatial;

mod forward;
mod response;

pub use forward::ForwardDynamicsCalculator;
pub use response::ImpulseResponse;
pub use spatial::SpatialVector;
