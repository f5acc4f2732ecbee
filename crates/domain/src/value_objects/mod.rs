//! Value objects for instance addressing and placement.

mod coordinate;
mod environment;
mod names;

pub use coordinate::Coordinate;
pub use environment::EnvironmentHandle;
pub use names::{GroupKey, MapName};
