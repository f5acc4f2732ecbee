pub mod aggregates;
pub mod error;
pub mod events;
pub mod ids;
pub mod value_objects;

pub use aggregates::{Admission, Evicted, Instance, InstanceState, JoinRejection, Visibility};
pub use error::DomainError;
pub use events::{InstanceEvent, TeardownCause};
pub use ids::{InstanceId, PlayerId};
pub use value_objects::{Coordinate, EnvironmentHandle, GroupKey, MapName};
