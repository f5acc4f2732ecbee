//! Aggregates - consistency boundaries with encapsulated state
//!
//! `Instance` is the only aggregate: every occupancy and lifecycle change of a
//! map instance goes through it.

pub mod instance;

pub use instance::{Admission, Evicted, Instance, InstanceState, JoinRejection, Visibility};
