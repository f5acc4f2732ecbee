//! Infrastructure implementations.
//!
//! Contains port trait implementations for external dependencies.

pub mod access_policy;
pub mod clock;
pub mod config;
pub mod content_loader;
pub mod event_bus;
pub mod ports;
pub mod sandbox;
pub mod transport;
