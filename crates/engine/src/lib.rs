//! mapshard Engine library.
//!
//! Provisions and tears down ephemeral map instances.
//!
//! ## Structure
//!
//! - `use_cases/` - Instance lifecycle orchestration and content administration
//! - `stores/` - In-memory registry and player index
//! - `infrastructure/` - External dependency implementations (ports + adapters)
//! - `app` - Application composition

pub mod app;
pub mod infrastructure;
pub mod stores;
pub mod use_cases;

/// Fakes shared by the use case tests.
#[cfg(test)]
pub mod test_fixtures;

pub use app::App;
