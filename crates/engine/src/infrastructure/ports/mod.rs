//! Port traits for infrastructure boundaries.
//!
//! These are the ONLY abstractions in the engine. Everything else is concrete types.
//! Ports exist for:
//! - Environment lifecycle (sandbox engine, external)
//! - Content population (package loader, external)
//! - Admission rules (permission storage, external)
//! - Player hand-off (connection transport, external)
//! - Clock/Random (for testing)

mod error;
mod external;
mod testing;

// =============================================================================
// External Service Ports
// =============================================================================
pub use external::{
    AccessPolicy, AcquiredEnvironment, ContentLoader, EnvironmentProvider, MarkerHint,
    PlayerNotice, PlayerTransport,
};

// =============================================================================
// Test-Only Mocks (only available during test builds)
// =============================================================================
#[cfg(test)]
pub use external::{MockAccessPolicy, MockContentLoader, MockEnvironmentProvider, MockPlayerTransport};

#[cfg(test)]
pub use testing::{MockClockPort, MockRandomPort};

// =============================================================================
// Testing Ports
// =============================================================================
pub use testing::{ClockPort, RandomPort};

// =============================================================================
// Error Types
// =============================================================================
pub use error::{ContentError, EnvironmentError, TransportError};
