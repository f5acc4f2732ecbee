//! In-memory state storage modules.
//!
//! Stores hold the orchestrator's runtime state:
//! - `InstanceRegistry` - live instances by id
//! - `PlayerIndex` - which instance each player occupies or is queued for
//! - `PendingReleases` - environments still held by a finishing teardown

pub mod instance_registry;
pub mod pending_release;
pub mod player_index;

// Re-export store types
pub use instance_registry::{InstanceCell, InstanceRegistry};
pub use pending_release::{PendingReleases, ReleaseTicket};
pub use player_index::PlayerIndex;
