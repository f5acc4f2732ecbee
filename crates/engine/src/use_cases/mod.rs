//! Use cases - User story orchestration.
//!
//! Each module contains use cases for a specific area.

pub mod content_admin;
pub mod lifecycle;

// Re-export main types
pub use content_admin::{ContentAdmin, ContentAdminError};
pub use lifecycle::{
    InstanceOrchestrator, InstanceSnapshot, JoinOutcome, LifecycleError, INSTANCE_CODE_LENGTH,
};
