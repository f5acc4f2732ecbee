//! Opaque reference to an isolated environment owned by one instance.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Handle to an environment ("world") created by the environment provider.
///
/// The handle is exclusively owned by the instance it was acquired for and
/// is never shared across instances.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EnvironmentHandle {
    id: String,
}

impl EnvironmentHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    /// Provider-side id; equals the owning instance id.
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for EnvironmentHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}
