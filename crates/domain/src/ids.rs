use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::value_objects::{GroupKey, MapName};

macro_rules! define_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// Player IDs
define_id!(PlayerId);

/// Prefix shared by every public instance id.
const PUBLIC_PREFIX: &str = "PUBLIC_";

/// Identifier of a live map instance.
///
/// Unlike the UUID-backed ids above, instance ids are human readable and
/// double as environment ids:
/// - public: `PUBLIC_<map>` (deterministic, one live public instance per map)
/// - private: `<map>_<code>`
/// - group: `<map>_group-<key>-<code>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(String);

impl InstanceId {
    pub fn public(map: &MapName) -> Self {
        Self(format!("{PUBLIC_PREFIX}{map}"))
    }

    pub fn private(map: &MapName, code: &str) -> Self {
        Self(format!("{map}_{code}"))
    }

    pub fn group(map: &MapName, key: &GroupKey, code: &str) -> Self {
        Self(format!("{map}_group-{key}-{code}"))
    }

    /// Wrap an id received from a caller. No validation: unknown ids simply
    /// fail to resolve in the registry.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_public(&self) -> bool {
        self.0.starts_with(PUBLIC_PREFIX)
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
