//! Validated name newtypes for instance addressing
//!
//! Map names and group keys end up embedded in instance ids (and from there
//! in environment ids), so they are restricted to a filesystem-safe alphabet:
//! - Non-empty after trimming
//! - At most 64 characters
//! - ASCII alphanumerics, `_` and `-` only
//!
//! Map names additionally may not be `PUBLIC` or start with `PUBLIC_`:
//! every private or group id starts with `<map>_`, and must never look like
//! a public id.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::DomainError;

/// Maximum length for names embedded in instance ids
const MAX_NAME_LENGTH: usize = 64;

/// Map name reserved by the public instance id prefix
const RESERVED_MAP_NAME: &str = "PUBLIC";

fn validate(kind: &str, raw: String) -> Result<String, DomainError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation(format!("{kind} cannot be empty")));
    }
    if trimmed.len() > MAX_NAME_LENGTH {
        return Err(DomainError::validation(format!(
            "{kind} cannot exceed {MAX_NAME_LENGTH} characters"
        )));
    }
    if let Some(bad) = trimmed
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
    {
        return Err(DomainError::validation(format!(
            "{kind} contains invalid character '{bad}'"
        )));
    }
    Ok(trimmed.to_string())
}

// ============================================================================
// MapName
// ============================================================================

/// A validated map name (the content package a play session is built from)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MapName(String);

impl MapName {
    /// Create a new validated map name.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the name is empty, too long,
    /// contains characters outside `[A-Za-z0-9_-]`, or is reserved for
    /// public instance ids.
    pub fn new(name: impl Into<String>) -> Result<Self, DomainError> {
        let name = validate("Map name", name.into())?;
        let reserved = name
            .strip_prefix(RESERVED_MAP_NAME)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('_'));
        if reserved {
            return Err(DomainError::validation(format!(
                "Map name '{name}' is reserved for public instance ids"
            )));
        }
        Ok(Self(name))
    }

    /// Returns the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MapName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for MapName {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<MapName> for String {
    fn from(name: MapName) -> String {
        name.0
    }
}

// ============================================================================
// GroupKey
// ============================================================================

/// A validated group key (party code) scoping a group instance
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GroupKey(String);

impl GroupKey {
    /// Create a new validated group key.
    ///
    /// # Errors
    ///
    /// Same rules as [`MapName::new`].
    pub fn new(key: impl Into<String>) -> Result<Self, DomainError> {
        validate("Group key", key.into()).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for GroupKey {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<GroupKey> for String {
    fn from(key: GroupKey) -> String {
        key.0
    }
}
