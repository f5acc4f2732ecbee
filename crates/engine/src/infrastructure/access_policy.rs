//! Rule-based access policy loaded from a JSON rules file.
//!
//! ```json
//! {
//!   "max_players": 10,
//!   "bypass": ["<player uuid>"],
//!   "globally_blocked_maps": ["closed_course"],
//!   "blocked_maps": { "<player uuid>": ["course2"] },
//!   "map_grants": { "vip_course": ["<player uuid>"], "*": ["<player uuid>"] }
//! }
//! ```
//!
//! A map without a grant list is open to everyone. The `"*"` grant list
//! names players allowed on every map.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::Deserialize;

use crate::infrastructure::ports::AccessPolicy;
use mapshard_domain::{MapName, PlayerId};

/// Occupancy limit used when the rules file does not set one.
pub const DEFAULT_MAX_PLAYERS: usize = 10;

const WILDCARD_GRANT: &str = "*";

#[derive(Debug, thiserror::Error)]
pub enum AccessRulesError {
    #[error("Failed to read access rules from {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid access rules: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Raw rules file layout.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AccessRules {
    pub max_players: Option<usize>,
    pub bypass: HashSet<PlayerId>,
    pub globally_blocked_maps: HashSet<String>,
    pub blocked_maps: HashMap<PlayerId, HashSet<String>>,
    pub map_grants: HashMap<String, HashSet<PlayerId>>,
}

/// [`AccessPolicy`] evaluating bypass, global block, player block, then grants.
#[derive(Debug, Clone, Default)]
pub struct RuleAccessPolicy {
    rules: AccessRules,
}

impl RuleAccessPolicy {
    pub fn new(rules: AccessRules) -> Self {
        Self { rules }
    }

    /// Policy that admits everyone up to the default occupancy limit.
    pub fn open() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self, AccessRulesError> {
        Ok(Self::new(serde_json::from_str(json)?))
    }

    pub fn from_file(path: &Path) -> Result<Self, AccessRulesError> {
        let json = std::fs::read_to_string(path).map_err(|source| AccessRulesError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let policy = Self::from_json(&json)?;
        tracing::info!(
            path = %path.display(),
            max_players = policy.max_occupants(),
            bypass = policy.rules.bypass.len(),
            "Loaded access rules"
        );
        Ok(policy)
    }
}

impl AccessPolicy for RuleAccessPolicy {
    fn can_join(&self, player: PlayerId, map: &MapName) -> bool {
        let rules = &self.rules;
        if rules.bypass.contains(&player) {
            return true;
        }
        if rules.globally_blocked_maps.contains(map.as_str()) {
            return false;
        }
        if rules
            .blocked_maps
            .get(&player)
            .is_some_and(|blocked| blocked.contains(map.as_str()))
        {
            return false;
        }
        match rules.map_grants.get(map.as_str()) {
            None => true,
            Some(granted) => {
                granted.contains(&player)
                    || rules
                        .map_grants
                        .get(WILDCARD_GRANT)
                        .is_some_and(|all| all.contains(&player))
            }
        }
    }

    fn max_occupants(&self) -> usize {
        self.rules.max_players.unwrap_or(DEFAULT_MAX_PLAYERS)
    }
}
