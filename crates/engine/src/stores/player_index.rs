//! Player to instance index.

use dashmap::DashMap;

use mapshard_domain::{InstanceId, PlayerId};

/// Maps each player to the single instance they occupy or are queued for.
#[derive(Default)]
pub struct PlayerIndex {
    players: DashMap<PlayerId, InstanceId>,
}

impl PlayerIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, player: PlayerId) -> Option<InstanceId> {
        self.players.get(&player).map(|id| id.clone())
    }

    /// Point `player` at `instance`, returning the previous mapping.
    pub fn insert(&self, player: PlayerId, instance: InstanceId) -> Option<InstanceId> {
        self.players.insert(player, instance)
    }

    /// Remove the mapping only if it still points at `instance`.
    pub fn remove_if_points_to(&self, player: PlayerId, instance: &InstanceId) -> bool {
        self.players
            .remove_if(&player, |_, current| current == instance)
            .is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_reports_previous_instance() {
        let index = PlayerIndex::new();
        let player = PlayerId::new();
        let a = InstanceId::from_raw("a");
        let b = InstanceId::from_raw("b");

        assert_eq!(index.insert(player, a.clone()), None);
        assert_eq!(index.insert(player, b.clone()), Some(a));
        assert_eq!(index.get(player), Some(b));
    }

    #[test]
    fn conditional_removal_leaves_newer_mappings() {
        let index = PlayerIndex::new();
        let player = PlayerId::new();
        let old = InstanceId::from_raw("old");
        let new = InstanceId::from_raw("new");
        index.insert(player, new.clone());

        assert!(!index.remove_if_points_to(player, &old));
        assert_eq!(index.get(player), Some(new.clone()));
        assert!(index.remove_if_points_to(player, &new));
        assert_eq!(index.get(player), None);
        assert!(!index.remove_if_points_to(player, &new));
    }
}
