//! In-memory sandbox environments.
//!
//! `SandboxWorlds` is the block storage shared by the environment provider
//! (which creates, unloads and purges worlds) and the content loader (which
//! pastes packages and scans for markers). A world survives `release` and is
//! only dropped by `purge`, so re-acquiring a released world reports it as
//! reused with its blocks intact. Purging a loaded world is refused.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::infrastructure::ports::{AcquiredEnvironment, EnvironmentError, EnvironmentProvider};
use mapshard_domain::EnvironmentHandle;

/// Integer block position.
pub type BlockPos = (i64, i64, i64);

#[derive(Debug, Default)]
struct SandboxWorld {
    loaded: bool,
    blocks: HashMap<BlockPos, String>,
}

/// Shared store of sandbox worlds keyed by environment id.
#[derive(Debug, Default)]
pub struct SandboxWorlds {
    worlds: DashMap<String, SandboxWorld>,
}

impl SandboxWorlds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn exists(&self, env_id: &str) -> bool {
        self.worlds.contains_key(env_id)
    }

    pub fn is_loaded(&self, env_id: &str) -> bool {
        self.worlds.get(env_id).is_some_and(|w| w.loaded)
    }

    pub fn block_count(&self, env_id: &str) -> usize {
        self.worlds.get(env_id).map_or(0, |w| w.blocks.len())
    }

    pub fn block_at(&self, env_id: &str, pos: BlockPos) -> Option<String> {
        self.worlds
            .get(env_id)
            .and_then(|w| w.blocks.get(&pos).cloned())
    }

    /// Write blocks into a loaded world. Returns false if the world is not
    /// loaded; nothing is written in that case.
    pub fn write_blocks(
        &self,
        env_id: &str,
        blocks: impl IntoIterator<Item = (BlockPos, String)>,
    ) -> bool {
        let Some(mut world) = self.worlds.get_mut(env_id) else {
            return false;
        };
        if !world.loaded {
            return false;
        }
        world.blocks.extend(blocks);
        true
    }

    /// Positions of every block of `kind` inside the box starting at `min`
    /// with extent `size` (exclusive upper bound), in x, z, y scan order.
    /// `None` if the world is not loaded.
    pub fn find_blocks(
        &self,
        env_id: &str,
        kind: &str,
        min: BlockPos,
        size: [i64; 3],
    ) -> Option<Vec<BlockPos>> {
        let world = self.worlds.get(env_id)?;
        if !world.loaded {
            return None;
        }
        let (mx, my, mz) = min;
        let [w, h, d] = size;
        let mut found: Vec<BlockPos> = world
            .blocks
            .iter()
            .filter(|(_, k)| k.as_str() == kind)
            .map(|(pos, _)| *pos)
            .filter(|(x, y, z)| {
                (mx..mx + w).contains(x) && (my..my + h).contains(y) && (mz..mz + d).contains(z)
            })
            .collect();
        found.sort_by_key(|(x, y, z)| (*x, *z, *y));
        Some(found)
    }

    fn load(&self, env_id: &str) -> Result<bool, EnvironmentError> {
        let mut world = self.worlds.entry(env_id.to_string()).or_insert_with(|| SandboxWorld {
            loaded: false,
            blocks: HashMap::new(),
        });
        if world.loaded {
            return Err(EnvironmentError::InUse(env_id.to_string()));
        }
        let reused = !world.blocks.is_empty();
        world.loaded = true;
        Ok(reused)
    }

    fn unload(&self, env_id: &str) -> bool {
        match self.worlds.get_mut(env_id) {
            Some(mut world) if world.loaded => {
                world.loaded = false;
                true
            }
            _ => false,
        }
    }

    /// Loaded worlds are never removed; a newer owner may hold them.
    fn remove(&self, env_id: &str) -> bool {
        self.worlds.remove_if(env_id, |_, w| !w.loaded).is_some()
    }
}

/// [`EnvironmentProvider`] backed by [`SandboxWorlds`].
pub struct SandboxEnvironmentProvider {
    worlds: Arc<SandboxWorlds>,
}

impl SandboxEnvironmentProvider {
    pub fn new(worlds: Arc<SandboxWorlds>) -> Self {
        Self { worlds }
    }
}

#[async_trait]
impl EnvironmentProvider for SandboxEnvironmentProvider {
    async fn acquire(&self, env_id: &str) -> Result<Option<AcquiredEnvironment>, EnvironmentError> {
        if env_id.trim().is_empty() {
            return Err(EnvironmentError::creation_failed(env_id, "empty environment id"));
        }
        let reused = self.worlds.load(env_id)?;
        tracing::debug!(env_id = %env_id, reused, "Sandbox environment loaded");
        Ok(Some(AcquiredEnvironment {
            handle: EnvironmentHandle::new(env_id),
            reused,
        }))
    }

    async fn release(&self, environment: &EnvironmentHandle) -> bool {
        let released = self.worlds.unload(environment.id());
        if released {
            tracing::debug!(env_id = %environment, "Sandbox environment unloaded");
        }
        released
    }

    async fn purge(&self, env_id: &str) -> bool {
        let purged = self.worlds.remove(env_id);
        if purged {
            tracing::debug!(env_id = %env_id, "Sandbox environment purged");
        }
        purged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> (Arc<SandboxWorlds>, SandboxEnvironmentProvider) {
        let worlds = Arc::new(SandboxWorlds::new());
        (worlds.clone(), SandboxEnvironmentProvider::new(worlds))
    }

    #[tokio::test]
    async fn acquire_creates_fresh_world() {
        let (worlds, provider) = provider();

        let acquired = provider.acquire("PUBLIC_course1").await.unwrap().unwrap();

        assert_eq!(acquired.handle.id(), "PUBLIC_course1");
        assert!(!acquired.reused);
        assert!(worlds.is_loaded("PUBLIC_course1"));
    }

    #[tokio::test]
    async fn loaded_world_cannot_be_acquired_twice() {
        let (_, provider) = provider();
        provider.acquire("course1_abc").await.unwrap();

        let second = provider.acquire("course1_abc").await;
        assert!(matches!(second, Err(EnvironmentError::InUse(_))));
    }

    #[tokio::test]
    async fn released_world_with_content_is_reused_until_purged() {
        let (worlds, provider) = provider();
        let acquired = provider.acquire("PUBLIC_course1").await.unwrap().unwrap();
        assert!(worlds.write_blocks("PUBLIC_course1", [((0, 100, 0), "stone".to_string())]));

        assert!(provider.release(&acquired.handle).await);
        assert!(!provider.release(&acquired.handle).await);
        assert!(!worlds.write_blocks("PUBLIC_course1", [((1, 100, 0), "stone".to_string())]));

        let again = provider.acquire("PUBLIC_course1").await.unwrap().unwrap();
        assert!(again.reused);
        assert_eq!(worlds.block_count("PUBLIC_course1"), 1);

        assert!(!provider.purge("PUBLIC_course1").await);
        provider.release(&again.handle).await;
        assert!(provider.purge("PUBLIC_course1").await);
        assert!(!provider.purge("PUBLIC_course1").await);
        assert!(!worlds.exists("PUBLIC_course1"));
    }

    #[test]
    fn find_blocks_scans_the_box_in_x_z_y_order() {
        let worlds = SandboxWorlds::new();
        worlds.load("w").unwrap();
        worlds.write_blocks(
            "w",
            [
                ((10, 100, 0), "marker".to_string()),
                ((2, 101, 3), "marker".to_string()),
                ((2, 102, 1), "marker".to_string()),
                ((1, 100, 0), "stone".to_string()),
                ((300, 100, 0), "marker".to_string()),
                ((-1, 100, 0), "marker".to_string()),
            ],
        );

        let found = worlds
            .find_blocks("w", "marker", (0, 100, 0), [300, 4, 8])
            .unwrap();
        assert_eq!(found, vec![(2, 102, 1), (2, 101, 3), (10, 100, 0)]);
        assert!(worlds
            .find_blocks("missing", "marker", (0, 0, 0), [1, 1, 1])
            .is_none());
    }
}
