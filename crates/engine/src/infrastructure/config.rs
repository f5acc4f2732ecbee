//! Runtime configuration loaded from `MAPSHARD_*` environment variables.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;

use mapshard_domain::{Coordinate, MapName};

/// Default grace period between an instance becoming empty and its teardown.
pub const DEFAULT_CLEANUP_DELAY_SECONDS: u64 = 15;
/// Default time a ready instance may stay without any joiner.
pub const DEFAULT_NO_JOIN_CLEANUP_DELAY_SECONDS: u64 = 60;
/// Default event bus buffer per subscriber.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Tunables for the instance lifecycle.
#[derive(Debug, Clone, PartialEq)]
pub struct LifecycleConfig {
    /// Grace period after an instance becomes empty.
    pub cleanup_delay: Duration,
    /// How long a ready instance waits for its first occupant.
    pub no_join_cleanup_delay: Duration,
    /// Where content packages are pasted.
    pub paste_origin: Coordinate,
    /// Offset from the paste origin used when no entry point is found.
    pub entry_fallback_offset: Coordinate,
    /// Route environment acquisition through a single-permit lane.
    pub serialize_environment_acquire: bool,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            cleanup_delay: Duration::from_secs(DEFAULT_CLEANUP_DELAY_SECONDS),
            no_join_cleanup_delay: Duration::from_secs(DEFAULT_NO_JOIN_CLEANUP_DELAY_SECONDS),
            paste_origin: Coordinate::new(0.0, 100.0, 0.0),
            entry_fallback_offset: Coordinate::new(0.0, 1.0, 0.0),
            serialize_environment_acquire: true,
        }
    }
}

/// Full application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub lifecycle: LifecycleConfig,
    /// Directory holding `<name>.json` content packages.
    pub packages_dir: PathBuf,
    /// Directory raw packages are imported from.
    pub import_dir: PathBuf,
    /// Map name to package catalog.
    pub catalog_path: PathBuf,
    /// Access rules file. Without one every player may join every map.
    pub access_rules_path: Option<PathBuf>,
    pub event_capacity: usize,
    /// Public instances created at startup.
    pub warm_public_maps: Vec<MapName>,
}

impl AppConfig {
    /// Read configuration from the process environment.
    ///
    /// Missing numeric values fall back to their defaults; malformed
    /// coordinates and map names are reported as errors.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let cleanup_delay_seconds: u64 = get("MAPSHARD_CLEANUP_DELAY_SECONDS")
            .unwrap_or_else(|| DEFAULT_CLEANUP_DELAY_SECONDS.to_string())
            .parse()
            .unwrap_or(DEFAULT_CLEANUP_DELAY_SECONDS);
        let no_join_seconds: u64 = get("MAPSHARD_NO_JOIN_CLEANUP_DELAY_SECONDS")
            .unwrap_or_else(|| DEFAULT_NO_JOIN_CLEANUP_DELAY_SECONDS.to_string())
            .parse()
            .unwrap_or(DEFAULT_NO_JOIN_CLEANUP_DELAY_SECONDS);

        let paste_origin: Coordinate = get("MAPSHARD_PASTE_ORIGIN")
            .unwrap_or_else(|| "0,100,0".into())
            .parse()
            .context("MAPSHARD_PASTE_ORIGIN must be \"x,y,z\"")?;
        let entry_fallback_offset: Coordinate = get("MAPSHARD_ENTRY_FALLBACK_OFFSET")
            .unwrap_or_else(|| "0,1,0".into())
            .parse()
            .context("MAPSHARD_ENTRY_FALLBACK_OFFSET must be \"x,y,z\"")?;

        let serialize_environment_acquire = get("MAPSHARD_SERIALIZE_ENV_ACQUIRE")
            .map(|v| !matches!(v.trim().to_ascii_lowercase().as_str(), "false" | "0" | "no"))
            .unwrap_or(true);

        let data_dir = PathBuf::from(get("MAPSHARD_DATA_DIR").unwrap_or_else(|| "data".into()));
        let packages_dir = get("MAPSHARD_PACKAGES_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("packages"));
        let import_dir = get("MAPSHARD_IMPORT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("import"));
        let catalog_path = get("MAPSHARD_CATALOG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("maps.json"));
        let access_rules_path = get("MAPSHARD_ACCESS_RULES_PATH").map(PathBuf::from);

        let event_capacity: usize = get("MAPSHARD_EVENT_CAPACITY")
            .unwrap_or_else(|| DEFAULT_EVENT_CAPACITY.to_string())
            .parse()
            .unwrap_or(DEFAULT_EVENT_CAPACITY)
            .max(1);

        let warm_public_maps = get("MAPSHARD_WARM_PUBLIC_MAPS")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| MapName::new(s).with_context(|| format!("invalid warm map name: {s}")))
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(Self {
            lifecycle: LifecycleConfig {
                cleanup_delay: Duration::from_secs(cleanup_delay_seconds),
                no_join_cleanup_delay: Duration::from_secs(no_join_seconds),
                paste_origin,
                entry_fallback_offset,
                serialize_environment_acquire,
            },
            packages_dir,
            import_dir,
            catalog_path,
            access_rules_path,
            event_capacity,
            warm_public_maps,
        })
    }
}
