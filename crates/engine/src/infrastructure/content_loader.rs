//! JSON content packages pasted into sandbox environments.
//!
//! Layout on disk:
//! - `<packages_dir>/<name>.json`: one package per file
//! - `<import_dir>/<name>.json`: raw packages waiting to be imported
//! - `catalog_path`: `{"course1": {"package": "course1"}}`, map name to package
//!
//! A package describes a bounded block volume:
//!
//! ```json
//! {
//!   "size": [16, 8, 16],
//!   "entry": [2.5, 1.0, 2.5],
//!   "blocks": [{"x": 2, "y": 0, "z": 2, "kind": "marker"}]
//! }
//! ```
//!
//! `entry` is optional and relative to the paste origin. Blocks of kind
//! `marker` designate the entry marker; the entry point is the top centre of
//! the marker block.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::infrastructure::ports::{ContentError, ContentLoader, MarkerHint};
use crate::infrastructure::sandbox::{BlockPos, SandboxWorlds};
use mapshard_domain::{Coordinate, EnvironmentHandle, MapName};

/// Block kind that marks the entry point.
pub const MARKER_BLOCK: &str = "marker";
/// Offset from a marker block's corner to where players are placed.
pub const MARKER_ENTRY_OFFSET: Coordinate = Coordinate::new(0.5, 1.0, 0.5);

const PACKAGE_EXTENSION: &str = "json";

// =============================================================================
// Package format
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageBlock {
    pub x: i64,
    pub y: i64,
    pub z: i64,
    pub kind: String,
}

/// A parsed content package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentPackage {
    /// Volume dimensions; every block must lie inside `[0, size)`.
    pub size: [i64; 3],
    #[serde(default)]
    pub entry: Option<[f64; 3]>,
    #[serde(default)]
    pub blocks: Vec<PackageBlock>,
}

impl ContentPackage {
    fn validate(&self, name: &str) -> Result<(), ContentError> {
        if self.size.iter().any(|d| *d <= 0) {
            return Err(ContentError::invalid_package(name, "size must be positive"));
        }
        let [w, h, d] = self.size;
        if let Some(b) = self
            .blocks
            .iter()
            .find(|b| !(0..w).contains(&b.x) || !(0..h).contains(&b.y) || !(0..d).contains(&b.z))
        {
            return Err(ContentError::invalid_package(
                name,
                format!("block at ({}, {}, {}) lies outside the volume", b.x, b.y, b.z),
            ));
        }
        Ok(())
    }

    fn parse(name: &str, raw: &str) -> Result<Self, ContentError> {
        let package: ContentPackage =
            serde_json::from_str(raw).map_err(|e| ContentError::invalid_package(name, e))?;
        package.validate(name)?;
        Ok(package)
    }
}

#[derive(Debug, Clone, Deserialize)]
struct CatalogEntry {
    package: String,
}

// =============================================================================
// Loader
// =============================================================================

/// [`ContentLoader`] reading packages from disk into [`SandboxWorlds`].
pub struct PackageContentLoader {
    worlds: Arc<SandboxWorlds>,
    packages_dir: PathBuf,
    import_dir: PathBuf,
    catalog_path: PathBuf,
    catalog: RwLock<HashMap<MapName, String>>,
    /// Parsed packages; invalidated on import and removal
    packages: DashMap<String, Arc<ContentPackage>>,
}

impl PackageContentLoader {
    pub fn new(
        worlds: Arc<SandboxWorlds>,
        packages_dir: impl Into<PathBuf>,
        import_dir: impl Into<PathBuf>,
        catalog_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            worlds,
            packages_dir: packages_dir.into(),
            import_dir: import_dir.into(),
            catalog_path: catalog_path.into(),
            catalog: RwLock::new(HashMap::new()),
            packages: DashMap::new(),
        }
    }

    fn package_path(dir: &Path, name: &str) -> PathBuf {
        dir.join(format!("{name}.{PACKAGE_EXTENSION}"))
    }

    /// Package names end up in file paths, so they follow the map name rules.
    fn checked_name(name: &str) -> Result<String, ContentError> {
        MapName::new(name)
            .map(|n| n.as_str().to_string())
            .map_err(|e| ContentError::invalid_package(name, e))
    }

    async fn read_package(dir: &Path, name: &str) -> Result<ContentPackage, ContentError> {
        let path = Self::package_path(dir, name);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ContentError::PackageNotFound(name.to_string()))
            }
            Err(e) => return Err(ContentError::storage("read_package", e)),
        };
        ContentPackage::parse(name, &raw)
    }

    async fn load_package(&self, name: &str) -> Result<Arc<ContentPackage>, ContentError> {
        if let Some(cached) = self.packages.get(name) {
            return Ok(cached.clone());
        }
        let package = Arc::new(Self::read_package(&self.packages_dir, name).await?);
        self.packages.insert(name.to_string(), package.clone());
        Ok(package)
    }
}

#[async_trait]
impl ContentLoader for PackageContentLoader {
    async fn populate(
        &self,
        map: &MapName,
        environment: &EnvironmentHandle,
        origin: Coordinate,
    ) -> Result<Option<Coordinate>, ContentError> {
        let package_name = self
            .package_for(map)
            .ok_or_else(|| ContentError::UnknownMap(map.to_string()))?;
        let package = self.load_package(&package_name).await?;

        let (ox, oy, oz) = origin.block();
        let blocks = package
            .blocks
            .iter()
            .map(|b| ((ox + b.x, oy + b.y, oz + b.z), b.kind.clone()));
        if !self.worlds.write_blocks(environment.id(), blocks) {
            return Err(ContentError::EnvironmentUnavailable(environment.to_string()));
        }

        tracing::debug!(
            map = %map,
            package = %package_name,
            env_id = %environment,
            blocks = package.blocks.len(),
            "Pasted content package"
        );
        Ok(package
            .entry
            .map(|[x, y, z]| origin.offset(Coordinate::new(x, y, z))))
    }

    async fn locate_marker(
        &self,
        environment: &EnvironmentHandle,
        hint: &MarkerHint,
    ) -> Result<Option<Coordinate>, ContentError> {
        // Only the volume the map's package was pasted into is scanned
        let package_name = self
            .package_for(&hint.map_name)
            .ok_or_else(|| ContentError::UnknownMap(hint.map_name.to_string()))?;
        let package = self.load_package(&package_name).await?;
        let found = self
            .worlds
            .find_blocks(environment.id(), MARKER_BLOCK, hint.origin.block(), package.size)
            .ok_or_else(|| ContentError::EnvironmentUnavailable(environment.to_string()))?;
        Ok(found.first().map(|(x, y, z): &BlockPos| {
            Coordinate::new(*x as f64, *y as f64, *z as f64).offset(MARKER_ENTRY_OFFSET)
        }))
    }

    fn package_for(&self, map: &MapName) -> Option<String> {
        self.catalog
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(map)
            .cloned()
    }

    fn available_maps(&self) -> Vec<MapName> {
        let mut maps: Vec<MapName> = self
            .catalog
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        maps.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        maps
    }

    async fn import_package(&self, source: &str, target: &str) -> Result<(), ContentError> {
        let source = Self::checked_name(source)?;
        let target = Self::checked_name(target)?;

        // Parse before copying so a broken file never reaches the package dir.
        Self::read_package(&self.import_dir, &source).await?;

        tokio::fs::create_dir_all(&self.packages_dir)
            .await
            .map_err(|e| ContentError::storage("import_package", e))?;
        tokio::fs::copy(
            Self::package_path(&self.import_dir, &source),
            Self::package_path(&self.packages_dir, &target),
        )
        .await
        .map_err(|e| ContentError::storage("import_package", e))?;
        self.packages.remove(&target);

        tracing::info!(source = %source, target = %target, "Imported content package");
        Ok(())
    }

    async fn remove_package(&self, name: &str) -> Result<bool, ContentError> {
        let name = Self::checked_name(name)?;
        self.packages.remove(&name);
        match tokio::fs::remove_file(Self::package_path(&self.packages_dir, &name)).await {
            Ok(()) => {
                tracing::info!(package = %name, "Removed content package");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(ContentError::storage("remove_package", e)),
        }
    }

    async fn reload_catalog(&self) -> Result<usize, ContentError> {
        let raw = match tokio::fs::read_to_string(&self.catalog_path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    path = %self.catalog_path.display(),
                    "Map catalog not found, no maps registered"
                );
                "{}".to_string()
            }
            Err(e) => return Err(ContentError::storage("reload_catalog", e)),
        };
        let entries: HashMap<MapName, CatalogEntry> = serde_json::from_str(&raw)
            .map_err(|e| ContentError::storage("reload_catalog", e))?;

        let catalog: HashMap<MapName, String> = entries
            .into_iter()
            .map(|(map, entry)| (map, entry.package))
            .collect();
        let count = catalog.len();
        *self.catalog.write().unwrap_or_else(PoisonError::into_inner) = catalog;
        self.packages.clear();

        tracing::info!(maps = count, "Map catalog loaded");
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        root: PathBuf,
        worlds: Arc<SandboxWorlds>,
        loader: PackageContentLoader,
    }

    const COURSE: &str = r#"{
        "size": [8, 4, 8],
        "blocks": [
            {"x": 0, "y": 0, "z": 0, "kind": "stone"},
            {"x": 5, "y": 0, "z": 5, "kind": "marker"}
        ]
    }"#;

    async fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        std::fs::create_dir_all(root.join("packages")).unwrap();
        std::fs::create_dir_all(root.join("import")).unwrap();
        std::fs::write(root.join("packages/course1.json"), COURSE).unwrap();
        std::fs::write(
            root.join("maps.json"),
            r#"{"course1": {"package": "course1"}, "course2": {"package": "course2"}}"#,
        )
        .unwrap();

        let worlds = Arc::new(SandboxWorlds::new());
        let loader = PackageContentLoader::new(
            worlds.clone(),
            root.join("packages"),
            root.join("import"),
            root.join("maps.json"),
        );
        assert_eq!(loader.reload_catalog().await.unwrap(), 2);
        Fixture {
            _dir: dir,
            root,
            worlds,
            loader,
        }
    }

    async fn loaded_env(worlds: &Arc<SandboxWorlds>, id: &str) -> EnvironmentHandle {
        use crate::infrastructure::ports::EnvironmentProvider;
        use crate::infrastructure::sandbox::SandboxEnvironmentProvider;
        SandboxEnvironmentProvider::new(worlds.clone())
            .acquire(id)
            .await
            .unwrap()
            .unwrap()
            .handle
    }

    fn map(name: &str) -> MapName {
        MapName::new(name).unwrap()
    }

    #[tokio::test]
    async fn populate_pastes_blocks_and_marker_is_found() {
        let f = fixture().await;
        let env = loaded_env(&f.worlds, "PUBLIC_course1").await;
        let origin = Coordinate::new(0.0, 100.0, 0.0);

        let entry = f.loader.populate(&map("course1"), &env, origin).await.unwrap();
        assert_eq!(entry, None);
        assert_eq!(f.worlds.block_at("PUBLIC_course1", (5, 100, 5)).as_deref(), Some("marker"));

        let hint = MarkerHint {
            map_name: map("course1"),
            origin,
        };
        let marker = f.loader.locate_marker(&env, &hint).await.unwrap();
        assert_eq!(marker, Some(Coordinate::new(5.5, 101.0, 5.5)));
    }

    #[tokio::test]
    async fn marker_scan_covers_the_whole_package_volume() {
        let f = fixture().await;
        std::fs::write(
            f.root.join("packages/course1.json"),
            r#"{
                "size": [300, 4, 8],
                "blocks": [
                    {"x": 250, "y": 2, "z": 3, "kind": "marker"},
                    {"x": 260, "y": 0, "z": 0, "kind": "marker"}
                ]
            }"#,
        )
        .unwrap();
        let env = loaded_env(&f.worlds, "PUBLIC_course1").await;
        let origin = Coordinate::new(0.0, 100.0, 0.0);
        f.loader.populate(&map("course1"), &env, origin).await.unwrap();
        // Outside the pasted volume
        f.worlds.write_blocks("PUBLIC_course1", [((5, 99, 0), "marker".to_string())]);

        let hint = MarkerHint {
            map_name: map("course1"),
            origin,
        };
        let marker = f.loader.locate_marker(&env, &hint).await.unwrap();
        assert_eq!(marker, Some(Coordinate::new(250.5, 103.0, 3.5)));

        let unknown = MarkerHint {
            map_name: map("nope"),
            origin,
        };
        assert!(matches!(
            f.loader.locate_marker(&env, &unknown).await,
            Err(ContentError::UnknownMap(_))
        ));
    }

    #[tokio::test]
    async fn explicit_entry_is_relative_to_origin() {
        let f = fixture().await;
        std::fs::write(
            f.root.join("packages/course1.json"),
            r#"{"size": [1, 1, 1], "entry": [0.5, 2.0, 0.5]}"#,
        )
        .unwrap();
        let env = loaded_env(&f.worlds, "e").await;

        let entry = f
            .loader
            .populate(&map("course1"), &env, Coordinate::new(10.0, 64.0, 10.0))
            .await
            .unwrap();
        assert_eq!(entry, Some(Coordinate::new(10.5, 66.0, 10.5)));
    }

    #[tokio::test]
    async fn populate_failures() {
        let f = fixture().await;
        let env = loaded_env(&f.worlds, "e").await;
        let origin = Coordinate::default();

        let unknown = f.loader.populate(&map("nope"), &env, origin).await;
        assert!(matches!(unknown, Err(ContentError::UnknownMap(_))));

        // course2 is registered but has no package file
        let missing = f.loader.populate(&map("course2"), &env, origin).await;
        assert!(matches!(missing, Err(ContentError::PackageNotFound(_))));

        let unloaded = EnvironmentHandle::new("not-loaded");
        let result = f.loader.populate(&map("course1"), &unloaded, origin).await;
        assert!(matches!(result, Err(ContentError::EnvironmentUnavailable(_))));
    }

    #[tokio::test]
    async fn import_validates_and_remove_reports_existence() {
        let f = fixture().await;
        std::fs::write(f.root.join("import/raw.json"), COURSE).unwrap();
        std::fs::write(f.root.join("import/broken.json"), r#"{"size": [0, 1, 1]}"#).unwrap();

        f.loader.import_package("raw", "course2").await.unwrap();
        assert!(f.root.join("packages/course2.json").exists());

        let broken = f.loader.import_package("broken", "course3").await;
        assert!(matches!(broken, Err(ContentError::InvalidPackage { .. })));
        assert!(!f.root.join("packages/course3.json").exists());

        let traversal = f.loader.import_package("../maps", "x").await;
        assert!(matches!(traversal, Err(ContentError::InvalidPackage { .. })));

        assert!(f.loader.remove_package("course2").await.unwrap());
        assert!(!f.loader.remove_package("course2").await.unwrap());
    }

    #[tokio::test]
    async fn reload_picks_up_catalog_changes() {
        let f = fixture().await;
        std::fs::write(f.root.join("maps.json"), r#"{"solo": {"package": "course1"}}"#).unwrap();

        assert_eq!(f.loader.reload_catalog().await.unwrap(), 1);
        assert_eq!(f.loader.available_maps(), vec![map("solo")]);
        assert_eq!(f.loader.package_for(&map("solo")).as_deref(), Some("course1"));
        assert_eq!(f.loader.package_for(&map("course1")), None);
    }
}
