//! Application state and composition.

use std::sync::Arc;

use anyhow::Context;

use crate::infrastructure::{
    access_policy::RuleAccessPolicy,
    clock::{SystemClock, SystemRandom},
    config::AppConfig,
    content_loader::PackageContentLoader,
    event_bus::InstanceEventBus,
    ports::{AccessPolicy, ClockPort, ContentLoader, EnvironmentProvider, PlayerTransport, RandomPort},
    sandbox::{SandboxEnvironmentProvider, SandboxWorlds},
    transport::LoggingTransport,
};
use crate::use_cases::{ContentAdmin, InstanceOrchestrator};
use mapshard_domain::{InstanceId, MapName};

/// Main application state.
///
/// Holds the orchestrator and the content administration use case. All
/// collaborators are injected as `Arc<dyn Port>`.
pub struct App {
    pub orchestrator: InstanceOrchestrator,
    pub content_admin: Arc<ContentAdmin>,
}

impl App {
    pub fn new(
        environments: Arc<dyn EnvironmentProvider>,
        content: Arc<dyn ContentLoader>,
        access: Arc<dyn AccessPolicy>,
        transport: Arc<dyn PlayerTransport>,
        config: &AppConfig,
    ) -> Self {
        let clock: Arc<dyn ClockPort> = Arc::new(SystemClock::new());
        let random: Arc<dyn RandomPort> = Arc::new(SystemRandom::new());
        let events = InstanceEventBus::new(config.event_capacity);

        let orchestrator = InstanceOrchestrator::new(
            environments,
            content.clone(),
            access,
            transport,
            clock,
            random,
            events,
            config.lifecycle.clone(),
        );
        let content_admin = Arc::new(ContentAdmin::new(content, orchestrator.clone()));

        Self {
            orchestrator,
            content_admin,
        }
    }

    /// Wire the reference adapters: sandbox environments, on-disk content
    /// packages, rule-based access and a logging transport.
    pub async fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let worlds = Arc::new(SandboxWorlds::new());
        let environments = Arc::new(SandboxEnvironmentProvider::new(worlds.clone()));

        let content = Arc::new(PackageContentLoader::new(
            worlds,
            &config.packages_dir,
            &config.import_dir,
            &config.catalog_path,
        ));
        content
            .reload_catalog()
            .await
            .with_context(|| format!("loading map catalog {}", config.catalog_path.display()))?;

        let access = match &config.access_rules_path {
            Some(path) => RuleAccessPolicy::from_file(path)
                .with_context(|| format!("loading access rules {}", path.display()))?,
            None => {
                tracing::info!("No access rules configured, all maps are open");
                RuleAccessPolicy::open()
            }
        };

        Ok(Self::new(
            environments,
            content,
            Arc::new(access),
            Arc::new(LoggingTransport::new()),
            config,
        ))
    }

    /// Create the public instance of every map in `maps`.
    pub fn warm_public_maps(&self, maps: &[MapName]) -> Vec<InstanceId> {
        maps.iter()
            .map(|map| {
                let id = self.orchestrator.create_public(map);
                tracing::info!(instance_id = %id, "Warming public instance");
                id
            })
            .collect()
    }
}
