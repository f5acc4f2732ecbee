//! Content package administration.

use std::sync::Arc;

use crate::infrastructure::ports::{ContentError, ContentLoader};
use crate::use_cases::lifecycle::InstanceOrchestrator;
use mapshard_domain::{InstanceId, MapName};

#[derive(Debug, thiserror::Error)]
pub enum ContentAdminError {
    /// A live instance was built from the package.
    #[error("Package {package} is in use by instance {instance_id}")]
    PackageInUse {
        package: String,
        instance_id: InstanceId,
    },

    #[error(transparent)]
    Content(#[from] ContentError),
}

/// Lists, imports, removes and reloads content packages.
pub struct ContentAdmin {
    content: Arc<dyn ContentLoader>,
    orchestrator: InstanceOrchestrator,
}

impl ContentAdmin {
    pub fn new(content: Arc<dyn ContentLoader>, orchestrator: InstanceOrchestrator) -> Self {
        Self {
            content,
            orchestrator,
        }
    }

    pub fn list_maps(&self) -> Vec<MapName> {
        self.content.available_maps()
    }

    pub async fn import(&self, source: &str, target: &str) -> Result<(), ContentAdminError> {
        self.content.import_package(source, target).await?;
        Ok(())
    }

    /// Delete a package. Refused while any registered instance uses it.
    pub async fn remove(&self, package: &str) -> Result<bool, ContentAdminError> {
        for instance in self.orchestrator.list_instances().await {
            if self.content.package_for(&instance.map_name).as_deref() == Some(package) {
                tracing::warn!(
                    package = %package,
                    instance_id = %instance.id,
                    "Refusing to remove package used by a live instance"
                );
                return Err(ContentAdminError::PackageInUse {
                    package: package.to_string(),
                    instance_id: instance.id,
                });
            }
        }
        Ok(self.content.remove_package(package).await?)
    }

    pub async fn reload(&self) -> Result<usize, ContentAdminError> {
        Ok(self.content.reload_catalog().await?)
    }
}
