//! Error types for port operations.

/// Environment provider failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EnvironmentError {
    /// The environment is already loaded by another owner.
    #[error("Environment already in use: {0}")]
    InUse(String),

    /// The provider could not create the environment.
    #[error("Environment creation failed for {env_id}: {message}")]
    CreationFailed { env_id: String, message: String },
}

impl EnvironmentError {
    pub fn creation_failed(env_id: impl ToString, message: impl ToString) -> Self {
        Self::CreationFailed {
            env_id: env_id.to_string(),
            message: message.to_string(),
        }
    }
}

/// Content loading failures - includes the package or map for actionable logs.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ContentError {
    /// No package is registered for the map in the catalog.
    #[error("No content package registered for map: {0}")]
    UnknownMap(String),

    /// The package file does not exist.
    #[error("Content package not found: {0}")]
    PackageNotFound(String),

    /// The package exists but could not be read or parsed.
    #[error("Invalid content package {package}: {message}")]
    InvalidPackage { package: String, message: String },

    /// The target environment is not loaded.
    #[error("Environment not loaded: {0}")]
    EnvironmentUnavailable(String),

    /// Filesystem failure while managing packages.
    #[error("Content storage error in {operation}: {message}")]
    Storage {
        operation: &'static str,
        message: String,
    },
}

impl ContentError {
    pub fn invalid_package(package: impl ToString, message: impl ToString) -> Self {
        Self::InvalidPackage {
            package: package.to_string(),
            message: message.to_string(),
        }
    }

    pub fn storage(operation: &'static str, message: impl ToString) -> Self {
        Self::Storage {
            operation,
            message: message.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::PackageNotFound(_) | Self::UnknownMap(_))
    }
}

/// Player hand-off failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("Player is offline: {0}")]
    Offline(String),
    #[error("Transfer failed: {0}")]
    Failed(String),
}
