//! mapshard Engine - Main entry point.

use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mapshard_engine::infrastructure::config::AppConfig;
use mapshard_engine::App;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment from repo root, then the working directory.
    load_dotenv_from_repo_root();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mapshard_engine=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting mapshard Engine");

    let config = AppConfig::from_env()?;
    tracing::info!(
        cleanup_delay_secs = config.lifecycle.cleanup_delay.as_secs(),
        no_join_delay_secs = config.lifecycle.no_join_cleanup_delay.as_secs(),
        packages_dir = %config.packages_dir.display(),
        "Configuration loaded"
    );

    let app = App::from_config(&config).await?;

    // Log lifecycle events
    let mut events = app.orchestrator.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    tracing::debug!(instance_id = %event.instance_id(), event = ?event, "Lifecycle event")
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event logger fell behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    app.warm_public_maps(&config.warm_public_maps);

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested");

    let destroyed = app.orchestrator.cleanup_all().await;
    tracing::info!(destroyed, "mapshard Engine stopped");
    Ok(())
}

fn load_dotenv_from_repo_root() {
    let repo_root = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..");

    // Prefer local overrides.
    for filename in [".env.local", ".env"] {
        let path = repo_root.join(filename);
        if path.exists() {
            let _ = dotenvy::from_path(path);
        }
    }
    let _ = dotenvy::dotenv();
}
