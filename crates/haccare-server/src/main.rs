//! hacCare simulation engine host process.
//!
//! Connects to SurrealDB, applies pending migrations, resolves schema
//! capabilities and runs the timer-expiry sweep until interrupted.

use std::time::Duration;

use chrono::Utc;
use haccare_core::registry::EntityRegistry;
use haccare_db::{DbConfig, DbManager, SurrealRepositories};
use haccare_sim::{LifecycleConfig, SimulationLifecycleManager};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

const DEFAULT_SWEEP_SECS: u64 = 60;

fn lifecycle_config() -> Result<LifecycleConfig, uuid::Error> {
    let mut config = LifecycleConfig::default();
    if let Ok(value) = std::env::var("HACCARE_FALLBACK_PARENT_TENANT") {
        config.fallback_parent_tenant_id = Some(Uuid::parse_str(value.trim())?);
    }
    if let Ok(prefix) = std::env::var("HACCARE_BARCODE_PREFIX") {
        config.barcode_prefix = prefix;
    }
    Ok(config)
}

fn sweep_interval() -> Duration {
    let secs = std::env::var("HACCARE_EXPIRY_SWEEP_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .filter(|secs| *secs > 0)
        .unwrap_or(DEFAULT_SWEEP_SECS);
    Duration::from_secs(secs)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("haccare=info")),
        )
        .json()
        .init();

    info!("Starting hacCare simulation engine...");

    let db = DbManager::connect(&DbConfig::from_env()).await?;
    haccare_db::run_migrations(db.client()).await?;
    let capabilities = haccare_db::detect_capabilities(db.client()).await?;
    let registry = EntityRegistry::standard(capabilities)?;
    info!(
        kinds = ?registry.supported_order(),
        "Entity registry ready"
    );

    let manager = SimulationLifecycleManager::new(
        SurrealRepositories::new(db.client().clone()),
        registry,
        lifecycle_config()?,
    );

    let mut ticker = tokio::time::interval(sweep_interval());
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(err) = manager.expire_due(Utc::now()).await {
                    error!(error = %err, "Expiry sweep failed");
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    info!("hacCare simulation engine stopped.");
    Ok(())
}
