//! Intake server module initialization.

use std::sync::Arc;

use anyhow::Result;

use logpost_core::config::LogpostConfig;
use logpost_core::plugin::{DynPlugin, PipelinePlugin, PluginInfo, PluginType};
use logpost_intake::{IntakeServerBuilder, KeyStore, RecordStore};

/// Plugin name used in the registry and health reports.
pub const NAME: &str = "intake";

/// Initialize the intake server and open its record store.
///
/// Returns `None` when disabled. The returned key store handle is the one
/// the server verifies with, so clearing it on SIGHUP picks up rotated keys.
pub async fn init(config: &LogpostConfig) -> Result<Option<(Box<dyn DynPlugin>, Arc<KeyStore>)>> {
    if !config.intake.enabled {
        tracing::info!("intake disabled in configuration");
        return Ok(None);
    }

    let db_path = config.intake_database_path();
    tracing::info!(
        bind_addr = %config.intake.bind_addr,
        database = %db_path.display(),
        clients = config.intake.clients.len(),
        "initializing intake"
    );
    let store = RecordStore::open(&db_path)
        .await
        .map_err(|e| anyhow::anyhow!("failed to open intake store {}: {}", db_path.display(), e))?;
    let server = IntakeServerBuilder::new()
        .config(config)
        .store(store)
        .build()
        .map_err(|e| anyhow::anyhow!("failed to build intake server: {}", e))?;
    let keys = server.keys();

    let plugin = PipelinePlugin::new(
        PluginInfo::new(
            NAME,
            "authenticates, verifies and stores sealed batches",
            PluginType::Intake,
        ),
        server,
    );
    Ok(Some((Box::new(plugin), keys)))
}
