//! Transport module initialization.
//!
//! ```text
//! DurableBuffer --drain--> HTTP POST --> remote intake
//! ```

use anyhow::Result;

use logpost_core::config::LogpostConfig;
use logpost_core::plugin::{DynPlugin, PipelinePlugin, PluginInfo, PluginType};
use logpost_spool::DurableBuffer;
use logpost_transport::TransportClientBuilder;

/// Plugin name used in the registry and health reports.
pub const NAME: &str = "transport";

/// Initialize the transport client. Returns `None` when disabled.
pub fn init(
    config: &LogpostConfig,
    buffer: Option<&DurableBuffer>,
) -> Result<Option<Box<dyn DynPlugin>>> {
    if !config.transport.enabled {
        tracing::info!("transport disabled in configuration");
        return Ok(None);
    }
    let buffer = buffer
        .ok_or_else(|| anyhow::anyhow!("transport requires the durable buffer"))?
        .clone();

    tracing::info!(endpoint = %config.transport.endpoint, "initializing transport");
    let client = TransportClientBuilder::new()
        .config(config)
        .buffer(buffer)
        .build()
        .map_err(|e| anyhow::anyhow!("failed to build transport client: {}", e))?;

    let plugin = PipelinePlugin::new(
        PluginInfo::new(
            NAME,
            "drains the durable buffer to the remote intake",
            PluginType::Transport,
        ),
        client,
    );
    Ok(Some(Box::new(plugin)))
}
