//! Collector pipeline module initialization.
//!
//! ```text
//! sources --> processors --> seal --> DurableBuffer (shared with transport)
//! ```

use anyhow::Result;

use logpost_core::config::LogpostConfig;
use logpost_core::plugin::{DynPlugin, PipelinePlugin, PluginInfo, PluginType};
use logpost_log_pipeline::{CollectorPipelineBuilder, KeyReloader};
use logpost_spool::DurableBuffer;

/// Plugin name used in the registry and health reports.
pub const NAME: &str = "collector";

/// Initialize the collector pipeline.
///
/// Returns `None` when the collector is disabled. Key material is loaded
/// here, so a missing or unreadable key file fails daemon startup.
pub fn init(
    config: &LogpostConfig,
    buffer: Option<&DurableBuffer>,
) -> Result<Option<(Box<dyn DynPlugin>, KeyReloader)>> {
    if !config.collector.enabled {
        tracing::info!("collector disabled in configuration");
        return Ok(None);
    }
    let buffer = buffer
        .ok_or_else(|| anyhow::anyhow!("collector requires the durable buffer"))?
        .clone();

    tracing::info!(
        sources = config.collector.sources.len(),
        processors = config.collector.processors.len(),
        "initializing collector"
    );
    let pipeline = CollectorPipelineBuilder::new()
        .config(config)
        .buffer(buffer)
        .build()
        .map_err(|e| anyhow::anyhow!("failed to build collector pipeline: {}", e))?;
    let reloader = pipeline.key_reloader();

    let plugin = PipelinePlugin::new(
        PluginInfo::new(
            NAME,
            "local sources, processors and sealing into the durable buffer",
            PluginType::Collector,
        ),
        pipeline,
    );
    Ok(Some((Box::new(plugin), reloader)))
}
