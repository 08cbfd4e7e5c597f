//! Module initialization.
//!
//! Each logpost component is built from its config section, wrapped in a
//! [`PipelinePlugin`](logpost_core::plugin::PipelinePlugin) and registered
//! in the orchestrator's plugin registry.
//!
//! Registration order is collector, transport, intake. The registry stops
//! plugins in the same order, so the collector seals its last partial batch
//! into the durable buffer before the transport runs its final drain.

pub mod collector;
pub mod intake;
pub mod transport;

use std::sync::Arc;

use logpost_intake::KeyStore;
use logpost_log_pipeline::KeyReloader;

/// Handles that survive plugin registration and serve SIGHUP key reloads.
#[derive(Default, Clone)]
pub struct ReloadHandles {
    /// Collector sealing keys.
    pub collector: Option<KeyReloader>,
    /// Intake verification key cache.
    pub intake: Option<Arc<KeyStore>>,
}

impl ReloadHandles {
    /// Reload every registered key source.
    ///
    /// A failed collector reload keeps the previous keys and is logged;
    /// it never stops the daemon.
    pub async fn reload(&self) {
        if let Some(collector) = &self.collector {
            if let Err(e) = collector.reload().await {
                tracing::error!(error = %e, "sealing key reload failed, keeping previous keys");
            }
        }
        if let Some(keys) = &self.intake {
            keys.reload();
            tracing::info!("intake verification keys will be re-read on next request");
        }
    }

    /// Whether anything reacts to SIGHUP.
    pub fn is_empty(&self) -> bool {
        self.collector.is_none() && self.intake.is_none()
    }
}
