//! Component orchestration -- assembly, lifecycle and signal handling.
//!
//! The [`Orchestrator`] is the central coordinator of `logpost-daemon`.
//! It validates configuration, opens the shared durable buffer, builds the
//! enabled components, and runs them until a shutdown signal arrives.
//!
//! # Startup Order
//!
//! 1. Collector (produces sealed envelopes into the buffer)
//! 2. Transport (drains the buffer)
//! 3. Intake (independent receiver)
//!
//! # Shutdown Order (same as startup)
//!
//! 1. Collector (flush partial batch, seal, enqueue)
//! 2. Transport (bounded final drain)
//! 3. Intake (finish in-flight requests)
//!
//! # Signals
//!
//! - `SIGTERM`, `SIGINT`: graceful shutdown
//! - `SIGHUP`: reload sealing keys and clear the intake key cache

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::Result;
use tokio::sync::broadcast;

use logpost_core::config::LogpostConfig;
use logpost_core::metrics as m;
use logpost_core::pipeline::HealthStatus;
use logpost_core::plugin::PluginRegistry;
use logpost_spool::DurableBuffer;

use crate::health::{DaemonHealth, ModuleHealth, aggregate_status};
use crate::metrics_server;
use crate::modules::{self, ReloadHandles};
use crate::pid::{remove_pid_file, write_pid_file};

/// Interval between aggregated health log lines.
const HEALTH_INTERVAL: Duration = Duration::from_secs(30);
/// Interval between uptime gauge updates.
const UPTIME_INTERVAL: Duration = Duration::from_secs(10);

/// The main daemon orchestrator.
pub struct Orchestrator {
    /// Loaded and validated configuration.
    config: LogpostConfig,
    /// Registered components, in start/stop order.
    plugins: PluginRegistry,
    /// Key reload handles for SIGHUP.
    reload: ReloadHandles,
    /// Shared durable buffer (collector and transport).
    buffer: Option<DurableBuffer>,
    /// Shutdown broadcast for background tasks.
    shutdown_tx: broadcast::Sender<()>,
    /// Background tasks spawned by `start`.
    tasks: Vec<tokio::task::JoinHandle<()>>,
    /// PID file written by `start`, removed by `shutdown`.
    pid_file: Option<PathBuf>,
    /// Daemon start time (for uptime reporting).
    start_time: Instant,
}

impl Orchestrator {
    /// Load `logpost.toml`, apply environment overrides, validate, and build.
    pub async fn build(config_path: &Path) -> Result<Self> {
        let config = LogpostConfig::load(config_path)
            .await
            .map_err(|e| anyhow::anyhow!("failed to load config: {}", e))?;
        Self::build_from_config(config).await
    }

    /// Build from an already-loaded configuration.
    ///
    /// Fails if validation fails, the buffer or intake store cannot be
    /// opened, key material cannot be loaded, or a component rejects its
    /// configuration.
    pub async fn build_from_config(config: LogpostConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;

        if config.metrics.enabled {
            metrics_server::install_metrics_recorder(&config.metrics)?;
        }

        let buffer = if config.collector.enabled || config.transport.enabled {
            let path = config.buffer_path();
            tracing::info!(path = %path.display(), "opening durable buffer");
            Some(
                DurableBuffer::open_with_config(&path, &config.buffer)
                    .await
                    .map_err(|e| {
                        anyhow::anyhow!("failed to open durable buffer {}: {}", path.display(), e)
                    })?,
            )
        } else {
            None
        };

        let mut plugins = PluginRegistry::new();
        let mut reload = ReloadHandles::default();

        if let Some((plugin, reloader)) = modules::collector::init(&config, buffer.as_ref())? {
            plugins.register(plugin)?;
            reload.collector = Some(reloader);
        }
        if let Some(plugin) = modules::transport::init(&config, buffer.as_ref())? {
            plugins.register(plugin)?;
        }
        if let Some((plugin, keys)) = modules::intake::init(&config).await? {
            plugins.register(plugin)?;
            reload.intake = Some(keys);
        }

        if plugins.count() == 0 {
            tracing::warn!("no component enabled, daemon will idle until stopped");
        }
        tracing::info!(total_plugins = plugins.count(), "orchestrator initialized");

        if config.metrics.enabled {
            record_daemon_metrics(plugins.count());
        }

        let (shutdown_tx, _) = broadcast::channel(4);
        Ok(Self {
            config,
            plugins,
            reload,
            buffer,
            shutdown_tx,
            tasks: Vec::new(),
            pid_file: None,
            start_time: Instant::now(),
        })
    }

    /// Start every component and block until SIGTERM or SIGINT, then stop.
    pub async fn run(&mut self) -> Result<()> {
        self.start().await?;

        let signal = self.wait_for_shutdown_signal().await;
        match &signal {
            Ok(name) => tracing::info!(signal = name, "shutdown signal received"),
            Err(e) => tracing::error!(error = %e, "signal handling failed, shutting down"),
        }

        self.shutdown().await?;
        signal.map(|_| ())
    }

    /// Write the PID file and start components in registration order.
    ///
    /// If any component fails to start, the ones already running are stopped
    /// and the PID file is removed before the error is returned.
    pub async fn start(&mut self) -> Result<()> {
        if !self.config.general.pid_file.is_empty() {
            let path = PathBuf::from(&self.config.general.pid_file);
            write_pid_file(&path)?;
            self.pid_file = Some(path);
        }

        tracing::info!("initializing all plugins");
        if let Err(e) = self.plugins.init_all().await {
            tracing::error!(error = %e, "plugin initialization failed");
            self.release_pid_file();
            return Err(e.into());
        }

        tracing::info!("starting all plugins");
        if let Err(e) = self.plugins.start_all().await {
            tracing::warn!(error = %e, "startup failed, rolling back already-started plugins");
            if let Err(stop_err) = self.plugins.stop_all().await {
                tracing::error!(
                    startup_error = %e,
                    rollback_error = %stop_err,
                    "rollback also failed during startup failure cleanup"
                );
            }
            self.release_pid_file();
            return Err(e.into());
        }

        if self.config.metrics.enabled {
            self.tasks.push(spawn_uptime_updater(
                self.start_time,
                self.shutdown_tx.subscribe(),
            ));
        }

        tracing::info!(plugins = self.plugins.count(), "logpost-daemon running");
        Ok(())
    }

    /// Stop background tasks and components, then remove the PID file.
    pub async fn shutdown(&mut self) -> Result<()> {
        let _ = self.shutdown_tx.send(());
        for task in self.tasks.drain(..) {
            let _ = task.await;
        }

        tracing::info!("stopping all plugins");
        let result = self.plugins.stop_all().await;

        if let Some(buffer) = &self.buffer {
            match buffer.stats().await {
                Ok(stats) => tracing::info!(
                    backlog = stats.backlog(),
                    delivered_total = stats.delivered_total,
                    "durable buffer state at shutdown"
                ),
                Err(e) => tracing::warn!(error = %e, "failed to read buffer stats at shutdown"),
            }
        }

        self.release_pid_file();
        tracing::info!("logpost-daemon shut down");
        result.map_err(Into::into)
    }

    /// Reload key material as on SIGHUP.
    pub async fn reload_keys(&self) {
        if self.reload.is_empty() {
            tracing::debug!("no key material to reload");
            return;
        }
        self.reload.reload().await;
    }

    /// Current aggregated health status.
    pub async fn health(&self) -> DaemonHealth {
        let modules: Vec<ModuleHealth> = self
            .plugins
            .health_check_all()
            .await
            .into_iter()
            .map(|(name, _state, status)| ModuleHealth {
                name,
                enabled: true,
                status,
            })
            .collect();

        let uptime_secs = self.start_time.elapsed().as_secs();
        if self.config.metrics.enabled {
            #[allow(clippy::cast_precision_loss)]
            metrics::gauge!(m::DAEMON_UPTIME_SECONDS).set(uptime_secs as f64);
        }

        DaemonHealth {
            status: aggregate_status(&modules),
            uptime_secs,
            modules,
        }
    }

    /// Names of registered components, in start order.
    pub fn plugin_names(&self) -> Vec<String> {
        self.plugins.list().into_iter().map(|i| i.name.clone()).collect()
    }

    /// The loaded configuration.
    pub fn config(&self) -> &LogpostConfig {
        &self.config
    }

    fn release_pid_file(&mut self) {
        if let Some(path) = self.pid_file.take() {
            remove_pid_file(&path);
        }
    }

    /// Wait for SIGTERM or SIGINT, serving SIGHUP reloads and periodic
    /// health logging in the meantime. Returns the terminating signal name.
    async fn wait_for_shutdown_signal(&self) -> Result<&'static str> {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigterm = signal(SignalKind::terminate())
            .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {}", e))?;
        let mut sigint = signal(SignalKind::interrupt())
            .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {}", e))?;
        let mut sighup = signal(SignalKind::hangup())
            .map_err(|e| anyhow::anyhow!("failed to install SIGHUP handler: {}", e))?;

        let mut health_tick = tokio::time::interval(HEALTH_INTERVAL);
        health_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        health_tick.tick().await;

        loop {
            tokio::select! {
                _ = sigterm.recv() => return Ok("SIGTERM"),
                _ = sigint.recv() => return Ok("SIGINT"),
                _ = sighup.recv() => {
                    tracing::info!("SIGHUP received, reloading keys");
                    self.reload_keys().await;
                }
                _ = health_tick.tick() => log_health(&self.health().await),
            }
        }
    }
}

fn log_health(health: &DaemonHealth) {
    match &health.status {
        HealthStatus::Healthy => {
            tracing::debug!(uptime_secs = health.uptime_secs, "daemon healthy");
        }
        HealthStatus::Degraded(reason) => {
            tracing::warn!(uptime_secs = health.uptime_secs, reason = %reason, "daemon degraded");
        }
        HealthStatus::Unhealthy(reason) => {
            tracing::error!(uptime_secs = health.uptime_secs, reason = %reason, "daemon unhealthy");
        }
    }
}

/// Record build info and the registered plugin count.
fn record_daemon_metrics(plugin_count: usize) {
    metrics::gauge!(m::DAEMON_BUILD_INFO, "version" => env!("CARGO_PKG_VERSION")).set(1.0);
    #[allow(clippy::cast_precision_loss)]
    metrics::gauge!(m::DAEMON_PLUGINS_REGISTERED).set(plugin_count as f64);
}

/// Periodically refresh the uptime gauge until shutdown.
fn spawn_uptime_updater(
    start_time: Instant,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(UPTIME_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    #[allow(clippy::cast_precision_loss)]
                    metrics::gauge!(m::DAEMON_UPTIME_SECONDS)
                        .set(start_time.elapsed().as_secs() as f64);
                }
                _ = shutdown_rx.recv() => {
                    tracing::debug!("uptime updater shutting down");
                    break;
                }
            }
        }
    })
}
