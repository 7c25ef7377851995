//! Daemon orchestration -- assembly, envelope intake and lifecycle.
//!
//! The [`Orchestrator`] turns a loaded [`FirehoseConfig`] into a running
//! forwarder: it installs the metrics recorder, loads the app metadata
//! stand-in, builds the [`ForwarderPipeline`], connects an optional envelope
//! source and waits for a shutdown signal.
//!
//! # Shutdown order
//!
//! 1. Envelope source (stop producing envelopes)
//! 2. Forwarder pipeline (stop ingest and stats, drain the packet queue)

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use firehose_core::config::FirehoseConfig;
use firehose_core::event::Envelope;
use firehose_core::pipeline::{AppMetadataCache, HealthStatus, Pipeline};
use firehose_forwarder::{
    ForwarderConfig, ForwarderPipeline, ForwarderPipelineBuilder, InMemoryAppCache,
};

use crate::metrics_server;
use crate::source::{JsonLinesSource, SourceInput, SourceStats};

/// Point-in-time daemon health.
#[derive(Debug, Clone, PartialEq)]
pub struct DaemonHealth {
    pub status: HealthStatus,
    pub uptime_secs: u64,
    pub total_shipped: u64,
    pub queue_utilization: f64,
}

pub struct Orchestrator {
    config: FirehoseConfig,
    pipeline: ForwarderPipeline,
    /// Handed to the envelope source on `run`
    envelope_tx: Option<mpsc::Sender<Envelope>>,
    shutdown_tx: broadcast::Sender<()>,
    start_time: Instant,
}

impl Orchestrator {
    /// Load `firehose.toml` (with env overrides) and build.
    pub async fn build(config_path: &Path) -> Result<Self> {
        let config = FirehoseConfig::load(config_path)
            .await
            .map_err(|e| anyhow::anyhow!("failed to load config: {e}"))?;
        Self::build_from_config(config).await
    }

    /// Build from an already-loaded configuration.
    ///
    /// Every configuration problem (bad selection, bad static fields, bad
    /// filter file) fails here, before anything connects.
    pub async fn build_from_config(config: FirehoseConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("config validation failed: {e}"))?;

        if config.metrics.enabled {
            metrics_server::install_metrics_recorder(&config.metrics)?;
        }

        let cache = load_app_cache(&config.routing.app_cache_path).await?;

        let (pipeline, envelope_tx) = ForwarderPipelineBuilder::new()
            .config(ForwarderConfig::from_core(&config))
            .app_cache(cache)
            .build()
            .await
            .map_err(|e| anyhow::anyhow!("failed to build forwarder pipeline: {e}"))?;

        let selected: Vec<&str> = pipeline
            .router()
            .selected_events()
            .into_iter()
            .map(|t| t.name())
            .collect();
        tracing::info!(
            selected = %selected.join(","),
            server = %config.syslog.server,
            protocol = %config.syslog.protocol,
            "orchestrator initialized"
        );

        let (shutdown_tx, _) = broadcast::channel(4);
        Ok(Self {
            config,
            pipeline,
            envelope_tx: Some(envelope_tx),
            shutdown_tx,
            start_time: Instant::now(),
        })
    }

    /// Start the pipeline, run until a shutdown signal, then stop.
    ///
    /// With `exit_on_eof`, the daemon also stops once the source has read
    /// all of its input.
    pub async fn run(&mut self, input: Option<SourceInput>, exit_on_eof: bool) -> Result<()> {
        self.pipeline
            .start()
            .await
            .map_err(|e| anyhow::anyhow!("failed to start forwarder pipeline: {e}"))?;

        let mut source_task = self.spawn_source(input);

        let mut uptime_task = self
            .config
            .metrics
            .enabled
            .then(|| spawn_uptime_updater(self.start_time, self.shutdown_tx.subscribe()));

        tracing::info!("firehose-daemon running");
        if exit_on_eof && let Some(task) = source_task.as_mut() {
            let exhausted = tokio::select! {
                signal = wait_for_shutdown_signal() => {
                    tracing::info!(signal = signal?, "shutdown signal received");
                    false
                }
                result = task => {
                    log_source_result(result);
                    tracing::info!("envelope source exhausted, shutting down");
                    true
                }
            };
            if exhausted {
                source_task = None;
            }
        } else {
            let signal = wait_for_shutdown_signal().await?;
            tracing::info!(signal, "shutdown signal received");
        }

        let _ = self.shutdown_tx.send(());

        if let Some(task) = source_task.take() {
            log_source_result(task.await);
        }
        if let Some(task) = uptime_task.take() {
            let _ = task.await;
        }

        self.shutdown().await
    }

    fn spawn_source(
        &mut self,
        input: Option<SourceInput>,
    ) -> Option<JoinHandle<Result<SourceStats>>> {
        let tx = self.envelope_tx.take()?;
        let input = input?;
        let shutdown_rx = self.shutdown_tx.subscribe();
        Some(tokio::spawn(JsonLinesSource::new(input).run(tx, shutdown_rx)))
    }

    async fn shutdown(&mut self) -> Result<()> {
        tracing::info!("stopping forwarder pipeline");
        self.pipeline.stop().await.map_err(Into::into)
    }

    pub async fn health(&self) -> DaemonHealth {
        let uptime_secs = self.start_time.elapsed().as_secs();
        if self.config.metrics.enabled {
            #[allow(clippy::cast_precision_loss)]
            metrics::gauge!(firehose_core::metrics::DAEMON_UPTIME_SECONDS).set(uptime_secs as f64);
        }

        DaemonHealth {
            status: self.pipeline.health_check().await,
            uptime_secs,
            total_shipped: self.pipeline.router().total_count(),
            queue_utilization: self.pipeline.queue_utilization(),
        }
    }

    pub fn config(&self) -> &FirehoseConfig {
        &self.config
    }

    pub fn pipeline(&self) -> &ForwarderPipeline {
        &self.pipeline
    }

    /// Sender for callers that feed envelopes themselves. `None` once `run`
    /// has handed it to a source or it was already taken.
    pub fn take_envelope_sender(&mut self) -> Option<mpsc::Sender<Envelope>> {
        self.envelope_tx.take()
    }
}

async fn load_app_cache(path: &str) -> Result<Arc<dyn AppMetadataCache>> {
    if path.trim().is_empty() {
        return Ok(Arc::new(InMemoryAppCache::new()));
    }
    let cache = InMemoryAppCache::from_json_file(path.trim())
        .await
        .map_err(|e| anyhow::anyhow!("failed to load app cache: {e}"))?;
    tracing::info!(path, apps = cache.len(), "app metadata cache loaded");
    Ok(Arc::new(cache))
}

fn log_source_result(result: std::result::Result<Result<SourceStats>, tokio::task::JoinError>) {
    match result {
        Ok(Ok(stats)) => tracing::debug!(sent = stats.sent, "envelope source joined"),
        Ok(Err(e)) => tracing::error!(error = %e, "envelope source failed"),
        Err(e) => tracing::error!(error = %e, "envelope source task panicked"),
    }
}

/// Wait for SIGTERM or SIGINT and return its name.
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {e}"))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {e}"))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Refresh the uptime gauge every 10 seconds.
fn spawn_uptime_updater(
    start_time: Instant,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    use firehose_core::metrics as m;

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(10));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    #[allow(clippy::cast_precision_loss)]
                    metrics::gauge!(m::DAEMON_UPTIME_SECONDS).set(start_time.elapsed().as_secs() as f64);
                }
                _ = shutdown_rx.recv() => break,
            }
        }
    })
}
