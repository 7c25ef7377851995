//! Prometheus scrape endpoint.
//!
//! Uses the HTTP listener built into `metrics-exporter-prometheus`; every
//! `metrics::counter!`/`gauge!` call in the forwarder is recorded once the
//! recorder is installed.

use std::net::SocketAddr;

use anyhow::Result;
use firehose_core::config::MetricsConfig;
use metrics_exporter_prometheus::PrometheusBuilder;

/// Parse `listen_addr:port`.
pub fn listen_addr(config: &MetricsConfig) -> Result<SocketAddr> {
    format!("{}:{}", config.listen_addr, config.port)
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid metrics listen address: {e}"))
}

/// Install the global recorder and start the listener. Once per process.
pub fn install_metrics_recorder(config: &MetricsConfig) -> Result<()> {
    let addr = listen_addr(config)?;

    if addr.ip().is_unspecified() {
        tracing::warn!(
            listen_addr = %addr,
            "metrics endpoint is exposed on all interfaces; restrict listen_addr in untrusted networks"
        );
    }

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("failed to install metrics recorder: {e}"))?;

    firehose_core::metrics::describe_all();

    tracing::info!(listen_addr = %addr, "Prometheus metrics endpoint active");
    Ok(())
}
