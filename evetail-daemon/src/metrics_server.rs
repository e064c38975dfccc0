//! Prometheus metrics HTTP server.
//!
//! Uses the built-in HTTP listener from `metrics-exporter-prometheus`.
//! Per-file ingest counters are labelled with the input path.

use std::net::SocketAddr;

use anyhow::Result;
use evetail_core::config::MetricsConfig;
use metrics_exporter_prometheus::PrometheusBuilder;

/// The only scrape path the built-in listener serves.
pub const METRICS_ENDPOINT: &str = "/metrics";

/// Resolve the listener address from the `[metrics]` section.
///
/// # Errors
///
/// - `endpoint` is anything other than `/metrics`
/// - `listen_addr:port` is not a socket address
pub fn listen_addr(config: &MetricsConfig) -> Result<SocketAddr> {
    if config.endpoint != METRICS_ENDPOINT {
        return Err(anyhow::anyhow!(
            "unsupported metrics endpoint '{}': only '{}' is supported",
            config.endpoint,
            METRICS_ENDPOINT
        ));
    }

    format!("{}:{}", config.listen_addr, config.port)
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid metrics listen address: {}", e))
}

/// Install the global metrics recorder and start the HTTP listener.
///
/// Call once per process, before any file processor is built, so that
/// processors register their counters with the Prometheus recorder.
pub fn install_metrics_recorder(config: &MetricsConfig) -> Result<()> {
    let addr = listen_addr(config)?;

    if addr.ip().is_unspecified() {
        tracing::warn!(
            listen_addr = %addr,
            "metrics endpoint is exposed on all interfaces"
        );
    }

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("failed to install metrics recorder: {}", e))?;

    evetail_core::metrics::describe_all();

    tracing::info!(listen_addr = %addr, "Prometheus metrics endpoint active");
    Ok(())
}
