//! Aggregated health reporting.
//!
//! Every file processor reports its own [`HealthStatus`]; the daemon
//! status is the worst of them.
//!
//! # Aggregation Rule
//!
//! - All Healthy -> Healthy
//! - Any Degraded, none Unhealthy -> Degraded(reason)
//! - Any Unhealthy -> Unhealthy(reason)

use serde::Serialize;

use evetail_core::pipeline::HealthStatus;
use evetail_ingest::ProcessorStats;

/// Aggregated health report for the entire daemon.
#[derive(Debug, Clone, Serialize)]
pub struct DaemonHealth {
    /// Overall daemon health status (worst of all processors).
    pub status: HealthStatus,
    /// Daemon uptime in seconds since start.
    pub uptime_secs: u64,
    /// Per-file reports.
    pub processors: Vec<ProcessorHealth>,
}

/// Health of a single file processor.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessorHealth {
    /// Input file path.
    pub path: String,
    /// Lifecycle state name (initialized, running, stopped).
    pub state: String,
    /// Current health status.
    pub status: HealthStatus,
    /// Counters since the processor was built.
    pub stats: ProcessorStats,
}

/// Aggregate processor health into a single status.
///
/// Reasons are prefixed with the input path they came from.
pub fn aggregate_status(processors: &[ProcessorHealth]) -> HealthStatus {
    let mut unhealthy = Vec::new();
    let mut degraded = Vec::new();

    for processor in processors {
        match &processor.status {
            HealthStatus::Healthy => {}
            HealthStatus::Degraded(reason) => {
                degraded.push(format!("{}: {}", processor.path, reason));
            }
            HealthStatus::Unhealthy(reason) => {
                unhealthy.push(format!("{}: {}", processor.path, reason));
            }
        }
    }

    if !unhealthy.is_empty() {
        HealthStatus::Unhealthy(unhealthy.join("; "))
    } else if !degraded.is_empty() {
        HealthStatus::Degraded(degraded.join("; "))
    } else {
        HealthStatus::Healthy
    }
}

/// Log a health report at a level matching its status.
pub fn log_health(health: &DaemonHealth) {
    let records: u64 = health.processors.iter().map(|p| p.stats.records).sum();
    match &health.status {
        HealthStatus::Healthy => tracing::debug!(
            uptime_secs = health.uptime_secs,
            processors = health.processors.len(),
            records,
            "daemon healthy"
        ),
        HealthStatus::Degraded(reason) => tracing::warn!(
            uptime_secs = health.uptime_secs,
            records,
            reason = %reason,
            "daemon degraded"
        ),
        HealthStatus::Unhealthy(reason) => tracing::error!(
            uptime_secs = health.uptime_secs,
            records,
            reason = %reason,
            "daemon unhealthy"
        ),
    }
}
