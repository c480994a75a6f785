//! Metrics collection and export.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format.

use anyhow::Result;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::info;

/// Metric names.
pub mod names {
    pub const SHARDS_ACTIVE: &str = "shardline_shards_active";
    pub const DISPATCH_TOTAL: &str = "shardline_dispatch_total";
    pub const RECONNECTS_TOTAL: &str = "shardline_reconnects_total";
    pub const HEARTBEAT_LATENCY_SECONDS: &str = "shardline_heartbeat_latency_seconds";
    pub const SHARD_FATAL_TOTAL: &str = "shardline_shard_fatal_total";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    metrics::describe_gauge!(names::SHARDS_ACTIVE, "Shards currently running");
    metrics::describe_counter!(names::DISPATCH_TOTAL, "Dispatch events received");
    metrics::describe_counter!(names::RECONNECTS_TOTAL, "Gateway reconnects by kind");
    metrics::describe_histogram!(
        names::HEARTBEAT_LATENCY_SECONDS,
        "Time between a heartbeat and its acknowledgement"
    );
    metrics::describe_counter!(names::SHARD_FATAL_TOTAL, "Shards stopped by a fatal error");

    info!("Metrics initialized");
}

/// Start the Prometheus exporter.
///
/// # Errors
///
/// Returns an error if the exporter cannot be installed.
pub fn start_metrics_server(port: u16) -> Result<()> {
    let addr: SocketAddr = format!("0.0.0.0:{port}").parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

pub fn record_dispatch(event: &str) {
    counter!(names::DISPATCH_TOTAL, "event" => event.to_string()).increment(1);
}

/// Record a reconnect; `kind` is `resume` or `identify`.
pub fn record_reconnect(kind: &'static str) {
    counter!(names::RECONNECTS_TOTAL, "kind" => kind).increment(1);
}

pub fn record_heartbeat_latency(latency: Duration) {
    histogram!(names::HEARTBEAT_LATENCY_SECONDS).record(latency.as_secs_f64());
}

pub fn record_fatal(shard: u32) {
    counter!(names::SHARD_FATAL_TOTAL, "shard" => shard.to_string()).increment(1);
}

/// Tracks a running shard in the active gauge until dropped.
pub struct ShardMetricsGuard;

impl ShardMetricsGuard {
    #[must_use]
    pub fn new() -> Self {
        gauge!(names::SHARDS_ACTIVE).increment(1.0);
        Self
    }
}

impl Default for ShardMetricsGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ShardMetricsGuard {
    fn drop(&mut self) {
        gauge!(names::SHARDS_ACTIVE).decrement(1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recorders_without_exporter() {
        // No recorder installed; calls are no-ops.
        let _guard = ShardMetricsGuard::new();
        record_dispatch("READY");
        record_reconnect("resume");
        record_heartbeat_latency(Duration::from_millis(40));
    }
}
