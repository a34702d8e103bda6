//! Prometheus metrics for hearth-server.
//!
//! Exposes invite operation metrics in Prometheus format at the `/metrics` endpoint.

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use std::time::Instant;

/// Initialize the Prometheus metrics recorder and return a handle for rendering.
///
/// Must be called once at server startup before any metrics are recorded.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    describe_counter!(
        "hearth_invite_operations_total",
        "Invite operations processed, by operation and outcome"
    );
    describe_histogram!(
        "hearth_invite_operation_duration_seconds",
        "Duration of invite operations in seconds"
    );
    describe_counter!(
        "hearth_invite_cleanup_rows_total",
        "Invites revoked or purged by the maintenance sweep"
    );

    Ok(handle)
}

/// Record one finished invite operation.
pub fn record_operation(op: &'static str, outcome: &'static str, duration: std::time::Duration) {
    counter!("hearth_invite_operations_total", "op" => op, "outcome" => outcome).increment(1);
    histogram!("hearth_invite_operation_duration_seconds", "op" => op)
        .record(duration.as_secs_f64());
}

/// Record the result of one cleanup sweep.
pub fn record_cleanup(revoked: u64, purged: u64) {
    counter!("hearth_invite_cleanup_rows_total", "action" => "revoked").increment(revoked);
    counter!("hearth_invite_cleanup_rows_total", "action" => "purged").increment(purged);
}

/// Times an operation and records it on completion.
pub struct OperationTimer {
    op: &'static str,
    start: Instant,
}

impl OperationTimer {
    pub fn new(op: &'static str) -> Self {
        Self {
            op,
            start: Instant::now(),
        }
    }

    pub fn finish(self, outcome: &'static str) {
        record_operation(self.op, outcome, self.start.elapsed());
    }
}
