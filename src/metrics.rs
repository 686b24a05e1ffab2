//! Metrics port: counters, a latency histogram, and gauges.
//!
//! Backed by the `metrics` crate's global recorder, pairing naturally with a
//! `metrics-exporter-prometheus` exporter at the process boundary. Call sites
//! never format label strings themselves at the hot path other than the
//! static names below; values are recorded through the facade so swapping the
//! exporter never touches `ot`/`room` code.

/// Buckets for `operation_latency_ms`.
pub const LATENCY_BUCKETS_MS: &[f64] = &[1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0];

/// Records the outcome of an applied or rejected `OT_OP`.
pub fn record_operation(op_type: &'static str, status: &'static str) {
    metrics::counter!("operations_total", "type" => op_type, "status" => status).increment(1);
}

/// Records a conflict that required a non-trivial transform (history was
/// non-empty at apply time).
pub fn record_conflict_resolved() {
    metrics::counter!("conflicts_resolved_total").increment(1);
}

/// Records a rate-limit rejection.
pub fn record_rate_limit_rejection() {
    metrics::counter!("rate_limit_rejections_total").increment(1);
}

/// Records end-to-end apply latency in milliseconds.
pub fn record_operation_latency_ms(ms: f64) {
    metrics::histogram!("operation_latency_ms").record(ms);
}

/// Updates the live room count gauge.
pub fn set_room_count(count: usize) {
    metrics::gauge!("room_count").set(count as f64);
}

/// Updates a room's outbound queue-depth gauge.
pub fn set_queue_depth(room_id: &str, depth: usize) {
    metrics::gauge!("queue_depth", "room_id" => room_id.to_string()).set(depth as f64);
}

/// A small RAII timer: records `operation_latency_ms` when dropped.
pub struct LatencyTimer {
    start: std::time::Instant,
}

impl LatencyTimer {
    pub fn start() -> Self {
        Self { start: std::time::Instant::now() }
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        record_operation_latency_ms(self.start.elapsed().as_secs_f64() * 1000.0);
    }
}
