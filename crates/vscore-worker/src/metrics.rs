//! Pipeline metrics.

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and serve `/metrics` on `port`.
///
/// Must be called from within the tokio runtime.
pub fn init_metrics(port: u16) -> Result<(), BuildError> {
    PrometheusBuilder::new()
        .with_http_listener(SocketAddr::from(([0, 0, 0, 0], port)))
        .install()
}

/// Metric names as constants for consistency.
pub mod names {
    pub const RUNS_TOTAL: &str = "vscore_runs_total";
    pub const STAGE_DURATION_SECONDS: &str = "vscore_stage_duration_seconds";
    pub const ANALYSIS_FALLBACK_TOTAL: &str = "vscore_analysis_fallback_total";
    pub const RECONCILE_POLICY_TOTAL: &str = "vscore_reconcile_policy_total";
    pub const MUSIC_GENERATION_ATTEMPTS_TOTAL: &str = "vscore_music_generation_attempts_total";
}

/// Record a finished run; `outcome` is the final status.
pub fn record_run(outcome: &'static str) {
    counter!(names::RUNS_TOTAL, "outcome" => outcome).increment(1);
}

pub fn record_stage_duration(stage: &'static str, elapsed: Duration) {
    histogram!(names::STAGE_DURATION_SECONDS, "stage" => stage).record(elapsed.as_secs_f64());
}

pub fn record_analysis_fallback() {
    counter!(names::ANALYSIS_FALLBACK_TOTAL).increment(1);
}

pub fn record_reconcile_policy(policy: &'static str) {
    counter!(names::RECONCILE_POLICY_TOTAL, "policy" => policy).increment(1);
}

pub fn record_music_attempt() {
    counter!(names::MUSIC_GENERATION_ATTEMPTS_TOTAL).increment(1);
}
