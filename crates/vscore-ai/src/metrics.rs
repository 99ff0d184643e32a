//! Metrics for outbound model calls.

use std::time::Duration;

use metrics::{counter, histogram};

pub mod names {
    pub const REQUESTS_TOTAL: &str = "ai_requests_total";
    pub const LATENCY_SECONDS: &str = "ai_request_latency_seconds";
}

pub fn record_request(provider: &'static str, success: bool, elapsed: Duration) {
    let outcome = if success { "success" } else { "error" };
    counter!(names::REQUESTS_TOTAL, "provider" => provider, "outcome" => outcome).increment(1);
    histogram!(names::LATENCY_SECONDS, "provider" => provider).record(elapsed.as_secs_f64());
}
