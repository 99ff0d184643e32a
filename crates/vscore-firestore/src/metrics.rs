//! Persistence metrics.

use std::time::Duration;

use metrics::{counter, histogram};
use vscore_models::PipelineStatus;

pub mod names {
    /// Requests by operation, collection and status class.
    pub const REQUESTS_TOTAL: &str = "firestore_requests_total";
    pub const RETRIES_TOTAL: &str = "firestore_retries_total";
    pub const LATENCY_SECONDS: &str = "firestore_latency_seconds";
    /// Upserts of per-run records (frame sets, generations, artifacts).
    pub const RECORD_UPSERTS_TOTAL: &str = "firestore_record_upserts_total";
    /// Pipeline status writes by target status.
    pub const STATUS_WRITES_TOTAL: &str = "vscore_status_writes_total";
}

/// `2xx`, `4xx`, `5xx`, or `network` when no response arrived.
fn status_class(status: u16) -> &'static str {
    match status {
        0 => "network",
        100..=399 => "2xx",
        400..=499 => "4xx",
        _ => "5xx",
    }
}

pub fn record_request(operation: &str, collection: &str, status: u16, elapsed: Duration) {
    counter!(
        names::REQUESTS_TOTAL,
        "operation" => operation.to_string(),
        "collection" => collection.to_string(),
        "status" => status_class(status)
    )
    .increment(1);
    histogram!(names::LATENCY_SECONDS, "operation" => operation.to_string()).record(elapsed.as_secs_f64());
}

pub fn record_retry(operation: &str) {
    counter!(names::RETRIES_TOTAL, "operation" => operation.to_string()).increment(1);
}

pub fn record_upsert(collection: &'static str) {
    counter!(names::RECORD_UPSERTS_TOTAL, "collection" => collection).increment(1);
}

pub fn record_status_write(status: PipelineStatus) {
    counter!(names::STATUS_WRITES_TOTAL, "status" => status.as_str()).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classes() {
        assert_eq!(status_class(200), "2xx");
        assert_eq!(status_class(404), "4xx");
        assert_eq!(status_class(503), "5xx");
        assert_eq!(status_class(0), "network");
    }
}
