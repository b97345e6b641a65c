//! Request metrics.
//!
//! Recorded through the `metrics` facade. No exporter is installed here:
//! an application that wants Prometheus or anything else installs its own
//! recorder, and until then every call is a no-op.
//!
//! | Metric | Type | Labels |
//! |--------|------|--------|
//! | `hermes_requests_total` | Counter | `method`, `route`, `status`, `kind` |
//! | `hermes_request_duration_seconds` | Histogram | `method`, `route` |
//! | `hermes_in_flight_requests` | Gauge | - |
//! | `hermes_auth_failures_total` | Counter | `route` |
//! | `hermes_validation_failures_total` | Counter | `route` |
//! | `hermes_rejected_requests_total` | Counter | `reason` |

use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};

/// Requests completed.
pub const REQUESTS_TOTAL: &str = "hermes_requests_total";
/// Request latency.
pub const REQUEST_DURATION: &str = "hermes_request_duration_seconds";
/// Requests currently executing.
pub const IN_FLIGHT: &str = "hermes_in_flight_requests";
/// Requests that failed authentication.
pub const AUTH_FAILURES: &str = "hermes_auth_failures_total";
/// Requests that failed validation.
pub const VALIDATION_FAILURES: &str = "hermes_validation_failures_total";
/// Requests refused by the transport before reaching the pipeline.
pub const REJECTED: &str = "hermes_rejected_requests_total";

/// Route label for requests that matched nothing.
pub const UNMATCHED_ROUTE: &str = "unmatched";

/// Registers descriptions with the installed recorder.
pub fn describe_metrics() {
    describe_counter!(REQUESTS_TOTAL, "Requests completed, by status and error kind");
    describe_histogram!(
        REQUEST_DURATION,
        metrics::Unit::Seconds,
        "Time from receipt to encoded response"
    );
    describe_gauge!(IN_FLIGHT, "Requests currently executing");
    describe_counter!(AUTH_FAILURES, "Requests rejected by authentication");
    describe_counter!(VALIDATION_FAILURES, "Requests rejected by validation");
    describe_counter!(REJECTED, "Requests refused by the transport");
}

/// Records a completed request.
///
/// `kind` is the error kind for failed requests and `"ok"` otherwise.
pub fn record_request(method: &str, route: &str, status: u16, kind: &str, duration: Duration) {
    counter!(
        REQUESTS_TOTAL,
        "method" => method.to_string(),
        "route" => route.to_string(),
        "status" => status.to_string(),
        "kind" => kind.to_string()
    )
    .increment(1);

    histogram!(
        REQUEST_DURATION,
        "method" => method.to_string(),
        "route" => route.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Records an authentication failure.
pub fn record_auth_failure(route: &str) {
    counter!(AUTH_FAILURES, "route" => route.to_string()).increment(1);
}

/// Records a validation failure.
pub fn record_validation_failure(route: &str) {
    counter!(VALIDATION_FAILURES, "route" => route.to_string()).increment(1);
}

/// Records a request the transport refused (`capacity`, `too_large`).
pub fn record_rejected(reason: &'static str) {
    counter!(REJECTED, "reason" => reason).increment(1);
}

/// Tracks one in-flight request; the gauge drops when the guard does,
/// including when the request future is cancelled.
#[derive(Debug)]
pub struct InFlightGuard {
    _private: (),
}

impl InFlightGuard {
    /// Increments the gauge.
    #[must_use]
    pub fn new() -> Self {
        gauge!(IN_FLIGHT).increment(1.0);
        Self { _private: () }
    }
}

impl Default for InFlightGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        gauge!(IN_FLIGHT).decrement(1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder_is_noop() {
        describe_metrics();
        record_request("GET", "/nodes/{id}", 200, "ok", Duration::from_millis(3));
        record_auth_failure("/nodes/{id}");
        record_validation_failure("/nodes");
        record_rejected("capacity");
        drop(InFlightGuard::new());
    }
}
