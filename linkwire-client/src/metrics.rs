//! Client metrics definitions
//!
//! OpenTelemetry instruments recorded by the supervisor and the facade.
//! They are only created when observability is enabled on the
//! [`ClientBuilder`](crate::ClientBuilder).
//!
//! # Metrics Collected
//!
//! - **linkwire.client.connection.state**: current state, see
//!   [`ConnectionState::as_gauge`](crate::ConnectionState::as_gauge) (gauge)
//! - **linkwire.client.requests.total**: requests by operation and status (counter)
//! - **linkwire.client.request.duration**: request latency in seconds (histogram)
//! - **linkwire.client.errors.total**: errors by kind (counter)
//! - **linkwire.client.reconnection.attempts** / **.success** (counters)
//! - **linkwire.client.heartbeat.failures**: missed pongs and failed pings (counter)
//! - **linkwire.client.unsolicited.received**: server pushes by operation (counter)
//! - **linkwire.client.frames.dropped**: undecodable inbound frames (counter)

use opentelemetry::{
    global,
    metrics::{Counter, Gauge, Histogram, Meter},
    KeyValue,
};

/// Client metrics for monitoring
pub struct ClientMetrics {
    pub connection_state: Gauge<i64>,
    pub requests_total: Counter<u64>,
    pub request_duration: Histogram<f64>,
    pub errors_total: Counter<u64>,
    pub reconnection_attempts: Counter<u64>,
    pub reconnection_success: Counter<u64>,
    pub heartbeat_failures: Counter<u64>,
    pub unsolicited_received: Counter<u64>,
    pub frames_dropped: Counter<u64>,
}

impl ClientMetrics {
    /// Create metrics on the global meter provider
    pub fn new(service_name: impl Into<String>) -> Self {
        let name: &'static str = Box::leak(service_name.into().into_boxed_str());
        let meter = global::meter(name);
        Self::new_with_meter(&meter)
    }

    /// Create metrics on a caller-supplied meter
    pub fn new_with_meter(meter: &Meter) -> Self {
        Self {
            connection_state: meter
                .i64_gauge("linkwire.client.connection.state")
                .with_description("Connection state (0=disconnected, 1=connecting, 2=open, 3=closing)")
                .build(),
            requests_total: meter
                .u64_counter("linkwire.client.requests.total")
                .with_description("Total number of requests sent")
                .build(),
            request_duration: meter
                .f64_histogram("linkwire.client.request.duration")
                .with_description("Request duration in seconds")
                .build(),
            errors_total: meter
                .u64_counter("linkwire.client.errors.total")
                .with_description("Total number of errors encountered")
                .build(),
            reconnection_attempts: meter
                .u64_counter("linkwire.client.reconnection.attempts")
                .with_description("Total number of reconnection attempts")
                .build(),
            reconnection_success: meter
                .u64_counter("linkwire.client.reconnection.success")
                .with_description("Total number of successful reconnections")
                .build(),
            heartbeat_failures: meter
                .u64_counter("linkwire.client.heartbeat.failures")
                .with_description("Pings that failed to send or were never answered")
                .build(),
            unsolicited_received: meter
                .u64_counter("linkwire.client.unsolicited.received")
                .with_description("Server frames with no pending request")
                .build(),
            frames_dropped: meter
                .u64_counter("linkwire.client.frames.dropped")
                .with_description("Inbound frames that matched no envelope shape")
                .build(),
        }
    }

    pub fn update_connection_state(&self, state: i64) {
        self.connection_state.record(state, &[]);
    }

    /// Record a completed request
    pub fn record_request(&self, op: &str, status: &str, duration_secs: f64) {
        let attributes = &[
            KeyValue::new("op", op.to_string()),
            KeyValue::new("status", status.to_string()),
        ];
        self.requests_total.add(1, attributes);
        self.request_duration.record(duration_secs, attributes);
    }

    pub fn record_error(&self, error_type: &str) {
        let attributes = &[KeyValue::new("error_type", error_type.to_string())];
        self.errors_total.add(1, attributes);
    }

    pub fn record_reconnection_attempt(&self) {
        self.reconnection_attempts.add(1, &[]);
    }

    pub fn record_reconnection_success(&self) {
        self.reconnection_success.add(1, &[]);
    }

    pub fn record_heartbeat_failure(&self) {
        self.heartbeat_failures.add(1, &[]);
    }

    pub fn record_unsolicited(&self, op: &str) {
        let attributes = &[KeyValue::new("op", op.to_string())];
        self.unsolicited_received.add(1, attributes);
    }

    pub fn record_dropped_frame(&self) {
        self.frames_dropped.add(1, &[]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ConnectionState;

    #[test]
    fn test_metrics_creation() {
        let metrics = ClientMetrics::new("test-client");

        metrics.update_connection_state(ConnectionState::Open.as_gauge());
        metrics.record_request("Login", "success", 0.05);
        metrics.record_error("transport");
        metrics.record_reconnection_attempt();
        metrics.record_reconnection_success();
        metrics.record_heartbeat_failure();
        metrics.record_unsolicited("CreateComment");
        metrics.record_dropped_frame();
    }

    #[test]
    fn test_connection_state_metrics() {
        let metrics = ClientMetrics::new("test-client-state");

        for state in [
            ConnectionState::Disconnected,
            ConnectionState::Connecting,
            ConnectionState::Open,
            ConnectionState::Closing,
        ] {
            metrics.update_connection_state(state.as_gauge());
        }
    }

    #[test]
    fn test_metrics_on_sdk_meter() {
        use opentelemetry::metrics::MeterProvider;
        use opentelemetry_sdk::metrics::SdkMeterProvider;

        let provider = SdkMeterProvider::builder().build();
        let metrics = ClientMetrics::new_with_meter(&provider.meter("linkwire-test"));

        metrics.record_reconnection_attempt();
        metrics.record_reconnection_success();
        metrics.record_unsolicited("CreatePost");
        let _ = provider.shutdown();
    }

    #[test]
    fn test_request_metrics() {
        let metrics = ClientMetrics::new("test-client-req");

        metrics.record_request("GetSite", "success", 0.03);
        metrics.record_request("Login", "server_error", 0.01);
        metrics.record_request("GetPosts", "timeout", 30.0);
        metrics.record_error("timeout");
    }
}
