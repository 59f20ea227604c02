//! Request and operation counters for an external scraper.
//!
//! The daemon never reads these back; they exist purely so a scraper
//! on the debug listener can observe API traffic and operation churn.

use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

pub struct Metrics {
    registry: Registry,
    requests: IntCounterVec,
    operations: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();
        let requests = IntCounterVec::new(
            Opts::new("clusterd_api_requests_total", "API requests by method and status"),
            &["method", "status"],
        )
        .expect("static metric definition is valid");
        let operations = IntCounterVec::new(
            Opts::new("clusterd_operations_total", "Operation state transitions"),
            &["state"],
        )
        .expect("static metric definition is valid");
        registry.register(Box::new(requests.clone())).expect("fresh registry");
        registry.register(Box::new(operations.clone())).expect("fresh registry");
        Self {
            registry,
            requests,
            operations,
        }
    }

    pub fn observe_request(&self, method: &str, status: u16) {
        self.requests.with_label_values(&[method, &status.to_string()]).inc();
    }

    pub fn observe_operation(&self, state: &str) {
        self.operations.with_label_values(&[state]).inc();
    }

    pub fn render(&self) -> String {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if encoder.encode(&self.registry.gather(), &mut buffer).is_err() {
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observed_requests_show_up_in_the_rendered_text() {
        let metrics = Metrics::new();
        metrics.observe_request("GET", 200);
        metrics.observe_operation("success");
        let text = metrics.render();
        assert!(text.contains("clusterd_api_requests_total"));
        assert!(text.contains("clusterd_operations_total"));
    }
}
