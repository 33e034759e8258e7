//! Per-endpoint probe metrics and their Prometheus text exposition.
//!
//! The registry is purely observational: the probe executor writes to it when
//! one is attached and nothing in the engine ever reads it back.

use dashmap::DashMap;
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EndpointMetrics {
    pub up: bool,
    pub errors_total: u64,
    pub duration_sum_seconds: f64,
    pub duration_count: u64,
}

#[derive(Debug, Default)]
pub struct MetricsRegistry {
    endpoints: DashMap<String, EndpointMetrics>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_up(&self, endpoint: &str, up: bool) {
        self.endpoints.entry(endpoint.to_string()).or_default().up = up;
    }

    pub fn inc_errors(&self, endpoint: &str) {
        self.endpoints
            .entry(endpoint.to_string())
            .or_default()
            .errors_total += 1;
    }

    pub fn observe_duration(&self, endpoint: &str, duration: Duration) {
        let mut entry = self.endpoints.entry(endpoint.to_string()).or_default();
        entry.duration_sum_seconds += duration.as_secs_f64();
        entry.duration_count += 1;
    }

    pub fn get(&self, endpoint: &str) -> Option<EndpointMetrics> {
        self.endpoints.get(endpoint).map(|entry| *entry)
    }

    /// Point-in-time copy, sorted by endpoint.
    pub fn snapshot(&self) -> BTreeMap<String, EndpointMetrics> {
        self.endpoints
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect()
    }

    pub fn render_prometheus(&self) -> String {
        render_prometheus(&self.snapshot())
    }
}

/// Render a snapshot into the Prometheus text exposition format.
pub fn render_prometheus(snapshot: &BTreeMap<String, EndpointMetrics>) -> String {
    let mut out = String::new();

    out.push_str("# HELP ollama_endpoint_up Endpoint availability.\n");
    out.push_str("# TYPE ollama_endpoint_up gauge\n");
    for (endpoint, m) in snapshot {
        out.push_str(&format!(
            "ollama_endpoint_up{{endpoint=\"{}\"}} {}\n",
            escape_label(endpoint),
            u8::from(m.up)
        ));
    }

    out.push_str("# HELP ollama_request_errors_total Total number of request errors.\n");
    out.push_str("# TYPE ollama_request_errors_total counter\n");
    for (endpoint, m) in snapshot {
        out.push_str(&format!(
            "ollama_request_errors_total{{endpoint=\"{}\"}} {}\n",
            escape_label(endpoint),
            m.errors_total
        ));
    }

    out.push_str("# HELP ollama_request_duration_seconds Request duration in seconds.\n");
    out.push_str("# TYPE ollama_request_duration_seconds summary\n");
    for (endpoint, m) in snapshot {
        let label = escape_label(endpoint);
        out.push_str(&format!(
            "ollama_request_duration_seconds_sum{{endpoint=\"{}\"}} {:.6}\n",
            label, m.duration_sum_seconds
        ));
        out.push_str(&format!(
            "ollama_request_duration_seconds_count{{endpoint=\"{}\"}} {}\n",
            label, m.duration_count
        ));
    }

    out
}

fn escape_label(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}
