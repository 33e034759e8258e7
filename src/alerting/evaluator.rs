use super::sink::{Alert, AlertSink, Severity};
use crate::config::AlertConfig;
use dashmap::DashMap;
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Success-rate rule is only evaluated once an endpoint has this many checks.
pub const MIN_SAMPLE_SIZE: u64 = 10;

/// Lifetime counters for one endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EndpointAlertState {
    pub consecutive_failures: u64,
    pub total_checks: u64,
    pub total_failures: u64,
}

impl EndpointAlertState {
    fn record(&mut self, success: bool) {
        self.total_checks += 1;
        if success {
            self.consecutive_failures = 0;
        } else {
            self.consecutive_failures += 1;
            self.total_failures += 1;
        }
    }

    pub fn success_rate(&self) -> f64 {
        if self.total_checks == 0 {
            1.0
        } else {
            1.0 - self.total_failures as f64 / self.total_checks as f64
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EndpointStats {
    pub total_checks: u64,
    pub failures: u64,
    pub successes: u64,
    pub success_rate: String,
}

/// Per-endpoint alert bookkeeping shared by every probe of a monitor process.
///
/// Counter updates go through the map's entry lock, so concurrent callers see
/// each read-modify-write as one step. The lock is never held across an await.
pub struct AlertThresholdEvaluator {
    config: AlertConfig,
    sink: Option<Arc<dyn AlertSink>>,
    states: DashMap<String, EndpointAlertState>,
}

impl AlertThresholdEvaluator {
    pub fn new(config: AlertConfig, sink: Option<Arc<dyn AlertSink>>) -> Self {
        Self {
            config,
            sink,
            states: DashMap::new(),
        }
    }

    /// Fold one check into the endpoint's counters and return the updated state.
    pub fn record_check(&self, endpoint: &str, success: bool) -> EndpointAlertState {
        let mut state = self.states.entry(endpoint.to_string()).or_default();
        state.record(success);
        *state
    }

    /// Decide which alerts a post-update state calls for. Pure; ignores whether
    /// alerting is enabled.
    pub fn evaluate(
        &self,
        endpoint: &str,
        state: &EndpointAlertState,
        success: bool,
        error: Option<&str>,
    ) -> Vec<Alert> {
        let mut alerts = Vec::new();

        if !success && state.consecutive_failures >= u64::from(self.config.min_failures) {
            let mut details = BTreeMap::new();
            details.insert(
                "consecutive_failures".to_string(),
                json!(state.consecutive_failures),
            );
            details.insert("total_checks".to_string(), json!(state.total_checks));
            if let Some(error) = error {
                details.insert("last_error".to_string(), json!(error));
            }
            alerts.push(Alert {
                message: format!(
                    "Endpoint '{endpoint}' has failed {} times consecutively",
                    state.consecutive_failures
                ),
                severity: Severity::Error,
                endpoint: endpoint.to_string(),
                details,
            });
        }

        if state.total_checks >= MIN_SAMPLE_SIZE {
            let success_rate = state.success_rate();
            if success_rate < self.config.alert_threshold {
                let rate = format_percent(success_rate);
                let threshold = format_percent(self.config.alert_threshold);
                let mut details = BTreeMap::new();
                details.insert("success_rate".to_string(), json!(rate));
                details.insert("threshold".to_string(), json!(threshold));
                details.insert("total_checks".to_string(), json!(state.total_checks));
                details.insert("failures".to_string(), json!(state.total_failures));
                alerts.push(Alert {
                    message: format!(
                        "Endpoint '{endpoint}' success rate ({rate}) is below threshold ({threshold})"
                    ),
                    severity: Severity::Warning,
                    endpoint: endpoint.to_string(),
                    details,
                });
            }
        }

        alerts
    }

    /// Record the check, then emit whatever alerts the updated counters call
    /// for. Bookkeeping always happens; emission is skipped when alerting is
    /// disabled. Returns the alerts that were emitted.
    pub async fn record_and_evaluate(
        &self,
        endpoint: &str,
        success: bool,
        error: Option<&str>,
    ) -> Vec<Alert> {
        let state = self.record_check(endpoint, success);
        if !self.config.is_active() {
            return Vec::new();
        }

        let alerts = self.evaluate(endpoint, &state, success, error);
        for alert in &alerts {
            warn!(
                endpoint,
                severity = %alert.severity,
                message = %alert.message,
                "alert triggered"
            );
            match &self.sink {
                Some(sink) => {
                    let delivered = sink.deliver(alert).await;
                    debug!(endpoint, delivered, "alert delivery finished");
                }
                None => debug!(endpoint, "no alert sink attached"),
            }
        }
        alerts
    }

    pub fn state(&self, endpoint: &str) -> Option<EndpointAlertState> {
        self.states.get(endpoint).map(|state| *state)
    }

    pub fn get_stats(&self) -> BTreeMap<String, EndpointStats> {
        self.states
            .iter()
            .map(|entry| {
                let state = entry.value();
                let stats = EndpointStats {
                    total_checks: state.total_checks,
                    failures: state.total_failures,
                    successes: state.total_checks - state.total_failures,
                    success_rate: format_percent(state.success_rate()),
                };
                (entry.key().clone(), stats)
            })
            .collect()
    }

    pub fn reset(&self) {
        self.states.clear();
    }
}

fn format_percent(ratio: f64) -> String {
    format!("{:.1}%", ratio * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerting::MockAlertSink;

    fn active_config() -> AlertConfig {
        AlertConfig {
            enabled: true,
            webhook_url: Some("https://hooks.example.com/test".to_string()),
            alert_on_failure: true,
            alert_threshold: 0.95,
            min_failures: 3,
        }
    }

    fn evaluator_with_sink() -> (AlertThresholdEvaluator, Arc<MockAlertSink>) {
        let sink = Arc::new(MockAlertSink::new());
        let evaluator = AlertThresholdEvaluator::new(active_config(), Some(sink.clone()));
        (evaluator, sink)
    }

    #[test]
    fn test_consecutive_failures_track_trailing_run() {
        let evaluator = AlertThresholdEvaluator::new(AlertConfig::default(), None);
        let runs = [true, false, false, true, false, false, false];
        for success in runs {
            evaluator.record_check("/", success);
        }

        let state = evaluator.state("/").unwrap();
        assert_eq!(state.consecutive_failures, 3);
        assert_eq!(state.total_checks, 7);
        assert_eq!(state.total_failures, 5);
        assert!(state.total_failures <= state.total_checks);
    }

    #[tokio::test]
    async fn test_consecutive_failure_rule_refires() {
        let (evaluator, sink) = evaluator_with_sink();

        assert!(evaluator.record_and_evaluate("/health", false, None).await.is_empty());
        assert!(evaluator.record_and_evaluate("/health", false, None).await.is_empty());

        let third = evaluator
            .record_and_evaluate("/health", false, Some("connection refused"))
            .await;
        assert_eq!(third.len(), 1);
        assert_eq!(third[0].severity, Severity::Error);
        assert_eq!(
            third[0].message,
            "Endpoint '/health' has failed 3 times consecutively"
        );
        assert_eq!(third[0].details["consecutive_failures"], 3);
        assert_eq!(third[0].details["total_checks"], 3);
        assert_eq!(third[0].details["last_error"], "connection refused");

        let fourth = evaluator.record_and_evaluate("/health", false, None).await;
        assert_eq!(fourth.len(), 1);
        assert!(!fourth[0].details.contains_key("last_error"));
        assert_eq!(sink.count(Severity::Error), 2);

        evaluator.record_and_evaluate("/health", true, None).await;
        assert!(evaluator.record_and_evaluate("/health", false, None).await.is_empty());
        assert!(evaluator.record_and_evaluate("/health", false, None).await.is_empty());
        assert_eq!(sink.count(Severity::Error), 2);
    }

    #[tokio::test]
    async fn test_success_rate_rule_fires_at_sample_size() {
        let (evaluator, sink) = evaluator_with_sink();

        evaluator.record_and_evaluate("/", false, None).await;
        for _ in 0..8 {
            assert!(evaluator.record_and_evaluate("/", true, None).await.is_empty());
        }
        let tenth = evaluator.record_and_evaluate("/", true, None).await;

        assert_eq!(tenth.len(), 1);
        let alert = &tenth[0];
        assert_eq!(alert.severity, Severity::Warning);
        assert_eq!(
            alert.message,
            "Endpoint '/' success rate (90.0%) is below threshold (95.0%)"
        );
        assert_eq!(alert.details["success_rate"], "90.0%");
        assert_eq!(alert.details["threshold"], "95.0%");
        assert_eq!(alert.details["total_checks"], 10);
        assert_eq!(alert.details["failures"], 1);
        assert_eq!(sink.count(Severity::Warning), 1);
    }

    #[tokio::test]
    async fn test_perfect_record_never_warns() {
        let (evaluator, sink) = evaluator_with_sink();
        for _ in 0..10 {
            evaluator.record_and_evaluate("/", true, None).await;
        }
        assert!(sink.alerts().is_empty());
    }

    #[tokio::test]
    async fn test_both_rules_fire_together() {
        let (evaluator, _sink) = evaluator_with_sink();
        for _ in 0..9 {
            evaluator.record_and_evaluate("/", true, None).await;
        }
        evaluator.record_and_evaluate("/", false, None).await;
        evaluator.record_and_evaluate("/", false, None).await;

        let alerts = evaluator.record_and_evaluate("/", false, None).await;
        let severities: Vec<_> = alerts.iter().map(|a| a.severity).collect();
        assert_eq!(severities, vec![Severity::Error, Severity::Warning]);
    }

    #[tokio::test]
    async fn test_disabled_alerting_still_records() {
        let sink = Arc::new(MockAlertSink::new());
        let mut config = active_config();
        config.alert_on_failure = false;
        let evaluator = AlertThresholdEvaluator::new(config, Some(sink.clone()));

        for _ in 0..12 {
            assert!(evaluator.record_and_evaluate("/", false, None).await.is_empty());
        }

        assert!(sink.alerts().is_empty());
        assert_eq!(evaluator.state("/").unwrap().total_checks, 12);
    }

    #[tokio::test]
    async fn test_failed_delivery_does_not_propagate() {
        let sink = Arc::new(MockAlertSink::failing());
        let evaluator = AlertThresholdEvaluator::new(active_config(), Some(sink.clone()));

        for _ in 0..3 {
            evaluator.record_and_evaluate("/", false, None).await;
        }

        assert_eq!(sink.alerts().len(), 1);
        assert_eq!(evaluator.state("/").unwrap().consecutive_failures, 3);
    }

    #[test]
    fn test_get_stats_and_reset() {
        let evaluator = AlertThresholdEvaluator::new(AlertConfig::default(), None);
        evaluator.record_check("X", true);
        evaluator.record_check("X", true);
        evaluator.record_check("X", false);

        let stats = evaluator.get_stats();
        assert_eq!(
            stats["X"],
            EndpointStats {
                total_checks: 3,
                failures: 1,
                successes: 2,
                success_rate: "66.7%".to_string(),
            }
        );

        evaluator.reset();
        assert!(evaluator.get_stats().is_empty());
        assert!(evaluator.state("X").is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_recording_keeps_counts() {
        let evaluator = Arc::new(AlertThresholdEvaluator::new(AlertConfig::default(), None));
        let mut handles = Vec::new();
        for i in 0..8 {
            let evaluator = evaluator.clone();
            handles.push(tokio::spawn(async move {
                for n in 0..250 {
                    evaluator.record_check("/", (i + n) % 2 == 0);
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let state = evaluator.state("/").unwrap();
        assert_eq!(state.total_checks, 2000);
        assert_eq!(state.total_failures, 1000);
    }
}
