use crate::alerting::AlertThresholdEvaluator;
use crate::config::EndpointSpec;
use crate::probe::{ProbeExecutor, ProbeOutcome};
use std::sync::Arc;
use tracing::{error, info};

/// Runs one probe per configured endpoint concurrently and feeds every outcome
/// to the alert evaluator.
pub struct CheckFanOut {
    executor: Arc<ProbeExecutor>,
    endpoints: Arc<[EndpointSpec]>,
    evaluator: Arc<AlertThresholdEvaluator>,
}

impl CheckFanOut {
    pub fn new(
        executor: Arc<ProbeExecutor>,
        endpoints: Vec<EndpointSpec>,
        evaluator: Arc<AlertThresholdEvaluator>,
    ) -> Self {
        Self {
            executor,
            endpoints: endpoints.into(),
            evaluator,
        }
    }

    pub fn endpoints(&self) -> &[EndpointSpec] {
        &self.endpoints
    }

    pub fn evaluator(&self) -> &Arc<AlertThresholdEvaluator> {
        &self.evaluator
    }

    /// One monitoring cycle. Outcomes come back in endpoint declaration order.
    /// A probe task that panics is reported as an `Error` outcome for its
    /// endpoint only.
    pub async fn run_checks(&self) -> Vec<ProbeOutcome> {
        let handles: Vec<_> = self
            .endpoints
            .iter()
            .cloned()
            .map(|endpoint| {
                let executor = self.executor.clone();
                tokio::spawn(async move { executor.probe(&endpoint).await })
            })
            .collect();

        let mut outcomes = Vec::with_capacity(handles.len());
        for (endpoint, handle) in self.endpoints.iter().zip(handles) {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(endpoint = %endpoint.path, error = %e, "probe task failed");
                    ProbeOutcome::Error {
                        description: format!("probe task failed: {e}"),
                    }
                }
            };
            outcomes.push(outcome);
        }

        for (endpoint, outcome) in self.endpoints.iter().zip(&outcomes) {
            let error = outcome.error_description();
            self.evaluator
                .record_and_evaluate(&endpoint.path, outcome.is_success(), error.as_deref())
                .await;
        }

        let successful = outcomes.iter().filter(|o| o.is_success()).count();
        info!(
            endpoints = outcomes.len(),
            successful,
            failed = outcomes.len() - successful,
            "check cycle finished"
        );
        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerting::{AlertSink, MockAlertSink, Severity};
    use crate::config::AlertConfig;
    use crate::error::TransportError;
    use crate::http_client::{HttpClient, HttpResponse, MockHttpClient, ProbeRequest};
    use crate::retry::RetryPolicy;
    use async_trait::async_trait;
    use std::time::Duration;

    const BASE: &str = "http://ollama.test";

    fn fan_out(
        client: Arc<dyn HttpClient>,
        endpoints: Vec<EndpointSpec>,
        config: AlertConfig,
        sink: Option<Arc<MockAlertSink>>,
    ) -> CheckFanOut {
        let executor = Arc::new(ProbeExecutor::new(
            client,
            BASE,
            Duration::from_secs(10),
            RetryPolicy::new(3, Duration::ZERO),
        ));
        let sink = sink.map(|s| s as Arc<dyn AlertSink>);
        let evaluator = Arc::new(AlertThresholdEvaluator::new(config, sink));
        CheckFanOut::new(executor, endpoints, evaluator)
    }

    #[tokio::test]
    async fn test_outcomes_in_declaration_order() {
        let client = Arc::new(
            MockHttpClient::new()
                .with_response("http://ollama.test/a", 200, "ok")
                .with_failure("http://ollama.test/b", "connection refused"),
        );
        let fan_out = fan_out(
            client.clone(),
            vec![EndpointSpec::new("/a"), EndpointSpec::new("/b")],
            AlertConfig::default(),
            None,
        );

        let outcomes = fan_out.run_checks().await;

        assert_eq!(outcomes.len(), 2);
        assert!(outcomes[0].is_success());
        assert!(matches!(outcomes[1], ProbeOutcome::Error { .. }));
        assert_eq!(client.calls("http://ollama.test/b"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_order_is_independent_of_completion_order() {
        // The slow endpoint is declared first and finishes last.
        struct SlowFirst;

        #[async_trait]
        impl HttpClient for SlowFirst {
            async fn send(&self, request: &ProbeRequest) -> Result<HttpResponse, TransportError> {
                let (delay, status_code) = if request.url.ends_with("/slow") {
                    (Duration::from_secs(5), 200)
                } else {
                    (Duration::from_millis(10), 500)
                };
                tokio::time::sleep(delay).await;
                Ok(HttpResponse {
                    status_code,
                    body: String::new(),
                    content_type: None,
                })
            }
        }

        let fan_out = fan_out(
            Arc::new(SlowFirst),
            vec![EndpointSpec::new("/slow"), EndpointSpec::new("/fast")],
            AlertConfig::default(),
            None,
        );

        let outcomes = fan_out.run_checks().await;

        assert_eq!(outcomes[0].status_code(), Some(200));
        assert_eq!(outcomes[1].status_code(), Some(500));
    }

    #[tokio::test]
    async fn test_outcomes_feed_the_evaluator() {
        let client = Arc::new(
            MockHttpClient::new()
                .with_response("http://ollama.test/", 200, "Ollama is running")
                .with_response("http://ollama.test/api/tags", 500, "error"),
        );
        let sink = Arc::new(MockAlertSink::new());
        let config = AlertConfig {
            enabled: true,
            webhook_url: Some("https://hooks.example.com/test".to_string()),
            ..AlertConfig::default()
        };
        let fan_out = fan_out(
            client,
            vec![EndpointSpec::new("/"), EndpointSpec::new("/api/tags")],
            config,
            Some(sink.clone()),
        );

        for _ in 0..3 {
            fan_out.run_checks().await;
        }

        let stats = fan_out.evaluator().get_stats();
        assert_eq!(stats["/"].successes, 3);
        assert_eq!(stats["/api/tags"].failures, 3);

        let alerts = sink.alerts();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].endpoint, "/api/tags");
        assert_eq!(alerts[0].severity, Severity::Error);
        assert_eq!(
            alerts[0].details["last_error"],
            "unexpected status code (expected 200), got status 500"
        );
    }
}
