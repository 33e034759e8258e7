//! Single-endpoint probe execution.
//!
//! A probe is one logical check of one endpoint: the request is sent, the
//! response is classified against the endpoint's expectations, and transport
//! errors are retried by the executor's [`RetryPolicy`]. Expectation
//! mismatches are terminal for the probe and never retried.

use crate::config::EndpointSpec;
use crate::error::TransportError;
use crate::http_client::{HttpClient, HttpResponse, ProbeRequest};
use crate::metrics::MetricsRegistry;
use crate::retry::RetryPolicy;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

const BODY_LOG_LIMIT: usize = 500;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MismatchReason {
    UnexpectedStatus { expected: u16 },
    MissingContent { expected: String },
}

impl fmt::Display for MismatchReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MismatchReason::UnexpectedStatus { expected } => {
                write!(f, "unexpected status code (expected {expected})")
            }
            MismatchReason::MissingContent { expected } => {
                write!(f, "expected content not found: {expected}")
            }
        }
    }
}

/// Result of one probe, after retries.
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeOutcome {
    Success {
        latency: Duration,
        status_code: u16,
    },
    Failure {
        latency: Duration,
        status_code: u16,
        reason: MismatchReason,
    },
    Error {
        description: String,
    },
}

impl ProbeOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ProbeOutcome::Success { .. })
    }

    pub fn latency(&self) -> Option<Duration> {
        match self {
            ProbeOutcome::Success { latency, .. } | ProbeOutcome::Failure { latency, .. } => {
                Some(*latency)
            }
            ProbeOutcome::Error { .. } => None,
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            ProbeOutcome::Success { status_code, .. }
            | ProbeOutcome::Failure { status_code, .. } => Some(*status_code),
            ProbeOutcome::Error { .. } => None,
        }
    }

    /// Text describing why the probe did not succeed, if it did not.
    pub fn error_description(&self) -> Option<String> {
        match self {
            ProbeOutcome::Success { .. } => None,
            ProbeOutcome::Failure {
                status_code,
                reason,
                ..
            } => Some(format!("{reason}, got status {status_code}")),
            ProbeOutcome::Error { description } => Some(description.clone()),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ProbeOutcome::Success { .. } => "success",
            ProbeOutcome::Failure { .. } => "failed",
            ProbeOutcome::Error { .. } => "error",
        }
    }
}

pub struct ProbeExecutor {
    client: Arc<dyn HttpClient>,
    base_url: String,
    timeout: Duration,
    retry: RetryPolicy,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl ProbeExecutor {
    pub fn new(
        client: Arc<dyn HttpClient>,
        base_url: impl Into<String>,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            timeout,
            retry,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Probe `endpoint`, retrying transport errors. Never fails: exhausted
    /// retries become [`ProbeOutcome::Error`].
    pub async fn probe(&self, endpoint: &EndpointSpec) -> ProbeOutcome {
        let request = ProbeRequest::for_endpoint(endpoint, &self.base_url, self.timeout);
        let span = tracing::info_span!(
            "probe",
            endpoint = %endpoint.path,
            request_id = %Uuid::new_v4()
        );

        async {
            info!(url = %request.url, method = %request.method, "testing endpoint");
            let request = &request;
            match self
                .retry
                .run(move |attempt| self.attempt(endpoint, request, attempt))
                .await
            {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(error = %e, "endpoint probe failed after retries");
                    ProbeOutcome::Error {
                        description: e.to_string(),
                    }
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn attempt(
        &self,
        endpoint: &EndpointSpec,
        request: &ProbeRequest,
        attempt: u32,
    ) -> Result<ProbeOutcome, TransportError> {
        let started = Instant::now();
        let sent = tokio::time::timeout(self.timeout, self.client.send(request)).await;
        let latency = started.elapsed();

        let response = match sent {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(self.record_transport_error(endpoint, attempt, e)),
            Err(_) => {
                let e = TransportError::Timeout(self.timeout);
                return Err(self.record_transport_error(endpoint, attempt, e));
            }
        };

        if let Some(metrics) = &self.metrics {
            metrics.observe_duration(&endpoint.path, latency);
        }
        log_response(&response, latency);

        Ok(self.classify(endpoint, response, latency))
    }

    fn classify(
        &self,
        endpoint: &EndpointSpec,
        response: HttpResponse,
        latency: Duration,
    ) -> ProbeOutcome {
        let status_code = response.status_code;

        if status_code != endpoint.expected_status {
            warn!(status_code, expected = endpoint.expected_status, "unexpected status code");
            if let Some(metrics) = &self.metrics {
                metrics.set_up(&endpoint.path, false);
                metrics.inc_errors(&endpoint.path);
            }
            return ProbeOutcome::Failure {
                latency,
                status_code,
                reason: MismatchReason::UnexpectedStatus {
                    expected: endpoint.expected_status,
                },
            };
        }

        if let Some(expected) = &endpoint.expected_content {
            if !response.body.contains(expected.as_str()) {
                warn!(expected = %expected, "expected content not found");
                if let Some(metrics) = &self.metrics {
                    metrics.set_up(&endpoint.path, false);
                }
                return ProbeOutcome::Failure {
                    latency,
                    status_code,
                    reason: MismatchReason::MissingContent {
                        expected: expected.clone(),
                    },
                };
            }
        }

        info!("endpoint is functioning correctly");
        if let Some(metrics) = &self.metrics {
            metrics.set_up(&endpoint.path, true);
        }
        ProbeOutcome::Success {
            latency,
            status_code,
        }
    }

    fn record_transport_error(
        &self,
        endpoint: &EndpointSpec,
        attempt: u32,
        e: TransportError,
    ) -> TransportError {
        error!(attempt, error = %e, "request error");
        if let Some(metrics) = &self.metrics {
            metrics.set_up(&endpoint.path, false);
            metrics.inc_errors(&endpoint.path);
        }
        e
    }
}

fn log_response(response: &HttpResponse, latency: Duration) {
    info!(
        status_code = response.status_code,
        latency_ms = latency.as_millis() as u64,
        "response received"
    );
    if response.is_json() {
        match serde_json::from_str::<serde_json::Value>(&response.body) {
            Ok(json) => debug!(body = %json, "json response"),
            Err(_) => warn!("failed to parse json response"),
        }
    } else {
        let preview: String = response.body.chars().take(BODY_LOG_LIMIT).collect();
        debug!(body = %preview, "response");
    }
}
