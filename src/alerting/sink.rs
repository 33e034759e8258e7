use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use reqwest::Client;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::{error, info};

pub const SERVICE_NAME: &str = "ollama-monitor";
const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);
const ACCEPTED_STATUS: [u16; 4] = [200, 201, 202, 204];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Critical => "critical",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    pub message: String,
    pub severity: Severity,
    pub endpoint: String,
    pub details: BTreeMap<String, serde_json::Value>,
}

/// Delivers alerts somewhere. Returns whether delivery succeeded; callers log
/// the result and never act on it, so implementations must not panic or block
/// indefinitely.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn deliver(&self, alert: &Alert) -> bool;
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    timestamp: String,
    severity: Severity,
    message: &'a str,
    service: &'static str,
    endpoint: &'a str,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    details: &'a BTreeMap<String, serde_json::Value>,
}

pub struct WebhookAlertSink {
    client: Client,
    webhook_url: String,
}

impl WebhookAlertSink {
    pub fn new(webhook_url: impl Into<String>) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(WEBHOOK_TIMEOUT).build()?;
        Ok(Self {
            client,
            webhook_url: webhook_url.into(),
        })
    }

    fn payload<'a>(alert: &'a Alert) -> WebhookPayload<'a> {
        WebhookPayload {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
            severity: alert.severity,
            message: &alert.message,
            service: SERVICE_NAME,
            endpoint: &alert.endpoint,
            details: &alert.details,
        }
    }
}

#[async_trait]
impl AlertSink for WebhookAlertSink {
    async fn deliver(&self, alert: &Alert) -> bool {
        let response = self
            .client
            .post(&self.webhook_url)
            .json(&Self::payload(alert))
            .send()
            .await;

        match response {
            Ok(response) if ACCEPTED_STATUS.contains(&response.status().as_u16()) => {
                info!(message = %alert.message, "alert sent successfully");
                true
            }
            Ok(response) => {
                let status = response.status().as_u16();
                let body = response.text().await.unwrap_or_default();
                error!(status, response = %body, "failed to send alert");
                false
            }
            Err(e) => {
                error!(error = %e, "error sending alert");
                false
            }
        }
    }
}

/// Records every alert it is handed.
pub struct MockAlertSink {
    delivered: Mutex<Vec<Alert>>,
    succeed: bool,
}

impl MockAlertSink {
    pub fn new() -> Self {
        Self {
            delivered: Mutex::new(Vec::new()),
            succeed: true,
        }
    }

    /// A sink that records alerts but reports every delivery as failed.
    pub fn failing() -> Self {
        Self {
            delivered: Mutex::new(Vec::new()),
            succeed: false,
        }
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.delivered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.delivered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|alert| alert.severity == severity)
            .count()
    }
}

impl Default for MockAlertSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AlertSink for MockAlertSink {
    async fn deliver(&self, alert: &Alert) -> bool {
        self.delivered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(alert.clone());
        self.succeed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_alert() -> Alert {
        let mut details = BTreeMap::new();
        details.insert("consecutive_failures".to_string(), json!(3));
        details.insert("total_checks".to_string(), json!(7));
        Alert {
            message: "Endpoint '/' has failed 3 times consecutively".to_string(),
            severity: Severity::Error,
            endpoint: "/".to_string(),
            details,
        }
    }

    #[test]
    fn test_webhook_payload_shape() {
        let alert = sample_alert();
        let payload = serde_json::to_value(WebhookAlertSink::payload(&alert)).unwrap();

        assert_eq!(payload["severity"], "error");
        assert_eq!(payload["service"], "ollama-monitor");
        assert_eq!(payload["endpoint"], "/");
        assert_eq!(payload["details"]["consecutive_failures"], 3);
        assert!(payload["timestamp"].as_str().unwrap().ends_with('Z'));
    }

    #[tokio::test]
    async fn test_webhook_delivery_failure_returns_false() {
        // Port 9 (discard) on localhost is not expected to accept HTTP connections.
        let sink = WebhookAlertSink::new("http://127.0.0.1:9/hook").unwrap();
        assert!(!sink.deliver(&sample_alert()).await);
    }

    #[tokio::test]
    async fn test_mock_sink_records_alerts() {
        let sink = MockAlertSink::failing();
        assert!(!sink.deliver(&sample_alert()).await);
        assert_eq!(sink.alerts().len(), 1);
        assert_eq!(sink.count(Severity::Error), 1);
        assert_eq!(sink.count(Severity::Warning), 0);
    }

    #[test]
    fn test_severity_display() {
        assert_eq!(Severity::Critical.to_string(), "critical");
        assert_eq!(serde_json::to_value(Severity::Warning).unwrap(), "warning");
    }
}
