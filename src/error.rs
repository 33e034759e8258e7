use std::time::Duration;
use thiserror::Error;

/// Errors raised while sending a probe request. These are the only errors the
/// retry policy retries.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("http error: {0}")]
    Http(#[source] reqwest::Error),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl TransportError {
    /// Classify a reqwest error. `timeout` is the per-request budget that was in force.
    pub fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            TransportError::Timeout(timeout)
        } else if err.is_connect() {
            TransportError::Connect(err.to_string())
        } else if err.is_builder() {
            TransportError::InvalidRequest(err.to_string())
        } else {
            TransportError::Http(err)
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for {var}: {value}")]
    Env { var: &'static str, value: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to build http client: {0}")]
    ClientBuild(#[source] reqwest::Error),

    #[error("invalid load test parameters: {0}")]
    InvalidLoadTest(String),

    #[error("report io error: {0}")]
    ReportIo(#[from] std::io::Error),

    #[error("report serialization error: {0}")]
    ReportFormat(#[from] serde_json::Error),

    #[error("report template error: {0}")]
    ReportTemplate(#[from] askama::Error),

    #[error("status server error: {0}")]
    Server(#[source] std::io::Error),

    #[error("task failed: {0}")]
    Task(String),
}
