use crate::error::ConfigError;
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:11435";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);
const MAX_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "DELETE" => Ok(HttpMethod::Delete),
            "PATCH" => Ok(HttpMethod::Patch),
            "HEAD" => Ok(HttpMethod::Head),
            "OPTIONS" => Ok(HttpMethod::Options),
            other => Err(ConfigError::Invalid(format!(
                "method must be one of GET, POST, PUT, DELETE, PATCH, HEAD, OPTIONS (got {other:?})"
            ))),
        }
    }
}

impl TryFrom<String> for HttpMethod {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<HttpMethod> for String {
    fn from(method: HttpMethod) -> Self {
        method.as_str().to_string()
    }
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Delete => reqwest::Method::DELETE,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Head => reqwest::Method::HEAD,
            HttpMethod::Options => reqwest::Method::OPTIONS,
        }
    }
}

fn default_expected_status() -> u16 {
    200
}

/// One monitored HTTP target. The path is the endpoint's identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EndpointSpec {
    pub path: String,
    #[serde(default)]
    pub method: HttpMethod,
    #[serde(default = "default_expected_status")]
    pub expected_status: u16,
    #[serde(default)]
    pub expected_content: Option<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: Option<serde_json::Value>,
}

impl EndpointSpec {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method: HttpMethod::Get,
            expected_status: default_expected_status(),
            expected_content: None,
            headers: BTreeMap::new(),
            body: None,
        }
    }

    pub fn with_method(mut self, method: HttpMethod) -> Self {
        self.method = method;
        self
    }

    pub fn with_expected_status(mut self, status: u16) -> Self {
        self.expected_status = status;
        self
    }

    pub fn with_expected_content(mut self, content: impl Into<String>) -> Self {
        self.expected_content = Some(content.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Join the endpoint path onto a base URL with exactly one slash between them.
    pub fn url(&self, base_url: &str) -> String {
        format!(
            "{}/{}",
            base_url.trim_end_matches('/'),
            self.path.trim_start_matches('/')
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AlertConfig {
    pub enabled: bool,
    pub webhook_url: Option<String>,
    pub alert_on_failure: bool,
    pub alert_threshold: f64,
    pub min_failures: u32,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            webhook_url: None,
            alert_on_failure: true,
            alert_threshold: 0.95,
            min_failures: 3,
        }
    }
}

impl AlertConfig {
    /// Whether alerts are emitted at all. Bookkeeping happens regardless.
    pub fn is_active(&self) -> bool {
        self.enabled && self.alert_on_failure
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    base_url: Option<String>,
    timeout: Option<u64>,
    retry_attempts: Option<u32>,
    retry_delay: Option<u64>,
    interval: Option<u64>,
    endpoints: Option<Vec<EndpointSpec>>,
    alerting: Option<AlertConfig>,
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub retry: RetryPolicy,
    pub interval: Duration,
    pub endpoints: Vec<EndpointSpec>,
    pub alerting: AlertConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            retry: RetryPolicy::default(),
            interval: DEFAULT_INTERVAL,
            endpoints: vec![EndpointSpec::new("/")],
            alerting: AlertConfig::default(),
        }
    }
}

impl MonitorConfig {
    /// Defaults, then the optional TOML file, then process environment.
    /// Callers apply their own overrides and must call [`MonitorConfig::validate`].
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|var| std::env::var(var).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let file: FileConfig = toml::from_str(raw)?;
        let mut config = Self::default();

        if let Some(base_url) = file.base_url {
            config.base_url = base_url;
        }
        if let Some(timeout) = file.timeout {
            config.timeout = Duration::from_secs(timeout);
        }
        if let Some(attempts) = file.retry_attempts {
            config.retry.attempts = attempts;
        }
        if let Some(delay) = file.retry_delay {
            config.retry.delay = Duration::from_secs(delay);
        }
        if let Some(interval) = file.interval {
            config.interval = Duration::from_secs(interval);
        }
        if let Some(endpoints) = file.endpoints {
            config.endpoints = endpoints;
        }
        if let Some(alerting) = file.alerting {
            config.alerting = alerting;
        }

        Ok(config)
    }

    /// Overlay environment variables. `lookup` is `std::env::var` in production.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(base_url) = lookup("OLLAMA_API_BASE") {
            self.base_url = base_url;
        }
        if let Some(timeout) = parse_var::<u64, _>(&lookup, "DEFAULT_TIMEOUT")? {
            self.timeout = Duration::from_secs(timeout);
        }
        if let Some(attempts) = parse_var::<u32, _>(&lookup, "RETRY_ATTEMPTS")? {
            self.retry.attempts = attempts;
        }
        if let Some(delay) = parse_var::<u64, _>(&lookup, "RETRY_DELAY")? {
            self.retry.delay = Duration::from_secs(delay);
        }
        if let Some(webhook_url) = lookup("ALERT_WEBHOOK_URL") {
            self.alerting.webhook_url = Some(webhook_url);
            self.alerting.enabled = true;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_http_url(&self.base_url) {
            return Err(ConfigError::Invalid(format!(
                "base_url must be an http(s) URL (got {:?})",
                self.base_url
            )));
        }

        let timeout_secs = self.timeout.as_secs();
        if timeout_secs == 0 || timeout_secs > MAX_TIMEOUT_SECS {
            return Err(ConfigError::Invalid(format!(
                "timeout must be between 1 and {MAX_TIMEOUT_SECS} seconds"
            )));
        }

        if self.retry.attempts == 0 {
            return Err(ConfigError::Invalid(
                "retry attempts must be at least 1".to_string(),
            ));
        }

        if self.interval.is_zero() {
            return Err(ConfigError::Invalid(
                "monitoring interval must be greater than 0".to_string(),
            ));
        }

        if self.endpoints.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one endpoint must be configured".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for endpoint in &self.endpoints {
            if endpoint.path.is_empty() {
                return Err(ConfigError::Invalid("endpoint path cannot be empty".to_string()));
            }
            if !seen.insert(endpoint.path.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate endpoint path {:?}",
                    endpoint.path
                )));
            }
            if !(100..=599).contains(&endpoint.expected_status) {
                return Err(ConfigError::Invalid(format!(
                    "expected_status for {:?} must be between 100 and 599",
                    endpoint.path
                )));
            }
        }

        let alerting = &self.alerting;
        if !(0.0..=1.0).contains(&alerting.alert_threshold) {
            return Err(ConfigError::Invalid(
                "alert_threshold must be between 0.0 and 1.0".to_string(),
            ));
        }
        if alerting.min_failures == 0 {
            return Err(ConfigError::Invalid(
                "min_failures must be at least 1".to_string(),
            ));
        }
        match &alerting.webhook_url {
            Some(url) if !is_http_url(url) => {
                return Err(ConfigError::Invalid(format!(
                    "webhook_url must be an http(s) URL (got {url:?})"
                )));
            }
            None if alerting.enabled => {
                return Err(ConfigError::Invalid(
                    "webhook_url is required when alerting is enabled".to_string(),
                ));
            }
            _ => {}
        }

        Ok(())
    }

    pub fn endpoint(&self, path: &str) -> Option<&EndpointSpec> {
        self.endpoints.iter().find(|endpoint| endpoint.path == path)
    }

    pub fn log_configuration(&self) {
        info!(
            base_url = %self.base_url,
            timeout = ?self.timeout,
            retry_attempts = self.retry.attempts,
            retry_delay = ?self.retry.delay,
            interval = ?self.interval,
            endpoints = self.endpoints.len(),
            "monitor configuration"
        );
        for endpoint in &self.endpoints {
            info!(
                path = %endpoint.path,
                method = %endpoint.method,
                expected_status = endpoint.expected_status,
                expected_content = ?endpoint.expected_content,
                "configured endpoint"
            );
        }
        info!(
            enabled = self.alerting.enabled,
            webhook_configured = self.alerting.webhook_url.is_some(),
            alert_on_failure = self.alerting.alert_on_failure,
            alert_threshold = self.alerting.alert_threshold,
            min_failures = self.alerting.min_failures,
            "alerting configuration"
        );
    }
}

fn parse_var<T, F>(lookup: &F, var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        Some(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::Env { var, value }),
        None => Ok(None),
    }
}

fn is_http_url(url: &str) -> bool {
    let rest = url
        .strip_prefix("http://")
        .or_else(|| url.strip_prefix("https://"));
    matches!(rest, Some(host) if !host.is_empty())
}
