use crate::config::{EndpointSpec, HttpMethod};
use crate::error::TransportError;
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Transport seam for probes. Implementations are shared across every probe
/// in a cycle and must not be reconfigured by individual requests.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn send(&self, request: &ProbeRequest) -> Result<HttpResponse, TransportError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProbeRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<serde_json::Value>,
    pub timeout: Duration,
}

impl ProbeRequest {
    pub fn for_endpoint(endpoint: &EndpointSpec, base_url: &str, timeout: Duration) -> Self {
        Self {
            method: endpoint.method,
            url: endpoint.url(base_url),
            headers: endpoint.headers.clone(),
            body: endpoint.body.clone(),
            timeout,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status_code: u16,
    pub body: String,
    pub content_type: Option<String>,
}

impl HttpResponse {
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(&self.body)
    }

    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn is_json(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.starts_with("application/json"))
    }
}

pub struct ReqwestHttpClient {
    client: Client,
}

impl ReqwestHttpClient {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .pool_idle_timeout(Duration::from_secs(60))
            .tcp_nodelay(true)
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn send(&self, request: &ProbeRequest) -> Result<HttpResponse, TransportError> {
        let mut builder = self
            .client
            .request(request.method.into(), &request.url)
            .timeout(request.timeout);

        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(e, request.timeout))?;

        let status_code = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::from_reqwest(e, request.timeout))?;

        Ok(HttpResponse {
            status_code,
            body,
            content_type,
        })
    }
}

/// One scripted reply of the mock client.
#[derive(Debug, Clone)]
pub enum MockReply {
    Respond { status_code: u16, body: String },
    Fail(String),
}

impl MockReply {
    pub fn ok(body: &str) -> Self {
        MockReply::Respond {
            status_code: 200,
            body: body.to_string(),
        }
    }

    pub fn status(status_code: u16, body: &str) -> Self {
        MockReply::Respond {
            status_code,
            body: body.to_string(),
        }
    }

    pub fn fail(message: &str) -> Self {
        MockReply::Fail(message.to_string())
    }
}

/// In-memory client. Each URL has a queue of replies; the last reply of a
/// queue repeats forever. Unknown URLs get the default reply.
pub struct MockHttpClient {
    responses: Mutex<HashMap<String, VecDeque<MockReply>>>,
    default_response: MockReply,
    latency: Duration,
    calls: Mutex<HashMap<String, usize>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockHttpClient {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(HashMap::new()),
            default_response: MockReply::status(404, "Not Found"),
            latency: Duration::ZERO,
            calls: Mutex::new(HashMap::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_response(self, url: &str, status_code: u16, body: &str) -> Self {
        self.with_sequence(url, vec![MockReply::status(status_code, body)])
    }

    pub fn with_failure(self, url: &str, message: &str) -> Self {
        self.with_sequence(url, vec![MockReply::fail(message)])
    }

    pub fn with_sequence(self, url: &str, replies: Vec<MockReply>) -> Self {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(url.to_string(), replies.into());
        self
    }

    pub fn with_default_response(mut self, status_code: u16, body: &str) -> Self {
        self.default_response = MockReply::status(status_code, body);
        self
    }

    /// Every request sleeps this long before replying.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn calls(&self, url: &str) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(url)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .sum()
    }

    /// Highest number of requests observed in flight at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn next_reply(&self, url: &str) -> MockReply {
        *self
            .calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(url.to_string())
            .or_insert(0) += 1;

        let mut responses = self.responses.lock().unwrap_or_else(PoisonError::into_inner);
        let reply = match responses.get_mut(url) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        };
        reply.unwrap_or_else(|| self.default_response.clone())
    }
}

impl Default for MockHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClient for MockHttpClient {
    async fn send(&self, request: &ProbeRequest) -> Result<HttpResponse, TransportError> {
        let reply = self.next_reply(&request.url);

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match reply {
            MockReply::Respond { status_code, body } => Ok(HttpResponse {
                status_code,
                body,
                content_type: Some("text/plain".to_string()),
            }),
            MockReply::Fail(message) => Err(TransportError::Connect(message)),
        }
    }
}
