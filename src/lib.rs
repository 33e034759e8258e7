pub mod alerting;
pub mod config;
pub mod error;
pub mod fanout;
pub mod http_client;
pub mod logging;
pub mod metrics;
pub mod probe;
pub mod report;
pub mod retry;
pub mod scheduler;
pub mod server;

pub use alerting::{
    Alert, AlertSink, AlertThresholdEvaluator, EndpointAlertState, EndpointStats, MockAlertSink,
    Severity, WebhookAlertSink,
};
pub use config::{AlertConfig, EndpointSpec, HttpMethod, MonitorConfig};
pub use error::{ConfigError, MonitorError, TransportError};
pub use fanout::CheckFanOut;
pub use http_client::{HttpClient, HttpResponse, MockHttpClient, ProbeRequest, ReqwestHttpClient};
pub use load_test::{LatencyStats, LoadGenerator, LoadTestSummary};
pub use logging::{init_tracing, LogFormat};
pub use metrics::MetricsRegistry;
pub use probe::{MismatchReason, ProbeExecutor, ProbeOutcome};
pub use report::{FileReporter, ReportFormat};
pub use retry::RetryPolicy;
pub use scheduler::{ContinuousScheduler, CycleReporter, SchedulerState, Shutdown};
pub use server::{status_router, StatusState};
