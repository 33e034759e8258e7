//! Alert-threshold bookkeeping and alert delivery.
//!
//! [`AlertThresholdEvaluator`] owns the per-endpoint counters and decides when
//! a probe outcome warrants an alert. Delivery is delegated to an
//! [`AlertSink`]; [`WebhookAlertSink`] posts JSON to a webhook URL.

pub mod evaluator;
pub mod sink;

pub use evaluator::{AlertThresholdEvaluator, EndpointAlertState, EndpointStats};
pub use sink::{Alert, AlertSink, MockAlertSink, Severity, WebhookAlertSink};
