use crate::config::EndpointSpec;
use crate::error::MonitorError;
use crate::probe::ProbeOutcome;
use crate::scheduler::CycleReporter;
use askama::Template;
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use clap::ValueEnum;
use serde::Serialize;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    #[default]
    Text,
    Json,
    Csv,
    Html,
}

#[derive(Debug, Serialize)]
struct JsonReport<'a> {
    timestamp: String,
    summary: JsonSummary,
    endpoints: Vec<JsonEndpoint<'a>>,
}

#[derive(Debug, Serialize)]
struct JsonSummary {
    total_endpoints: usize,
    successful: usize,
    failed: usize,
}

#[derive(Debug, Serialize)]
struct JsonEndpoint<'a> {
    name: &'a str,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_time_seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Template)]
#[template(path = "report.html")]
struct HtmlReport {
    timestamp: String,
    total: usize,
    successful: usize,
    failed: usize,
    rows: Vec<HtmlRow>,
}

struct HtmlRow {
    name: String,
    status: &'static str,
    status_code: String,
    response_time: String,
    has_error: bool,
    error: String,
}

/// Render one cycle. `endpoints` and `outcomes` are paired by position.
pub fn render(
    format: ReportFormat,
    endpoints: &[EndpointSpec],
    outcomes: &[ProbeOutcome],
) -> Result<String, MonitorError> {
    match format {
        ReportFormat::Text => Ok(render_text(endpoints, outcomes)),
        ReportFormat::Json => render_json(endpoints, outcomes),
        ReportFormat::Csv => Ok(render_csv(endpoints, outcomes)),
        ReportFormat::Html => render_html(endpoints, outcomes),
    }
}

pub async fn write_report(
    path: &Path,
    format: ReportFormat,
    endpoints: &[EndpointSpec],
    outcomes: &[ProbeOutcome],
) -> Result<(), MonitorError> {
    let content = render(format, endpoints, outcomes)?;
    tokio::fs::write(path, content).await?;
    info!(path = %path.display(), ?format, "report written");
    Ok(())
}

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn endpoint_name(endpoints: &[EndpointSpec], idx: usize) -> String {
    endpoints
        .get(idx)
        .map(|endpoint| endpoint.path.clone())
        .unwrap_or_else(|| format!("endpoint_{}", idx + 1))
}

fn render_text(endpoints: &[EndpointSpec], outcomes: &[ProbeOutcome]) -> String {
    let mut report = String::new();
    let _ = writeln!(report, "Ollama Monitor Report");
    let _ = writeln!(report, "=====================");
    let _ = writeln!(report, "Generated: {}", timestamp());
    let _ = writeln!(report);

    for (idx, outcome) in outcomes.iter().enumerate() {
        let name = endpoint_name(endpoints, idx);
        match outcome {
            ProbeOutcome::Error { description } => {
                let _ = writeln!(report, "Endpoint {name}: An error occurred - {description}");
            }
            ProbeOutcome::Success {
                latency,
                status_code,
            } => {
                let _ = writeln!(report, "Endpoint {name}:");
                let _ = writeln!(report, "  Status: success");
                let _ = writeln!(report, "  Status Code: {status_code}");
                let _ = writeln!(
                    report,
                    "  Response Time: {:.2} seconds",
                    latency.as_secs_f64()
                );
                let _ = writeln!(report);
            }
            ProbeOutcome::Failure {
                latency,
                status_code,
                reason,
            } => {
                let _ = writeln!(report, "Endpoint {name}:");
                let _ = writeln!(report, "  Status: failed ({reason})");
                let _ = writeln!(report, "  Status Code: {status_code}");
                let _ = writeln!(
                    report,
                    "  Response Time: {:.2} seconds",
                    latency.as_secs_f64()
                );
                let _ = writeln!(report);
            }
        }
    }
    report
}

fn render_json(
    endpoints: &[EndpointSpec],
    outcomes: &[ProbeOutcome],
) -> Result<String, MonitorError> {
    let successful = outcomes.iter().filter(|o| o.is_success()).count();
    let names: Vec<String> = (0..outcomes.len())
        .map(|idx| endpoint_name(endpoints, idx))
        .collect();

    let report = JsonReport {
        timestamp: timestamp(),
        summary: JsonSummary {
            total_endpoints: outcomes.len(),
            successful,
            failed: outcomes.len() - successful,
        },
        endpoints: names
            .iter()
            .zip(outcomes)
            .map(|(name, outcome)| JsonEndpoint {
                name,
                status: outcome.label(),
                status_code: outcome.status_code(),
                response_time_seconds: outcome
                    .latency()
                    .map(|latency| (latency.as_secs_f64() * 1000.0).round() / 1000.0),
                error: outcome.error_description(),
            })
            .collect(),
    };

    Ok(serde_json::to_string_pretty(&report)?)
}

fn render_csv(endpoints: &[EndpointSpec], outcomes: &[ProbeOutcome]) -> String {
    let mut report = String::from("Endpoint,Status,Status Code,Response Time (s),Error\n");
    for (idx, outcome) in outcomes.iter().enumerate() {
        let status_code = outcome
            .status_code()
            .map_or_else(|| "-".to_string(), |code| code.to_string());
        let latency = outcome
            .latency()
            .map_or_else(|| "-".to_string(), |l| format!("{:.3}", l.as_secs_f64()));
        let error = outcome.error_description().unwrap_or_else(|| "-".to_string());
        let row = [
            csv_field(&endpoint_name(endpoints, idx)),
            outcome.label().to_string(),
            status_code,
            latency,
            csv_field(&error),
        ];
        report.push_str(&row.join(","));
        report.push('\n');
    }
    report
}

fn render_html(
    endpoints: &[EndpointSpec],
    outcomes: &[ProbeOutcome],
) -> Result<String, MonitorError> {
    let successful = outcomes.iter().filter(|o| o.is_success()).count();
    let rows = outcomes
        .iter()
        .enumerate()
        .map(|(idx, outcome)| {
            let error = outcome.error_description();
            HtmlRow {
                name: endpoint_name(endpoints, idx),
                status: outcome.label(),
                status_code: outcome
                    .status_code()
                    .map_or_else(|| "-".to_string(), |code| code.to_string()),
                response_time: outcome
                    .latency()
                    .map_or_else(|| "-".to_string(), |l| format!("{:.3}s", l.as_secs_f64())),
                has_error: error.is_some(),
                error: error.unwrap_or_default(),
            }
        })
        .collect();

    let report = HtmlReport {
        timestamp: timestamp(),
        total: outcomes.len(),
        successful,
        failed: outcomes.len() - successful,
        rows,
    };
    Ok(report.render()?)
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Rewrites the report file after every scheduler cycle.
pub struct FileReporter {
    path: PathBuf,
    format: ReportFormat,
}

impl FileReporter {
    pub fn new(path: impl Into<PathBuf>, format: ReportFormat) -> Self {
        Self {
            path: path.into(),
            format,
        }
    }
}

#[async_trait]
impl CycleReporter for FileReporter {
    async fn report(
        &self,
        endpoints: &[EndpointSpec],
        outcomes: &[ProbeOutcome],
    ) -> Result<(), MonitorError> {
        write_report(&self.path, self.format, endpoints, outcomes).await
    }
}
