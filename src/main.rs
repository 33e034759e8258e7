use anyhow::{Context, Result};
use clap::Parser;
use ollama_monitor::report::write_report;
use ollama_monitor::server::{self, StatusState};
use ollama_monitor::{
    init_tracing, AlertSink, AlertThresholdEvaluator, CheckFanOut, ContinuousScheduler,
    EndpointSpec, FileReporter, LoadGenerator, LogFormat, MetricsRegistry, MonitorConfig,
    MonitorError, ProbeExecutor, ReportFormat, ReqwestHttpClient, Shutdown, WebhookAlertSink,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Debug, Parser)]
#[command(name = "ollama-monitor", version, about = "Monitor Ollama API endpoints")]
struct Cli {
    /// Base URL of the API to monitor
    #[arg(long)]
    url: Option<String>,

    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Per-request timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Serve Prometheus metrics and status endpoints
    #[arg(long)]
    prometheus: bool,

    #[arg(long, default_value_t = 8000)]
    metrics_port: u16,

    /// Run a load test instead of a health check
    #[arg(long)]
    load_test: bool,

    #[arg(long, default_value_t = 100)]
    num_requests: usize,

    #[arg(long, default_value_t = 10)]
    concurrency: usize,

    /// Endpoint path to load test (defaults to the first configured endpoint)
    #[arg(long)]
    load_endpoint: Option<String>,

    /// Keep checking every `--interval` seconds until Ctrl-C
    #[arg(long)]
    continuous: bool,

    /// Seconds between checks in continuous mode
    #[arg(long)]
    interval: Option<u64>,

    #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
    report_format: ReportFormat,

    #[arg(long, default_value = "ollama_monitor_report.txt")]
    output: PathBuf,

    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

impl Cli {
    fn apply_overrides(&self, config: &mut MonitorConfig) {
        if let Some(url) = &self.url {
            config.base_url = url.clone();
        }
        if let Some(timeout) = self.timeout {
            config.timeout = Duration::from_secs(timeout);
        }
        if let Some(interval) = self.interval {
            config.interval = Duration::from_secs(interval);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let log_format = if cli.json_logs {
        LogFormat::Json
    } else {
        LogFormat::Text
    };
    init_tracing(&cli.log_level, log_format).context("failed to initialise logging")?;

    let mut config = MonitorConfig::load(cli.config.as_deref())?;
    cli.apply_overrides(&mut config);
    config.validate()?;
    config.log_configuration();

    let http_client =
        Arc::new(ReqwestHttpClient::new(config.timeout).map_err(MonitorError::ClientBuild)?);
    let mut executor = ProbeExecutor::new(
        http_client,
        config.base_url.clone(),
        config.timeout,
        config.retry,
    );

    let metrics = cli.prometheus.then(|| Arc::new(MetricsRegistry::new()));
    if let Some(metrics) = &metrics {
        executor = executor.with_metrics(metrics.clone());
    }
    let executor = Arc::new(executor);

    let sink: Option<Arc<dyn AlertSink>> = match &config.alerting.webhook_url {
        Some(url) if config.alerting.is_active() => Some(Arc::new(
            WebhookAlertSink::new(url.clone()).map_err(MonitorError::ClientBuild)?,
        )),
        _ => None,
    };
    let evaluator = Arc::new(AlertThresholdEvaluator::new(config.alerting.clone(), sink));

    let shutdown = Shutdown::new();
    let server_handle = metrics.as_ref().map(|metrics| {
        let addr = SocketAddr::from(([0, 0, 0, 0], cli.metrics_port));
        let state = StatusState {
            evaluator: evaluator.clone(),
            metrics: Some(metrics.clone()),
        };
        let mut stop = shutdown.subscribe();
        tokio::spawn(async move {
            let signal = async move {
                let _ = stop.wait_for(|stopped| *stopped).await;
            };
            if let Err(e) = server::serve(addr, state, signal).await {
                error!(error = %e, "status server failed");
            }
        })
    });

    if cli.load_test {
        let endpoint = load_test_endpoint(&config, cli.load_endpoint.as_deref())?;
        let summary = LoadGenerator::new(executor)
            .run(&endpoint, cli.num_requests, cli.concurrency)
            .await?;
        summary.log();
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else if cli.continuous {
        let fan_out = Arc::new(CheckFanOut::new(
            executor,
            config.endpoints.clone(),
            evaluator,
        ));
        let reporter = Arc::new(FileReporter::new(cli.output.clone(), cli.report_format));
        let mut scheduler = ContinuousScheduler::new(fan_out, config.interval, &shutdown)
            .with_reporter(reporter);

        let trigger = shutdown.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("received Ctrl-C, shutting down"),
                Err(e) => warn!(error = %e, "failed to listen for Ctrl-C, shutting down"),
            }
            trigger.trigger();
        });

        scheduler.run().await;
    } else {
        let fan_out = CheckFanOut::new(executor, config.endpoints.clone(), evaluator);
        let outcomes = fan_out.run_checks().await;
        write_report(&cli.output, cli.report_format, fan_out.endpoints(), &outcomes).await?;
    }

    shutdown.trigger();
    if let Some(handle) = server_handle {
        let _ = handle.await;
    }
    info!("monitoring finished");
    Ok(())
}

fn load_test_endpoint(config: &MonitorConfig, path: Option<&str>) -> Result<EndpointSpec> {
    match path {
        Some(path) => Ok(config
            .endpoint(path)
            .cloned()
            .unwrap_or_else(|| EndpointSpec::new(path))),
        None => config
            .endpoints
            .first()
            .cloned()
            .context("no endpoints configured for the load test"),
    }
}
