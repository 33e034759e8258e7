use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ollama_monitor::{
    AlertConfig, AlertSink, AlertThresholdEvaluator, CheckFanOut, EndpointSpec, LatencyStats,
    MockAlertSink, MockHttpClient, ProbeExecutor, RetryPolicy,
};
use std::sync::Arc;
use std::time::Duration;

fn alert_config() -> AlertConfig {
    AlertConfig {
        enabled: true,
        webhook_url: Some("https://hooks.example.com/bench".to_string()),
        ..AlertConfig::default()
    }
}

fn bench_record_check(c: &mut Criterion) {
    let evaluator = AlertThresholdEvaluator::new(AlertConfig::default(), None);
    let mut n = 0u64;
    c.bench_function("record_check", |b| {
        b.iter(|| {
            n += 1;
            black_box(evaluator.record_check("/api/tags", n % 7 != 0))
        })
    });
}

fn bench_record_and_evaluate(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let sink: Arc<dyn AlertSink> = Arc::new(MockAlertSink::new());
    let evaluator = AlertThresholdEvaluator::new(alert_config(), Some(sink));

    c.bench_function("record_and_evaluate_success", |b| {
        b.iter(|| {
            rt.block_on(async {
                black_box(evaluator.record_and_evaluate("/", true, None).await)
            })
        })
    });
}

fn bench_latency_stats(c: &mut Criterion) {
    let samples: Vec<Duration> = (0..1000u64)
        .map(|i| Duration::from_micros((i * 7919) % 250_000))
        .collect();

    c.bench_function("latency_stats_1000", |b| {
        b.iter(|| black_box(LatencyStats::from_samples(black_box(&samples))))
    });
}

fn bench_fan_out_cycle(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let paths = ["/", "/api/tags", "/api/version", "/api/ps"];
    let client = paths.iter().fold(MockHttpClient::new(), |client, path| {
        client.with_response(&format!("http://ollama.bench{path}"), 200, "ok")
    });
    let executor = Arc::new(ProbeExecutor::new(
        Arc::new(client),
        "http://ollama.bench",
        Duration::from_secs(10),
        RetryPolicy::new(1, Duration::ZERO),
    ));
    let evaluator = Arc::new(AlertThresholdEvaluator::new(AlertConfig::default(), None));
    let endpoints = paths.iter().map(|path| EndpointSpec::new(*path)).collect();
    let fan_out = CheckFanOut::new(executor, endpoints, evaluator);

    c.bench_function("fan_out_cycle_4_endpoints", |b| {
        b.iter(|| rt.block_on(async { black_box(fan_out.run_checks().await) }))
    });
}

criterion_group!(
    benches,
    bench_record_check,
    bench_record_and_evaluate,
    bench_latency_stats,
    bench_fan_out_cycle
);
criterion_main!(benches);
