use crate::config::EndpointSpec;
use crate::error::MonitorError;
use crate::fanout::CheckFanOut;
use crate::probe::ProbeOutcome;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{self, Instant};
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Running,
    Stopping,
    Stopped,
}

/// Cooperative shutdown trigger shared between the process and the scheduler.
#[derive(Clone)]
pub struct Shutdown {
    sender: Arc<watch::Sender<bool>>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn trigger(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.sender.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Receives every completed cycle's ordered outcomes.
#[async_trait]
pub trait CycleReporter: Send + Sync {
    async fn report(
        &self,
        endpoints: &[EndpointSpec],
        outcomes: &[ProbeOutcome],
    ) -> Result<(), MonitorError>;
}

/// Runs a check cycle, waits `interval`, repeats, until shutdown is triggered.
///
/// Shutdown is only observed between cycles: a cycle that has started always
/// completes, alert evaluation included. `run` never fails; a cycle that
/// panics or a reporter that errors is logged and the loop carries on.
pub struct ContinuousScheduler {
    fan_out: Arc<CheckFanOut>,
    interval: Duration,
    shutdown: watch::Receiver<bool>,
    reporter: Option<Arc<dyn CycleReporter>>,
    state: SchedulerState,
    cycles: u64,
}

impl ContinuousScheduler {
    pub fn new(fan_out: Arc<CheckFanOut>, interval: Duration, shutdown: &Shutdown) -> Self {
        Self {
            fan_out,
            interval,
            shutdown: shutdown.subscribe(),
            reporter: None,
            state: SchedulerState::Running,
            cycles: 0,
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn CycleReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Returns the number of cycles that were run.
    pub async fn run(&mut self) -> u64 {
        self.state = SchedulerState::Running;
        info!(
            interval_secs = self.interval.as_secs_f64(),
            endpoints = self.fan_out.endpoints().len(),
            "starting continuous monitoring"
        );

        while !*self.shutdown.borrow_and_update() {
            self.run_cycle().await;
            if self.wait_for_next_cycle().await {
                break;
            }
        }

        self.state = SchedulerState::Stopping;
        info!(cycles = self.cycles, "shutdown requested, stopping monitor");
        self.state = SchedulerState::Stopped;
        info!(cycles = self.cycles, "continuous monitoring stopped");
        self.cycles
    }

    async fn run_cycle(&mut self) {
        self.cycles += 1;
        let cycle = self.cycles;
        debug!(cycle, "starting check cycle");

        let fan_out = self.fan_out.clone();
        let outcomes = match tokio::spawn(async move { fan_out.run_checks().await }).await {
            Ok(outcomes) => outcomes,
            Err(e) => {
                error!(cycle, error = %e, "check cycle failed");
                return;
            }
        };

        if let Some(reporter) = &self.reporter {
            if let Err(e) = reporter.report(self.fan_out.endpoints(), &outcomes).await {
                error!(cycle, error = %e, "failed to report check cycle");
            }
        }
    }

    /// Waits out the interval. Returns true when shutdown was requested.
    async fn wait_for_next_cycle(&mut self) -> bool {
        if *self.shutdown.borrow_and_update() {
            return true;
        }

        let deadline = Instant::now() + self.interval;
        loop {
            tokio::select! {
                _ = time::sleep_until(deadline) => return false,
                changed = self.shutdown.changed() => match changed {
                    Ok(()) if *self.shutdown.borrow_and_update() => return true,
                    Ok(()) => continue,
                    // Every trigger handle is gone, so nothing can stop us later.
                    Err(_) => return true,
                },
            }
        }
    }
}
