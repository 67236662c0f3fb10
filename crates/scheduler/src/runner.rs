use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{watch, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::alarms::AlarmSource;
use crate::maintenance::Maintenance;
use crate::metrics::{SchedulerCounters, SchedulerMetrics};

/// Default cap on alarm checks executing at the same time.
pub const DEFAULT_MAX_CONCURRENT_CHECKS: usize = 64;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("{0} interval must be greater than zero")]
    ZeroInterval(&'static str),
}

/// Lifecycle: `Idle` before `start`, `Running` while the control loop is
/// alive, `Stopped` once it has exited. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerState {
    Idle,
    Running,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopSignal {
    Run,
    /// Exit and leave in-flight checks running detached.
    Stop,
    /// Exit after every in-flight check has finished.
    Drain,
}

/// Drives periodic partition maintenance and alarm checks.
///
/// Maintenance runs synchronously inside the control loop, so passes never
/// overlap. Each alarm tick spawns one dispatch task that fetches due alarms
/// and fans out one check per alarm, gated by a semaphore. Neither a slow
/// fetch nor a slow check delays the next tick, maintenance or stop.
pub struct Scheduler {
    maintenance: Arc<Maintenance>,
    alarms: Arc<dyn AlarmSource>,
    max_concurrent_checks: usize,
}

impl Scheduler {
    pub fn new(maintenance: Maintenance, alarms: Arc<dyn AlarmSource>) -> Self {
        Self {
            maintenance: Arc::new(maintenance),
            alarms,
            max_concurrent_checks: DEFAULT_MAX_CONCURRENT_CHECKS,
        }
    }

    /// Cap concurrent alarm checks. Values below one are raised to one.
    pub fn with_max_concurrent_checks(mut self, limit: usize) -> Self {
        self.max_concurrent_checks = limit.max(1);
        self
    }

    pub fn state(&self) -> SchedulerState {
        SchedulerState::Idle
    }

    /// Run one maintenance pass, then spawn the control loop.
    ///
    /// A failing first pass is logged and retried on the next maintenance
    /// tick; it does not prevent the scheduler from starting.
    pub async fn start(
        self,
        alarm_interval: Duration,
        maintenance_interval: Duration,
    ) -> Result<SchedulerHandle, SchedulerError> {
        if alarm_interval.is_zero() {
            return Err(SchedulerError::ZeroInterval("alarm"));
        }
        if maintenance_interval.is_zero() {
            return Err(SchedulerError::ZeroInterval("maintenance"));
        }

        info!(
            alarm_interval = ?alarm_interval,
            maintenance_interval = ?maintenance_interval,
            max_concurrent_checks = self.max_concurrent_checks,
            streams = self.maintenance.streams().len(),
            "scheduler starting"
        );

        let counters = Arc::new(SchedulerCounters::default());
        run_maintenance(&self.maintenance, &counters).await;

        let (stop_tx, stop_rx) = watch::channel(StopSignal::Run);
        let stopped = Arc::new(AtomicBool::new(false));
        let control = ControlLoop {
            maintenance: self.maintenance,
            alarms: self.alarms,
            gate: Arc::new(Semaphore::new(self.max_concurrent_checks)),
            fetch_timeout: alarm_interval,
            in_flight: JoinSet::new(),
            counters: counters.clone(),
        };
        let task = tokio::spawn(control.run(
            alarm_interval,
            maintenance_interval,
            stop_rx,
            stopped.clone(),
        ));

        Ok(SchedulerHandle {
            stop_tx,
            task,
            counters,
            stopped,
        })
    }
}

/// Handle to a running scheduler. Dropping it stops the control loop.
pub struct SchedulerHandle {
    stop_tx: watch::Sender<StopSignal>,
    task: JoinHandle<()>,
    counters: Arc<SchedulerCounters>,
    stopped: Arc<AtomicBool>,
}

impl SchedulerHandle {
    /// Ask the control loop to exit. In-flight checks keep running detached.
    ///
    /// Returns `false` if a stop was already requested; repeated calls are
    /// harmless.
    pub fn stop(&self) -> bool {
        self.signal(StopSignal::Stop)
    }

    /// Stop the control loop and wait for it and every in-flight check.
    ///
    /// Also upgrades an earlier [`stop`](Self::stop) that the loop has not
    /// acted on yet. Checks already detached by a completed stop are not
    /// awaited.
    pub async fn shutdown(self) {
        self.signal(StopSignal::Drain);
        self.join().await;
    }

    /// Wait for the control loop to exit.
    pub async fn join(self) {
        let SchedulerHandle { stop_tx, task, .. } = self;
        if let Err(e) = task.await {
            error!(error = %e, "scheduler control loop panicked");
        }
        drop(stop_tx);
    }

    pub fn state(&self) -> SchedulerState {
        if self.stopped.load(Ordering::Acquire) {
            SchedulerState::Stopped
        } else {
            SchedulerState::Running
        }
    }

    pub fn metrics(&self) -> SchedulerMetrics {
        self.counters.snapshot()
    }

    fn signal(&self, signal: StopSignal) -> bool {
        self.stop_tx.send_if_modified(|current| {
            let escalates = match *current {
                StopSignal::Run => true,
                StopSignal::Stop => signal == StopSignal::Drain,
                StopSignal::Drain => false,
            };
            if escalates {
                *current = signal;
            }
            escalates
        })
    }
}

enum Event {
    AlarmTick,
    MaintenanceTick,
    Stop(StopSignal),
}

struct ControlLoop {
    maintenance: Arc<Maintenance>,
    alarms: Arc<dyn AlarmSource>,
    gate: Arc<Semaphore>,
    fetch_timeout: Duration,
    /// Dispatch tasks, each owning the checks of one tick.
    in_flight: JoinSet<()>,
    counters: Arc<SchedulerCounters>,
}

impl ControlLoop {
    async fn run(
        mut self,
        alarm_interval: Duration,
        maintenance_interval: Duration,
        mut stop: watch::Receiver<StopSignal>,
        stopped: Arc<AtomicBool>,
    ) {
        let now = Instant::now();
        let mut alarm_ticker = interval_at(now + alarm_interval, alarm_interval);
        alarm_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut maintenance_ticker = interval_at(now + maintenance_interval, maintenance_interval);
        maintenance_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let signal = loop {
            let event = tokio::select! {
                _ = alarm_ticker.tick() => Event::AlarmTick,
                _ = maintenance_ticker.tick() => Event::MaintenanceTick,
                changed = stop.changed() => match changed {
                    Ok(()) => Event::Stop(*stop.borrow_and_update()),
                    // Every handle is gone.
                    Err(_) => Event::Stop(StopSignal::Stop),
                },
            };

            // A stop that raced a tick wins; no new work starts after it.
            let pending = *stop.borrow();
            if pending != StopSignal::Run {
                break pending;
            }

            match event {
                Event::AlarmTick => self.spawn_dispatch(),
                Event::MaintenanceTick => run_maintenance(&self.maintenance, &self.counters).await,
                Event::Stop(StopSignal::Run) => {}
                Event::Stop(signal) => break signal,
            }
            self.reap_finished();
        };

        // A drain requested after a stop, before the loop acted on it.
        let signal = if *stop.borrow() == StopSignal::Drain {
            StopSignal::Drain
        } else {
            signal
        };

        match signal {
            StopSignal::Drain => {
                info!(in_flight = self.in_flight.len(), "scheduler draining alarm checks");
                while let Some(result) = self.in_flight.join_next().await {
                    log_join_error(result);
                }
            }
            _ => {
                if !self.in_flight.is_empty() {
                    info!(in_flight = self.in_flight.len(), "scheduler leaving alarm checks running");
                }
                self.in_flight.detach_all();
            }
        }

        stopped.store(true, Ordering::Release);
        info!("scheduler stopped");
    }

    fn spawn_dispatch(&mut self) {
        self.in_flight.spawn(dispatch_checks(
            self.alarms.clone(),
            self.gate.clone(),
            self.counters.clone(),
            self.fetch_timeout,
        ));
    }

    fn reap_finished(&mut self) {
        while let Some(result) = self.in_flight.try_join_next() {
            log_join_error(result);
        }
    }
}

/// Fetch due alarms once and run one check per alarm, all sharing one watermark.
///
/// The fetch is bounded by `fetch_timeout` so a hung source cannot pile up
/// dispatch tasks across ticks.
async fn dispatch_checks(
    source: Arc<dyn AlarmSource>,
    gate: Arc<Semaphore>,
    counters: Arc<SchedulerCounters>,
    fetch_timeout: Duration,
) {
    let alarms = match timeout(fetch_timeout, source.alarms_to_check(Utc::now())).await {
        Ok(Ok(alarms)) => alarms,
        Ok(Err(e)) => {
            warn!(error = %e, "fetching due alarms failed, skipping tick");
            counters.record_skipped_tick();
            return;
        }
        Err(_) => {
            warn!(timeout = ?fetch_timeout, "fetching due alarms timed out, skipping tick");
            counters.record_skipped_tick();
            return;
        }
    };
    let watermark = Utc::now();
    counters.record_alarm_tick(watermark, alarms.len());

    if alarms.is_empty() {
        debug!("no alarms due");
        return;
    }
    debug!(count = alarms.len(), watermark = %watermark, "dispatching alarm checks");

    let mut checks = JoinSet::new();
    for alarm in alarms {
        let source = source.clone();
        let gate = gate.clone();
        let counters = counters.clone();
        checks.spawn(async move {
            // The gate is never closed.
            let Ok(_permit) = gate.acquire_owned().await else {
                return;
            };
            match source.check_alarm(alarm.id, watermark).await {
                Ok(()) => counters.record_check(true),
                Err(e) => {
                    warn!(alarm_id = alarm.id, error = %e, "alarm check failed");
                    counters.record_check(false);
                }
            }
        });
    }
    while let Some(result) = checks.join_next().await {
        log_join_error(result);
    }
}

fn log_join_error(result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        if e.is_panic() {
            error!(error = %e, "alarm check panicked");
        }
    }
}

async fn run_maintenance(maintenance: &Maintenance, counters: &SchedulerCounters) {
    match maintenance.run_pass(Utc::now()).await {
        Ok(outcome) => counters.record_maintenance(
            outcome.created.len(),
            outcome.rotated.len(),
            outcome.rotation_failures.len(),
        ),
        Err(e) if e.is_transient() => {
            counters.record_maintenance_failure();
            warn!(error = %e, "maintenance pass failed, retrying next tick");
        }
        Err(e) => {
            counters.record_maintenance_failure();
            error!(error = %e, "maintenance pass aborted");
        }
    }
}
