use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Scheduler operational metrics, as read from a [`crate::SchedulerHandle`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SchedulerMetrics {
    /// Alarm ticks that fetched due alarms successfully.
    pub alarm_ticks: u64,
    /// Alarm ticks abandoned because fetching due alarms failed.
    pub skipped_alarm_ticks: u64,
    pub checks_dispatched: u64,
    pub checks_succeeded: u64,
    pub checks_failed: u64,
    /// Maintenance passes that completed, including the one run at start.
    pub maintenance_passes: u64,
    /// Maintenance passes aborted by a storage error.
    pub maintenance_failures: u64,
    pub partitions_created: u64,
    pub partitions_rotated: u64,
    pub rotation_failures: u64,
    /// Watermark shared by the checks of the most recent alarm tick.
    pub last_watermark: Option<DateTime<Utc>>,
}

/// Lock-free counters shared between the control loop and check tasks.
#[derive(Debug, Default)]
pub(crate) struct SchedulerCounters {
    alarm_ticks: AtomicU64,
    skipped_alarm_ticks: AtomicU64,
    checks_dispatched: AtomicU64,
    checks_succeeded: AtomicU64,
    checks_failed: AtomicU64,
    maintenance_passes: AtomicU64,
    maintenance_failures: AtomicU64,
    partitions_created: AtomicU64,
    partitions_rotated: AtomicU64,
    rotation_failures: AtomicU64,
    last_watermark: Mutex<Option<DateTime<Utc>>>,
}

impl SchedulerCounters {
    pub(crate) fn record_alarm_tick(&self, watermark: DateTime<Utc>, dispatched: usize) {
        self.alarm_ticks.fetch_add(1, Ordering::Relaxed);
        self.checks_dispatched.fetch_add(dispatched as u64, Ordering::Relaxed);
        *self.last_watermark.lock().expect("watermark lock poisoned") = Some(watermark);
    }

    pub(crate) fn record_skipped_tick(&self) {
        self.skipped_alarm_ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_check(&self, ok: bool) {
        let counter = if ok { &self.checks_succeeded } else { &self.checks_failed };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_maintenance(&self, created: usize, rotated: usize, rotation_failures: usize) {
        self.maintenance_passes.fetch_add(1, Ordering::Relaxed);
        self.partitions_created.fetch_add(created as u64, Ordering::Relaxed);
        self.partitions_rotated.fetch_add(rotated as u64, Ordering::Relaxed);
        self.rotation_failures.fetch_add(rotation_failures as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_maintenance_failure(&self) {
        self.maintenance_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> SchedulerMetrics {
        SchedulerMetrics {
            alarm_ticks: self.alarm_ticks.load(Ordering::Relaxed),
            skipped_alarm_ticks: self.skipped_alarm_ticks.load(Ordering::Relaxed),
            checks_dispatched: self.checks_dispatched.load(Ordering::Relaxed),
            checks_succeeded: self.checks_succeeded.load(Ordering::Relaxed),
            checks_failed: self.checks_failed.load(Ordering::Relaxed),
            maintenance_passes: self.maintenance_passes.load(Ordering::Relaxed),
            maintenance_failures: self.maintenance_failures.load(Ordering::Relaxed),
            partitions_created: self.partitions_created.load(Ordering::Relaxed),
            partitions_rotated: self.partitions_rotated.load(Ordering::Relaxed),
            rotation_failures: self.rotation_failures.load(Ordering::Relaxed),
            last_watermark: *self.last_watermark.lock().expect("watermark lock poisoned"),
        }
    }
}
