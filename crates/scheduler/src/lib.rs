pub mod alarms;
pub mod maintenance;
pub mod metrics;
pub mod runner;

pub use alarms::{AlarmSource, NoAlarms, ScheduledAlarm};
pub use maintenance::{Maintenance, MaintenanceOutcome, MIN_RETENTION};
pub use metrics::SchedulerMetrics;
pub use runner::{
    Scheduler, SchedulerError, SchedulerHandle, SchedulerState, DEFAULT_MAX_CONCURRENT_CHECKS,
};
