use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An alarm the external collaborator reports as due for evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScheduledAlarm {
    pub id: i64,
}

/// The alarm-evaluation collaborator driven by the scheduler.
///
/// Both calls may fail; the scheduler logs the error and carries on. A
/// failing `alarms_to_check` skips that tick; a failing `check_alarm` only
/// affects its own alarm.
#[async_trait]
pub trait AlarmSource: Send + Sync {
    async fn alarms_to_check(&self, now: DateTime<Utc>) -> anyhow::Result<Vec<ScheduledAlarm>>;

    /// Evaluate one alarm as of `watermark`, the instant captured once for
    /// the whole tick.
    async fn check_alarm(&self, alarm_id: i64, watermark: DateTime<Utc>) -> anyhow::Result<()>;
}

/// Source that never reports anything due. Used when alarm evaluation runs
/// in another process.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAlarms;

#[async_trait]
impl AlarmSource for NoAlarms {
    async fn alarms_to_check(&self, _now: DateTime<Utc>) -> anyhow::Result<Vec<ScheduledAlarm>> {
        Ok(Vec::new())
    }

    async fn check_alarm(&self, alarm_id: i64, _watermark: DateTime<Utc>) -> anyhow::Result<()> {
        anyhow::bail!("alarm {alarm_id} checked but no alarm source is configured")
    }
}
