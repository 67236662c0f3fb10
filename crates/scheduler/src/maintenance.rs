//! One maintenance pass: provision partitions for every stream, then rotate.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use metronome_core::{Config, CoreError, StreamName};
use metronome_storage::{
    PartitionManager, PartitionStore, RotationFailure, RotationManager, StoreError,
    DEFAULT_ROTATE_AFTER,
};

/// Shortest usable retention. Tomorrow's partition is provisioned up to a day
/// before it goes live and receives writes for a further day, so anything
/// shorter would rotate a partition that is still current.
pub const MIN_RETENTION: Duration = Duration::from_secs(48 * 3_600);

#[derive(Debug, Clone, Default, Serialize)]
pub struct MaintenanceOutcome {
    pub created: Vec<String>,
    pub rotated: Vec<String>,
    pub rotation_failures: Vec<RotationFailure>,
}

/// Partition upkeep for a fixed set of streams.
pub struct Maintenance {
    manager: PartitionManager,
    rotation: RotationManager,
    streams: Vec<StreamName>,
    retention: Duration,
}

impl Maintenance {
    pub fn new(store: Arc<dyn PartitionStore>, streams: Vec<StreamName>) -> Self {
        Self {
            manager: PartitionManager::new(store.clone()),
            rotation: RotationManager::new(store),
            streams,
            retention: DEFAULT_ROTATE_AFTER,
        }
    }

    /// Streams and retention taken from configuration.
    pub fn from_config(store: Arc<dyn PartitionStore>, config: &Config) -> Result<Self, CoreError> {
        let streams = config.streams.stream_names()?;
        Ok(Self::new(store, streams).with_retention(config.scheduler.retention()))
    }

    /// Set the retention window, raised to [`MIN_RETENTION`] if shorter.
    pub fn with_retention(mut self, retention: Duration) -> Self {
        if retention < MIN_RETENTION {
            warn!(
                requested = ?retention,
                minimum = ?MIN_RETENTION,
                "retention shorter than the provisioning horizon, clamping"
            );
        }
        self.retention = retention.max(MIN_RETENTION);
        self
    }

    pub fn streams(&self) -> &[StreamName] {
        &self.streams
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// Ensure every stream's partitions, then rotate every stream.
    ///
    /// Provisioning always completes before rotation begins. Any provisioning
    /// or listing error aborts the pass; individual failed drops are
    /// collected in the outcome instead.
    pub async fn run_pass(&self, now: DateTime<Utc>) -> Result<MaintenanceOutcome, StoreError> {
        let mut outcome = MaintenanceOutcome::default();

        for stream in &self.streams {
            self.manager.ensure_stream(stream).await?;
            let report = self.manager.ensure_partitions(stream, &now).await?;
            outcome
                .created
                .extend(report.created.into_iter().map(|r| r.partition_name));
        }

        for stream in &self.streams {
            let report = self.rotation.rotate_at(stream, self.retention, now).await?;
            outcome.rotated.extend(report.rotated);
            outcome.rotation_failures.extend(report.failed);
        }

        if !outcome.created.is_empty() || !outcome.rotated.is_empty() {
            info!(
                created = outcome.created.len(),
                rotated = outcome.rotated.len(),
                failed = outcome.rotation_failures.len(),
                "maintenance pass complete"
            );
        }
        Ok(outcome)
    }
}
