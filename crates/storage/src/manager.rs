use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use tracing::{debug, info};

use metronome_core::{PartitionSpec, StreamName};

use crate::backend::PartitionStore;
use crate::error::StoreError;
use crate::registry::PartitionRecord;

/// Partitions created by one [`PartitionManager::ensure_partitions`] call.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EnsureReport {
    pub created: Vec<PartitionRecord>,
}

impl EnsureReport {
    pub fn created_names(&self) -> Vec<&str> {
        self.created.iter().map(|r| r.partition_name.as_str()).collect()
    }
}

/// Keeps today's and tomorrow's partitions of a stream provisioned.
///
/// Provisioning one day ahead means a writer crossing the UTC day boundary
/// never finds its partition missing, so the write path never creates
/// partitions itself.
#[derive(Clone)]
pub struct PartitionManager {
    store: Arc<dyn PartitionStore>,
}

impl PartitionManager {
    pub fn new(store: Arc<dyn PartitionStore>) -> Self {
        Self { store }
    }

    pub async fn ensure_stream(&self, stream: &StreamName) -> Result<(), StoreError> {
        self.store.ensure_stream(stream).await
    }

    /// Guarantee that the partitions covering the UTC day of `reference` and
    /// the following day exist and are registered.
    ///
    /// Idempotent: partitions already in the registry are left alone. Each
    /// missing partition is created and registered in its own transaction;
    /// an error aborts the call after rolling back the failing partition.
    pub async fn ensure_partitions<Tz: TimeZone>(
        &self,
        stream: &StreamName,
        reference: &DateTime<Tz>,
    ) -> Result<EnsureReport, StoreError> {
        let created_at = reference.with_timezone(&Utc);
        let today = PartitionSpec::covering(stream, reference)?;
        let tomorrow = PartitionSpec::covering(stream, &today.range_end)?;

        let mut report = EnsureReport::default();
        for spec in [today, tomorrow] {
            if self.store.partition_exists(&spec.name).await? {
                debug!(stream = %stream, partition = %spec.name, "partition already provisioned");
                continue;
            }
            let record = self.store.create_partition(&spec, created_at).await?;
            info!(
                stream = %stream,
                partition = %record.partition_name,
                from = %record.range_start,
                to = %record.range_end,
                "partition created"
            );
            report.created.push(record);
        }
        Ok(report)
    }
}
