use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use metronome_core::StreamName;

use crate::backend::PartitionStore;
use crate::error::StoreError;

/// Default retention: 720 hours (30 days).
pub const DEFAULT_ROTATE_AFTER: Duration = Duration::from_secs(720 * 3_600);

#[derive(Debug, Clone, Serialize)]
pub struct RotationFailure {
    pub partition: String,
    pub error: String,
}

/// Outcome of one rotation pass over a stream.
#[derive(Debug, Clone, Serialize)]
pub struct RotationReport {
    pub cutoff: DateTime<Utc>,
    pub rotated: Vec<String>,
    pub failed: Vec<RotationFailure>,
}

impl RotationReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Drops partitions whose retention window has elapsed.
#[derive(Clone)]
pub struct RotationManager {
    store: Arc<dyn PartitionStore>,
}

impl RotationManager {
    pub fn new(store: Arc<dyn PartitionStore>) -> Self {
        Self { store }
    }

    pub async fn rotate(&self, stream: &StreamName, retention: Duration) -> Result<RotationReport, StoreError> {
        self.rotate_at(stream, retention, Utc::now()).await
    }

    /// Drop every partition of `stream` created before `now - retention`.
    ///
    /// Each partition is dropped together with its registry row in its own
    /// transaction. A failing partition is reported and skipped; the rest
    /// of the pass continues. Only listing the candidates can fail the call.
    pub async fn rotate_at(
        &self,
        stream: &StreamName,
        retention: Duration,
        now: DateTime<Utc>,
    ) -> Result<RotationReport, StoreError> {
        let retention = chrono::Duration::from_std(retention).unwrap_or(chrono::Duration::MAX);
        let cutoff = now.checked_sub_signed(retention).unwrap_or(DateTime::<Utc>::MIN_UTC);

        let candidates = self.store.list_partitions_older_than(stream, cutoff).await?;
        let mut report = RotationReport {
            cutoff,
            rotated: Vec::with_capacity(candidates.len()),
            failed: Vec::new(),
        };

        for record in candidates {
            match self.store.drop_partition(&record).await {
                Ok(()) => {
                    info!(
                        stream = %stream,
                        partition = %record.partition_name,
                        created_at = %record.created_at,
                        "partition rotated"
                    );
                    report.rotated.push(record.partition_name);
                }
                Err(e) => {
                    warn!(
                        stream = %stream,
                        partition = %record.partition_name,
                        error = %e,
                        "partition rotation failed"
                    );
                    report.failed.push(RotationFailure {
                        partition: record.partition_name,
                        error: e.to_string(),
                    });
                }
            }
        }
        Ok(report)
    }
}
