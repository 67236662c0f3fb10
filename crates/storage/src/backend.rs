use async_trait::async_trait;
use chrono::{DateTime, Utc};

use metronome_core::{PartitionSpec, PlannedQuery, Points, Sample, StreamName};

use crate::error::StoreError;
use crate::registry::PartitionRecord;

/// A storage engine with range-partitioned child relations.
///
/// Every method that mutates partitions is atomic: a partition and its
/// registry row are created together or not at all, and dropped together or
/// not at all. Implementations: [`crate::PgStore`] (PostgreSQL declarative
/// partitioning) and [`crate::MemoryStore`] (in-process emulation).
#[async_trait]
pub trait PartitionStore: Send + Sync {
    /// Create the parent relation of `stream` if it does not exist yet.
    async fn ensure_stream(&self, stream: &StreamName) -> Result<(), StoreError>;

    /// Whether the registry knows a partition called `name`.
    async fn partition_exists(&self, name: &str) -> Result<bool, StoreError>;

    /// Every registered partition of `stream`, ordered by range start.
    async fn list_partitions(&self, stream: &StreamName) -> Result<Vec<PartitionRecord>, StoreError>;

    /// Registered partitions of `stream` with `created_at < cutoff`.
    async fn list_partitions_older_than(
        &self,
        stream: &StreamName,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<PartitionRecord>, StoreError>;

    /// Create the physical partition described by `spec`, attach it to its
    /// stream and register it, in one transaction.
    async fn create_partition(
        &self,
        spec: &PartitionSpec,
        created_at: DateTime<Utc>,
    ) -> Result<PartitionRecord, StoreError>;

    /// Drop the physical partition and delete its registry row, in one transaction.
    async fn drop_partition(&self, record: &PartitionRecord) -> Result<(), StoreError>;

    /// Append samples. Fails with [`StoreError::NoPartition`] if any sample
    /// falls outside every partition; nothing is written in that case.
    async fn insert_samples(&self, stream: &StreamName, samples: &[Sample]) -> Result<(), StoreError>;

    async fn count(&self, stream: &StreamName, query: &PlannedQuery) -> Result<u64, StoreError>;

    async fn find(&self, stream: &StreamName, query: &PlannedQuery) -> Result<Points, StoreError>;
}
