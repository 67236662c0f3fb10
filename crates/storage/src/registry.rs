//! The `partition_records` table: the single source of truth for which
//! physical partitions exist.
//!
//! [`PartitionRegistry`] is a stateless unit struct whose functions take any
//! PostgreSQL executor, so the same calls run against the pool or inside the
//! transaction that creates or drops the physical partition.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgExecutor;

use metronome_core::{PartitionSpec, StreamName};

use crate::error::StoreError;

/// Registry row describing one physical partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct PartitionRecord {
    #[sqlx(try_from = "String")]
    pub parent_stream: StreamName,
    pub partition_name: String,
    /// Inclusive lower bound of the partition range.
    pub range_start: DateTime<Utc>,
    /// Exclusive upper bound of the partition range.
    pub range_end: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl PartitionRecord {
    pub fn from_spec(spec: &PartitionSpec, created_at: DateTime<Utc>) -> Self {
        Self {
            parent_stream: spec.stream.clone(),
            partition_name: spec.name.clone(),
            range_start: spec.range_start,
            range_end: spec.range_end,
            created_at,
        }
    }

    /// Whether this partition's retention window has elapsed at `cutoff`.
    pub fn is_older_than(&self, cutoff: DateTime<Utc>) -> bool {
        self.created_at < cutoff
    }
}

const RECORD_COLUMNS: &str = "parent_stream, partition_name, range_start, range_end, created_at";

/// Stateless access to `partition_records`.
pub struct PartitionRegistry;

impl PartitionRegistry {
    /// Insert the registry row for a freshly created partition.
    pub async fn record_partition<'e, E: PgExecutor<'e>>(
        executor: E,
        spec: &PartitionSpec,
        created_at: DateTime<Utc>,
    ) -> Result<PartitionRecord, sqlx::Error> {
        let sql = format!(
            "INSERT INTO partition_records ({RECORD_COLUMNS})
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {RECORD_COLUMNS}"
        );
        sqlx::query_as::<_, PartitionRecord>(&sql)
            .bind(spec.stream.as_str())
            .bind(&spec.name)
            .bind(spec.range_start)
            .bind(spec.range_end)
            .bind(created_at)
            .fetch_one(executor)
            .await
    }

    pub async fn partition_exists<'e, E: PgExecutor<'e>>(
        executor: E,
        name: &str,
    ) -> Result<bool, StoreError> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM partition_records WHERE partition_name = $1)",
        )
        .bind(name)
        .fetch_one(executor)
        .await?;
        Ok(exists)
    }

    /// Every record of `stream`, ordered by range start.
    pub async fn list_partitions<'e, E: PgExecutor<'e>>(
        executor: E,
        stream: &StreamName,
    ) -> Result<Vec<PartitionRecord>, StoreError> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM partition_records
             WHERE parent_stream = $1
             ORDER BY range_start"
        );
        let rows = sqlx::query_as::<_, PartitionRecord>(&sql)
            .bind(stream.as_str())
            .fetch_all(executor)
            .await?;
        Ok(rows)
    }

    /// Records of `stream` created strictly before `cutoff`, oldest first.
    pub async fn list_partitions_older_than<'e, E: PgExecutor<'e>>(
        executor: E,
        stream: &StreamName,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<PartitionRecord>, StoreError> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM partition_records
             WHERE parent_stream = $1 AND created_at < $2
             ORDER BY created_at, range_start"
        );
        let rows = sqlx::query_as::<_, PartitionRecord>(&sql)
            .bind(stream.as_str())
            .bind(cutoff)
            .fetch_all(executor)
            .await?;
        Ok(rows)
    }

    /// Remove a registry row. Returns `false` when no row matched.
    pub async fn delete_partition_record<'e, E: PgExecutor<'e>>(
        executor: E,
        name: &str,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM partition_records WHERE partition_name = $1")
            .bind(name)
            .execute(executor)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
