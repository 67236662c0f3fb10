//! PostgreSQL backend built on declarative range partitioning.
//!
//! Each logical stream is a parent table `PARTITION BY RANGE (ts)`; each day
//! is a child attached with `FOR VALUES FROM (day) TO (next day)`, so the
//! planner prunes partitions whose bounds cannot match a query's time filter.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::{debug, info};

use metronome_core::config::PostgresConfig;
use metronome_core::{
    AggregatedPoint, Direction, OrderField, PartitionSpec, PlannedQuery, Points, Sample,
    SampleFilter, StreamName,
};

use crate::backend::PartitionStore;
use crate::error::{is_missing_partition, is_undefined_table, map_create_error, map_drop_error, StoreError};
use crate::registry::{PartitionRecord, PartitionRegistry};

/// Rows per INSERT statement; three bind parameters each stays under the
/// 65535 parameter limit.
const INSERT_CHUNK: usize = 10_000;

#[derive(Debug, sqlx::FromRow)]
struct SampleRow {
    reference_id: i64,
    ts: DateTime<Utc>,
    value: f64,
}

#[derive(Debug, sqlx::FromRow)]
struct BucketRow {
    bucket: DateTime<Utc>,
    avg_value: f64,
    samples: i64,
}

/// Partition store backed by a PostgreSQL connection pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect using the configured credentials and apply migrations.
    pub async fn connect(config: &PostgresConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.connection_string())
            .await?;
        info!("PostgreSQL connected: {}", config.host);

        let store = Self::from_pool(pool);
        store.migrate().await?;
        Ok(store)
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        info!("Database migrations applied successfully");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Locate the first sample no registered partition covers.
    async fn uncovered_sample(&self, stream: &StreamName, samples: &[Sample]) -> Result<Option<Sample>, StoreError> {
        let partitions = PartitionRegistry::list_partitions(&self.pool, stream).await?;
        Ok(samples
            .iter()
            .find(|s| {
                !partitions
                    .iter()
                    .any(|p| p.range_start <= s.timestamp && s.timestamp < p.range_end)
            })
            .copied())
    }
}

fn push_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: &SampleFilter) {
    builder.push(" WHERE TRUE");
    if let Some(id) = filter.reference() {
        builder.push(" AND reference_id = ").push_bind(id);
    }
    if let Some(from) = filter.from {
        builder.push(" AND ts >= ").push_bind(from);
    }
    if let Some(to) = filter.to {
        builder.push(" AND ts <= ").push_bind(to);
    }
}

fn push_page(builder: &mut QueryBuilder<'_, Postgres>, query: &PlannedQuery) {
    builder
        .push(" OFFSET ")
        .push_bind(i64::try_from(query.page.offset).unwrap_or(i64::MAX));
    if let Some(limit) = query.page.limit {
        builder
            .push(" LIMIT ")
            .push_bind(i64::try_from(limit).unwrap_or(i64::MAX));
    }
}

fn direction_sql(direction: Direction) -> &'static str {
    match direction {
        Direction::Asc => "ASC",
        Direction::Desc => "DESC",
    }
}

fn unknown_stream(e: sqlx::Error, stream: &StreamName) -> StoreError {
    if is_undefined_table(&e) {
        StoreError::UnknownStream(stream.to_string())
    } else {
        StoreError::Database(e)
    }
}

#[async_trait]
impl PartitionStore for PgStore {
    async fn ensure_stream(&self, stream: &StreamName) -> Result<(), StoreError> {
        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {stream} (
                id BIGINT GENERATED ALWAYS AS IDENTITY,
                reference_id BIGINT NOT NULL,
                ts TIMESTAMPTZ NOT NULL,
                value DOUBLE PRECISION NOT NULL
            ) PARTITION BY RANGE (ts)"
        ))
        .execute(&self.pool)
        .await?;

        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS {stream}_ref_ts_idx ON {stream} (reference_id, ts)"
        ))
        .execute(&self.pool)
        .await?;

        debug!(stream = %stream, "stream relation ensured");
        Ok(())
    }

    async fn partition_exists(&self, name: &str) -> Result<bool, StoreError> {
        PartitionRegistry::partition_exists(&self.pool, name).await
    }

    async fn list_partitions(&self, stream: &StreamName) -> Result<Vec<PartitionRecord>, StoreError> {
        PartitionRegistry::list_partitions(&self.pool, stream).await
    }

    async fn list_partitions_older_than(
        &self,
        stream: &StreamName,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<PartitionRecord>, StoreError> {
        PartitionRegistry::list_partitions_older_than(&self.pool, stream, cutoff).await
    }

    async fn create_partition(
        &self,
        spec: &PartitionSpec,
        created_at: DateTime<Utc>,
    ) -> Result<PartitionRecord, StoreError> {
        let stream = spec.stream.as_str();
        let mut tx = self.pool.begin().await?;

        sqlx::query(&format!(
            "CREATE TABLE {} PARTITION OF {} FOR VALUES FROM ('{}') TO ('{}')",
            spec.name,
            stream,
            spec.range_start.to_rfc3339(),
            spec.range_end.to_rfc3339(),
        ))
        .execute(&mut *tx)
        .await
        .map_err(|e| map_create_error(e, stream, &spec.name))?;

        let record = PartitionRegistry::record_partition(&mut *tx, spec, created_at)
            .await
            .map_err(|e| map_create_error(e, stream, &spec.name))?;

        tx.commit().await?;
        Ok(record)
    }

    async fn drop_partition(&self, record: &PartitionRecord) -> Result<(), StoreError> {
        let stream = record.parent_stream.as_str();
        let name = record.partition_name.as_str();
        let mut tx = self.pool.begin().await?;

        sqlx::query(&format!("DROP TABLE {name}"))
            .execute(&mut *tx)
            .await
            .map_err(|e| map_drop_error(e, stream, name))?;

        if !PartitionRegistry::delete_partition_record(&mut *tx, name).await? {
            return Err(StoreError::Integrity(format!(
                "partition '{name}' was dropped but had no registry row"
            )));
        }

        tx.commit().await?;
        Ok(())
    }

    async fn insert_samples(&self, stream: &StreamName, samples: &[Sample]) -> Result<(), StoreError> {
        if samples.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for chunk in samples.chunks(INSERT_CHUNK) {
            let mut builder: QueryBuilder<Postgres> =
                QueryBuilder::new(format!("INSERT INTO {stream} (reference_id, ts, value) "));
            builder.push_values(chunk, |mut row, s| {
                row.push_bind(s.reference_id)
                    .push_bind(s.timestamp)
                    .push_bind(s.value);
            });

            if let Err(e) = builder.build().execute(&mut *tx).await {
                drop(tx);
                if is_missing_partition(&e) {
                    let timestamp = self
                        .uncovered_sample(stream, samples)
                        .await?
                        .map_or(samples[0].timestamp, |s| s.timestamp);
                    return Err(StoreError::NoPartition {
                        stream: stream.to_string(),
                        timestamp,
                    });
                }
                return Err(unknown_stream(e, stream));
            }
        }
        tx.commit().await?;
        Ok(())
    }

    async fn count(&self, stream: &StreamName, query: &PlannedQuery) -> Result<u64, StoreError> {
        let mut builder: QueryBuilder<Postgres> = match query.trunc {
            Some(trunc) => QueryBuilder::new(format!(
                "SELECT COUNT(*) FROM (SELECT date_trunc('{}', ts, 'UTC') FROM {stream}",
                trunc.as_str()
            )),
            None => QueryBuilder::new(format!("SELECT COUNT(*) FROM {stream}")),
        };
        push_filter(&mut builder, &query.filter);
        if query.trunc.is_some() {
            builder.push(" GROUP BY 1) AS groups");
        }

        let count: i64 = builder
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| unknown_stream(e, stream))?;
        Ok(count.max(0) as u64)
    }

    async fn find(&self, stream: &StreamName, query: &PlannedQuery) -> Result<Points, StoreError> {
        let direction = direction_sql(query.order.direction);

        match query.trunc {
            Some(trunc) => {
                let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
                    "SELECT date_trunc('{}', ts, 'UTC') AS bucket, AVG(value) AS avg_value, \
                     COUNT(*) AS samples FROM {stream}",
                    trunc.as_str()
                ));
                push_filter(&mut builder, &query.filter);
                let column = match query.order.field {
                    OrderField::Timestamp => "bucket",
                    OrderField::Value => "avg_value",
                };
                builder.push(format!(" GROUP BY bucket ORDER BY {column} {direction}, bucket ASC"));
                push_page(&mut builder, query);

                let rows: Vec<BucketRow> = builder
                    .build_query_as()
                    .fetch_all(&self.pool)
                    .await
                    .map_err(|e| unknown_stream(e, stream))?;
                Ok(Points::Aggregated(
                    rows.into_iter()
                        .map(|r| AggregatedPoint {
                            timestamp: r.bucket,
                            value: r.avg_value,
                            samples: r.samples.max(0) as u64,
                        })
                        .collect(),
                ))
            }
            None => {
                let mut builder: QueryBuilder<Postgres> =
                    QueryBuilder::new(format!("SELECT reference_id, ts, value FROM {stream}"));
                push_filter(&mut builder, &query.filter);
                let column = match query.order.field {
                    OrderField::Timestamp => "ts",
                    OrderField::Value => "value",
                };
                builder.push(format!(" ORDER BY {column} {direction}, ts ASC, id ASC"));
                push_page(&mut builder, query);

                let rows: Vec<SampleRow> = builder
                    .build_query_as()
                    .fetch_all(&self.pool)
                    .await
                    .map_err(|e| unknown_stream(e, stream))?;
                Ok(Points::Raw(
                    rows.into_iter()
                        .map(|r| Sample::new(r.reference_id, r.ts, r.value))
                        .collect(),
                ))
            }
        }
    }
}
