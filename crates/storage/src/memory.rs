//! In-process partition store.
//!
//! Emulates range partitioning with one row set per partition and prunes
//! partitions by their registered ranges before scanning. Every operation
//! runs under a single lock acquisition, which plays the role of a
//! transaction: a partition and its registry row appear and disappear
//! together.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use metronome_core::{
    AggregatedPoint, Direction, OrderBy, OrderField, PartitionSpec, PlannedQuery, Points, Sample,
    SampleFilter, StreamName,
};

use crate::backend::PartitionStore;
use crate::error::StoreError;
use crate::registry::PartitionRecord;

struct StoredRow {
    id: u64,
    sample: Sample,
}

struct Table {
    stream: StreamName,
    range_start: DateTime<Utc>,
    range_end: DateTime<Utc>,
    rows: Vec<StoredRow>,
}

impl Table {
    fn covers(&self, ts: DateTime<Utc>) -> bool {
        self.range_start <= ts && ts < self.range_end
    }
}

#[derive(Default)]
struct State {
    streams: HashSet<StreamName>,
    /// Physical partitions, keyed by name.
    tables: HashMap<String, Table>,
    /// Registry rows, keyed by partition name.
    registry: BTreeMap<String, PartitionRecord>,
    next_id: u64,
    drop_failures: HashSet<String>,
    last_scan: Vec<String>,
}

impl State {
    fn require_stream(&self, stream: &StreamName) -> Result<(), StoreError> {
        if self.streams.contains(stream) {
            Ok(())
        } else {
            Err(StoreError::UnknownStream(stream.to_string()))
        }
    }

    /// Matching rows from the partitions that survive pruning, recording
    /// which partitions were scanned.
    fn scan(&mut self, stream: &StreamName, filter: &SampleFilter) -> Vec<(u64, Sample)> {
        let mut scanned: Vec<&String> = self
            .tables
            .iter()
            .filter(|(_, t)| &t.stream == stream && filter.overlaps(t.range_start, t.range_end))
            .map(|(name, _)| name)
            .collect();
        scanned.sort();

        let rows = scanned
            .iter()
            .flat_map(|name| self.tables[*name].rows.iter())
            .filter(|r| filter.matches(&r.sample))
            .map(|r| (r.id, r.sample))
            .collect();

        self.last_scan = scanned.into_iter().cloned().collect();
        rows
    }
}

/// Partition store that keeps everything in memory.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("memory store lock poisoned")
    }

    /// Make the next drops of `partition` fail with a transient error.
    pub fn inject_drop_failure(&self, partition: &str) {
        self.lock().drop_failures.insert(partition.to_string());
    }

    pub fn clear_drop_failure(&self, partition: &str) {
        self.lock().drop_failures.remove(partition);
    }

    /// Create a physical partition with no registry row, as if a previous
    /// process had crashed between the two steps.
    pub fn inject_orphan_partition(&self, spec: &PartitionSpec) {
        let mut state = self.lock();
        state.streams.insert(spec.stream.clone());
        state.tables.insert(
            spec.name.clone(),
            Table {
                stream: spec.stream.clone(),
                range_start: spec.range_start,
                range_end: spec.range_end,
                rows: Vec::new(),
            },
        );
    }

    /// Names of the physical partitions of `stream`, sorted.
    pub fn physical_partitions(&self, stream: &StreamName) -> Vec<String> {
        let state = self.lock();
        let mut names: Vec<String> = state
            .tables
            .iter()
            .filter(|(_, t)| &t.stream == stream)
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Partitions touched by the most recent `count` or `find`, sorted.
    pub fn scanned_partitions(&self) -> Vec<String> {
        self.lock().last_scan.clone()
    }
}

fn compare(order: OrderBy, a: (DateTime<Utc>, f64), b: (DateTime<Utc>, f64)) -> Ordering {
    let primary = match order.field {
        OrderField::Timestamp => a.0.cmp(&b.0),
        OrderField::Value => a.1.total_cmp(&b.1),
    };
    match order.direction {
        Direction::Asc => primary,
        Direction::Desc => primary.reverse(),
    }
}

fn paginate<T>(items: Vec<T>, query: &PlannedQuery) -> Vec<T> {
    let offset = usize::try_from(query.page.offset).unwrap_or(usize::MAX);
    let limit = query
        .page
        .limit
        .map_or(usize::MAX, |l| usize::try_from(l).unwrap_or(usize::MAX));
    items.into_iter().skip(offset).take(limit).collect()
}

fn aggregate(rows: &[(u64, Sample)], query: &PlannedQuery) -> Vec<AggregatedPoint> {
    let Some(trunc) = query.trunc else {
        return Vec::new();
    };
    let mut groups: BTreeMap<DateTime<Utc>, (f64, u64)> = BTreeMap::new();
    for (_, sample) in rows {
        let group = groups.entry(trunc.truncate(sample.timestamp)).or_default();
        group.0 += sample.value;
        group.1 += 1;
    }
    groups
        .into_iter()
        .map(|(timestamp, (sum, samples))| AggregatedPoint {
            timestamp,
            value: sum / samples as f64,
            samples,
        })
        .collect()
}

#[async_trait]
impl PartitionStore for MemoryStore {
    async fn ensure_stream(&self, stream: &StreamName) -> Result<(), StoreError> {
        self.lock().streams.insert(stream.clone());
        Ok(())
    }

    async fn partition_exists(&self, name: &str) -> Result<bool, StoreError> {
        Ok(self.lock().registry.contains_key(name))
    }

    async fn list_partitions(&self, stream: &StreamName) -> Result<Vec<PartitionRecord>, StoreError> {
        let state = self.lock();
        let mut records: Vec<PartitionRecord> = state
            .registry
            .values()
            .filter(|r| &r.parent_stream == stream)
            .cloned()
            .collect();
        records.sort_by_key(|r| r.range_start);
        Ok(records)
    }

    async fn list_partitions_older_than(
        &self,
        stream: &StreamName,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<PartitionRecord>, StoreError> {
        let state = self.lock();
        let mut records: Vec<PartitionRecord> = state
            .registry
            .values()
            .filter(|r| &r.parent_stream == stream && r.is_older_than(cutoff))
            .cloned()
            .collect();
        records.sort_by_key(|r| (r.created_at, r.range_start));
        Ok(records)
    }

    async fn create_partition(
        &self,
        spec: &PartitionSpec,
        created_at: DateTime<Utc>,
    ) -> Result<PartitionRecord, StoreError> {
        let mut state = self.lock();
        state.require_stream(&spec.stream)?;

        if state.tables.contains_key(&spec.name) || state.registry.contains_key(&spec.name) {
            return Err(StoreError::Integrity(format!(
                "partition '{}' already exists but is not registered",
                spec.name
            )));
        }
        let overlapping = state.tables.iter().find(|(_, t)| {
            t.stream == spec.stream && t.range_start < spec.range_end && spec.range_start < t.range_end
        });
        if let Some((name, _)) = overlapping {
            return Err(StoreError::Integrity(format!(
                "partition '{}' would overlap partition '{name}'",
                spec.name
            )));
        }

        let record = PartitionRecord::from_spec(spec, created_at);
        state.tables.insert(
            spec.name.clone(),
            Table {
                stream: spec.stream.clone(),
                range_start: spec.range_start,
                range_end: spec.range_end,
                rows: Vec::new(),
            },
        );
        state.registry.insert(spec.name.clone(), record.clone());
        Ok(record)
    }

    async fn drop_partition(&self, record: &PartitionRecord) -> Result<(), StoreError> {
        let mut state = self.lock();
        let name = record.partition_name.as_str();

        if state.drop_failures.contains(name) {
            return Err(StoreError::Unavailable(format!(
                "could not obtain lock on partition '{name}'"
            )));
        }
        if !state.tables.contains_key(name) {
            return Err(StoreError::Integrity(format!(
                "partition '{name}' is registered but missing from stream '{}'",
                record.parent_stream
            )));
        }
        if !state.registry.contains_key(name) {
            return Err(StoreError::Integrity(format!(
                "partition '{name}' was dropped but had no registry row"
            )));
        }

        state.tables.remove(name);
        state.registry.remove(name);
        Ok(())
    }

    async fn insert_samples(&self, stream: &StreamName, samples: &[Sample]) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.require_stream(stream)?;

        let mut targets = Vec::with_capacity(samples.len());
        for sample in samples {
            let covering = state
                .tables
                .iter()
                .find(|(_, t)| &t.stream == stream && t.covers(sample.timestamp))
                .map(|(name, _)| name.clone());
            match covering {
                Some(name) => targets.push(name),
                None => {
                    return Err(StoreError::NoPartition {
                        stream: stream.to_string(),
                        timestamp: sample.timestamp,
                    })
                }
            }
        }

        for (sample, name) in samples.iter().zip(targets) {
            state.next_id += 1;
            let id = state.next_id;
            if let Some(table) = state.tables.get_mut(&name) {
                table.rows.push(StoredRow { id, sample: *sample });
            }
        }
        Ok(())
    }

    async fn count(&self, stream: &StreamName, query: &PlannedQuery) -> Result<u64, StoreError> {
        let mut state = self.lock();
        state.require_stream(stream)?;
        let rows = state.scan(stream, &query.filter);

        let count = match query.trunc {
            Some(_) => aggregate(&rows, query).len(),
            None => rows.len(),
        };
        Ok(count as u64)
    }

    async fn find(&self, stream: &StreamName, query: &PlannedQuery) -> Result<Points, StoreError> {
        let mut state = self.lock();
        state.require_stream(stream)?;
        let mut rows = state.scan(stream, &query.filter);
        drop(state);

        if query.trunc.is_some() {
            let mut points = aggregate(&rows, query);
            points.sort_by(|a, b| {
                compare(query.order, (a.timestamp, a.value), (b.timestamp, b.value))
                    .then(a.timestamp.cmp(&b.timestamp))
            });
            return Ok(Points::Aggregated(paginate(points, query)));
        }

        rows.sort_by(|(a_id, a), (b_id, b)| {
            compare(query.order, (a.timestamp, a.value), (b.timestamp, b.value))
                .then(a.timestamp.cmp(&b.timestamp))
                .then(a_id.cmp(b_id))
        });
        let samples = rows.into_iter().map(|(_, s)| s).collect();
        Ok(Points::Raw(paginate(samples, query)))
    }
}
