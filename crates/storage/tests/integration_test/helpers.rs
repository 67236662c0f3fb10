use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};

use metronome_core::{QueryParams, Sample, StreamName};
use metronome_storage::{MemoryStore, PartitionManager, QueryEngine, RotationManager, SampleWriter};

pub fn stream(name: &str) -> StreamName {
    StreamName::new(name).unwrap()
}

pub fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
}

/// Every storage component wired to one in-memory store.
pub struct Fixture {
    pub store: Arc<MemoryStore>,
    pub manager: PartitionManager,
    pub rotation: RotationManager,
    pub queries: QueryEngine,
    pub writer: SampleWriter,
}

/// Build a fixture with `stream` already registered.
pub async fn fixture(stream: &StreamName) -> Fixture {
    let store = Arc::new(MemoryStore::new());
    let fixture = Fixture {
        manager: PartitionManager::new(store.clone()),
        rotation: RotationManager::new(store.clone()),
        queries: QueryEngine::new(store.clone()),
        writer: SampleWriter::new(store.clone()),
        store,
    };
    fixture.manager.ensure_stream(stream).await.unwrap();
    fixture
}

/// Provision every day from `first` to `last` inclusive.
pub async fn provision_days(fixture: &Fixture, stream: &StreamName, first: DateTime<Utc>, last: DateTime<Utc>) {
    let mut day = first;
    while day <= last {
        fixture.manager.ensure_partitions(stream, &day).await.unwrap();
        day += chrono::Duration::days(1);
    }
}

pub fn samples(reference_id: i64, points: &[(DateTime<Utc>, f64)]) -> Vec<Sample> {
    points
        .iter()
        .map(|(ts, value)| Sample::new(reference_id, *ts, *value))
        .collect()
}

pub fn params() -> QueryParams {
    QueryParams::default()
}
