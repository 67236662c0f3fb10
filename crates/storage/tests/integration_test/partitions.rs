use chrono::{Duration, TimeZone, Utc};

use metronome_core::{PartitionSpec, Sample};
use metronome_storage::{PartitionStore, StoreError};

use crate::helpers::{at, fixture, params, stream};

#[tokio::test]
async fn test_ensure_covers_today_and_tomorrow() {
    let s = stream("response_time");
    let fx = fixture(&s).await;

    // Every hour of a day, including both edges, yields the same two partitions.
    for hour in [0, 7, 23] {
        let t = at(2025, 6, 14, hour, 59, 59) + Duration::milliseconds(999);
        fx.manager.ensure_partitions(&s, &t).await.unwrap();
    }

    let records = fx.store.list_partitions(&s).await.unwrap();
    let names: Vec<&str> = records.iter().map(|r| r.partition_name.as_str()).collect();
    assert_eq!(names, vec!["response_time_2025_06_14", "response_time_2025_06_15"]);
    assert_eq!(records[0].range_start, at(2025, 6, 14, 0, 0, 0));
    assert_eq!(records[0].range_end, at(2025, 6, 15, 0, 0, 0));
    assert_eq!(records[1].range_start, at(2025, 6, 15, 0, 0, 0));
    assert_eq!(records[1].range_end, at(2025, 6, 16, 0, 0, 0));

    // Registry and physical partitions agree.
    assert_eq!(fx.store.physical_partitions(&s), names);
}

#[tokio::test]
async fn test_ensure_is_idempotent() {
    let s = stream("response_time");
    let fx = fixture(&s).await;
    let t = at(2025, 2, 28, 12, 0, 0);

    let first = fx.manager.ensure_partitions(&s, &t).await.unwrap();
    let second = fx.manager.ensure_partitions(&s, &t).await.unwrap();

    assert_eq!(first.created.len(), 2);
    assert!(second.created.is_empty());
    assert_eq!(fx.store.list_partitions(&s).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_streams_do_not_share_partitions() {
    let a = stream("response_time");
    let b = stream("request_time");
    let fx = fixture(&a).await;
    fx.manager.ensure_stream(&b).await.unwrap();
    let t = at(2025, 6, 14, 12, 0, 0);

    fx.manager.ensure_partitions(&a, &t).await.unwrap();
    let report = fx.manager.ensure_partitions(&b, &t).await.unwrap();

    assert_eq!(report.created.len(), 2);
    assert_eq!(fx.store.physical_partitions(&a).len(), 2);
    assert_eq!(fx.store.physical_partitions(&b).len(), 2);
}

#[tokio::test]
async fn test_day_boundary_writes_need_no_extra_provisioning() {
    let s = stream("response_time");
    let fx = fixture(&s).await;
    let last_ms = at(2025, 6, 14, 23, 59, 59) + Duration::milliseconds(999);
    let next_day = last_ms + Duration::milliseconds(1);
    assert_eq!(next_day, at(2025, 6, 15, 0, 0, 0));

    fx.manager.ensure_partitions(&s, &last_ms).await.unwrap();

    fx.writer.record(&s, Sample::new(1, last_ms, 10.0)).await.unwrap();
    fx.writer.record(&s, Sample::new(1, next_day, 20.0)).await.unwrap();

    assert_eq!(fx.queries.count(&s, &params()).await.unwrap(), 2);
    assert_eq!(fx.store.physical_partitions(&s).len(), 2);
}

#[tokio::test]
async fn test_write_to_unprovisioned_day_fails_loudly() {
    let s = stream("response_time");
    let fx = fixture(&s).await;
    fx.manager.ensure_partitions(&s, &at(2025, 6, 14, 12, 0, 0)).await.unwrap();

    let beyond = at(2025, 6, 16, 0, 0, 0);
    let err = fx.writer.record(&s, Sample::new(1, beyond, 1.0)).await.unwrap_err();
    match err {
        StoreError::NoPartition { stream, timestamp } => {
            assert_eq!(stream, "response_time");
            assert_eq!(timestamp, beyond);
        }
        other => panic!("expected NoPartition, got {other}"),
    }

    // The writer did not provision anything on the way.
    assert_eq!(fx.store.physical_partitions(&s).len(), 2);
    assert!(!fx.store.partition_exists("response_time_2025_06_16").await.unwrap());
}

#[tokio::test]
async fn test_write_to_unknown_stream_is_rejected() {
    let s = stream("response_time");
    let fx = fixture(&s).await;
    let ts = Utc.with_ymd_and_hms(2025, 6, 14, 12, 0, 0).unwrap();

    let err = fx
        .writer
        .record(&stream("not_registered"), Sample::new(1, ts, 1.0))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::UnknownStream(name) if name == "not_registered"));
}

#[tokio::test]
async fn test_failed_creation_leaves_no_registry_row() {
    let s = stream("response_time");
    let fx = fixture(&s).await;
    let t = at(2025, 6, 14, 12, 0, 0);
    let today = PartitionSpec::covering(&s, &t).unwrap();
    fx.store.inject_orphan_partition(&today);

    let err = fx.manager.ensure_partitions(&s, &t).await.unwrap_err();
    assert!(matches!(err, StoreError::Integrity(_)));
    assert!(fx.store.list_partitions(&s).await.unwrap().is_empty());
}
