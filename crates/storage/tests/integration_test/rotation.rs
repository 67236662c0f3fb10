use std::time::Duration as StdDuration;

use chrono::Duration;

use metronome_storage::{PartitionStore, DEFAULT_ROTATE_AFTER};

use crate::helpers::{at, fixture, params, provision_days, samples, stream};

#[tokio::test]
async fn test_rotation_respects_retention_window() {
    let s = stream("response_time");
    let fx = fixture(&s).await;
    let now = at(2025, 6, 30, 12, 0, 0);
    let retention = StdDuration::from_secs(7 * 24 * 3_600);
    let cutoff = now - Duration::days(7);

    // One partition pair created just before the cutoff, one two days after it.
    fx.manager.ensure_partitions(&s, &(cutoff - Duration::seconds(1))).await.unwrap();
    fx.manager.ensure_partitions(&s, &(cutoff + Duration::days(2))).await.unwrap();
    let before: Vec<String> = fx
        .store
        .list_partitions(&s)
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.partition_name)
        .collect();
    assert_eq!(before.len(), 4);

    let report = fx.rotation.rotate_at(&s, retention, now).await.unwrap();
    assert_eq!(report.cutoff, cutoff);
    assert_eq!(
        report.rotated,
        vec!["response_time_2025_06_23", "response_time_2025_06_24"]
    );
    assert!(report.is_clean());

    let remaining = fx.store.physical_partitions(&s);
    assert_eq!(remaining, vec!["response_time_2025_06_25", "response_time_2025_06_26"]);
}

#[tokio::test]
async fn test_partition_created_exactly_at_cutoff_is_kept() {
    let s = stream("response_time");
    let fx = fixture(&s).await;
    let now = at(2025, 6, 30, 0, 0, 0);
    let cutoff = now - Duration::hours(720);

    fx.manager.ensure_partitions(&s, &cutoff).await.unwrap();

    let report = fx.rotation.rotate_at(&s, DEFAULT_ROTATE_AFTER, now).await.unwrap();
    assert!(report.rotated.is_empty());

    let later = now + Duration::milliseconds(1);
    let report = fx.rotation.rotate_at(&s, DEFAULT_ROTATE_AFTER, later).await.unwrap();
    assert_eq!(report.rotated.len(), 2);
    assert!(fx.store.list_partitions(&s).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_repeated_rotation_is_idempotent() {
    let s = stream("response_time");
    let fx = fixture(&s).await;
    let start = at(2025, 5, 1, 12, 0, 0);
    provision_days(&fx, &s, start, start + Duration::days(3)).await;
    let now = start + Duration::days(31) + Duration::hours(12);

    let first = fx.rotation.rotate_at(&s, DEFAULT_ROTATE_AFTER, now).await.unwrap();
    let second = fx.rotation.rotate_at(&s, DEFAULT_ROTATE_AFTER, now).await.unwrap();

    // Cutoff is May 3rd 00:00; partitions provisioned on May 1st and 2nd are past it.
    assert_eq!(
        first.rotated,
        vec!["response_time_2025_05_01", "response_time_2025_05_02", "response_time_2025_05_03"]
    );
    assert!(second.rotated.is_empty());
    assert!(second.is_clean());
}

#[tokio::test]
async fn test_frequent_rotation_never_touches_live_partitions() {
    let s = stream("response_time");
    let fx = fixture(&s).await;
    let created = at(2025, 6, 1, 0, 0, 0);
    fx.manager.ensure_partitions(&s, &created).await.unwrap();
    fx.writer
        .record_batch(&s, &samples(1, &[(created, 1.0), (created + Duration::days(1), 2.0)]))
        .await
        .unwrap();

    for minutes in (0..720 * 60).step_by(600) {
        let now = created + Duration::minutes(minutes);
        let report = fx.rotation.rotate_at(&s, DEFAULT_ROTATE_AFTER, now).await.unwrap();
        assert!(report.rotated.is_empty(), "rotated too early at +{minutes}m");
    }
    assert_eq!(fx.queries.count(&s, &params()).await.unwrap(), 2);
}

#[tokio::test]
async fn test_rotation_is_best_effort_per_partition() {
    let s = stream("response_time");
    let fx = fixture(&s).await;
    let start = at(2025, 4, 1, 12, 0, 0);
    provision_days(&fx, &s, start, start + Duration::days(2)).await;
    // 2025-04-01 ..= 2025-04-04
    assert_eq!(fx.store.physical_partitions(&s).len(), 4);

    fx.store.inject_drop_failure("response_time_2025_04_02");
    let now = at(2025, 6, 1, 0, 0, 0);
    let report = fx.rotation.rotate_at(&s, DEFAULT_ROTATE_AFTER, now).await.unwrap();

    assert_eq!(report.rotated.len(), 3);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].partition, "response_time_2025_04_02");
    assert!(!report.is_clean());

    // The failed partition is still both physical and registered.
    assert_eq!(fx.store.physical_partitions(&s), vec!["response_time_2025_04_02"]);
    assert!(fx.store.partition_exists("response_time_2025_04_02").await.unwrap());

    // The next pass picks it up once the fault clears.
    fx.store.clear_drop_failure("response_time_2025_04_02");
    let retry = fx.rotation.rotate_at(&s, DEFAULT_ROTATE_AFTER, now).await.unwrap();
    assert_eq!(retry.rotated, vec!["response_time_2025_04_02"]);
    assert!(fx.store.physical_partitions(&s).is_empty());
}
