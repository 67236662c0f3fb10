use std::sync::Arc;
use std::time::Duration;

use metronome_storage::MemoryStore;

use metronome_scheduler::SchedulerState;

use crate::helpers::{scheduler, stream, RecordingAlarms, ALARM_INTERVAL, MAINTENANCE_INTERVAL};

#[tokio::test(start_paused = true)]
async fn test_one_tick_dispatches_every_alarm_with_shared_watermark() {
    let store = Arc::new(MemoryStore::new());
    let alarms = Arc::new(RecordingAlarms::new(1..=5).failing(3));

    let handle = scheduler(&store, &alarms)
        .start(ALARM_INTERVAL, MAINTENANCE_INTERVAL)
        .await
        .unwrap();
    tokio::time::sleep(ALARM_INTERVAL + Duration::from_secs(1)).await;

    let calls = alarms.calls();
    let mut ids: Vec<i64> = calls.iter().map(|(id, _)| *id).collect();
    ids.sort();
    assert_eq!(ids, vec![1, 2, 3, 4, 5]);

    let watermark = calls[0].1;
    assert!(calls.iter().all(|(_, w)| *w == watermark));

    // The failing check did not stop its siblings.
    assert_eq!(alarms.completed(), 5);
    let metrics = handle.metrics();
    assert_eq!(metrics.alarm_ticks, 1);
    assert_eq!(metrics.checks_dispatched, 5);
    assert_eq!(metrics.checks_succeeded, 4);
    assert_eq!(metrics.checks_failed, 1);
    assert_eq!(metrics.last_watermark, Some(watermark));

    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_each_tick_captures_a_new_watermark() {
    let store = Arc::new(MemoryStore::new());
    let alarms = Arc::new(RecordingAlarms::new([7, 8]));

    let handle = scheduler(&store, &alarms)
        .start(ALARM_INTERVAL, MAINTENANCE_INTERVAL)
        .await
        .unwrap();
    tokio::time::sleep(ALARM_INTERVAL * 2 + Duration::from_secs(1)).await;
    handle.shutdown().await;

    let calls = alarms.calls();
    assert_eq!(calls.len(), 4);
    // Within a tick both alarms share a watermark.
    assert_eq!(calls[0].1, calls[1].1);
    assert_eq!(calls[2].1, calls[3].1);
    assert!(calls[0].1 <= calls[2].1);
}

#[tokio::test(start_paused = true)]
async fn test_slow_checks_do_not_block_ticks() {
    let store = Arc::new(MemoryStore::new());
    let alarms = Arc::new(
        RecordingAlarms::new([1, 2]).with_check_delay(Duration::from_secs(25)),
    );

    let handle = scheduler(&store, &alarms)
        .with_max_concurrent_checks(1)
        .start(ALARM_INTERVAL, MAINTENANCE_INTERVAL)
        .await
        .unwrap();

    // Ticks at 10s, 20s and 30s all fetch even though the first check
    // occupies the only permit until 35s.
    tokio::time::sleep(Duration::from_secs(35) - Duration::from_millis(1)).await;
    assert_eq!(alarms.fetches(), 3);
    assert_eq!(alarms.completed(), 0);
    assert_eq!(alarms.max_running(), 1);
    assert_eq!(handle.metrics().checks_dispatched, 6);

    handle.stop();
    handle.join().await;
    assert_eq!(alarms.fetches(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_concurrency_cap_bounds_running_checks() {
    let store = Arc::new(MemoryStore::new());
    let alarms = Arc::new(
        RecordingAlarms::new(1..=10).with_check_delay(Duration::from_secs(1)),
    );

    let handle = scheduler(&store, &alarms)
        .with_max_concurrent_checks(3)
        .start(ALARM_INTERVAL, MAINTENANCE_INTERVAL)
        .await
        .unwrap();
    tokio::time::sleep(ALARM_INTERVAL + Duration::from_millis(1)).await;
    handle.shutdown().await;

    assert_eq!(alarms.completed(), 10);
    assert_eq!(alarms.max_running(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_failed_fetch_skips_only_that_tick() {
    let store = Arc::new(MemoryStore::new());
    let alarms = Arc::new(RecordingAlarms::new([4]).with_failing_fetches(1));

    let handle = scheduler(&store, &alarms)
        .start(ALARM_INTERVAL, MAINTENANCE_INTERVAL)
        .await
        .unwrap();
    tokio::time::sleep(ALARM_INTERVAL * 2 + Duration::from_secs(1)).await;

    let metrics = handle.metrics();
    assert_eq!(metrics.skipped_alarm_ticks, 1);
    assert_eq!(metrics.alarm_ticks, 1);
    assert_eq!(alarms.calls().len(), 1);
    assert_eq!(handle.state(), SchedulerState::Running);
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_drains_but_stop_detaches() {
    let store = Arc::new(MemoryStore::new());
    let drained = Arc::new(RecordingAlarms::new(1..=3).with_check_delay(Duration::from_secs(5)));
    let handle = scheduler(&store, &drained)
        .start(ALARM_INTERVAL, MAINTENANCE_INTERVAL)
        .await
        .unwrap();
    tokio::time::sleep(ALARM_INTERVAL + Duration::from_secs(1)).await;
    assert_eq!(drained.completed(), 0);
    handle.shutdown().await;
    assert_eq!(drained.completed(), 3);

    let store = Arc::new(MemoryStore::new());
    let detached = Arc::new(RecordingAlarms::new(1..=3).with_check_delay(Duration::from_secs(5)));
    let handle = scheduler(&store, &detached)
        .start(ALARM_INTERVAL, MAINTENANCE_INTERVAL)
        .await
        .unwrap();
    tokio::time::sleep(ALARM_INTERVAL + Duration::from_secs(1)).await;
    handle.stop();
    handle.join().await;
    assert_eq!(detached.completed(), 0);

    // Detached checks still run to completion on their own.
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(detached.completed(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_hung_fetch_blocks_neither_maintenance_nor_stop() {
    let store = Arc::new(MemoryStore::new());
    let alarms = Arc::new(RecordingAlarms::new([1]).with_fetch_delay(Duration::from_secs(3_600)));
    let maintenance_interval = Duration::from_secs(60);

    let handle = scheduler(&store, &alarms)
        .start(ALARM_INTERVAL, maintenance_interval)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_secs(601)).await;

    let metrics = handle.metrics();
    // Initial pass plus one per minute.
    assert_eq!(metrics.maintenance_passes, 11);
    assert_eq!(metrics.alarm_ticks, 0);
    assert!(metrics.skipped_alarm_ticks >= 50);
    assert!(alarms.calls().is_empty());
    assert_eq!(store.physical_partitions(&stream()).len(), 2);

    assert!(handle.stop());
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(handle.state(), SchedulerState::Stopped);
    handle.join().await;
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_after_stop_still_drains() {
    let store = Arc::new(MemoryStore::new());
    let alarms = Arc::new(RecordingAlarms::new(1..=3).with_check_delay(Duration::from_secs(5)));
    let handle = scheduler(&store, &alarms)
        .start(ALARM_INTERVAL, MAINTENANCE_INTERVAL)
        .await
        .unwrap();
    tokio::time::sleep(ALARM_INTERVAL + Duration::from_secs(1)).await;
    assert_eq!(alarms.completed(), 0);

    handle.stop();
    handle.shutdown().await;
    assert_eq!(alarms.completed(), 3);
}
