//! Integration tests for the waiting-room matchmaking service
//!
//! These tests drive the public façade, the tick processor and the scheduler
//! together against the in-memory stores.

mod fixtures;

use fixtures::{category, user, PartitionedStore, RacingStore, TestBed};
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};
use waiting_room::config::AppConfig;
use waiting_room::error::{error_kind, ErrorKind};
use waiting_room::service::AppState;
use waiting_room::store::WaitingPoolStore;
use waiting_room::{RecordingMatchHandler, SchedulerState};

#[tokio::test]
async fn test_oldest_first_matching_workflow() {
    let bed = TestBed::new();

    for (t, id) in [(0, "A"), (1, "B"), (2, "C")] {
        bed.at(t);
        bed.join_present(id, "trivia").await;
    }

    let report = bed.processor.run_tick().await;
    assert_eq!(report.matches_committed, 1);
    assert_eq!(bed.delivered_groups(), vec![vec!["A", "B"]]);
    assert_eq!(bed.waiting("trivia").await, vec!["C"]);

    // D arrives and pairs with the leftover
    bed.at(3);
    bed.join_present("D", "trivia").await;

    let report = bed.processor.run_tick().await;
    assert_eq!(report.matches_committed, 1);
    assert_eq!(
        bed.delivered_groups(),
        vec![vec!["A", "B"], vec!["C", "D"]]
    );
    assert!(bed.waiting("trivia").await.is_empty());

    println!("✅ Oldest-first matching workflow test passed");
}

#[tokio::test]
async fn test_absent_user_times_out() {
    let bed = TestBed::new();

    // "short" has a 10s timeout; A never heartbeats
    bed.service.add_to_waiting_list("A", "short").await.unwrap();

    bed.at(10);
    let report = bed.processor.run_tick().await;
    assert_eq!(report.users_evicted, 0);
    assert_eq!(report.users_skipped_offline, 1);
    assert_eq!(bed.waiting("short").await, vec!["A"]);

    bed.at(11);
    let report = bed.processor.run_tick().await;
    assert_eq!(report.users_evicted, 1);
    assert_eq!(report.matches_committed, 0);
    assert!(bed.waiting("short").await.is_empty());
    assert_eq!(bed.handler.delivered_count(), 0);

    println!("✅ Timeout eviction test passed");
}

#[tokio::test]
async fn test_cancel_racing_commit_skips_match() {
    let mut racing = None;
    let bed = TestBed::with_store(|pool| {
        let store = Arc::new(RacingStore::new(pool));
        racing = Some(store.clone());
        store as Arc<dyn WaitingPoolStore>
    });
    let racing = racing.unwrap();

    bed.join_present("A", "trivia").await;
    bed.join_present("B", "trivia").await;

    // A leaves after the tick took its snapshot but before it commits
    racing.cancel_before_commit(&user("A"), &category("trivia"));

    let report = bed.processor.run_tick().await;
    assert_eq!(report.matches_committed, 0);
    assert_eq!(report.matches_discarded, 1);
    assert_eq!(bed.handler.delivered_count(), 0);
    assert_eq!(bed.waiting("trivia").await, vec!["B"]);

    println!("✅ Cancel racing commit test passed");
}

#[tokio::test]
async fn test_cancel_after_commit_is_harmless() {
    let bed = TestBed::new();
    bed.join_present("A", "trivia").await;
    bed.join_present("B", "trivia").await;

    bed.processor.run_tick().await;
    assert_eq!(bed.delivered_groups(), vec![vec!["A", "B"]]);

    // The entry is already gone; removing it again is not an error
    bed.service
        .remove_from_waiting_list("A", "trivia")
        .await
        .unwrap();
    assert!(bed.waiting("trivia").await.is_empty());
}

#[tokio::test]
async fn test_concurrent_cancel_never_commits_removed_user() {
    for _ in 0..20 {
        let bed = TestBed::new();
        bed.join_present("A", "trivia").await;
        bed.join_present("B", "trivia").await;

        let (report, removed) = tokio::join!(
            bed.processor.run_tick(),
            bed.service.remove_from_waiting_list("A", "trivia")
        );
        assert_ok!(removed);

        let waiting = bed.waiting("trivia").await;
        if report.matches_committed == 1 {
            assert_eq!(bed.delivered_groups(), vec![vec!["A", "B"]]);
            assert!(waiting.is_empty());
        } else {
            assert_eq!(bed.handler.delivered_count(), 0);
            assert_eq!(waiting, vec!["B"]);
        }
    }

    println!("✅ Concurrent cancel test passed");
}

#[tokio::test]
async fn test_add_is_idempotent() {
    let bed = TestBed::new();

    bed.service.add_to_waiting_list("A", "trivia").await.unwrap();
    bed.at(5);
    bed.service.add_to_waiting_list("A", "trivia").await.unwrap();

    let entries = bed.service.waiting_list("trivia").await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].enqueued_at, fixtures::t0() + chrono::Duration::seconds(5));
}

#[tokio::test]
async fn test_concurrent_adds_leave_one_entry() {
    let bed = Arc::new(TestBed::new());

    let adds = (0..16).map(|_| {
        let bed = bed.clone();
        async move { bed.service.add_to_waiting_list("A", "trivia").await }
    });
    let results = futures::future::join_all(adds).await;

    assert!(results.iter().all(|r| r.is_ok()));
    assert_eq!(bed.waiting("trivia").await, vec!["A"]);
}

#[tokio::test]
async fn test_failing_category_does_not_block_others() {
    let mut partitioned = None;
    let bed = TestBed::with_store(|pool| {
        let store = Arc::new(PartitionedStore::new(pool));
        partitioned = Some(store.clone());
        store as Arc<dyn WaitingPoolStore>
    });
    let partitioned = partitioned.unwrap();

    for id in ["A", "B"] {
        bed.join_present(id, "history").await;
    }
    for id in ["C", "D"] {
        bed.join_present(id, "football").await;
    }

    partitioned.set_unreachable(&category("history"), true);
    let report = bed.processor.run_tick().await;
    assert_eq!(report.categories_skipped, 1);
    assert_eq!(bed.delivered_groups(), vec![vec!["C", "D"]]);
    assert_eq!(bed.waiting("history").await, vec!["A", "B"]);

    // Once the partition heals the skipped category is matched normally
    partitioned.set_unreachable(&category("history"), false);
    let report = bed.processor.run_tick().await;
    assert_eq!(report.categories_skipped, 0);
    assert_eq!(report.matches_committed, 1);
    assert!(bed.waiting("history").await.is_empty());

    println!("✅ Category isolation test passed");
}

#[tokio::test]
async fn test_group_size_four_waits_for_full_group() {
    let bed = TestBed::with_group_size(4);

    for id in ["A", "B", "C"] {
        bed.join_present(id, "trivia").await;
    }
    let report = bed.processor.run_tick().await;
    assert_eq!(report.matches_committed, 0);

    bed.join_present("D", "trivia").await;
    bed.processor.run_tick().await;
    assert_eq!(bed.delivered_groups(), vec![vec!["A", "B", "C", "D"]]);
}

#[tokio::test]
async fn test_store_outage_surfaces_as_unavailable() {
    let bed = TestBed::new();
    bed.pool.set_available(false);

    let err = assert_err!(bed.service.add_to_waiting_list("A", "trivia").await);
    assert_eq!(error_kind(&err), ErrorKind::Unavailable);

    // Malformed input is reported as such even while the store is down
    let err = assert_err!(bed.service.add_to_waiting_list("", "trivia").await);
    assert_eq!(error_kind(&err), ErrorKind::Invalid);

    // The scheduler keeps going and reports nothing formed
    let report = bed.processor.run_tick().await;
    assert_eq!(report.matches_committed, 0);
}

#[tokio::test]
async fn test_presence_outage_leaves_pool_intact() {
    let bed = TestBed::new();
    bed.join_present("A", "trivia").await;
    bed.join_present("B", "trivia").await;

    bed.presence_store.set_available(false);
    let report = bed.processor.run_tick().await;
    assert_eq!(report.categories_skipped, 1);
    assert_eq!(bed.waiting("trivia").await, vec!["A", "B"]);

    bed.presence_store.set_available(true);
    let report = bed.processor.run_tick().await;
    assert_eq!(report.matches_committed, 1);
}

fn fast_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.scheduler.tick_interval_ms = 50;
    config.scheduler.shutdown_grace_seconds = 1;
    config
}

#[tokio::test]
async fn test_service_lifecycle_end_to_end() {
    let recorder = Arc::new(RecordingMatchHandler::new());
    let app = AppState::with_handler(fast_config(), recorder.clone()).unwrap();
    app.start().await.unwrap();
    assert_eq!(app.scheduler_state(), SchedulerState::Running);

    let service = app.matchmaking();
    for id in ["alice", "bob"] {
        service.heartbeat(id).await.unwrap();
        service.add_to_waiting_list(id, "trivia").await.unwrap();
    }

    let mut waited = Duration::ZERO;
    while recorder.delivered_count() == 0 && waited < Duration::from_secs(2) {
        tokio::time::sleep(Duration::from_millis(25)).await;
        waited += Duration::from_millis(25);
    }

    let delivered = recorder.delivered();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].category.as_str(), "trivia");
    assert!(app.pool_sizes().await.unwrap().is_empty());

    app.shutdown().await.unwrap();
    assert_eq!(app.scheduler_state(), SchedulerState::Stopped);

    println!("✅ Service lifecycle end-to-end test passed");
}

#[tokio::test]
async fn test_scheduler_double_stop() {
    let app = AppState::new(fast_config()).unwrap();
    app.start().await.unwrap();

    let scheduler = app.scheduler();
    assert_ok!(scheduler.stop().await);
    assert!(!scheduler.is_task_alive().await);

    assert_ok!(scheduler.stop().await);
    assert_eq!(scheduler.state(), SchedulerState::Stopped);
    assert!(!scheduler.is_task_alive().await);

    // Shutting the whole service down afterwards is still fine
    app.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_no_matches_after_shutdown() {
    let recorder = Arc::new(RecordingMatchHandler::new());
    let app = AppState::with_handler(fast_config(), recorder.clone()).unwrap();
    app.start().await.unwrap();
    app.shutdown().await.unwrap();

    let service = app.matchmaking();
    for id in ["alice", "bob"] {
        service.heartbeat(id).await.unwrap();
        service.add_to_waiting_list(id, "trivia").await.unwrap();
    }

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(recorder.delivered_count(), 0);
    assert_eq!(app.pool_sizes().await.unwrap().get("trivia"), Some(&2));
}
