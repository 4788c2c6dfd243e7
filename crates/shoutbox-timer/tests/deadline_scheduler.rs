//! Integration tests for the deadline scheduler.
//!
//! Uses `start_paused = true` so Tokio's clock auto-advances to the next
//! pending timer and the tests run instantly and deterministically.

use std::time::Duration;

use shoutbox_timer::DeadlineScheduler;
use tokio::time::Instant;

#[tokio::test(start_paused = true)]
async fn test_expired_fires_at_deadline() {
    let mut s = DeadlineScheduler::new();
    let start = Instant::now();
    s.schedule_in("close", Duration::from_secs(10));

    let fired = s.expired().await;
    assert_eq!(fired.key, "close");
    assert_eq!(fired.deadline, start + Duration::from_secs(10));
    assert!(Instant::now() >= start + Duration::from_secs(10));
    assert!(s.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_expired_fires_in_time_order() {
    let mut s = DeadlineScheduler::new();
    s.schedule_in(3, Duration::from_secs(30));
    s.schedule_in(1, Duration::from_secs(10));
    s.schedule_in(2, Duration::from_secs(20));

    let order = [
        s.expired().await.key,
        s.expired().await.key,
        s.expired().await.key,
    ];
    assert_eq!(order, [1, 2, 3]);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_deadline_never_fires() {
    let mut s = DeadlineScheduler::new();
    s.schedule_in("poll-1", Duration::from_secs(5));
    s.schedule_in("poll-2", Duration::from_secs(8));
    assert!(s.cancel(&"poll-1"));
    assert!(!s.cancel(&"poll-1"));

    let fired = s.expired().await;
    assert_eq!(fired.key, "poll-2");
}

#[tokio::test(start_paused = true)]
async fn test_empty_scheduler_pends_forever() {
    let mut s: DeadlineScheduler<u8> = DeadlineScheduler::new();
    let result = tokio::time::timeout(Duration::from_secs(3600), s.expired()).await;
    assert!(result.is_err(), "nothing scheduled, nothing fires");
}

#[tokio::test(start_paused = true)]
async fn test_dropped_wait_keeps_deadline() {
    let mut s = DeadlineScheduler::new();
    s.schedule_in("round", Duration::from_secs(10));

    // Another select! branch wins first; the deadline must survive.
    tokio::select! {
        _ = s.expired() => panic!("deadline should not fire yet"),
        _ = tokio::time::sleep(Duration::from_secs(2)) => {}
    }
    assert!(s.contains(&"round"));

    let fired = s.expired().await;
    assert_eq!(fired.key, "round");
}

#[tokio::test(start_paused = true)]
async fn test_past_deadline_fires_immediately_and_reports_lateness() {
    let mut s = DeadlineScheduler::new().with_late_warn(Duration::from_secs(1));
    let past = Instant::now();
    tokio::time::advance(Duration::from_secs(4)).await;
    s.schedule_at("stale", past);

    let fired = s.expired().await;
    assert_eq!(fired.key, "stale");
    assert!(fired.late_by >= Duration::from_secs(4));
}
