//! Deadline timer: single-shot semantics and the fire/cancel race.

use std::time::Duration;

use tokio::time::timeout;

use minirpc::DeadlineTimer;

#[tokio::test]
async fn fires_after_the_deadline() {
    let mut timer = DeadlineTimer::new();
    let expiry = timer.arm(Duration::from_millis(10));
    timeout(Duration::from_secs(5), expiry).await.expect("timer must fire");
    assert!(!timer.cancel(), "cancel must lose once the timer fired");
}

#[tokio::test]
async fn cancel_before_fire_wins() {
    let mut timer = DeadlineTimer::new();
    let expiry = timer.arm(Duration::from_secs(10));
    assert!(timer.cancel());
    assert!(
        timeout(Duration::from_millis(50), expiry).await.is_err(),
        "a cancelled expiry must never resolve"
    );
}

#[tokio::test]
async fn zero_duration_disables_the_deadline() {
    let mut timer = DeadlineTimer::new();
    let expiry = timer.arm(Duration::ZERO);
    assert!(timeout(Duration::from_millis(50), expiry).await.is_err());
    assert!(timer.cancel());
}

#[tokio::test]
async fn rearming_abandons_the_previous_expiry() {
    let mut timer = DeadlineTimer::new();
    let first = timer.arm(Duration::from_millis(10));
    let second = timer.arm(Duration::from_millis(10));
    timeout(Duration::from_secs(5), second).await.expect("armed timer must fire");
    assert!(
        timeout(Duration::from_millis(50), first).await.is_err(),
        "an abandoned expiry must never resolve"
    );
}

#[tokio::test]
async fn exactly_one_side_wins_under_race() {
    for round in 0..25u64 {
        let mut timer = DeadlineTimer::new();
        let expiry = timer.arm(Duration::from_millis(5));
        let fired = tokio::spawn(async move {
            timeout(Duration::from_millis(200), expiry).await.is_ok()
        });
        tokio::time::sleep(Duration::from_millis(round % 10)).await;
        let cancelled = timer.cancel();
        let fired = fired.await.expect("join expiry watcher");
        assert!(
            fired != cancelled,
            "exactly one of fire/cancel must win (round {round}: fired={fired}, cancelled={cancelled})"
        );
    }
}
