//! Integration coverage for [`portcullis::Backoff`]'s growth, cap, and reset
//! behavior, using a paused tokio clock so the assertions don't depend on
//! wall-clock timing. Each wait is driven on its own spawned task so its
//! timer is registered with the runtime before the clock is advanced.

use portcullis::Backoff;
use std::sync::Arc;
use std::time::Duration;

async fn transient_wait(backoff: &Arc<Backoff>, advance_by: Duration) {
    let backoff = Arc::clone(backoff);
    let handle = tokio::spawn(async move { backoff.wait_transient().await });
    tokio::time::advance(advance_by).await;
    handle.await.expect("wait_transient task panicked");
}

async fn invalidating_wait(backoff: &Arc<Backoff>, advance_by: Duration) {
    let backoff = Arc::clone(backoff);
    let handle = tokio::spawn(async move { backoff.wait_session_invalidating().await });
    tokio::time::advance(advance_by).await;
    handle.await.expect("wait_session_invalidating task panicked");
}

#[tokio::test(start_paused = true)]
async fn transient_backoff_grows_and_resets() {
    let backoff = Arc::new(Backoff::new());

    // First wait is jittered between 0 and the 1s base; advancing a full
    // second guarantees it has elapsed regardless of the jitter draw.
    transient_wait(&backoff, Duration::from_secs(1)).await;

    // Doubling from the 1s base without a reset, repeated enough times,
    // must eventually hit the 60s cap rather than growing unboundedly.
    for _ in 0..10 {
        transient_wait(&backoff, Duration::from_secs(60)).await;
    }

    backoff.reset();

    // After a reset the next wait is bounded by the base delay again, not
    // the grown-and-capped one from before the reset.
    transient_wait(&backoff, Duration::from_secs(1)).await;
}

#[tokio::test(start_paused = true)]
async fn session_invalidating_wait_does_not_grow() {
    let backoff = Arc::new(Backoff::new());

    for _ in 0..5 {
        invalidating_wait(&backoff, Duration::from_secs(5)).await;
    }

    // A session-invalidating wait never inflates the transient counter, so
    // the very next transient wait is still bounded by the 1s base.
    transient_wait(&backoff, Duration::from_secs(1)).await;
}
