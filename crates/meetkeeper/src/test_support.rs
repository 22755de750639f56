//! Helpers for tests that drive timers on a paused tokio clock.

use std::time::Duration;

/// Let every ready task on the current-thread runtime run to its next await.
pub(crate) async fn settle() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}

/// Move the paused clock forward and let woken tasks run.
pub(crate) async fn advance(duration: Duration) {
    tokio::time::advance(duration).await;
    settle().await;
}
