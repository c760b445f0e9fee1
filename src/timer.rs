//! One-shot cancellable deadline attached to each in-flight I/O operation.

use std::future::{self, Future};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time;

/// A single-shot deadline with a race-free cancel.
///
/// [`arm`](DeadlineTimer::arm) hands back an expiry future; the owning
/// operation races it against the actual I/O with `select!`. An atomic
/// decided flag guarantees at most one winner: either the expiry resolves
/// (and the losing I/O future is dropped, which is its cancellation), or
/// [`cancel`](DeadlineTimer::cancel) claims the win first and the expiry
/// never resolves.
///
/// A zero duration disables the deadline; the expiry never resolves.
#[derive(Debug)]
pub struct DeadlineTimer {
    decided: Arc<AtomicBool>,
}

impl Default for DeadlineTimer {
    fn default() -> Self {
        // Born decided: nothing is armed yet, so there is nothing to win.
        DeadlineTimer { decided: Arc::new(AtomicBool::new(true)) }
    }
}

impl DeadlineTimer {
    pub fn new() -> Self {
        DeadlineTimer::default()
    }

    /// Arms the timer for one operation and returns its expiry future.
    ///
    /// Re-arming abandons any previous expiry; it can no longer win.
    pub fn arm(&mut self, duration: Duration) -> impl Future<Output = ()> + Send + 'static {
        // Decide any previous round so an abandoned expiry cannot fire late.
        self.decided.store(true, Ordering::Release);
        self.decided = Arc::new(AtomicBool::new(false));
        let decided = Arc::clone(&self.decided);
        async move {
            if duration.is_zero() {
                future::pending::<()>().await;
            }
            time::sleep(duration).await;
            if decided.swap(true, Ordering::AcqRel) {
                // Lost the race against cancel; stay pending forever.
                future::pending::<()>().await;
            }
        }
    }

    /// Cancels the armed deadline. Returns true when cancellation won, false
    /// when the timer had already fired (or nothing was armed).
    pub fn cancel(&mut self) -> bool {
        !self.decided.swap(true, Ordering::AcqRel)
    }
}
