//! Trailing-edge debouncing.
//!
//! Two shapes of the same discipline live here:
//!
//! - [`Debouncer`] is the bare timer state. A task that owns several timers
//!   keeps one of these and awaits [`Debouncer::fired`] inside its own
//!   `select!` loop, so cancellation is just a method call on owned state.
//! - [`Debounced`] wraps a callback, in the `debounce(fn, delay)` style.
//!   Each [`Debounced::call`] aborts the previously scheduled run and spawns
//!   a fresh one on the current tokio runtime.
//!
//! Neither has a maximum-wait ceiling: a steady stream of calls postpones
//! execution indefinitely. Pair with a periodic trigger when a save must
//! eventually happen (see [`crate::autosave`]).

use std::fmt;
use std::future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::trace;

/// Timer state for a single trailing-edge debounce.
///
/// Holds at most one pending deadline together with the arguments of the
/// most recent call.
#[derive(Debug)]
pub struct Debouncer<A> {
    delay: Duration,
    pending: Option<(Instant, A)>,
}

impl<A> Debouncer<A> {
    /// Create an idle debouncer.
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: None,
        }
    }

    /// The quiet period required before firing.
    #[must_use]
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Schedule `args` to fire after the delay, replacing anything pending.
    pub fn call(&mut self, args: A) {
        self.pending = Some((Instant::now() + self.delay, args));
    }

    /// Drop the pending deadline, returning its arguments.
    pub fn cancel(&mut self) -> Option<A> {
        self.pending.take().map(|(_, args)| args)
    }

    /// Whether a deadline is scheduled.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// When the pending call will fire.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|(deadline, _)| *deadline)
    }

    /// Resolve with the latest arguments once the deadline passes.
    ///
    /// Never resolves while idle. Cancel-safe: dropping the future leaves
    /// the pending call untouched, so it can sit in a `select!` branch.
    pub async fn fired(&mut self) -> A {
        let Some(deadline) = self.deadline() else {
            return future::pending().await;
        };
        sleep_until(deadline).await;
        match self.pending.take() {
            Some((_, args)) => args,
            None => future::pending().await,
        }
    }
}

type Callback<A> = Arc<dyn Fn(A) + Send + Sync>;

/// A callback wrapped with trailing-edge debouncing.
///
/// Created by [`debounce`]. Dropping it cancels any pending run.
pub struct Debounced<A> {
    delay: Duration,
    callback: Callback<A>,
    pending: Mutex<Option<JoinHandle<()>>>,
}

/// Wrap `callback` so that bursts of calls collapse into one trailing call.
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
/// use meetkeeper::debounce::debounce;
///
/// # async fn demo() {
/// let log = debounce(|line: String| println!("{line}"), Duration::from_millis(200));
/// log.call("first".to_string());
/// log.call("second".to_string()); // only "second" is printed
/// # }
/// ```
pub fn debounce<A, F>(callback: F, delay: Duration) -> Debounced<A>
where
    A: Send + 'static,
    F: Fn(A) + Send + Sync + 'static,
{
    Debounced {
        delay,
        callback: Arc::new(callback),
        pending: Mutex::new(None),
    }
}

impl<A> Debounced<A> {
    /// The quiet period required before the callback runs.
    #[must_use]
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Cancel the pending run, if any.
    pub fn cancel(&self) {
        if let Some(handle) = self.slot().take() {
            trace!("cancelling pending debounced call");
            handle.abort();
        }
    }

    /// Whether a run is scheduled and has not completed.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.slot()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    fn slot(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<A> Debounced<A>
where
    A: Send + 'static,
{
    /// Schedule the callback with `args`, restarting the quiet period.
    ///
    /// Must be called from within a tokio runtime.
    pub fn call(&self, args: A) {
        let callback = Arc::clone(&self.callback);
        let delay = self.delay;
        let mut slot = self.slot();
        if let Some(previous) = slot.take() {
            previous.abort();
        }
        *slot = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            callback(args);
        }));
    }
}

impl<A> fmt::Debug for Debounced<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Debounced")
            .field("delay", &self.delay)
            .field("pending", &self.is_pending())
            .finish_non_exhaustive()
    }
}

impl<A> Drop for Debounced<A> {
    fn drop(&mut self) {
        let slot = self
            .pending
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = slot.take() {
            handle.abort();
        }
    }
}
