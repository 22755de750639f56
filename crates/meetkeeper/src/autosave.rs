//! Auto-save coordination.
//!
//! An [`AutoSave`] binds a live [`SaveTarget`] to a [`Persist`] backend and
//! keeps it saved without flooding the backend during rapid edits:
//!
//! - enabling performs one synchronous save of the current snapshot;
//! - every change to the target restarts a debounce timer of `interval`, so
//!   a burst of edits is persisted once, carrying the last value;
//! - a periodic timer of `interval` saves even while edits never pause, and
//!   absorbs any pending debounced save when it fires;
//! - [`AutoSave::save_now`] persists immediately whether or not automatic
//!   saves are enabled.
//!
//! Both timers belong to a single driver task. Stopping, dropping or
//! reconfiguring the coordinator aborts that task, so no timer from a
//! previous configuration can fire afterwards. Saves always read the target
//! at fire time.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use crate::config::AutoSaveConfig;
use crate::debounce::Debouncer;
use crate::error::{Error, Result};

/// A persistence backend for snapshots of type `T`.
///
/// Implementations must tolerate being handed the same snapshot repeatedly,
/// since periodic saves do not check for changes. Closures of the shape
/// `Fn(&T) -> Result<()>` implement this trait.
pub trait Persist<T>: Send + Sync {
    /// Persist one snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot could not be stored.
    fn persist(&self, snapshot: &T) -> Result<()>;
}

impl<T, F> Persist<T> for F
where
    F: Fn(&T) -> Result<()> + Send + Sync,
{
    fn persist(&self, snapshot: &T) -> Result<()> {
        self(snapshot)
    }
}

/// A live, replace-on-write value that coordinators read at save time.
///
/// Each [`SaveTarget::set`] replaces the whole snapshot.
#[derive(Debug)]
pub struct SaveTarget<T> {
    tx: watch::Sender<T>,
}

impl<T> SaveTarget<T> {
    /// Create a target holding `initial`.
    #[must_use]
    pub fn new(initial: T) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    /// Replace the current snapshot.
    pub fn set(&self, value: T) {
        self.tx.send_replace(value);
    }

    /// Modify the current snapshot in place.
    pub fn update(&self, modify: impl FnOnce(&mut T)) {
        self.tx.send_modify(modify);
    }

    /// Clone out the current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> T
    where
        T: Clone,
    {
        self.tx.borrow().clone()
    }

    /// A receiver that observes every future change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.tx.subscribe()
    }
}

/// Point-in-time view of a coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutoSaveStatus {
    /// Whether automatic saves are configured on.
    pub enabled: bool,
    /// Whether the driver task is alive.
    pub running: bool,
    /// Periodic cadence and debounce delay.
    pub interval: Duration,
    /// Successful saves of any kind.
    pub saves: u64,
    /// Failed saves of any kind.
    pub failures: u64,
    /// When the last successful save finished.
    pub last_saved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct SaveStats {
    saves: AtomicU64,
    failures: AtomicU64,
    last_saved_at: Mutex<Option<DateTime<Utc>>>,
}

impl SaveStats {
    fn record(&self, result: &Result<()>) {
        if result.is_ok() {
            self.saves.fetch_add(1, Ordering::SeqCst);
            *self
                .last_saved_at
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = Some(Utc::now());
        } else {
            self.failures.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn last_saved_at(&self) -> Option<DateTime<Utc>> {
        *self
            .last_saved_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn persist_snapshot<T>(snapshot: &T, persist: &dyn Persist<T>, stats: &SaveStats) -> Result<()> {
    let result = persist.persist(snapshot);
    stats.record(&result);
    result
}

/// Periodic and debounced persistence bound to one [`SaveTarget`].
///
/// Requires a tokio runtime whenever automatic saves are enabled.
pub struct AutoSave<T> {
    rx: watch::Receiver<T>,
    persist: Arc<dyn Persist<T>>,
    config: AutoSaveConfig,
    stats: Arc<SaveStats>,
    driver: Option<JoinHandle<()>>,
}

impl<T> AutoSave<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Bind a coordinator to `target`.
    ///
    /// When `config.enabled` is set, the current snapshot is persisted before
    /// this returns and the timers start.
    ///
    /// # Errors
    ///
    /// Returns the error of the initial save. No timers are started in that
    /// case.
    pub fn start(
        target: &SaveTarget<T>,
        persist: Arc<dyn Persist<T>>,
        config: AutoSaveConfig,
    ) -> Result<Self> {
        let mut autosave = Self {
            rx: target.subscribe(),
            persist,
            config,
            stats: Arc::default(),
            driver: None,
        };
        if config.enabled {
            autosave.launch()?;
        }
        Ok(autosave)
    }

    /// Persist the latest snapshot right now, bypassing both timers.
    ///
    /// Works whether or not automatic saves are enabled.
    ///
    /// # Errors
    ///
    /// Returns the error reported by the persistence backend.
    pub fn save_now(&self) -> Result<()> {
        let snapshot = self.rx.borrow().clone();
        debug!("manual save");
        persist_snapshot(&snapshot, self.persist.as_ref(), &self.stats)
    }

    /// Tear down the timers and start again with `config`.
    ///
    /// Enabling, or changing the interval while enabled, performs the
    /// immediate save again. An unchanged configuration is a no-op.
    ///
    /// # Errors
    ///
    /// Returns the error of the immediate save.
    pub fn reconfigure(&mut self, config: AutoSaveConfig) -> Result<()> {
        if config == self.config {
            return Ok(());
        }
        self.stop();
        self.config = config;
        if config.enabled {
            self.launch()?;
        }
        info!(
            enabled = config.enabled,
            interval_ms = config.interval_ms,
            "auto-save reconfigured"
        );
        Ok(())
    }

    fn launch(&mut self) -> Result<()> {
        if self.config.interval_ms == 0 {
            return Err(Error::ConfigValidation {
                message: "auto-save interval must be greater than 0".to_string(),
            });
        }
        let mut rx = self.rx.clone();
        let snapshot = rx.borrow_and_update().clone();
        persist_snapshot(&snapshot, self.persist.as_ref(), &self.stats)?;

        let interval = self.config.interval();
        let driver = Driver {
            rx,
            persist: Arc::clone(&self.persist),
            stats: Arc::clone(&self.stats),
            interval,
            first_tick: Instant::now() + interval,
        };
        debug!(interval_ms = self.config.interval_ms, "starting auto-save driver");
        self.driver = Some(tokio::spawn(driver.run()));
        Ok(())
    }
}

impl<T> AutoSave<T> {
    /// Cancel both timers. Manual saves keep working.
    pub fn stop(&mut self) {
        if let Some(driver) = self.driver.take() {
            debug!("stopping auto-save driver");
            driver.abort();
        }
    }

    /// Whether the driver task is alive.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.driver
            .as_ref()
            .is_some_and(|driver| !driver.is_finished())
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> AutoSaveConfig {
        self.config
    }

    /// Counters and timing for this coordinator.
    #[must_use]
    pub fn status(&self) -> AutoSaveStatus {
        AutoSaveStatus {
            enabled: self.config.enabled,
            running: self.is_running(),
            interval: self.config.interval(),
            saves: self.stats.saves.load(Ordering::SeqCst),
            failures: self.stats.failures.load(Ordering::SeqCst),
            last_saved_at: self.stats.last_saved_at(),
        }
    }
}

impl<T> std::fmt::Debug for AutoSave<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutoSave")
            .field("config", &self.config)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl<T> Drop for AutoSave<T> {
    fn drop(&mut self) {
        self.stop();
    }
}

/// The task owning the periodic and debounce timers.
struct Driver<T> {
    rx: watch::Receiver<T>,
    persist: Arc<dyn Persist<T>>,
    stats: Arc<SaveStats>,
    interval: Duration,
    first_tick: Instant,
}

impl<T> Driver<T>
where
    T: Clone + Send + Sync + 'static,
{
    async fn run(mut self) {
        let mut debouncer = Debouncer::new(self.interval);
        let mut ticker = interval_at(self.first_tick, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while self.step(&mut debouncer, &mut ticker).await {}
    }

    /// Handle the next timer or target event. Returns `false` once the
    /// target is gone.
    async fn step(&mut self, debouncer: &mut Debouncer<()>, ticker: &mut Interval) -> bool {
        // Debounced saves win ties with the ticker so one window yields one save.
        tokio::select! {
            biased;

            () = debouncer.fired() => {
                self.save("debounced");
                ticker.reset();
            }
            _ = ticker.tick() => {
                debouncer.cancel();
                self.save("periodic");
            }
            changed = self.rx.changed() => {
                if changed.is_err() {
                    debug!("save target dropped, auto-save driver exiting");
                    return false;
                }
                trace!("save target changed");
                debouncer.call(());
            }
        }
        true
    }

    /// Persist the current value, marking it seen so a change that arrived
    /// with this save does not schedule another one.
    fn save(&mut self, trigger: &'static str) {
        let snapshot = self.rx.borrow_and_update().clone();
        match persist_snapshot(&snapshot, self.persist.as_ref(), &self.stats) {
            Ok(()) => trace!(trigger, "auto-save completed"),
            Err(e) => warn!(trigger, error = %e, "auto-save failed"),
        }
    }
}
