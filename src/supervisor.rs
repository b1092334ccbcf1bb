//! # Recovery Supervisor
//!
//! Watchdog policy of the control loop.
//!
//! - Every healthy tick feeds the watchdog through [`RecoverySupervisor::heartbeat`].
//! - A forced restart consumes the supervisor, so no heartbeat can follow it.
//! - If the loop hangs, the watchdog expires on its own thread and aborts the
//!   process; the service manager then starts a fresh one.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, error, info};

/// Hardware-style watchdog contract.
#[cfg_attr(test, mockall::automock)]
pub trait Watchdog: Send {
    /// Start the countdown. Must be called before `reset`.
    fn arm(&mut self, timeout: Duration);

    /// Restart the countdown.
    fn reset(&mut self);
}

/// Token proving the supervisor has given up on the current process.
///
/// Handed to [`crate::host::restart`], which never returns.
///
/// Carries the still-armed watchdog so it keeps counting down, unfed, until
/// the process is actually replaced.
#[must_use = "a restart request does nothing until passed to host::restart"]
pub struct RestartRequest {
    _watchdog: Box<dyn Send>,
}

impl RestartRequest {
    /// Request for a restart before any watchdog has been armed, e.g. when
    /// the CAN adapter cannot be brought up.
    pub fn unsupervised() -> Self {
        Self {
            _watchdog: Box::new(()),
        }
    }
}

impl std::fmt::Debug for RestartRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestartRequest").finish_non_exhaustive()
    }
}

/// Feeds the watchdog while the loop is healthy and turns a broadcast fault
/// into a restart request.
#[derive(Debug)]
pub struct RecoverySupervisor<W: Watchdog> {
    watchdog: W,
    heartbeats: u64,
}

impl<W: Watchdog> RecoverySupervisor<W> {
    /// Arms the watchdog with `timeout` and takes ownership of it.
    pub fn new(mut watchdog: W, timeout: Duration) -> Self {
        watchdog.arm(timeout);
        info!("Watchdog armed ({} ms)", timeout.as_millis());
        Self {
            watchdog,
            heartbeats: 0,
        }
    }

    /// Feed the watchdog. Call once per healthy control-loop tick.
    pub fn heartbeat(&mut self) {
        self.watchdog.reset();
        self.heartbeats += 1;
    }

    /// Heartbeats issued since start-up.
    pub fn heartbeats(&self) -> u64 {
        self.heartbeats
    }

    /// Give up on the current process.
    ///
    /// The watchdog stays armed but is never fed again.
    pub fn force_restart(self) -> RestartRequest
    where
        W: 'static,
    {
        error!("Forcing restart after {} heartbeats", self.heartbeats);
        RestartRequest {
            _watchdog: Box::new(self.watchdog),
        }
    }
}

type ExpiryAction = Arc<dyn Fn() + Send + Sync>;

/// Software watchdog backed by a monitor thread
///
/// The monitor checks the last reset time a few times per timeout window and
/// runs the expiry action once if the window is exceeded. The default action
/// logs and aborts the process.
pub struct ThreadWatchdog {
    last_reset: Arc<Mutex<Instant>>,
    stop: Arc<AtomicBool>,
    on_expiry: ExpiryAction,
    monitor: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for ThreadWatchdog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadWatchdog")
            .field("armed", &self.monitor.is_some())
            .finish_non_exhaustive()
    }
}

impl Default for ThreadWatchdog {
    fn default() -> Self {
        Self::new()
    }
}

impl ThreadWatchdog {
    /// Watchdog that aborts the process on expiry.
    pub fn new() -> Self {
        Self::with_expiry_action(|| {
            error!("Watchdog expired, aborting");
            std::process::abort();
        })
    }

    /// Watchdog that runs `action` on expiry instead of aborting.
    pub fn with_expiry_action<F>(action: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            last_reset: Arc::new(Mutex::new(Instant::now())),
            stop: Arc::new(AtomicBool::new(false)),
            on_expiry: Arc::new(action),
            monitor: None,
        }
    }

    fn touch(&self) {
        // A poisoned lock only means the monitor panicked; keep feeding anyway
        let mut last = self.last_reset.lock().unwrap_or_else(|e| e.into_inner());
        *last = Instant::now();
    }

    fn disarm(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.monitor.take() {
            let _ = handle.join();
        }
    }
}

impl Watchdog for ThreadWatchdog {
    fn arm(&mut self, timeout: Duration) {
        self.disarm();
        self.stop = Arc::new(AtomicBool::new(false));
        self.touch();

        let last_reset = Arc::clone(&self.last_reset);
        let stop = Arc::clone(&self.stop);
        let on_expiry = Arc::clone(&self.on_expiry);
        let poll = (timeout / 4).max(Duration::from_millis(1));

        self.monitor = Some(thread::spawn(move || {
            while !stop.load(Ordering::Relaxed) {
                thread::sleep(poll);
                let elapsed = last_reset.lock().unwrap_or_else(|e| e.into_inner()).elapsed();
                if elapsed > timeout && !stop.load(Ordering::Relaxed) {
                    on_expiry();
                    return;
                }
            }
            debug!("Watchdog monitor stopped");
        }));
    }

    fn reset(&mut self) {
        self.touch();
    }
}

impl Drop for ThreadWatchdog {
    fn drop(&mut self) {
        self.disarm();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::eq;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_new_arms_watchdog() {
        let mut watchdog = MockWatchdog::new();
        watchdog
            .expect_arm()
            .with(eq(Duration::from_millis(500)))
            .times(1)
            .return_const(());
        watchdog.expect_reset().never();

        let supervisor = RecoverySupervisor::new(watchdog, Duration::from_millis(500));
        assert_eq!(supervisor.heartbeats(), 0);
    }

    #[test]
    fn test_heartbeat_resets_watchdog() {
        let mut watchdog = MockWatchdog::new();
        watchdog.expect_arm().times(1).return_const(());
        watchdog.expect_reset().times(3).return_const(());

        let mut supervisor = RecoverySupervisor::new(watchdog, Duration::from_millis(500));
        supervisor.heartbeat();
        supervisor.heartbeat();
        supervisor.heartbeat();
        assert_eq!(supervisor.heartbeats(), 3);
    }

    #[test]
    fn test_force_restart_does_not_feed_watchdog() {
        let mut watchdog = MockWatchdog::new();
        watchdog.expect_arm().times(1).return_const(());
        watchdog.expect_reset().times(1).return_const(());

        let mut supervisor = RecoverySupervisor::new(watchdog, Duration::from_millis(500));
        supervisor.heartbeat();
        let request = supervisor.force_restart();
        assert!(format!("{:?}", request).starts_with("RestartRequest"));
    }

    #[test]
    fn test_thread_watchdog_expires_without_reset() {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let mut watchdog = ThreadWatchdog::with_expiry_action(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        watchdog.arm(Duration::from_millis(20));
        thread::sleep(Duration::from_millis(150));

        assert_eq!(fired.load(Ordering::SeqCst), 1, "Expiry should fire exactly once");
    }

    #[test]
    fn test_thread_watchdog_fed_does_not_expire() {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let mut watchdog = ThreadWatchdog::with_expiry_action(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        watchdog.arm(Duration::from_millis(200));
        for _ in 0..20 {
            thread::sleep(Duration::from_millis(10));
            watchdog.reset();
        }

        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_thread_watchdog_drop_disarms() {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let mut watchdog = ThreadWatchdog::with_expiry_action(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        watchdog.arm(Duration::from_millis(40));
        drop(watchdog);
        thread::sleep(Duration::from_millis(100));

        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
