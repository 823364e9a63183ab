//! # Countdown Timers
//!
//! Resettable countdown and periodic window timers backing host liveness
//! and scaling windows.
//!
//! ## Invariant: owner-scoped firing
//! A countdown never begins a firing after `stop()` returns or its handle
//! is dropped.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// Future produced by a timer callback.
pub type TimerFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Fire once after the period elapses without a reset, then stop.
    Once,
    /// Fire every period, regardless of resets in between.
    Every,
}

/// A countdown owned by the entity it affects.
///
/// In once-mode the callback runs a single time, after `period` passes with
/// no intervening [`reset`](Countdown::reset); each reset restarts the full
/// period. In every-mode the callback runs at every period boundary until the
/// countdown is stopped or dropped.
///
/// The backing task is spawned on the ambient Tokio runtime and aborted on
/// drop, so a countdown cannot outlive its owner.
pub struct Countdown {
    reset: Arc<Notify>,
    handle: JoinHandle<()>,
}

impl Countdown {
    /// Start a once-mode countdown: `on_expire` runs after `period` elapses
    /// without a reset.
    pub fn once<F>(period: Duration, on_expire: F) -> Self
    where
        F: FnMut() -> TimerFuture + Send + 'static,
    {
        Self::start(Mode::Once, period, on_expire)
    }

    /// Start an every-mode countdown: `on_tick` runs at every period
    /// boundary.
    pub fn every<F>(period: Duration, on_tick: F) -> Self
    where
        F: FnMut() -> TimerFuture + Send + 'static,
    {
        Self::start(Mode::Every, period, on_tick)
    }

    fn start<F>(mode: Mode, period: Duration, mut fire: F) -> Self
    where
        F: FnMut() -> TimerFuture + Send + 'static,
    {
        let reset = Arc::new(Notify::new());
        let observer = Arc::clone(&reset);

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(period) => {
                        fire().await;
                        if mode == Mode::Once {
                            break;
                        }
                    }
                    _ = observer.notified() => {
                        // Restart the sleep from a full period.
                        continue;
                    }
                }
            }
        });

        Self { reset, handle }
    }

    /// Push the next firing back by a full period.
    pub fn reset(&self) {
        self.reset.notify_one();
    }

    /// Stop the countdown. No new firing begins after this returns.
    pub fn stop(&self) {
        self.handle.abort();
    }

    /// Whether the countdown has already fired (once-mode) or been stopped.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for Countdown {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

impl std::fmt::Debug for Countdown {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Countdown")
            .field("finished", &self.handle.is_finished())
            .finish()
    }
}
