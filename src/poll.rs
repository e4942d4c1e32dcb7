//! Periodic refresh engine for the dashboard watchers.
//!
//! DESIGN
//! ======
//! The backend has no push channel, so live views poll. [`Poller`] owns one
//! spawned task driving a fixed-period `tokio::time::interval` with
//! `MissedTickBehavior::Skip`. Each tick callback is awaited to completion
//! before the next tick fires, so a slow fetch can never stack a second
//! request behind itself. Watcher state is threaded through the callback by
//! value rather than shared behind a lock.
//!
//! Shutdown is twofold: the callback can report its condition became false
//! ([`PollFlow::Stop`], e.g. the rider's request went terminal), or the owner
//! signals a watch channel. Dropping the handle aborts the task outright so
//! an abandoned view cannot leak its poller.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

/// Tick verdict: keep polling or wind the task down.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PollFlow {
    Continue,
    Stop,
}

/// Handle to a running poll task.
#[derive(Debug)]
pub struct Poller {
    shutdown: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl Poller {
    /// Spawn a poll task ticking every `period`, starting immediately.
    ///
    /// `tick` receives the watcher state, runs one refresh, and returns the
    /// state together with the verdict. The first tick fires right away so a
    /// freshly mounted view is never stale for a full period.
    pub fn spawn<S, F, Fut>(name: &'static str, period: Duration, state: S, mut tick: F) -> Self
    where
        S: Send + 'static,
        F: FnMut(S) -> Fut + Send + 'static,
        Fut: Future<Output = (S, PollFlow)> + Send,
    {
        let (shutdown, mut signal) = watch::channel(false);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut state = state;

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let (next, flow) = tick(state).await;
                        state = next;
                        if flow == PollFlow::Stop {
                            debug!(name, "poller stopped by its own condition");
                            break;
                        }
                    }
                    _ = signal.changed() => {
                        debug!(name, "poller shut down");
                        break;
                    }
                }
            }
        });

        Self {
            shutdown,
            handle: Some(handle),
        }
    }

    /// Ask the task to stop after the tick in flight, if any.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Shut down and wait for the task to finish.
    pub async fn stop(mut self) {
        self.shutdown();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }

    /// Whether the task has already exited (stopped itself or was shut down).
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(JoinHandle::is_finished)
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        if let Some(handle) = &self.handle {
            handle.abort();
        }
    }
}

#[cfg(test)]
#[path = "poll_test.rs"]
mod tests;
