//! Publish timer for the relay loop.
//!
//! After a step changes the relay waits a short quiet period so a burst of
//! Docker events becomes one status update. Once it has published it
//! refreshes on a slow cadence, so the durations in the description keep
//! moving even when no step changes.

use std::time::Duration;
use tokio::time::Instant;

/// Default quiet period after a step change
pub const DEFAULT_QUIET: Duration = Duration::from_millis(20);

/// Default refresh interval while nothing changes
pub const DEFAULT_REFRESH: Duration = Duration::from_secs(10);

/// When the next publish is due.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    /// Nothing observed yet, no publish scheduled
    Idle,
    /// A step changed; publish once the quiet period passes
    Settling(Instant),
    /// Last publish is current; refresh at the deadline
    Refreshing(Instant),
}

#[derive(Debug, Clone)]
pub struct PublishTimer {
    state: TimerState,
    quiet: Duration,
    refresh: Duration,
}

impl Default for PublishTimer {
    fn default() -> Self {
        Self::new(DEFAULT_QUIET, DEFAULT_REFRESH)
    }
}

impl PublishTimer {
    pub fn new(quiet: Duration, refresh: Duration) -> Self {
        Self {
            state: TimerState::Idle,
            quiet,
            refresh,
        }
    }

    pub fn state(&self) -> TimerState {
        self.state
    }

    /// A step changed. Every change pushes the publish back by the quiet
    /// period, including one that arrives while already settling.
    pub fn on_change(&mut self, now: Instant) {
        self.state = TimerState::Settling(now + self.quiet);
    }

    /// A publish was attempted; the next one is a refresh.
    pub fn on_publish(&mut self, now: Instant) {
        self.state = TimerState::Refreshing(now + self.refresh);
    }

    pub fn deadline(&self) -> Option<Instant> {
        match self.state {
            TimerState::Idle => None,
            TimerState::Settling(at) | TimerState::Refreshing(at) => Some(at),
        }
    }

    /// Resolves at the deadline, or never while idle.
    pub async fn expired(&self) {
        match self.deadline() {
            Some(at) => tokio::time::sleep_until(at).await,
            None => std::future::pending::<()>().await,
        }
    }
}
