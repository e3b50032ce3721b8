//! Build step model.
//!
//! Steps are Cloud Build containers named `step_<N>`. Each Docker lifecycle
//! event for one of them is normalized into a [`Transition`], and the
//! [`BuildSteps`] tracker folds transitions into per-step [`StepState`].

mod normalize;
pub mod tracker;

pub use normalize::{parse_step_number, STEP_PREFIX};
pub use tracker::{Applied, BuildSnapshot, BuildSteps};

use std::fmt;

/// Status of a single build step.
///
/// Variants are declared in display precedence: failures first, then
/// cancellations, running and finally finished steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StepStatus {
    Error,
    Cancelled,
    Running,
    Done,
}

impl StepStatus {
    /// Capitalized label used in status descriptions
    pub fn label(&self) -> &'static str {
        match self {
            StepStatus::Error => "Error",
            StepStatus::Cancelled => "Cancelled",
            StepStatus::Running => "Running",
            StepStatus::Done => "Done",
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A normalized lifecycle change for one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// Step number from the container name
    pub num: u32,
    /// Display name: the manifest id or the container name
    pub id: String,
    pub status: StepStatus,
    /// Event time in nanoseconds, set by `start`
    pub started_at: Option<i64>,
    /// Event time in nanoseconds, set by `kill` and `die`
    pub ended_at: Option<i64>,
    /// Container exit code, set by `die`
    pub exit_code: Option<i32>,
}

/// Authoritative state of one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepState {
    pub number: u32,
    pub display_id: String,
    pub status: StepStatus,
    pub started_at: Option<i64>,
    /// `None` while the step is running
    pub ended_at: Option<i64>,
    /// Meaningful only for `Done` and `Error`
    pub exit_code: Option<i32>,
}

impl StepState {
    /// Elapsed nanoseconds from start to end, or to `now` while unended.
    ///
    /// `None` when the start was never observed.
    pub fn elapsed_nanos(&self, now: i64) -> Option<i64> {
        let start = self.started_at?;
        Some(self.ended_at.unwrap_or(now) - start)
    }
}
