//! Aggregation of step transitions into per-step state.
//!
//! The tracker is owned by the relay loop and only ever mutated there, so it
//! needs no locking.

use std::collections::BTreeMap;
use tracing::debug;

use super::{StepState, StepStatus, Transition};

/// Outcome of applying one transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applied {
    /// The step was already cancelled; nothing changed
    Ignored,
    /// The step was stored; `cancelled` lists running siblings that were
    /// cancelled because this step failed
    Updated { cancelled: Vec<u32> },
}

/// Current state of every step seen so far, keyed by step number.
#[derive(Debug, Clone, Default)]
pub struct BuildSteps {
    steps: BTreeMap<u32, StepState>,
}

impl BuildSteps {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a transition.
    ///
    /// A cancelled step never changes again: Docker reports a nonzero `die`
    /// after every `kill`, and that must not turn a cancellation into a
    /// failure. When a step fails, every other running step is marked
    /// cancelled at the failure's end time, since Cloud Build is about to
    /// kill them anyway.
    pub fn apply(&mut self, transition: Transition) -> Applied {
        let previous = self.steps.get(&transition.num);
        if previous.is_some_and(|s| s.status == StepStatus::Cancelled) {
            debug!(step = transition.num, status = %transition.status, "Ignoring update to cancelled step");
            return Applied::Ignored;
        }

        let started_at = transition
            .started_at
            .or_else(|| previous.and_then(|s| s.started_at));
        let state = StepState {
            number: transition.num,
            display_id: transition.id,
            status: transition.status,
            started_at,
            ended_at: transition.ended_at,
            exit_code: transition.exit_code,
        };
        debug!(
            step = state.number,
            id = %state.display_id,
            status = %state.status,
            started_at = ?state.started_at,
            ended_at = ?state.ended_at,
            exit_code = ?state.exit_code,
            "Step updated"
        );

        let failed = state.status == StepStatus::Error;
        let num = state.number;
        let ended_at = state.ended_at;
        self.steps.insert(num, state);

        let mut cancelled = Vec::new();
        if failed {
            for step in self.steps.values_mut() {
                if step.number != num && step.status == StepStatus::Running {
                    step.status = StepStatus::Cancelled;
                    step.ended_at = ended_at;
                    cancelled.push(step.number);
                }
            }
            if !cancelled.is_empty() {
                debug!(step = num, cancelled = ?cancelled, "Cancelled running steps after failure");
            }
        }

        Applied::Updated { cancelled }
    }

    pub fn get(&self, num: u32) -> Option<&StepState> {
        self.steps.get(&num)
    }

    /// Number of distinct steps observed
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Read-only view for status synthesis.
    pub fn snapshot(&self, expected_steps: usize) -> BuildSnapshot<'_> {
        BuildSnapshot {
            steps: self.steps.values().collect(),
            expected_steps,
        }
    }
}

/// Every observed step plus the expected step count (0 when unknown).
#[derive(Debug, Clone)]
pub struct BuildSnapshot<'a> {
    pub steps: Vec<&'a StepState>,
    pub expected_steps: usize,
}
