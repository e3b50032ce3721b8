//! Commit status synthesis.
//!
//! Turns a snapshot of build steps into the single GitHub commit status that
//! summarises them: a short description, a coarse state and a link to the
//! most relevant step in the Cloud Build console.

mod duration;

pub use duration::fmt_duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use url::Url;

use crate::steps::{BuildSnapshot, StepState, StepStatus};

/// Steps that ran for this long or less get no duration suffix.
const DURATION_NOISE: Duration = Duration::from_secs(10);

/// GitHub's limit on status descriptions
pub const MAX_DESCRIPTION: usize = 140;

/// Coarse commit status state understood by GitHub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitState {
    Pending,
    Success,
    Error,
}

impl CommitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommitState::Pending => "pending",
            CommitState::Success => "success",
            CommitState::Error => "error",
        }
    }
}

impl fmt::Display for CommitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body of a `POST /repos/{owner}/{repo}/statuses/{sha}` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitStatusUpdate {
    pub state: CommitState,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub target_url: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub context: String,
}

/// Link into the Cloud Build console for one build.
#[derive(Debug, Clone)]
pub struct BuildLink {
    base: Url,
    build_id: String,
    project_id: String,
}

impl BuildLink {
    pub fn new(base: Url, build_id: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            base,
            build_id: build_id.into(),
            project_id: project_id.into(),
        }
    }

    /// `{base}/{build_id};step={num}?project={project_id}`
    pub fn for_step(&self, num: u32) -> String {
        let mut link = self.base.clone();
        if let Ok(mut segments) = link.path_segments_mut() {
            segments
                .pop_if_empty()
                .push(&format!("{};step={}", self.build_id, num));
        }
        link.query_pairs_mut()
            .clear()
            .append_pair("project", &self.project_id);
        link.into()
    }
}

/// Builds commit status updates for one build and status context.
#[derive(Debug, Clone)]
pub struct StatusSynthesizer {
    context: String,
    link: BuildLink,
    max_description: usize,
}

impl StatusSynthesizer {
    pub fn new(context: impl Into<String>, link: BuildLink) -> Self {
        Self {
            context: context.into(),
            link,
            max_description: MAX_DESCRIPTION,
        }
    }

    /// Override the description limit
    pub fn with_max_description(mut self, max: usize) -> Self {
        self.max_description = max;
        self
    }

    /// Synthesize the status for `snapshot` as of `now` (Unix nanoseconds).
    ///
    /// Returns `None` until at least one step has been observed.
    pub fn synthesize(&self, snapshot: &BuildSnapshot<'_>, now: i64) -> Option<CommitStatusUpdate> {
        let mut steps = snapshot.steps.clone();
        sort_steps(&mut steps);
        let first = *steps.first()?;

        let description = truncate(describe(&steps, now), self.max_description);
        let state = coarse_state(first.status, steps.len(), snapshot.expected_steps);

        Some(CommitStatusUpdate {
            state,
            target_url: self.link.for_step(first.number),
            description,
            context: self.context.clone(),
        })
    }
}

/// Current wall-clock time in Unix nanoseconds, the clock Docker stamps
/// events with.
pub fn now_nanos() -> i64 {
    Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX)
}

/// Order steps by status precedence, then most recently ended, then most
/// recently started, then step number.
pub fn sort_steps(steps: &mut [&StepState]) {
    steps.sort_by(|a, b| {
        a.status
            .cmp(&b.status)
            .then_with(|| b.ended_at.cmp(&a.ended_at))
            .then_with(|| b.started_at.cmp(&a.started_at))
            .then_with(|| a.number.cmp(&b.number))
    });
}

/// Describe sorted steps, e.g. `Error: lint 1m2s; Running: test, build`.
pub fn describe(steps: &[&StepState], now: i64) -> String {
    let mut out = String::new();
    let mut previous: Option<StepStatus> = None;

    for step in steps {
        match previous {
            Some(status) if status == step.status => out.push_str(", "),
            _ => {
                if previous.is_some() {
                    out.push_str("; ");
                }
                out.push_str(step.status.label());
                out.push_str(": ");
            }
        }
        out.push_str(&step.display_id);

        if let Some(elapsed) = step.elapsed_nanos(now).and_then(|n| u64::try_from(n).ok()) {
            let elapsed = Duration::from_nanos(elapsed);
            if elapsed > DURATION_NOISE {
                out.push(' ');
                out.push_str(&fmt_duration(elapsed));
            }
        }
        previous = Some(step.status);
    }

    out
}

/// Cut `s` to at most `max` characters.
pub fn truncate(mut s: String, max: usize) -> String {
    if let Some((idx, _)) = s.char_indices().nth(max) {
        s.truncate(idx);
    }
    s
}

/// Map the highest-precedence step status to a commit state.
///
/// A finished first step only means the build finished when every expected
/// step has reported. Without a manifest the count is unknown and a finished
/// first step is taken as success; a later step starting flips it back to
/// pending.
pub fn coarse_state(first: StepStatus, observed: usize, expected: usize) -> CommitState {
    match first {
        StepStatus::Error | StepStatus::Cancelled => CommitState::Error,
        StepStatus::Running => CommitState::Pending,
        StepStatus::Done if expected == 0 || observed == expected => CommitState::Success,
        StepStatus::Done => CommitState::Pending,
    }
}
