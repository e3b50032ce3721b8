use tracing::warn;

use super::{StepStatus, Transition};
use crate::docker::DockerEvent;
use crate::manifest::StepRegistry;

/// Container name prefix Cloud Build gives its step containers
pub const STEP_PREFIX: &str = "step_";

/// Step number for a container named `step_<N>`.
pub fn parse_step_number(name: &str) -> Option<u32> {
    let digits = name.strip_prefix(STEP_PREFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

impl Transition {
    /// Normalize a Docker event.
    ///
    /// Returns `None` for containers that are not build steps, for actions
    /// other than `start`, `kill` and `die`, and for `die` events without a
    /// readable exit code.
    pub fn from_event(event: &DockerEvent, registry: &StepRegistry) -> Option<Self> {
        let name = event.actor.attributes.name.as_str();
        let num = parse_step_number(name)?;
        let at = event.timestamp_nanos();

        let (status, started_at, ended_at, exit_code) = match event.action.as_str() {
            "start" => (StepStatus::Running, Some(at), None, None),
            "kill" => (StepStatus::Cancelled, None, Some(at), None),
            "die" => {
                let raw = event.actor.attributes.exit_code.as_deref().unwrap_or("");
                let Ok(code) = raw.trim().parse::<i32>() else {
                    warn!(container = name, exit_code = raw, "Skipping die event without exit code");
                    return None;
                };
                let status = if code == 0 {
                    StepStatus::Done
                } else {
                    StepStatus::Error
                };
                (status, None, Some(at), Some(code))
            }
            _ => return None,
        };

        let id = registry
            .lookup(num)
            .map_or_else(|| name.to_string(), str::to_string);

        Some(Self {
            num,
            id,
            status,
            started_at,
            ended_at,
            exit_code,
        })
    }
}
