//! Long-running services driving a relay run.

pub mod debounce;
pub mod relay;

pub use debounce::{PublishTimer, TimerState};
pub use relay::{StatusRelay, TRANSITION_BUFFER};
