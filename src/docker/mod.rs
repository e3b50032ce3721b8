//! Docker event source.
//!
//! Streams container lifecycle events from the Docker daemon Cloud Build runs
//! steps on, and forwards the ones about build steps as transitions.

mod client;
mod decoder;
mod event;

pub use client::{DockerEndpoint, EventReader, EVENTS_PATH};
pub use decoder::EventDecoder;
pub use event::{Actor, Attributes, DockerEvent};

use thiserror::Error;

/// Failures of the event stream. All of them end the relay.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("connecting to docker at {host}: {message}")]
    Connect { host: String, message: String },

    #[error("HTTP {status} fetching docker events:\n{body}")]
    Status { status: u16, body: String },

    #[error("reading docker events: {0}")]
    Read(String),

    #[error("decoding event: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("docker event stream cancelled")]
    Cancelled,
}

impl SourceError {
    /// Whether the stream could not be established at all
    pub fn is_unavailable(&self) -> bool {
        matches!(self, SourceError::Connect { .. } | SourceError::Status { .. })
    }
}
