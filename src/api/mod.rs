//! Commit status publishing.
//!
//! The relay loop talks to a [`StatusSink`]; [`GitHubClient`] is the real
//! one, tests substitute an in-memory sink.

pub mod error;
pub mod github;

pub use error::ApiError;
pub use github::GitHubClient;

use async_trait::async_trait;

use crate::status::CommitStatusUpdate;

/// Destination for commit status updates.
///
/// Called serially by the relay loop; at most one publish is in flight.
#[async_trait]
pub trait StatusSink: Send + Sync {
    /// Sink name for logging (e.g., "github")
    fn name(&self) -> &str;

    /// Publish one status update. Succeeds only if the status was created.
    async fn publish(&self, update: &CommitStatusUpdate) -> Result<(), ApiError>;
}
