//! Top-level error types and their process exit codes.

use thiserror::Error;

use crate::api::ApiError;
use crate::docker::SourceError;

/// Exit code used when the Docker event stream could not be established.
pub const EXIT_SOURCE_UNAVAILABLE: i32 = 3;

/// Problems with the configuration, detected before any work starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("envvar {var} {hint}is required")]
    Missing {
        var: &'static str,
        hint: &'static str,
    },

    #[error("{key} is not a valid URL ({value:?}): {source}")]
    InvalidUrl {
        key: &'static str,
        value: String,
        #[source]
        source: url::ParseError,
    },

    #[error("unsupported docker host {0:?} (expected unix://, tcp:// or http://)")]
    UnsupportedDockerHost(String),

    #[error("building HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),

    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
}

/// The single terminating error of a relay run.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("publishing final status: {0}")]
    Publish(#[from] ApiError),
}

impl RelayError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            RelayError::Source(e) if e.is_unavailable() => EXIT_SOURCE_UNAVAILABLE,
            _ => 1,
        }
    }
}
