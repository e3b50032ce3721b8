//! gcb-relay - Cloud Build step progress as GitHub commit statuses.
//!
//! Runs alongside a Cloud Build build, watches the Docker daemon for the
//! build's step containers, and keeps a single GitHub commit status up to
//! date with which steps are running, done, failed or cancelled.

pub mod api;
pub mod app;
pub mod config;
pub mod docker;
pub mod env_vars;
pub mod error;
pub mod logging;
pub mod manifest;
pub mod services;
pub mod status;
pub mod steps;

pub use app::{run, App};
pub use config::Config;
pub use error::{ConfigError, RelayError};
