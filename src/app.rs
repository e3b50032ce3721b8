use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

use crate::api::GitHubClient;
use crate::config::Config;
use crate::docker::{DockerEndpoint, EventReader};
use crate::error::RelayError;
use crate::manifest::StepRegistry;
use crate::services::{StatusRelay, TRANSITION_BUFFER};
use crate::status::{BuildLink, StatusSynthesizer};

/// One relay run: a Docker event reader feeding the status relay.
pub struct App {
    endpoint: DockerEndpoint,
    registry: StepRegistry,
    sink: Arc<GitHubClient>,
    synthesizer: StatusSynthesizer,
    config: Config,
}

impl App {
    /// Validate the configuration and build every component of the run.
    pub fn new(config: Config) -> Result<Self, RelayError> {
        config.validate()?;

        let endpoint = DockerEndpoint::parse(&config.docker.host)?;
        let registry = StepRegistry::load(config.manifest_path().as_deref());

        let github = &config.github;
        let sink = GitHubClient::new(
            &config.github_api_url()?,
            &github.user,
            &github.repo,
            &github.commit_sha,
            &github.token,
        )?;

        let link = BuildLink::new(
            config.console_url()?,
            config.build.id.clone(),
            config.build.project_id.clone(),
        );
        let synthesizer = StatusSynthesizer::new(github.context.clone(), link)
            .with_max_description(config.publish.max_description);

        Ok(Self {
            endpoint,
            registry,
            sink: Arc::new(sink),
            synthesizer,
            config,
        })
    }

    /// Relay until the build fails or the Docker event stream ends.
    pub async fn run(self) -> Result<(), RelayError> {
        let expected_steps = self.registry.len();
        info!(
            docker = %self.endpoint,
            statuses = %self.sink.statuses_url(),
            context = %self.config.github.context,
            expected_steps,
            "Relaying build steps to GitHub"
        );

        let (tx, rx) = mpsc::channel(TRANSITION_BUFFER);
        let (done_tx, done_rx) = oneshot::channel();
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let mut reader = EventReader::new(self.endpoint, self.registry, tx).with_shutdown(shutdown_rx);
        let reader_task = tokio::spawn(async move {
            let result = reader.run().await;
            // The relay must see the result before the transition channel closes
            let _ = done_tx.send(result);
            drop(reader);
        });

        let relay = StatusRelay::new(self.sink, self.synthesizer, expected_steps)
            .with_timing(self.config.publish.debounce(), self.config.publish.refresh());
        let result = relay.run(rx, done_rx).await;

        let _ = shutdown_tx.send(()).await;
        if let Err(e) = reader_task.await {
            warn!(error = %e, "Docker event reader task failed");
        }

        result
    }
}

/// Build and run an [`App`] from an already loaded configuration.
pub async fn run(config: Config) -> Result<(), RelayError> {
    App::new(config)?.run().await
}
