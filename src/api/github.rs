//! GitHub commit status client

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::StatusCode;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::{ApiError, StatusSink};
use crate::error::ConfigError;
use crate::status::CommitStatusUpdate;

const USER_AGENT: &str = concat!("gcb-relay/", env!("CARGO_PKG_VERSION"));
const GITHUB_ACCEPT: &str = "application/vnd.github.v3+json";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Posts statuses for a single commit.
pub struct GitHubClient {
    statuses_url: Url,
    user: String,
    password: String,
    client: reqwest::Client,
}

impl GitHubClient {
    /// Create a client for `{api}/repos/{owner}/{repo}/statuses/{sha}`.
    ///
    /// `token` is `user:token`, `:token` or just `token`.
    pub fn new(
        api: &Url,
        owner: &str,
        repo: &str,
        sha: &str,
        token: &str,
    ) -> Result<Self, ConfigError> {
        let statuses_url = statuses_url(api, owner, repo, sha)?;
        let (user, password) = split_user_pass(token);
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(ConfigError::HttpClient)?;

        Ok(Self {
            statuses_url,
            user: user.to_string(),
            password: password.to_string(),
            client,
        })
    }

    pub fn statuses_url(&self) -> &Url {
        &self.statuses_url
    }
}

#[async_trait]
impl StatusSink for GitHubClient {
    fn name(&self) -> &str {
        "github"
    }

    async fn publish(&self, update: &CommitStatusUpdate) -> Result<(), ApiError> {
        let response = self
            .client
            .post(self.statuses_url.clone())
            .header(ACCEPT, GITHUB_ACCEPT)
            .basic_auth(&self.user, Some(&self.password))
            .json(update)
            .send()
            .await
            .map_err(|e| ApiError::network(e.to_string()))?;

        let status = response.status();
        if status != StatusCode::CREATED {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::from_response(status.as_u16(), body));
        }

        // Drain the body so the connection can be reused
        response
            .bytes()
            .await
            .map_err(|e| ApiError::network(format!("discarding github response body: {e}")))?;
        debug!(url = %self.statuses_url, state = %update.state, "Commit status created");
        Ok(())
    }
}

fn statuses_url(api: &Url, owner: &str, repo: &str, sha: &str) -> Result<Url, ConfigError> {
    let mut url = api.clone();
    url.path_segments_mut()
        .map_err(|()| ConfigError::InvalidUrl {
            key: "github.api",
            value: api.to_string(),
            source: url::ParseError::RelativeUrlWithCannotBeABaseBase,
        })?
        .pop_if_empty()
        .extend(["repos", owner, repo, "statuses", sha]);
    Ok(url)
}

/// Split `user:pass` at the first colon; a value without one is all password.
fn split_user_pass(user_pass: &str) -> (&str, &str) {
    user_pass.split_once(':').unwrap_or(("", user_pass))
}
