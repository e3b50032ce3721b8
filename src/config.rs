use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

use crate::env_vars::ENV_VARS;
use crate::error::ConfigError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub docker: DockerConfig,
    #[serde(default)]
    pub build: BuildConfig,
    #[serde(default)]
    pub github: GitHubConfig,
    #[serde(default)]
    pub publish: PublishConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DockerConfig {
    /// Daemon address: unix:///path, tcp://host:port or http://host:port
    #[serde(default = "default_docker_host")]
    pub host: String,
}

fn default_docker_host() -> String {
    "unix:///var/run/docker.sock".to_string()
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            host: default_docker_host(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub id: String,
    /// Optional cloudbuild.yaml used for step names and the expected step count
    #[serde(default)]
    pub manifest: Option<String>,
    /// Base of the Cloud Build console link
    #[serde(default = "default_console_url")]
    pub console_url: String,
}

fn default_console_url() -> String {
    "https://console.cloud.google.com/cloud-build/builds".to_string()
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            id: String::new(),
            manifest: None,
            console_url: default_console_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    #[serde(default = "default_github_api")]
    pub api: String,
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub repo: String,
    #[serde(default)]
    pub commit_sha: String,
    #[serde(default = "default_status_context")]
    pub context: String,
}

fn default_github_api() -> String {
    "https://api.github.com".to_string()
}

fn default_status_context() -> String {
    "gcb".to_string()
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api: default_github_api(),
            token: String::new(),
            user: String::new(),
            repo: String::new(),
            commit_sha: String::new(),
            context: default_status_context(),
        }
    }
}

/// Publish timing and limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishConfig {
    /// Quiet period after a step change before publishing (default: 20ms)
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Interval between refreshes while nothing changes (default: 10s)
    #[serde(default = "default_refresh_secs")]
    pub refresh_secs: u64,
    /// Maximum description length accepted by GitHub (default: 140)
    #[serde(default = "default_max_description")]
    pub max_description: usize,
}

fn default_debounce_ms() -> u64 {
    20
}

fn default_refresh_secs() -> u64 {
    10
}

fn default_max_description() -> usize {
    140
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            refresh_secs: default_refresh_secs(),
            max_description: default_max_description(),
        }
    }
}

impl PublishConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn refresh(&self) -> Duration {
        Duration::from_secs(self.refresh_secs)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Write logs to this file instead of stderr
    #[serde(default)]
    pub file: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

impl Config {
    /// Load configuration from defaults, an optional file and the process
    /// environment.
    pub fn load(config_path: Option<&str>) -> Result<Self, ConfigError> {
        Self::load_with(config_path, |name| std::env::var(name).ok())
    }

    /// Load configuration reading environment variables through `lookup`.
    ///
    /// Empty variables count as unset so the defaults still apply.
    pub fn load_with<F>(config_path: Option<&str>, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Start with embedded defaults so the relay works without config files
        let defaults = Config::default();
        let defaults_json = serde_json::to_string(&defaults)
            .map_err(|e| config::ConfigError::Foreign(Box::new(e)))?;

        let mut builder = config::Config::builder().add_source(config::File::from_str(
            &defaults_json,
            config::FileFormat::Json,
        ));

        // Explicit config file (CLI override)
        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path));
        }

        // Build environment variables win over everything else
        for var in ENV_VARS {
            let value = lookup(var.name).filter(|v| !v.is_empty());
            builder = builder.set_override_option(var.key, value)?;
        }

        let config = builder.build()?;
        Ok(config.try_deserialize()?)
    }

    /// Check that everything needed to publish statuses is present.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            (
                &self.github.token,
                "GITHUB_TOKEN",
                r#"("user:token", ":token" or "token") "#,
            ),
            (
                &self.github.user,
                "GITHUB_USER",
                r#"(the "user" in "github.com/user/repo") "#,
            ),
            (
                &self.github.repo,
                "GITHUB_REPO",
                r#"(the "repo" in "github.com/user/repo") "#,
            ),
            (&self.github.commit_sha, "COMMIT_SHA", ""),
        ];
        for (value, var, hint) in required {
            if value.is_empty() {
                return Err(ConfigError::Missing { var, hint });
            }
        }

        self.github_api_url()?;
        self.console_url()?;
        Ok(())
    }

    pub fn github_api_url(&self) -> Result<Url, ConfigError> {
        parse_url("github.api", &self.github.api)
    }

    pub fn console_url(&self) -> Result<Url, ConfigError> {
        parse_url("build.console_url", &self.build.console_url)
    }

    /// Path to the build manifest, if one was configured
    pub fn manifest_path(&self) -> Option<PathBuf> {
        self.build
            .manifest
            .as_deref()
            .filter(|m| !m.is_empty())
            .map(PathBuf::from)
    }
}

fn parse_url(key: &'static str, value: &str) -> Result<Url, ConfigError> {
    Url::parse(value).map_err(|source| ConfigError::InvalidUrl {
        key,
        value: value.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    fn full_env() -> Vec<(&'static str, &'static str)> {
        vec![
            ("PROJECT_ID", "gcb-project"),
            ("BUILD_ID", "build-123"),
            ("COMMIT_SHA", "abc123"),
            ("GITHUB_TOKEN", "user:token"),
            ("GITHUB_USER", "unravelin"),
            ("GITHUB_REPO", "gcb2gh-test"),
        ]
    }

    #[test]
    fn test_defaults_without_environment() {
        let config = Config::load_with(None, env(&[])).unwrap();
        assert_eq!(config.docker.host, "unix:///var/run/docker.sock");
        assert_eq!(config.github.api, "https://api.github.com");
        assert_eq!(config.github.context, "gcb");
        assert_eq!(config.publish.debounce(), Duration::from_millis(20));
        assert_eq!(config.publish.refresh(), Duration::from_secs(10));
        assert_eq!(config.publish.max_description, 140);
        assert!(config.manifest_path().is_none());
    }

    #[test]
    fn test_environment_overrides() {
        let mut vars = full_env();
        vars.push(("STATUS_CONTEXT", "gcb-test"));
        vars.push(("DOCKER_HOST", "tcp://127.0.0.1:2375"));
        vars.push(("BUILD_MANIFEST", "/workspace/cloudbuild.yaml"));
        let config = Config::load_with(None, env(&vars)).unwrap();

        assert_eq!(config.build.project_id, "gcb-project");
        assert_eq!(config.build.id, "build-123");
        assert_eq!(config.github.commit_sha, "abc123");
        assert_eq!(config.github.context, "gcb-test");
        assert_eq!(config.docker.host, "tcp://127.0.0.1:2375");
        assert_eq!(
            config.manifest_path(),
            Some(PathBuf::from("/workspace/cloudbuild.yaml"))
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_variables_keep_defaults() {
        let config =
            Config::load_with(None, env(&[("STATUS_CONTEXT", ""), ("DOCKER_HOST", "")])).unwrap();
        assert_eq!(config.github.context, "gcb");
        assert_eq!(config.docker.host, "unix:///var/run/docker.sock");
    }

    #[test]
    fn test_numeric_looking_values_stay_strings() {
        let mut vars = full_env();
        vars.retain(|(k, _)| *k != "COMMIT_SHA");
        vars.push(("COMMIT_SHA", "1234567"));
        let config = Config::load_with(None, env(&vars)).unwrap();
        assert_eq!(config.github.commit_sha, "1234567");
    }

    #[test]
    fn test_validate_reports_first_missing() {
        let config = Config::load_with(None, env(&[])).unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Missing {
                var: "GITHUB_TOKEN",
                ..
            }
        ));

        let mut vars = full_env();
        vars.retain(|(k, _)| *k != "GITHUB_REPO");
        let config = Config::load_with(None, env(&vars)).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("GITHUB_REPO"));
    }

    #[test]
    fn test_validate_rejects_bad_api_url() {
        let mut vars = full_env();
        vars.push(("GITHUB_API", "not a url"));
        let config = Config::load_with(None, env(&vars)).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidUrl {
                key: "github.api",
                ..
            })
        ));
    }

    #[test]
    fn test_config_file_layer() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[publish]\ndebounce_ms = 50\nrefresh_secs = 30\n\n[github]\ncontext = \"from-file\""
        )
        .unwrap();
        let path = file.path().to_string_lossy().to_string();

        let config = Config::load_with(Some(&path), env(&[])).unwrap();
        assert_eq!(config.publish.debounce(), Duration::from_millis(50));
        assert_eq!(config.publish.refresh(), Duration::from_secs(30));
        assert_eq!(config.github.context, "from-file");

        // Environment still wins over the file
        let config = Config::load_with(Some(&path), env(&[("STATUS_CONTEXT", "env")])).unwrap();
        assert_eq!(config.github.context, "env");
    }
}
