//! Registry of the environment variables gcb-relay reads.
//!
//! Cloud Build injects these into the step that runs the relay, so the names
//! follow the build environment rather than a common prefix. Each entry maps
//! to a dotted key in [`crate::config::Config`]; `Config::load` applies every
//! non-empty variable as an override on top of defaults and the config file.

/// An environment variable definition
#[derive(Debug, Clone)]
pub struct EnvVar {
    /// Environment variable name (e.g., "GITHUB_TOKEN")
    pub name: &'static str,
    /// Dotted configuration key the value is written to
    pub key: &'static str,
    /// Human-readable description
    pub description: &'static str,
    /// Category for grouping in `--help` output and docs
    pub category: EnvVarCategory,
    /// Whether this variable is required for operation
    pub required: bool,
    /// Default value if not set
    pub default: Option<&'static str>,
}

/// Categories for organizing environment variables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnvVarCategory {
    /// Docker daemon connection
    Docker,
    /// Cloud Build identifiers
    Build,
    /// GitHub commit status target and credentials
    GitHub,
}

impl EnvVarCategory {
    /// Display name for this category
    pub fn display_name(&self) -> &'static str {
        match self {
            EnvVarCategory::Docker => "Docker",
            EnvVarCategory::Build => "Cloud Build",
            EnvVarCategory::GitHub => "GitHub",
        }
    }
}

/// Static registry of all recognised environment variables
pub static ENV_VARS: &[EnvVar] = &[
    // === Docker ===
    EnvVar {
        name: "DOCKER_HOST",
        key: "docker.host",
        description: "Docker daemon address (unix:///path, tcp://host:port or http://host:port)",
        category: EnvVarCategory::Docker,
        required: false,
        default: Some("unix:///var/run/docker.sock"),
    },
    // === Build ===
    EnvVar {
        name: "PROJECT_ID",
        key: "build.project_id",
        description: "Google Cloud project the build runs in, used for the status link",
        category: EnvVarCategory::Build,
        required: false,
        default: None,
    },
    EnvVar {
        name: "BUILD_ID",
        key: "build.id",
        description: "Cloud Build ID, used for the status link",
        category: EnvVarCategory::Build,
        required: false,
        default: None,
    },
    EnvVar {
        name: "BUILD_MANIFEST",
        key: "build.manifest",
        description: "Path to the cloudbuild.yaml used to name steps and count them",
        category: EnvVarCategory::Build,
        required: false,
        default: None,
    },
    // === GitHub ===
    EnvVar {
        name: "GITHUB_API",
        key: "github.api",
        description: "GitHub API base URL",
        category: EnvVarCategory::GitHub,
        required: false,
        default: Some("https://api.github.com"),
    },
    EnvVar {
        name: "GITHUB_TOKEN",
        key: "github.token",
        description: "GitHub credentials as \"user:token\", \":token\" or \"token\"",
        category: EnvVarCategory::GitHub,
        required: true,
        default: None,
    },
    EnvVar {
        name: "GITHUB_USER",
        key: "github.user",
        description: "The \"user\" in github.com/user/repo",
        category: EnvVarCategory::GitHub,
        required: true,
        default: None,
    },
    EnvVar {
        name: "GITHUB_REPO",
        key: "github.repo",
        description: "The \"repo\" in github.com/user/repo",
        category: EnvVarCategory::GitHub,
        required: true,
        default: None,
    },
    EnvVar {
        name: "COMMIT_SHA",
        key: "github.commit_sha",
        description: "Commit the status is attached to",
        category: EnvVarCategory::GitHub,
        required: true,
        default: None,
    },
    EnvVar {
        name: "STATUS_CONTEXT",
        key: "github.context",
        description: "Status check name shown on the commit",
        category: EnvVarCategory::GitHub,
        required: false,
        default: Some("gcb"),
    },
];

/// Look up a variable definition by its environment name
pub fn find(name: &str) -> Option<&'static EnvVar> {
    ENV_VARS.iter().find(|v| v.name == name)
}

/// Registry entries whose config key matches `key`
pub fn for_key(key: &str) -> Option<&'static EnvVar> {
    ENV_VARS.iter().find(|v| v.key == key)
}

/// Render the registry as help text, grouped by category
pub fn help_text() -> String {
    let mut out = String::from("Environment variables:\n");
    let mut last = None;
    for var in ENV_VARS {
        if last != Some(var.category) {
            out.push_str(&format!("\n  {}:\n", var.category.display_name()));
            last = Some(var.category);
        }
        let suffix = match (var.required, var.default) {
            (true, _) => " (required)".to_string(),
            (false, Some(d)) => format!(" (default: {d})"),
            (false, None) => String::new(),
        };
        out.push_str(&format!("    {:<16}{}{}\n", var.name, var.description, suffix));
    }
    out
}
