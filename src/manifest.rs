//! Step names from the Cloud Build manifest.
//!
//! The manifest is optional. When it is present its `steps[].id` values give
//! steps readable names and its length is the only hint of how many steps the
//! build will run. Any problem reading it degrades to an empty registry.

use serde::Deserialize;
use std::path::Path;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
struct Manifest {
    #[serde(default)]
    steps: Vec<ManifestStep>,
}

#[derive(Debug, Deserialize)]
struct ManifestStep {
    #[serde(default)]
    id: Option<String>,
}

/// Immutable mapping from zero-based step index to its declared id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepRegistry {
    /// One entry per declared step; `None` where the step has no id
    ids: Vec<Option<String>>,
}

impl StepRegistry {
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = Option<S>>,
        S: Into<String>,
    {
        Self {
            ids: ids
                .into_iter()
                .map(|id| id.map(Into::into).filter(|id: &String| !id.is_empty()))
                .collect(),
        }
    }

    /// Read the manifest at `path`, logging and returning an empty registry on
    /// any failure.
    pub fn load(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Opening build manifest");
                return Self::default();
            }
        };

        match Self::parse(&contents) {
            Ok(registry) => {
                debug!(path = %path.display(), steps = registry.len(), "Read build manifest");
                registry
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Reading build manifest");
                Self::default()
            }
        }
    }

    /// Parse manifest YAML.
    pub fn parse(contents: &str) -> Result<Self, serde_yaml::Error> {
        let manifest: Manifest = serde_yaml::from_str(contents)?;
        Ok(Self::new(manifest.steps.into_iter().map(|s| s.id)))
    }

    /// Declared id for step `num`, if the manifest names it.
    pub fn lookup(&self, num: u32) -> Option<&str> {
        self.ids.get(num as usize)?.as_deref()
    }

    /// Number of declared steps; zero when unknown.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
