//! Configuration management

use super::template::TemplateEngine;
use crate::compiler::{BatchCompiler, DEFAULT_SPLIT_MARKER, Platform, check_split_marker};
use crate::jobs::{Environment, JobError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Application configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Target platform name (`win32`, `linux`, ...), the host if unset
    pub platform: Option<String>,
    /// Add the process environment to the variable context
    pub add_environ: bool,
    /// Engine rendering documents before parsing
    pub template_engine: TemplateEngine,
    /// Prefix of every job name
    pub job_prefix: String,
    /// Marker splitting a job into several scripts
    pub split_marker: String,
    /// Log level
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            platform: None,
            add_environ: true,
            template_engine: TemplateEngine::default(),
            job_prefix: String::new(),
            split_marker: DEFAULT_SPLIT_MARKER.to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Parses a configuration from YAML text
    ///
    /// # Errors
    ///
    /// Returns [`JobError::Yaml`] for invalid YAML or unknown keys, and
    /// [`JobError::Config`] for an empty or whitespace-padded split marker.
    pub fn from_yaml_str(text: &str) -> Result<Self, JobError> {
        let config: Self = serde_yaml::from_str(text)?;
        check_split_marker(&config.split_marker)?;
        Ok(config)
    }

    /// Reads a configuration file
    ///
    /// # Errors
    ///
    /// Returns [`JobError::Io`] if the file cannot be read and
    /// [`JobError::Yaml`] if it cannot be parsed.
    pub fn from_yaml_file(path: &Path) -> Result<Self, JobError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    /// Target platform
    #[must_use]
    pub fn platform(&self) -> Platform {
        self.platform
            .as_deref()
            .map_or_else(Platform::host, Platform::from_name)
    }

    /// Script compiler for the configured platform and marker
    #[must_use]
    pub fn compiler(&self) -> BatchCompiler {
        BatchCompiler::new(self.platform()).with_split_marker(self.split_marker.clone())
    }

    /// Snapshot of the process environment if `add_environ` is set
    #[must_use]
    pub fn environment(&self) -> Option<Environment> {
        self.add_environ.then(Environment::capture)
    }
}
