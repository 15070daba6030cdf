//! ---
//! hm_section: "05-configuration-logging"
//! hm_subsection: "module"
//! hm_type: "source"
//! hm_scope: "code"
//! hm_description: "Shared primitives and utilities for the instrumentation layer."
//! hm_version: "v0.0.0-prealpha"
//! hm_owner: "tbd"
//! ---
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::logging::LogFormat;

/// Request attribute under which the correlation id is stored unless overridden.
pub const DEFAULT_REQUEST_ID_ATTRIBUTE: &str = "hostmetrics.request_id";

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

fn default_request_id_attribute() -> String {
    DEFAULT_REQUEST_ID_ATTRIBUTE.to_owned()
}

fn default_enabled() -> bool {
    true
}

/// Primary configuration object for hostmetrics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostMetricsConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub instrumentation: InstrumentationConfig,
}

/// Metadata describing where a [`HostMetricsConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: HostMetricsConfig,
    pub source: PathBuf,
}

impl HostMetricsConfig {
    pub const ENV_CONFIG_PATH: &'static str = "HOSTMETRICS_CONFIG";

    /// Load configuration from disk, respecting the `HOSTMETRICS_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration from disk together with the effective source path.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_file(&path)?;
                return Ok(LoadedConfig {
                    config,
                    source: path,
                });
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                let path = candidate.as_ref().to_path_buf();
                let config = Self::from_file(&path)?;
                return Ok(LoadedConfig {
                    config,
                    source: path,
                });
            }
        }

        Err(anyhow!(
            "no configuration files found. inspected: {}",
            candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }

    /// Load and validate a single configuration file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        let config = toml::from_str::<HostMetricsConfig>(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        self.instrumentation.validate()
    }

    /// Render the configuration back into TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).with_context(|| "failed to serialise configuration to TOML")
    }
}

impl std::str::FromStr for HostMetricsConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: HostMetricsConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_prefix: None,
        }
    }
}

/// What happens when a listener callback panics.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ListenerPanicPolicy {
    /// The panic unwinds through the instrumented call like any other panic.
    /// A panic from an enter or starting callback still closes the pair with an
    /// `Interrupted` failure, even though the delegate never ran.
    #[default]
    Propagate,
    /// The panic is caught at the listener boundary and logged.
    Isolate,
}

/// Controls which unit kinds are decorated and how the decorators behave.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstrumentationConfig {
    #[serde(default = "default_request_id_attribute")]
    pub request_id_attribute: String,
    #[serde(default = "default_enabled")]
    pub stages: bool,
    #[serde(default = "default_enabled")]
    pub handlers: bool,
    #[serde(default = "default_enabled")]
    pub config_steps: bool,
    #[serde(default)]
    pub listener_panics: ListenerPanicPolicy,
    #[serde(default = "default_enabled")]
    pub log_wraps: bool,
}

impl InstrumentationConfig {
    pub fn validate(&self) -> Result<()> {
        if self.request_id_attribute.is_empty() {
            return Err(anyhow!("instrumentation.request_id_attribute must not be empty"));
        }
        if self.request_id_attribute.chars().any(char::is_whitespace) {
            return Err(anyhow!(
                "instrumentation.request_id_attribute '{}' must not contain whitespace",
                self.request_id_attribute
            ));
        }
        Ok(())
    }
}

impl Default for InstrumentationConfig {
    fn default() -> Self {
        Self {
            request_id_attribute: default_request_id_attribute(),
            stages: true,
            handlers: true,
            config_steps: true,
            listener_panics: ListenerPanicPolicy::default(),
            log_wraps: true,
        }
    }
}
