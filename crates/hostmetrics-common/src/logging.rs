//! ---
//! hm_section: "05-configuration-logging"
//! hm_subsection: "module"
//! hm_type: "source"
//! hm_scope: "code"
//! hm_description: "Tracing subscriber setup with console and rolling file output."
//! hm_version: "v0.0.0-prealpha"
//! hm_owner: "tbd"
//! ---
use std::path::PathBuf;

use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Registry;

use crate::config::LoggingConfig;

/// Filter override, checked before `RUST_LOG`.
pub const LOG_ENV: &str = "HOSTMETRICS_LOG";

const FALLBACK_DIRECTIVE: &str = "debug";

/// Writer guards must outlive the subscriber or buffered lines are lost.
static GUARDS: OnceCell<(WorkerGuard, WorkerGuard)> = OnceCell::new();

/// Console output format. The file layer always writes JSON.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    #[default]
    StructuredJson,
    Pretty,
}

fn env_filter() -> EnvFilter {
    if let Ok(directive) = std::env::var(LOG_ENV) {
        return EnvFilter::try_new(&directive).unwrap_or_else(|err| {
            eprintln!("ignoring invalid {LOG_ENV}={directive:?} ({err}), using {FALLBACK_DIRECTIVE}");
            EnvFilter::new(FALLBACK_DIRECTIVE)
        });
    }
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(FALLBACK_DIRECTIVE))
}

/// File name the daily appender rolls, before its date suffix.
pub fn log_file_name(service: &str, config: &LoggingConfig) -> String {
    let prefix = config.file_prefix.as_deref().unwrap_or(service);
    format!("{prefix}-{service}.log")
}

/// Install the process-wide subscriber for `service`.
///
/// Console lines go to stderr in the configured [`LogFormat`]; a JSON copy is
/// appended to a daily rolling file under `config.directory`. The filter is
/// read from [`LOG_ENV`], then `RUST_LOG`, and defaults to `debug`.
///
/// A second call keeps the first subscriber and returns `Ok`.
pub fn init_tracing(service: &str, config: &LoggingConfig) -> Result<PathBuf> {
    std::fs::create_dir_all(&config.directory)
        .with_context(|| format!("creating log directory {}", config.directory.display()))?;
    let file_name = log_file_name(service, config);

    let (file_writer, file_guard) =
        tracing_appender::non_blocking(rolling::daily(&config.directory, &file_name));
    let (console_writer, console_guard) = tracing_appender::non_blocking(std::io::stderr());
    let _ = GUARDS.set((file_guard, console_guard));

    let console = fmt::layer()
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_writer(console_writer);
    let console = match config.format {
        LogFormat::StructuredJson => console.with_target(false).json().boxed(),
        LogFormat::Pretty => console.with_target(true).boxed(),
    };
    let file = fmt::layer()
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .json()
        .with_writer(file_writer);

    let installed = Registry::default()
        .with(env_filter())
        .with(console)
        .with(file)
        .try_init()
        .is_ok();

    tracing::info!(
        service,
        directory = %config.directory.display(),
        file = %file_name,
        format = ?config.format,
        installed,
        "tracing initialised"
    );
    Ok(config.directory.join(file_name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_name_prefers_the_configured_prefix() {
        let mut config = LoggingConfig::default();
        assert_eq!(log_file_name("hostmetricsctl", &config), "hostmetricsctl-hostmetricsctl.log");
        config.file_prefix = Some("hm".into());
        assert_eq!(log_file_name("hostmetricsctl", &config), "hm-hostmetricsctl.log");
    }

    #[test]
    fn init_creates_the_log_directory() {
        let dir = tempfile::tempdir().unwrap();
        let config = LoggingConfig {
            directory: dir.path().join("logs"),
            ..LoggingConfig::default()
        };
        let path = init_tracing("unit", &config).unwrap();
        assert!(config.directory.is_dir());
        assert!(path.starts_with(&config.directory));
    }
}
