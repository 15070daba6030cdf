//! ---
//! hm_section: "06-control-tooling"
//! hm_subsection: "binary"
//! hm_type: "source"
//! hm_scope: "code"
//! hm_description: "Configuration resolution and inspection commands."
//! hm_version: "v0.0.0-prealpha"
//! hm_owner: "tbd"
//! ---
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use hostmetrics_common::config::HostMetricsConfig;

/// Files inspected, in order, when neither `--config` nor `HOSTMETRICS_CONFIG` is given.
pub const DEFAULT_CANDIDATES: [&str; 2] = ["hostmetrics.toml", "config/hostmetrics.toml"];

/// Dispatch entry point for configuration subcommands.
pub fn run(command: ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Show(cmd) => cmd.execute(),
    }
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the effective configuration as TOML.
    #[command(name = "show")]
    Show(ShowCommand),
}

#[derive(Debug, Args)]
pub struct ShowCommand {
    /// Configuration file to read instead of the default search.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

impl ShowCommand {
    fn execute(self) -> Result<()> {
        let (config, source) = resolve(self.config.as_deref())?;
        match source {
            Some(path) => println!("# source: {}", path.display()),
            None => println!("# source: built-in defaults"),
        }
        print!("{}", config.to_toml()?);
        Ok(())
    }
}

/// Resolve the effective configuration and where it came from.
///
/// An explicit path wins, then `HOSTMETRICS_CONFIG`, then the first existing
/// default candidate. With none of those the built-in defaults apply.
pub fn resolve(explicit: Option<&Path>) -> Result<(HostMetricsConfig, Option<PathBuf>)> {
    if let Some(path) = explicit {
        let config = HostMetricsConfig::from_file(path)
            .with_context(|| format!("loading --config {}", path.display()))?;
        return Ok((config, Some(path.to_path_buf())));
    }
    let env_set = std::env::var(HostMetricsConfig::ENV_CONFIG_PATH)
        .map(|value| !value.trim().is_empty())
        .unwrap_or(false);
    let candidate_exists = DEFAULT_CANDIDATES
        .iter()
        .any(|candidate| Path::new(candidate).exists());
    if env_set || candidate_exists {
        let loaded = HostMetricsConfig::load_with_source(&DEFAULT_CANDIDATES)?;
        return Ok((loaded.config, Some(loaded.source)));
    }
    Ok((HostMetricsConfig::default(), None))
}
