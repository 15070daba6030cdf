//! ---
//! hm_section: "06-control-tooling"
//! hm_subsection: "binary"
//! hm_type: "source"
//! hm_scope: "code"
//! hm_description: "Control CLI for operators exercising hostmetrics instrumentation."
//! hm_version: "v0.0.0-prealpha"
//! hm_owner: "tbd"
//! ---
use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};

mod config;
mod simulate;

#[derive(Debug, Parser)]
#[command(
    author,
    disable_version_flag = true,
    about = "hostmetrics instrumentation control utility",
    long_about = None
)]
struct Cli {
    #[arg(
        short = 'V',
        long = "version",
        action = ArgAction::SetTrue,
        help = "Print version information and exit"
    )]
    version: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run a simulated host with instrumentation attached and report the events.
    Simulate(simulate::SimulateCommand),
    #[command(subcommand, about = "Configuration inspection")]
    Config(config::ConfigCommand),
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    if cli.version {
        println!("hostmetricsctl {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }
    match cli.command {
        Some(Commands::Simulate(cmd)) => simulate::run(cmd)?,
        Some(Commands::Config(cmd)) => {
            hostmetrics_logging::init();
            config::run(cmd)?
        }
        None => {
            eprintln!("no command given; see --help");
        }
    }
    Ok(())
}
