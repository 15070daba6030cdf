//! ---
//! hm_section: "06-control-tooling"
//! hm_subsection: "binary"
//! hm_type: "source"
//! hm_scope: "code"
//! hm_description: "Simulated host run with instrumentation attached."
//! hm_version: "v0.0.0-prealpha"
//! hm_owner: "tbd"
//! ---
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ArgAction, Args, ValueEnum};
use hostmetrics_common::init_tracing;
use hostmetrics_core::{Event, Listener, MetricsHandler, TracingListener};
use hostmetrics_logging::{log_system_event, SystemEventOutcome};
use hostmetrics_testharness::units::{FlakyHandler, HelloHandler, NamedConfigStep, TagStage};
use hostmetrics_testharness::{AppCaptureListener, CaptureListener, EventSummary, SimulatedHost, Startup};
use serde_json::json;

use crate::config::resolve;

const NETWORK_CONNECTOR: &str = "http";
const LOCAL_CONNECTOR: &str = "local";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ListenerArg {
    /// Queue events in memory and print them after the run.
    Capture,
    /// Log events through tracing as they happen.
    Trace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputArg {
    Text,
    Json,
}

#[derive(Debug, Args)]
pub struct SimulateCommand {
    /// Configuration file to read instead of the default search.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Number of requests pushed through the network connector.
    #[arg(long, default_value_t = 5)]
    requests: u64,

    /// Deploy as an application (adds config steps and application events).
    #[arg(long, action = ArgAction::SetTrue)]
    application: bool,

    /// Make every K-th request fail; 0 disables failures.
    #[arg(long = "fail-every", value_name = "K", default_value_t = 0)]
    fail_every: u64,

    /// Listener installed in the metrics handler.
    #[arg(long, value_enum, default_value_t = ListenerArg::Capture)]
    listener: ListenerArg,

    /// Report format for captured events.
    #[arg(long, value_enum, default_value_t = OutputArg::Text)]
    output: OutputArg,

    /// Write logs through the configured rolling file appender.
    #[arg(long = "log-to-file", action = ArgAction::SetTrue)]
    log_to_file: bool,
}

enum Capture {
    Base(Arc<CaptureListener>),
    Extended(Arc<AppCaptureListener>),
    None,
}

impl Capture {
    fn events(&self) -> Vec<Event> {
        match self {
            Capture::Base(listener) => listener.events(),
            Capture::Extended(listener) => listener.events(),
            Capture::None => Vec::new(),
        }
    }
}

pub fn run(cmd: SimulateCommand) -> Result<()> {
    let (config, source) = resolve(cmd.config.as_deref())?;
    if cmd.log_to_file {
        let log_file =
            init_tracing("hostmetricsctl", &config.logging).context("initialising file logging")?;
        tracing::debug!(log_file = %log_file.display(), "rolling file logging enabled");
    } else {
        hostmetrics_logging::init();
    }
    if let Some(path) = &source {
        tracing::info!(config = %path.display(), "configuration loaded");
    }

    let attribute = config.instrumentation.request_id_attribute.clone();
    let (listener, capture) = match (cmd.listener, cmd.application) {
        (ListenerArg::Capture, true) => {
            let capture = Arc::new(AppCaptureListener::with_request_id_attribute(&attribute));
            (Listener::extended(capture.clone()), Capture::Extended(capture))
        }
        (ListenerArg::Capture, false) => {
            let capture = Arc::new(CaptureListener::with_request_id_attribute(&attribute));
            (Listener::base(capture.clone()), Capture::Base(capture))
        }
        (ListenerArg::Trace, _) => (
            Listener::extended(Arc::new(TracingListener::new(&attribute))),
            Capture::None,
        ),
    };
    let metrics = Arc::new(MetricsHandler::new(listener, config.instrumentation.clone()));

    let mut host = if cmd.application {
        SimulatedHost::application("demo", "/demo")
    } else {
        SimulatedHost::runtime("/demo")
    };
    host.add_connector(NETWORK_CONNECTOR, true)
        .add_connector(LOCAL_CONNECTOR, false);
    let context = host.context_mut();
    context
        .add_stage(Arc::new(TagStage))
        .add_handler("/hello", Arc::new(HelloHandler), Startup::Eager)
        .add_handler("/work", Arc::new(FlakyHandler::new(cmd.fail_every)), Startup::Lazy);
    if cmd.application {
        context
            .add_config_step(Arc::new(NamedConfigStep::new("schema")))
            .add_config_step(Arc::new(NamedConfigStep::new("routes")));
    }

    metrics.attach_to_connectors(host.connectors_mut());
    metrics.attach_to_context(host.context_mut());

    host.start().context("starting simulated host")?;
    let mut failed = 0u64;
    for _ in 0..cmd.requests {
        let exchange = host.dispatch(NETWORK_CONNECTOR, "/work")?;
        if exchange.result.is_err() {
            failed += 1;
        }
    }
    // Local traffic is not correlated.
    host.dispatch(LOCAL_CONNECTOR, "/hello")?;
    host.stop();

    log_system_event(
        None,
        "hostmetricsctl.simulate",
        &format!("{} request(s) dispatched, {failed} failed", cmd.requests),
        SystemEventOutcome::from_fault_count(failed),
    );

    let events = capture.events();
    let summary = EventSummary::from_events(&events);
    match cmd.output {
        OutputArg::Json => {
            let report = json!({
                "requests": cmd.requests,
                "failed_requests": failed,
                "events": events,
                "summary": summary,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputArg::Text => {
            if matches!(capture, Capture::None) {
                println!("events were written to the tracing output");
            }
            for event in &events {
                println!("{event}");
            }
            if !events.is_empty() {
                println!();
                println!("{:<22} {:>6} {:>8} {:>12} {:>10}", "kind", "count", "failures", "total_us", "max_us");
                for (kind, stats) in summary.iter() {
                    println!(
                        "{:<22} {:>6} {:>8} {:>12} {:>10}",
                        kind.as_str(),
                        stats.count,
                        stats.failures,
                        stats.total.as_micros(),
                        stats.max.as_micros()
                    );
                }
            }
            println!("{} request(s), {failed} failed", cmd.requests);
        }
    }
    Ok(())
}
