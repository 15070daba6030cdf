//! ---
//! hm_section: "05-configuration-logging"
//! hm_subsection: "module"
//! hm_type: "source"
//! hm_scope: "code"
//! hm_description: "Instrumentation-aware logging context, macros and system events."
//! hm_version: "v0.0.0-prealpha"
//! hm_owner: "tbd"
//! ---
//! Logging helpers shared by the instrumentation crates.
//!
//! Every record emitted through [`hm_info!`] and friends carries the same
//! four fields (`context`, `unit`, `request_id`, `phase`) so log output can be
//! joined with captured events. Empty fields are written as `""`.
#![warn(missing_docs)]

use tracing_subscriber::{fmt as subscriber_fmt, prelude::*, EnvFilter, Registry};

pub mod macros;

#[doc(hidden)]
pub use tracing;

const DEV_DEFAULT_DIRECTIVE: &str = "info";

/// Install a stderr subscriber for development and tests.
///
/// `RUST_LOG` wins when set; otherwise `info`. Safe to call repeatedly.
pub fn init() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEV_DEFAULT_DIRECTIVE));
    let _ = Registry::default()
        .with(filter)
        .with(subscriber_fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

/// Fields attached to a log record by the `hm_*` macros.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LogContext<'a> {
    /// Context path (`/shop`) or `/` for the root context.
    pub context: Option<&'a str>,
    /// Name of the stage, handler or config step.
    pub unit: Option<&'a str>,
    /// Correlation id, when the request carries one.
    pub request_id: Option<&'a str>,
    /// `pre`, `main` or `post` for config-step records.
    pub phase: Option<&'a str>,
}

impl<'a> LogContext<'a> {
    /// A context with no fields set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the context path.
    pub fn with_context(self, context: &'a str) -> Self {
        Self {
            context: Some(context),
            ..self
        }
    }

    /// Set the unit name.
    pub fn with_unit(self, unit: &'a str) -> Self {
        Self {
            unit: Some(unit),
            ..self
        }
    }

    /// Takes an `Option` because local requests have no correlation id.
    pub fn with_request_id(self, request_id: Option<&'a str>) -> Self {
        Self { request_id, ..self }
    }

    /// Set the config phase label.
    pub fn with_phase(self, phase: &'a str) -> Self {
        Self {
            phase: Some(phase),
            ..self
        }
    }
}

/// Outcome of an attachment, a run or another coarse operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemEventOutcome {
    /// Logged at `info`.
    Success,
    /// Logged at `error`.
    Fault,
}

impl SystemEventOutcome {
    /// `Fault` when any of the counted operations failed.
    pub fn from_fault_count(faults: u64) -> Self {
        if faults == 0 {
            SystemEventOutcome::Success
        } else {
            SystemEventOutcome::Fault
        }
    }

    /// Lowercase label written to the `outcome` field.
    pub fn as_str(&self) -> &'static str {
        match self {
            SystemEventOutcome::Success => "success",
            SystemEventOutcome::Fault => "fault",
        }
    }
}

macro_rules! system_event {
    ($level:expr, $ctx:expr, $event:expr, $outcome:expr, $message:expr) => {
        tracing::event!(
            $level,
            event = $event,
            outcome = $outcome.as_str(),
            context = $ctx.context.unwrap_or(""),
            unit = $ctx.unit.unwrap_or(""),
            request_id = $ctx.request_id.unwrap_or(""),
            phase = $ctx.phase.unwrap_or(""),
            message = %$message
        )
    };
}

/// Emit a named system event (`hostmetrics.attach.connectors`, ...).
pub fn log_system_event(
    context: Option<&LogContext>,
    event: &str,
    message: &str,
    outcome: SystemEventOutcome,
) {
    let ctx = context.copied().unwrap_or_default();
    match outcome {
        SystemEventOutcome::Success => {
            system_event!(tracing::Level::INFO, ctx, event, outcome, message)
        }
        SystemEventOutcome::Fault => {
            system_event!(tracing::Level::ERROR, ctx, event, outcome, message)
        }
    }
}
