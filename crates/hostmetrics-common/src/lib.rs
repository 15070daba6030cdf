//! ---
//! hm_section: "05-configuration-logging"
//! hm_subsection: "module"
//! hm_type: "source"
//! hm_scope: "code"
//! hm_description: "Shared primitives and utilities for the instrumentation layer."
//! hm_version: "v0.0.0-prealpha"
//! hm_owner: "tbd"
//! ---
//! Shared primitives for the hostmetrics workspace.
//! This crate exposes configuration loading, tracing initialisation, and
//! monotonic time helpers consumed by the instrumentation core and tooling.

pub mod config;
pub mod logging;
pub mod time;

pub use config::{
    HostMetricsConfig, InstrumentationConfig, ListenerPanicPolicy, LoadedConfig, LoggingConfig,
    DEFAULT_REQUEST_ID_ATTRIBUTE,
};
pub use logging::{init_tracing, LogFormat};
