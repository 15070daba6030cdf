//! ---
//! hm_section: "15-testing-qa-runbook"
//! hm_subsection: "integration-tests"
//! hm_type: "source"
//! hm_scope: "code"
//! hm_description: "Shared setup for the integration suites."
//! hm_version: "v0.0.0-prealpha"
//! hm_owner: "tbd"
//! ---
#![allow(dead_code)]

use std::sync::Arc;

use hostmetrics_common::config::InstrumentationConfig;
use hostmetrics_core::{Listener, MetricsHandler};
use hostmetrics_testharness::SimulatedHost;

pub const NETWORK: &str = "http";
pub const LOCAL: &str = "local";

/// Attach a fresh metrics handler to every connector and to the context.
pub fn instrument(host: &mut SimulatedHost, listener: Listener) -> Arc<MetricsHandler> {
    instrument_with(host, listener, InstrumentationConfig::default())
}

pub fn instrument_with(
    host: &mut SimulatedHost,
    listener: Listener,
    config: InstrumentationConfig,
) -> Arc<MetricsHandler> {
    let metrics = Arc::new(MetricsHandler::new(listener, config));
    metrics.attach_to_connectors(host.connectors_mut());
    metrics.attach_to_context(host.context_mut());
    metrics
}

pub fn runtime_host() -> SimulatedHost {
    let mut host = SimulatedHost::runtime("/shop");
    host.add_connector(NETWORK, true).add_connector(LOCAL, false);
    host
}

pub fn application_host() -> SimulatedHost {
    let mut host = SimulatedHost::application("shop", "/shop");
    host.add_connector(NETWORK, true).add_connector(LOCAL, false);
    host
}
