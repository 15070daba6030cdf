//! ---
//! hm_section: "11-simulation"
//! hm_subsection: "01-bootstrap"
//! hm_type: "source"
//! hm_scope: "code"
//! hm_description: "Test harness shared exports."
//! hm_version: "v0.1.0"
//! hm_owner: "tbd"
//! ---
//! Simulated host, capture listeners and sample units used by the
//! integration suites and by `hostmetricsctl simulate`.

pub mod capture;
pub mod host;
pub mod summary;
pub mod units;

pub use capture::{AppCaptureListener, CaptureListener};
pub use host::{Connector, Deployment, Exchange, HostError, SimulatedContext, SimulatedHost, Startup};
pub use summary::{EventSummary, KindSummary};
