//! ---
//! hm_section: "01-core-instrumentation"
//! hm_subsection: "module"
//! hm_type: "source"
//! hm_scope: "code"
//! hm_description: "Timing and lifecycle instrumentation core."
//! hm_version: "v0.0.0-prealpha"
//! hm_owner: "tbd"
//! ---
//! Timing and lifecycle instrumentation for request-processing hosts.
//!
//! A host hands every pipeline stage, request handler and configuration step
//! to a [`MetricsHandler`] before installing it. The handler returns the unit
//! wrapped in a [`TimingDecorator`] (at most once per chain) that reports
//! starting/ready and enter/exit events to the installed listener. Host
//! lifecycle transitions are routed to the same listener.

pub mod decorator;
pub mod dispatcher;
pub mod events;
pub mod failure;
pub mod handler;
pub mod host;
pub mod listener;
pub mod router;
pub mod trace_listener;
pub mod unit;

pub use decorator::TimingDecorator;
pub use dispatcher::{walk_chain, ChainWalk, WrapDecision, WrapDispatcher, MAX_CHAIN_DEPTH};
pub use events::{AppMetricsListener, Event, EventKind, MetricsListener, UnitRef};
pub use failure::{Failure, UnitError, UnitResult};
pub use handler::MetricsHandler;
pub use host::{
    ApplicationContext, Chain, ConnectorTarget, ContextTarget, LifecycleListener,
    LifecycleSubject, Request, RequestHooks, Response, RuntimeContext, WrapHooks,
};
pub use listener::{EventSink, Listener};
pub use router::LifecycleRouter;
pub use trace_listener::TracingListener;
pub use unit::{
    ConfigPhase, ConfigStep, ConfigStepKind, HandlerKind, Layer, PipelineStage, RequestHandler,
    StageKind, UnitCategory, UnitId, UnitKind,
};
