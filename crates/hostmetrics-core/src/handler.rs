//! ---
//! hm_section: "01-core-instrumentation"
//! hm_subsection: "module"
//! hm_type: "source"
//! hm_scope: "code"
//! hm_description: "Host-facing facade bundling the dispatcher and the lifecycle router."
//! hm_version: "v0.0.0-prealpha"
//! hm_owner: "tbd"
//! ---
//! [`MetricsHandler`] is the one object a host needs to know about. It
//! implements every hook trait and offers the two registration points.

use std::sync::Arc;

use hostmetrics_common::config::InstrumentationConfig;
use hostmetrics_logging::{log_system_event, LogContext, SystemEventOutcome};

use crate::dispatcher::WrapDispatcher;
use crate::failure::Failure;
use crate::host::{
    ConnectorTarget, ContextTarget, LifecycleListener, LifecycleSubject, Request, RequestHooks,
    WrapHooks,
};
use crate::listener::{EventSink, Listener};
use crate::router::LifecycleRouter;
use crate::unit::{ConfigStep, PipelineStage, RequestHandler};

#[derive(Debug)]
pub struct MetricsHandler {
    dispatcher: WrapDispatcher,
    router: LifecycleRouter,
    sink: Arc<EventSink>,
}

impl MetricsHandler {
    /// Build a handler around `listener`. The listener is fixed for the
    /// lifetime of the handler.
    ///
    /// `config` should already have passed [`InstrumentationConfig::validate`];
    /// debug builds assert it.
    pub fn new(listener: Listener, config: InstrumentationConfig) -> Self {
        debug_assert!(
            config.validate().is_ok(),
            "invalid instrumentation config: {:?}",
            config.validate().err()
        );
        let sink = Arc::new(EventSink::new(listener, config.listener_panics));
        Self {
            dispatcher: WrapDispatcher::new(sink.clone(), config),
            router: LifecycleRouter::new(sink.clone()),
            sink,
        }
    }

    pub fn listener(&self) -> &Listener {
        self.sink.listener()
    }

    pub fn config(&self) -> &InstrumentationConfig {
        self.dispatcher.config()
    }

    pub fn dispatcher(&self) -> &WrapDispatcher {
        &self.dispatcher
    }

    /// Correlation id previously stamped on `request`, if any.
    pub fn correlation_id(&self, request: &Request) -> Option<String> {
        request.attribute(&self.config().request_id_attribute)
    }

    /// Register the request hook on every network connector; returns how many
    /// connectors accepted it.
    pub fn attach_to_connectors<'c, I>(self: &Arc<Self>, connectors: I) -> usize
    where
        I: IntoIterator<Item = &'c mut dyn ConnectorTarget>,
    {
        let mut attached = 0;
        for connector in connectors {
            if !connector.is_network() {
                tracing::debug!(connector = connector.name(), "skipping non-network connector");
                continue;
            }
            connector.add_request_hooks(Arc::clone(self) as Arc<dyn RequestHooks>);
            attached += 1;
        }
        log_system_event(
            None,
            "hostmetrics.attach.connectors",
            &format!("request hook attached to {attached} network connector(s)"),
            SystemEventOutcome::Success,
        );
        attached
    }

    /// Register as wrap-hook provider and lifecycle listener of one context.
    pub fn attach_to_context(self: &Arc<Self>, context: &mut dyn ContextTarget) {
        context.add_wrap_hooks(Arc::clone(self) as Arc<dyn WrapHooks>);
        context.add_lifecycle_listener(Arc::clone(self) as Arc<dyn LifecycleListener>);
        let shape = if self.sink.is_extended() { "extended" } else { "base" };
        log_system_event(
            Some(&LogContext::new().with_unit("MetricsHandler")),
            "hostmetrics.attach.context",
            &format!("wrap hooks and lifecycle listener registered ({shape} listener)"),
            SystemEventOutcome::Success,
        );
    }
}

impl WrapHooks for MetricsHandler {
    fn wrap_stage(&self, stage: Arc<dyn PipelineStage>) -> Arc<dyn PipelineStage> {
        self.dispatcher.wrap_stage(stage)
    }

    fn wrap_handler(&self, handler: Arc<dyn RequestHandler>) -> Arc<dyn RequestHandler> {
        self.dispatcher.wrap_handler(handler)
    }

    fn wrap_config_step(&self, step: Arc<dyn ConfigStep>) -> Arc<dyn ConfigStep> {
        self.dispatcher.wrap_config_step(step)
    }
}

impl RequestHooks for MetricsHandler {
    fn on_request_begin(&self, request: &Request) {
        self.dispatcher.on_request_begin(request);
    }
}

impl LifecycleListener for MetricsHandler {
    fn lifecycle_starting(&self, subject: LifecycleSubject<'_>) {
        self.router.lifecycle_starting(subject);
    }

    fn lifecycle_started(&self, subject: LifecycleSubject<'_>) {
        self.router.lifecycle_started(subject);
    }

    fn lifecycle_failed(&self, subject: LifecycleSubject<'_>, cause: &Failure) {
        self.router.lifecycle_failed(subject, cause);
    }

    fn lifecycle_stopping(&self, subject: LifecycleSubject<'_>) {
        self.router.lifecycle_stopping(subject);
    }

    fn lifecycle_stopped(&self, subject: LifecycleSubject<'_>) {
        self.router.lifecycle_stopped(subject);
    }
}
