//! ---
//! hm_section: "01-core-instrumentation"
//! hm_subsection: "module"
//! hm_type: "source"
//! hm_scope: "code"
//! hm_description: "Diagnostic listener that writes every event to tracing."
//! hm_version: "v0.0.0-prealpha"
//! hm_owner: "tbd"
//! ---
use std::time::Duration;

use hostmetrics_common::config::DEFAULT_REQUEST_ID_ATTRIBUTE;
use hostmetrics_common::time::duration_to_micros;
use hostmetrics_logging::{hm_debug, hm_info, hm_warn, LogContext};

use crate::events::{AppMetricsListener, EventKind, MetricsListener};
use crate::failure::Failure;
use crate::host::{ApplicationContext, Request, RuntimeContext};
use crate::unit::{ConfigPhase, ConfigStep, PipelineStage, RequestHandler};

/// Extended listener that logs events instead of recording metrics.
///
/// Starting/ready and lifecycle events go to `info`, per-request enter/exit
/// to `debug`, and any closing event carrying a failure to `warn`.
#[derive(Debug, Clone)]
pub struct TracingListener {
    request_id_attribute: String,
}

impl Default for TracingListener {
    fn default() -> Self {
        Self::new(DEFAULT_REQUEST_ID_ATTRIBUTE)
    }
}

impl TracingListener {
    pub fn new(request_id_attribute: impl Into<String>) -> Self {
        Self {
            request_id_attribute: request_id_attribute.into(),
        }
    }

    fn request_id(&self, request: &Request) -> Option<String> {
        request.attribute(&self.request_id_attribute)
    }

    fn starting(&self, kind: EventKind, ctx: LogContext<'_>) {
        hm_info!(context = ctx, "{}", kind);
    }

    fn finished(&self, kind: EventKind, ctx: LogContext<'_>, duration: Duration, failure: Option<&Failure>) {
        let micros = duration_to_micros(duration);
        match failure {
            Some(failure) => hm_warn!(context = ctx, "{} after {}us: {}", kind, micros, failure),
            None => hm_info!(context = ctx, "{} after {}us", kind, micros),
        }
    }

    fn request_finished(
        &self,
        kind: EventKind,
        ctx: LogContext<'_>,
        duration: Duration,
        failure: Option<&Failure>,
    ) {
        let micros = duration_to_micros(duration);
        match failure {
            Some(failure) => hm_warn!(context = ctx, "{} after {}us: {}", kind, micros, failure),
            None => hm_debug!(context = ctx, "{} after {}us", kind, micros),
        }
    }
}

impl MetricsListener for TracingListener {
    fn on_context_starting(&self, context: &RuntimeContext) {
        self.starting(
            EventKind::ContextStarting,
            LogContext::new().with_context(context.name()),
        );
    }

    fn on_context_ready(&self, context: &RuntimeContext) {
        self.starting(
            EventKind::ContextReady,
            LogContext::new().with_context(context.name()),
        );
    }

    fn on_stage_starting(&self, context: &RuntimeContext, stage: &dyn PipelineStage) {
        self.starting(
            EventKind::StageStarting,
            LogContext::new()
                .with_context(context.name())
                .with_unit(stage.name()),
        );
    }

    fn on_stage_ready(
        &self,
        context: &RuntimeContext,
        stage: &dyn PipelineStage,
        duration: Duration,
        failure: Option<&Failure>,
    ) {
        let ctx = LogContext::new()
            .with_context(context.name())
            .with_unit(stage.name());
        self.finished(EventKind::StageReady, ctx, duration, failure);
    }

    fn on_stage_enter(&self, context: &RuntimeContext, stage: &dyn PipelineStage, request: &Request) {
        let request_id = self.request_id(request);
        let ctx = LogContext::new()
            .with_context(context.name())
            .with_unit(stage.name())
            .with_request_id(request_id.as_deref());
        hm_debug!(context = ctx, "{} {}", EventKind::StageEnter, request.path());
    }

    fn on_stage_exit(
        &self,
        context: &RuntimeContext,
        stage: &dyn PipelineStage,
        request: &Request,
        duration: Duration,
        failure: Option<&Failure>,
    ) {
        let request_id = self.request_id(request);
        let ctx = LogContext::new()
            .with_context(context.name())
            .with_unit(stage.name())
            .with_request_id(request_id.as_deref());
        self.request_finished(EventKind::StageExit, ctx, duration, failure);
    }

    fn on_handler_starting(&self, context: &RuntimeContext, handler: &dyn RequestHandler) {
        self.starting(
            EventKind::HandlerStarting,
            LogContext::new()
                .with_context(context.name())
                .with_unit(handler.name()),
        );
    }

    fn on_handler_ready(
        &self,
        context: &RuntimeContext,
        handler: &dyn RequestHandler,
        duration: Duration,
        failure: Option<&Failure>,
    ) {
        let ctx = LogContext::new()
            .with_context(context.name())
            .with_unit(handler.name());
        self.finished(EventKind::HandlerReady, ctx, duration, failure);
    }

    fn on_handler_enter(
        &self,
        context: &RuntimeContext,
        handler: &dyn RequestHandler,
        request: &Request,
    ) {
        let request_id = self.request_id(request);
        let ctx = LogContext::new()
            .with_context(context.name())
            .with_unit(handler.name())
            .with_request_id(request_id.as_deref());
        hm_debug!(context = ctx, "{} {}", EventKind::HandlerEnter, request.path());
    }

    fn on_handler_exit(
        &self,
        context: &RuntimeContext,
        handler: &dyn RequestHandler,
        request: &Request,
        duration: Duration,
        failure: Option<&Failure>,
    ) {
        let request_id = self.request_id(request);
        let ctx = LogContext::new()
            .with_context(context.name())
            .with_unit(handler.name())
            .with_request_id(request_id.as_deref());
        self.request_finished(EventKind::HandlerExit, ctx, duration, failure);
    }
}

impl AppMetricsListener for TracingListener {
    fn on_config_step_start(&self, app: &ApplicationContext, step: &dyn ConfigStep, phase: ConfigPhase) {
        self.starting(
            EventKind::ConfigStepStart,
            LogContext::new()
                .with_context(app.runtime().name())
                .with_unit(step.name())
                .with_phase(phase.as_str()),
        );
    }

    fn on_config_step_finish(
        &self,
        app: &ApplicationContext,
        step: &dyn ConfigStep,
        phase: ConfigPhase,
        duration: Duration,
        failure: Option<&Failure>,
    ) {
        let ctx = LogContext::new()
            .with_context(app.runtime().name())
            .with_unit(step.name())
            .with_phase(phase.as_str());
        self.finished(EventKind::ConfigStepFinish, ctx, duration, failure);
    }

    fn on_application_starting(&self, app: &ApplicationContext) {
        self.starting(
            EventKind::ApplicationStarting,
            LogContext::new()
                .with_context(app.runtime().name())
                .with_unit(app.name()),
        );
    }

    fn on_application_ready(&self, app: &ApplicationContext) {
        self.starting(
            EventKind::ApplicationReady,
            LogContext::new()
                .with_context(app.runtime().name())
                .with_unit(app.name()),
        );
    }
}
