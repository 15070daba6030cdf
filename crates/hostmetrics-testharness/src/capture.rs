//! ---
//! hm_section: "11-simulation"
//! hm_subsection: "02-capture"
//! hm_type: "source"
//! hm_scope: "code"
//! hm_description: "Listeners that log and queue every event for assertions."
//! hm_version: "v0.1.0"
//! hm_owner: "tbd"
//! ---
use std::time::Duration;

use parking_lot::Mutex;

use hostmetrics_common::config::DEFAULT_REQUEST_ID_ATTRIBUTE;
use hostmetrics_core::{
    AppMetricsListener, ApplicationContext, ConfigPhase, ConfigStep, Event, EventKind, Failure,
    MetricsListener, PipelineStage, Request, RequestHandler, RuntimeContext, UnitRef,
};

/// Base-shape listener that records every event it receives.
#[derive(Debug)]
pub struct CaptureListener {
    request_id_attribute: String,
    events: Mutex<Vec<Event>>,
}

impl Default for CaptureListener {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureListener {
    pub fn new() -> Self {
        Self::with_request_id_attribute(DEFAULT_REQUEST_ID_ATTRIBUTE)
    }

    pub fn with_request_id_attribute(attribute: impl Into<String>) -> Self {
        Self {
            request_id_attribute: attribute.into(),
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn kinds(&self) -> Vec<EventKind> {
        self.events.lock().iter().map(|event| event.kind).collect()
    }

    /// Events stamped with `request_id`, in arrival order.
    pub fn events_for_request(&self, request_id: &str) -> Vec<Event> {
        self.events
            .lock()
            .iter()
            .filter(|event| event.request_id.as_deref() == Some(request_id))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }

    fn record(&self, event: Event) {
        tracing::info!(target: "hostmetrics::capture", "[EVENT] {event}");
        self.events.lock().push(event);
    }

    fn request_id(&self, request: &Request) -> Option<String> {
        request.attribute(&self.request_id_attribute)
    }
}

impl MetricsListener for CaptureListener {
    fn on_context_starting(&self, context: &RuntimeContext) {
        self.record(Event::new(EventKind::ContextStarting, context));
    }

    fn on_context_ready(&self, context: &RuntimeContext) {
        self.record(Event::new(EventKind::ContextReady, context));
    }

    fn on_stage_starting(&self, context: &RuntimeContext, stage: &dyn PipelineStage) {
        self.record(Event::new(EventKind::StageStarting, context).with_unit(UnitRef::stage(stage)));
    }

    fn on_stage_ready(
        &self,
        context: &RuntimeContext,
        stage: &dyn PipelineStage,
        duration: Duration,
        failure: Option<&Failure>,
    ) {
        self.record(
            Event::new(EventKind::StageReady, context)
                .with_unit(UnitRef::stage(stage))
                .with_duration(duration)
                .with_failure(failure),
        );
    }

    fn on_stage_enter(&self, context: &RuntimeContext, stage: &dyn PipelineStage, request: &Request) {
        self.record(
            Event::new(EventKind::StageEnter, context)
                .with_unit(UnitRef::stage(stage))
                .with_request_id(self.request_id(request)),
        );
    }

    fn on_stage_exit(
        &self,
        context: &RuntimeContext,
        stage: &dyn PipelineStage,
        request: &Request,
        duration: Duration,
        failure: Option<&Failure>,
    ) {
        self.record(
            Event::new(EventKind::StageExit, context)
                .with_unit(UnitRef::stage(stage))
                .with_request_id(self.request_id(request))
                .with_duration(duration)
                .with_failure(failure),
        );
    }

    fn on_handler_starting(&self, context: &RuntimeContext, handler: &dyn RequestHandler) {
        self.record(
            Event::new(EventKind::HandlerStarting, context).with_unit(UnitRef::handler(handler)),
        );
    }

    fn on_handler_ready(
        &self,
        context: &RuntimeContext,
        handler: &dyn RequestHandler,
        duration: Duration,
        failure: Option<&Failure>,
    ) {
        self.record(
            Event::new(EventKind::HandlerReady, context)
                .with_unit(UnitRef::handler(handler))
                .with_duration(duration)
                .with_failure(failure),
        );
    }

    fn on_handler_enter(
        &self,
        context: &RuntimeContext,
        handler: &dyn RequestHandler,
        request: &Request,
    ) {
        self.record(
            Event::new(EventKind::HandlerEnter, context)
                .with_unit(UnitRef::handler(handler))
                .with_request_id(self.request_id(request)),
        );
    }

    fn on_handler_exit(
        &self,
        context: &RuntimeContext,
        handler: &dyn RequestHandler,
        request: &Request,
        duration: Duration,
        failure: Option<&Failure>,
    ) {
        self.record(
            Event::new(EventKind::HandlerExit, context)
                .with_unit(UnitRef::handler(handler))
                .with_request_id(self.request_id(request))
                .with_duration(duration)
                .with_failure(failure),
        );
    }
}

/// Extended-shape capture listener; also records application and
/// configuration-step events.
#[derive(Debug, Default)]
pub struct AppCaptureListener {
    inner: CaptureListener,
}

impl AppCaptureListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_request_id_attribute(attribute: impl Into<String>) -> Self {
        Self {
            inner: CaptureListener::with_request_id_attribute(attribute),
        }
    }

    pub fn events(&self) -> Vec<Event> {
        self.inner.events()
    }

    pub fn kinds(&self) -> Vec<EventKind> {
        self.inner.kinds()
    }

    pub fn events_for_request(&self, request_id: &str) -> Vec<Event> {
        self.inner.events_for_request(request_id)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn clear(&self) {
        self.inner.clear();
    }
}

impl MetricsListener for AppCaptureListener {
    fn on_context_starting(&self, context: &RuntimeContext) {
        self.inner.on_context_starting(context);
    }

    fn on_context_ready(&self, context: &RuntimeContext) {
        self.inner.on_context_ready(context);
    }

    fn on_stage_starting(&self, context: &RuntimeContext, stage: &dyn PipelineStage) {
        self.inner.on_stage_starting(context, stage);
    }

    fn on_stage_ready(
        &self,
        context: &RuntimeContext,
        stage: &dyn PipelineStage,
        duration: Duration,
        failure: Option<&Failure>,
    ) {
        self.inner.on_stage_ready(context, stage, duration, failure);
    }

    fn on_stage_enter(&self, context: &RuntimeContext, stage: &dyn PipelineStage, request: &Request) {
        self.inner.on_stage_enter(context, stage, request);
    }

    fn on_stage_exit(
        &self,
        context: &RuntimeContext,
        stage: &dyn PipelineStage,
        request: &Request,
        duration: Duration,
        failure: Option<&Failure>,
    ) {
        self.inner
            .on_stage_exit(context, stage, request, duration, failure);
    }

    fn on_handler_starting(&self, context: &RuntimeContext, handler: &dyn RequestHandler) {
        self.inner.on_handler_starting(context, handler);
    }

    fn on_handler_ready(
        &self,
        context: &RuntimeContext,
        handler: &dyn RequestHandler,
        duration: Duration,
        failure: Option<&Failure>,
    ) {
        self.inner
            .on_handler_ready(context, handler, duration, failure);
    }

    fn on_handler_enter(
        &self,
        context: &RuntimeContext,
        handler: &dyn RequestHandler,
        request: &Request,
    ) {
        self.inner.on_handler_enter(context, handler, request);
    }

    fn on_handler_exit(
        &self,
        context: &RuntimeContext,
        handler: &dyn RequestHandler,
        request: &Request,
        duration: Duration,
        failure: Option<&Failure>,
    ) {
        self.inner
            .on_handler_exit(context, handler, request, duration, failure);
    }
}

impl AppMetricsListener for AppCaptureListener {
    fn on_config_step_start(&self, app: &ApplicationContext, step: &dyn ConfigStep, phase: ConfigPhase) {
        self.inner.record(
            Event::for_application(EventKind::ConfigStepStart, app)
                .with_unit(UnitRef::config_step(step))
                .with_phase(phase),
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
        self.inner.record(
            Event::for_application(EventKind::ConfigStepFinish, app)
                .with_unit(UnitRef::config_step(step))
                .with_phase(phase)
                .with_duration(duration)
                .with_failure(failure),
        );
    }

    fn on_application_starting(&self, app: &ApplicationContext) {
        self.inner
            .record(Event::for_application(EventKind::ApplicationStarting, app));
    }

    fn on_application_ready(&self, app: &ApplicationContext) {
        self.inner
            .record(Event::for_application(EventKind::ApplicationReady, app));
    }
}
