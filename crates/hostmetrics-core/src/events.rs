//! ---
//! hm_section: "01-core-instrumentation"
//! hm_subsection: "module"
//! hm_type: "source"
//! hm_scope: "code"
//! hm_description: "Listener shapes and the owned event record."
//! hm_version: "v0.0.0-prealpha"
//! hm_owner: "tbd"
//! ---
//! Event contract.
//!
//! [`MetricsListener`] is the base shape every listener implements.
//! [`AppMetricsListener`] adds configuration-step and application events and
//! is only addressed when the installed listener declares it (see
//! [`crate::listener::Listener`]).
//!
//! Every `*_starting`/`*_enter` call is followed on the same call path by
//! exactly one matching `*_ready`/`*_exit` call, also when the unit fails or
//! unwinds.

use std::fmt;
use std::time::Duration;

use serde::{Serialize, Serializer};

use hostmetrics_common::time::duration_to_nanos;

use crate::failure::Failure;
use crate::host::{ApplicationContext, Request, RuntimeContext};
use crate::unit::{ConfigPhase, ConfigStep, PipelineStage, RequestHandler, UnitCategory, UnitId};

pub trait MetricsListener: Send + Sync {
    fn on_context_starting(&self, context: &RuntimeContext);

    fn on_context_ready(&self, context: &RuntimeContext);

    fn on_stage_starting(&self, context: &RuntimeContext, stage: &dyn PipelineStage);

    fn on_stage_ready(
        &self,
        context: &RuntimeContext,
        stage: &dyn PipelineStage,
        duration: Duration,
        failure: Option<&Failure>,
    );

    fn on_stage_enter(&self, context: &RuntimeContext, stage: &dyn PipelineStage, request: &Request);

    fn on_stage_exit(
        &self,
        context: &RuntimeContext,
        stage: &dyn PipelineStage,
        request: &Request,
        duration: Duration,
        failure: Option<&Failure>,
    );

    fn on_handler_starting(&self, context: &RuntimeContext, handler: &dyn RequestHandler);

    fn on_handler_ready(
        &self,
        context: &RuntimeContext,
        handler: &dyn RequestHandler,
        duration: Duration,
        failure: Option<&Failure>,
    );

    fn on_handler_enter(
        &self,
        context: &RuntimeContext,
        handler: &dyn RequestHandler,
        request: &Request,
    );

    fn on_handler_exit(
        &self,
        context: &RuntimeContext,
        handler: &dyn RequestHandler,
        request: &Request,
        duration: Duration,
        failure: Option<&Failure>,
    );
}

/// Extended shape: application-level events on top of the base set.
pub trait AppMetricsListener: MetricsListener {
    fn on_config_step_start(&self, app: &ApplicationContext, step: &dyn ConfigStep, phase: ConfigPhase);

    fn on_config_step_finish(
        &self,
        app: &ApplicationContext,
        step: &dyn ConfigStep,
        phase: ConfigPhase,
        duration: Duration,
        failure: Option<&Failure>,
    );

    fn on_application_starting(&self, app: &ApplicationContext);

    fn on_application_ready(&self, app: &ApplicationContext);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    ContextStarting,
    ContextReady,
    StageStarting,
    StageReady,
    StageEnter,
    StageExit,
    HandlerStarting,
    HandlerReady,
    HandlerEnter,
    HandlerExit,
    ConfigStepStart,
    ConfigStepFinish,
    ApplicationStarting,
    ApplicationReady,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::ContextStarting => "context-starting",
            EventKind::ContextReady => "context-ready",
            EventKind::StageStarting => "stage-starting",
            EventKind::StageReady => "stage-ready",
            EventKind::StageEnter => "stage-enter",
            EventKind::StageExit => "stage-exit",
            EventKind::HandlerStarting => "handler-starting",
            EventKind::HandlerReady => "handler-ready",
            EventKind::HandlerEnter => "handler-enter",
            EventKind::HandlerExit => "handler-exit",
            EventKind::ConfigStepStart => "config-step-start",
            EventKind::ConfigStepFinish => "config-step-finish",
            EventKind::ApplicationStarting => "application-starting",
            EventKind::ApplicationReady => "application-ready",
        }
    }

    /// True for events only the extended listener shape declares.
    pub fn is_extended(&self) -> bool {
        matches!(
            self,
            EventKind::ConfigStepStart
                | EventKind::ConfigStepFinish
                | EventKind::ApplicationStarting
                | EventKind::ApplicationReady
        )
    }

    /// True for the closing half of a starting/ready or enter/exit pair.
    pub fn is_finish(&self) -> bool {
        matches!(
            self,
            EventKind::StageReady
                | EventKind::StageExit
                | EventKind::HandlerReady
                | EventKind::HandlerExit
                | EventKind::ConfigStepFinish
        )
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitRef {
    pub category: UnitCategory,
    pub name: String,
    #[serde(skip)]
    pub id: UnitId,
}

impl UnitRef {
    pub fn stage(stage: &dyn PipelineStage) -> Self {
        Self {
            category: UnitCategory::PipelineStage,
            name: stage.name().to_string(),
            id: UnitId::of_ref(stage),
        }
    }

    pub fn handler(handler: &dyn RequestHandler) -> Self {
        Self {
            category: UnitCategory::RequestHandler,
            name: handler.name().to_string(),
            id: UnitId::of_ref(handler),
        }
    }

    pub fn config_step(step: &dyn ConfigStep) -> Self {
        Self {
            category: UnitCategory::ConfigStep,
            name: step.name().to_string(),
            id: UnitId::of_ref(step),
        }
    }
}

/// Owned snapshot of one observed event, for listeners that buffer or print.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub kind: EventKind,
    pub context: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub application: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<UnitRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<ConfigPhase>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(
        rename = "duration_ns",
        serialize_with = "serialize_duration",
        skip_serializing_if = "Option::is_none"
    )]
    pub duration: Option<Duration>,
    #[serde(
        serialize_with = "serialize_failure",
        skip_serializing_if = "Option::is_none"
    )]
    pub failure: Option<Failure>,
}

impl Event {
    pub fn new(kind: EventKind, context: &RuntimeContext) -> Self {
        Self {
            kind,
            context: context.name().to_string(),
            application: None,
            unit: None,
            phase: None,
            request_id: None,
            duration: None,
            failure: None,
        }
    }

    pub fn for_application(kind: EventKind, app: &ApplicationContext) -> Self {
        let mut event = Self::new(kind, app.runtime());
        event.application = Some(app.name().to_string());
        event
    }

    pub fn with_unit(mut self, unit: UnitRef) -> Self {
        self.unit = Some(unit);
        self
    }

    pub fn with_phase(mut self, phase: ConfigPhase) -> Self {
        self.phase = Some(phase);
        self
    }

    pub fn with_request_id(mut self, request_id: Option<String>) -> Self {
        self.request_id = request_id;
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn with_failure(mut self, failure: Option<&Failure>) -> Self {
        self.failure = failure.cloned();
        self
    }

    pub fn unit_name(&self) -> Option<&str> {
        self.unit.as_ref().map(|unit| unit.name.as_str())
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} context={}", self.kind, self.context)?;
        if let Some(app) = &self.application {
            write!(f, " application={app}")?;
        }
        if let Some(unit) = &self.unit {
            write!(f, " unit={}", unit.name)?;
        }
        if let Some(phase) = self.phase {
            write!(f, " phase={phase}")?;
        }
        if let Some(request_id) = &self.request_id {
            write!(f, " request_id={request_id}")?;
        }
        if let Some(duration) = self.duration {
            write!(f, " duration={duration:?}")?;
        }
        if let Some(failure) = &self.failure {
            write!(f, " failure=\"{failure}\"")?;
        }
        Ok(())
    }
}

fn serialize_duration<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match duration {
        Some(duration) => serializer.serialize_some(&duration_to_nanos(*duration)),
        None => serializer.serialize_none(),
    }
}

fn serialize_failure<S>(failure: &Option<Failure>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match failure {
        Some(failure) => serializer.serialize_some(&failure.to_string()),
        None => serializer.serialize_none(),
    }
}
