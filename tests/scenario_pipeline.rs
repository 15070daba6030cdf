//! ---
//! hm_section: "15-testing-qa-runbook"
//! hm_subsection: "integration-tests"
//! hm_type: "source"
//! hm_scope: "code"
//! hm_description: "End-to-end event order for runtime and application deployments."
//! hm_version: "v0.0.0-prealpha"
//! hm_owner: "tbd"
//! ---
mod support;

use std::sync::Arc;

use hostmetrics_core::{ConfigPhase, Listener};
use hostmetrics_testharness::units::{
    FailingHandler, HelloHandler, NamedConfigStep, ShortCircuitStage, TagStage, STAGE_VISITED_ATTRIBUTE,
};
use hostmetrics_testharness::{AppCaptureListener, CaptureListener, HostError, Startup};

use support::{application_host, instrument, runtime_host, LOCAL, NETWORK};

use hostmetrics_core::EventKind::*;

#[test]
fn runtime_request_produces_the_documented_sequence() {
    let mut host = runtime_host();
    host.context_mut()
        .add_stage(Arc::new(TagStage))
        .add_handler("/hello", Arc::new(HelloHandler), Startup::Lazy);
    let capture = Arc::new(CaptureListener::new());
    instrument(&mut host, Listener::base(capture.clone()));

    host.start().unwrap();
    assert_eq!(
        capture.kinds(),
        [ContextStarting, StageStarting, StageReady, ContextReady]
    );

    capture.clear();
    let exchange = host.dispatch(NETWORK, "/hello").unwrap();
    assert!(exchange.result.is_ok());
    assert_eq!(exchange.response().status, 200);
    assert_eq!(
        exchange.request.attribute(STAGE_VISITED_ATTRIBUTE).as_deref(),
        Some("true")
    );
    assert_eq!(
        capture.kinds(),
        [
            HandlerStarting,
            HandlerReady,
            StageEnter,
            HandlerEnter,
            HandlerExit,
            StageExit,
        ]
    );

    let events = capture.events();
    assert_eq!(events[2].unit_name(), Some("TagStage"));
    assert_eq!(events[3].unit_name(), Some("HelloHandler"));
    assert!(events[2..].iter().all(|event| event.context == "/shop"));

    // The lazily installed handler is reused for later requests.
    capture.clear();
    host.dispatch(NETWORK, "/hello").unwrap();
    assert_eq!(
        capture.kinds(),
        [StageEnter, HandlerEnter, HandlerExit, StageExit]
    );
}

#[test]
fn stage_duration_covers_the_handler() {
    let mut host = runtime_host();
    host.context_mut()
        .add_stage(Arc::new(TagStage))
        .add_handler("/hello", Arc::new(HelloHandler), Startup::Eager);
    let capture = Arc::new(CaptureListener::new());
    instrument(&mut host, Listener::base(capture.clone()));
    host.start().unwrap();
    capture.clear();

    host.dispatch(LOCAL, "/hello").unwrap();

    let events = capture.events();
    let handler = events[2].duration.unwrap();
    let stage = events[3].duration.unwrap();
    assert_eq!(events[3].kind, StageExit);
    assert!(stage >= handler);
}

#[test]
fn stage_exit_carries_the_downstream_failure() {
    let mut host = runtime_host();
    let failing = Arc::new(FailingHandler::new("nope"));
    host.context_mut()
        .add_stage(Arc::new(TagStage))
        .add_handler("/broken", failing.clone(), Startup::Eager);
    let capture = Arc::new(CaptureListener::new());
    instrument(&mut host, Listener::base(capture.clone()));
    host.start().unwrap();
    capture.clear();

    let exchange = host.dispatch(NETWORK, "/broken").unwrap();

    let returned = exchange.result.as_ref().unwrap_err();
    assert!(returned.same_as(failing.failure()));
    assert_eq!(
        capture.kinds(),
        [StageEnter, HandlerEnter, HandlerExit, StageExit]
    );
    let events = capture.events();
    assert_eq!(events[3].kind, StageExit);
    assert!(events[3].duration.is_some());
    assert!(events[3]
        .failure
        .as_ref()
        .is_some_and(|failure| failure.same_as(failing.failure())));
}

#[test]
fn short_circuiting_stage_never_reaches_the_handler() {
    let mut host = runtime_host();
    host.context_mut()
        .add_stage(Arc::new(ShortCircuitStage))
        .add_handler("/hello", Arc::new(HelloHandler), Startup::Eager);
    let capture = Arc::new(CaptureListener::new());
    instrument(&mut host, Listener::base(capture.clone()));
    host.start().unwrap();
    capture.clear();

    let exchange = host.dispatch(NETWORK, "/hello").unwrap();

    assert_eq!(exchange.response().status, 403);
    assert_eq!(capture.kinds(), [StageEnter, StageExit]);
    assert!(capture.events()[1].failure.is_none());
}

#[test]
fn application_start_reports_steps_per_phase_in_order() {
    let mut host = application_host();
    let schema = Arc::new(NamedConfigStep::new("schema"));
    let routes = Arc::new(NamedConfigStep::new("routes"));
    host.context_mut()
        .add_config_step(schema.clone())
        .add_config_step(routes.clone())
        .add_stage(Arc::new(TagStage))
        .add_handler("/hello", Arc::new(HelloHandler), Startup::Eager);
    let capture = Arc::new(AppCaptureListener::new());
    instrument(&mut host, Listener::extended(capture.clone()));

    host.start().unwrap();

    let phase_pairs = [
        ConfigStepStart,
        ConfigStepFinish,
        ConfigStepStart,
        ConfigStepFinish,
    ];
    let mut expected = vec![ApplicationStarting, ContextStarting];
    expected.extend(phase_pairs);
    expected.extend(phase_pairs);
    expected.extend([StageStarting, StageReady, HandlerStarting, HandlerReady]);
    expected.extend(phase_pairs);
    expected.extend([ApplicationReady, ContextReady]);
    assert_eq!(capture.kinds(), expected);

    let events = capture.events();
    let observed: Vec<(String, ConfigPhase)> = events
        .iter()
        .filter(|event| event.kind == ConfigStepFinish)
        .map(|event| (event.unit_name().unwrap().to_string(), event.phase.unwrap()))
        .collect();
    assert_eq!(
        observed,
        [
            ("schema".to_string(), ConfigPhase::Pre),
            ("routes".to_string(), ConfigPhase::Pre),
            ("schema".to_string(), ConfigPhase::Main),
            ("routes".to_string(), ConfigPhase::Main),
            ("schema".to_string(), ConfigPhase::Post),
            ("routes".to_string(), ConfigPhase::Post),
        ]
    );
    assert!(events
        .iter()
        .filter(|event| event.kind.is_extended())
        .all(|event| event.application.as_deref() == Some("shop")));
    assert_eq!(schema.phases(), ConfigPhase::ALL);
    assert_eq!(routes.phases(), ConfigPhase::ALL);
}

#[test]
fn failing_config_step_reports_its_failure_and_stops_the_start() {
    let mut host = application_host();
    let broken = Arc::new(NamedConfigStep::new("schema").failing_in(ConfigPhase::Main, "drift"));
    host.context_mut()
        .add_config_step(broken.clone())
        .add_handler("/hello", Arc::new(HelloHandler), Startup::Eager);
    let capture = Arc::new(AppCaptureListener::new());
    instrument(&mut host, Listener::extended(capture.clone()));

    let err = host.start().unwrap_err();
    assert!(matches!(err, HostError::StartFailed { .. }));

    assert_eq!(
        capture.kinds(),
        [
            ApplicationStarting,
            ContextStarting,
            ConfigStepStart,
            ConfigStepFinish,
            ConfigStepStart,
            ConfigStepFinish,
        ]
    );
    let finish = capture.events().pop().unwrap();
    assert_eq!(finish.phase, Some(ConfigPhase::Main));
    assert!(finish
        .failure
        .as_ref()
        .is_some_and(|failure| failure.same_as(broken.failure().unwrap())));
}

#[test]
fn stopped_context_refuses_requests() {
    let mut host = runtime_host();
    host.context_mut()
        .add_handler("/hello", Arc::new(HelloHandler), Startup::Eager);
    let capture = Arc::new(CaptureListener::new());
    instrument(&mut host, Listener::base(capture.clone()));
    host.start().unwrap();
    capture.clear();

    host.stop();

    assert!(capture.is_empty());
    assert!(host.context().installed_handler("/hello").is_none());
    assert!(matches!(
        host.dispatch(NETWORK, "/hello"),
        Err(HostError::NotStarted(_))
    ));
}
