//! ---
//! hm_section: "11-simulation"
//! hm_subsection: "03-units"
//! hm_type: "source"
//! hm_scope: "code"
//! hm_description: "Sample stages, handlers, decorators and config steps."
//! hm_version: "v0.1.0"
//! hm_owner: "tbd"
//! ---
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use hostmetrics_core::{
    ApplicationContext, Chain, ConfigPhase, ConfigStep, Failure, Layer, PipelineStage, Request,
    RequestHandler, RuntimeContext, UnitResult,
};

/// Attribute [`TagStage`] sets on every request it passes on.
pub const STAGE_VISITED_ATTRIBUTE: &str = "harness.stage_visited";

/// Responds `200 hello <path>`.
#[derive(Debug, Default)]
pub struct HelloHandler;

impl RequestHandler for HelloHandler {
    fn name(&self) -> &str {
        "HelloHandler"
    }

    fn service(&self, request: &Request) -> UnitResult {
        request.respond(200, format!("hello {}", request.path()));
        Ok(())
    }
}

/// Always fails with the same [`Failure`], so callers can check identity.
#[derive(Debug)]
pub struct FailingHandler {
    failure: Failure,
}

impl FailingHandler {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            failure: Failure::msg(message),
        }
    }

    pub fn failure(&self) -> &Failure {
        &self.failure
    }
}

impl RequestHandler for FailingHandler {
    fn name(&self) -> &str {
        "FailingHandler"
    }

    fn service(&self, _request: &Request) -> UnitResult {
        Err(self.failure.clone())
    }
}

/// Fails every `every`-th call, counting from one. `every == 0` never fails.
#[derive(Debug)]
pub struct FlakyHandler {
    every: u64,
    calls: AtomicU64,
}

impl FlakyHandler {
    pub fn new(every: u64) -> Self {
        Self {
            every,
            calls: AtomicU64::new(0),
        }
    }
}

impl RequestHandler for FlakyHandler {
    fn name(&self) -> &str {
        "FlakyHandler"
    }

    fn service(&self, request: &Request) -> UnitResult {
        let call = self.calls.fetch_add(1, Ordering::Relaxed) + 1;
        if self.every != 0 && call % self.every == 0 {
            return Err(Failure::msg(format!("simulated failure on call {call}")));
        }
        request.respond(200, format!("served {} (call {call})", request.path()));
        Ok(())
    }
}

/// Panics on every call, standing in for an interrupted delegate.
#[derive(Debug, Default)]
pub struct PanickingHandler;

impl RequestHandler for PanickingHandler {
    fn name(&self) -> &str {
        "PanickingHandler"
    }

    fn service(&self, _request: &Request) -> UnitResult {
        panic!("handler interrupted mid-request");
    }
}

/// Fails during `init`; never reached for service.
#[derive(Debug)]
pub struct FailingInitHandler {
    failure: Failure,
}

impl FailingInitHandler {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            failure: Failure::msg(message),
        }
    }

    pub fn failure(&self) -> &Failure {
        &self.failure
    }
}

impl RequestHandler for FailingInitHandler {
    fn name(&self) -> &str {
        "FailingInitHandler"
    }

    fn init(&self, _context: &RuntimeContext) -> UnitResult {
        Err(self.failure.clone())
    }

    fn service(&self, request: &Request) -> UnitResult {
        request.respond(200, "unreachable");
        Ok(())
    }
}

/// Marks the request and passes it on.
#[derive(Debug, Default)]
pub struct TagStage;

impl PipelineStage for TagStage {
    fn name(&self) -> &str {
        "TagStage"
    }

    fn process(&self, request: &Request, chain: &mut dyn Chain) -> UnitResult {
        request.set_attribute(STAGE_VISITED_ATTRIBUTE, "true");
        chain.proceed(request)
    }
}

/// Rejects every request without calling the rest of the chain.
#[derive(Debug, Default)]
pub struct ShortCircuitStage;

impl PipelineStage for ShortCircuitStage {
    fn name(&self) -> &str {
        "ShortCircuitStage"
    }

    fn process(&self, request: &Request, _chain: &mut dyn Chain) -> UnitResult {
        request.respond(403, "forbidden");
        Ok(())
    }
}

/// A third-party stage decorator that exposes what it wraps.
pub struct ForeignStageDecorator {
    inner: Arc<dyn PipelineStage>,
}

impl ForeignStageDecorator {
    pub fn new(inner: Arc<dyn PipelineStage>) -> Self {
        Self { inner }
    }
}

impl PipelineStage for ForeignStageDecorator {
    fn name(&self) -> &str {
        "ForeignStageDecorator"
    }

    fn layer(&self) -> Layer<'_, dyn PipelineStage> {
        Layer::Decorator(&self.inner)
    }

    fn init(&self, context: &RuntimeContext) -> UnitResult {
        self.inner.init(context)
    }

    fn process(&self, request: &Request, chain: &mut dyn Chain) -> UnitResult {
        self.inner.process(request, chain)
    }
}

/// A third-party handler decorator that exposes what it wraps.
pub struct ForeignHandlerDecorator {
    inner: Arc<dyn RequestHandler>,
}

impl ForeignHandlerDecorator {
    pub fn new(inner: Arc<dyn RequestHandler>) -> Self {
        Self { inner }
    }
}

impl RequestHandler for ForeignHandlerDecorator {
    fn name(&self) -> &str {
        "ForeignHandlerDecorator"
    }

    fn layer(&self) -> Layer<'_, dyn RequestHandler> {
        Layer::Decorator(&self.inner)
    }

    fn init(&self, context: &RuntimeContext) -> UnitResult {
        self.inner.init(context)
    }

    fn service(&self, request: &Request) -> UnitResult {
        self.inner.service(request)
    }
}

/// A handler decorator that does not reveal its inner unit.
pub struct OpaqueHandlerDecorator {
    inner: Arc<dyn RequestHandler>,
}

impl OpaqueHandlerDecorator {
    pub fn new(inner: Arc<dyn RequestHandler>) -> Self {
        Self { inner }
    }
}

impl RequestHandler for OpaqueHandlerDecorator {
    fn name(&self) -> &str {
        "OpaqueHandlerDecorator"
    }

    fn layer(&self) -> Layer<'_, dyn RequestHandler> {
        Layer::Unrecognized
    }

    fn init(&self, context: &RuntimeContext) -> UnitResult {
        self.inner.init(context)
    }

    fn service(&self, request: &Request) -> UnitResult {
        self.inner.service(request)
    }
}

/// Config step that records the phases it ran in and can fail in one of them.
#[derive(Debug)]
pub struct NamedConfigStep {
    name: String,
    fail_in: Option<(ConfigPhase, Failure)>,
    phases: Mutex<Vec<ConfigPhase>>,
}

impl NamedConfigStep {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fail_in: None,
            phases: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_in(mut self, phase: ConfigPhase, message: impl Into<String>) -> Self {
        self.fail_in = Some((phase, Failure::msg(message)));
        self
    }

    pub fn phases(&self) -> Vec<ConfigPhase> {
        self.phases.lock().clone()
    }

    pub fn failure(&self) -> Option<&Failure> {
        self.fail_in.as_ref().map(|(_, failure)| failure)
    }
}

impl ConfigStep for NamedConfigStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn configure(&self, _app: &ApplicationContext, phase: ConfigPhase) -> UnitResult {
        self.phases.lock().push(phase);
        match &self.fail_in {
            Some((failing, failure)) if *failing == phase => Err(failure.clone()),
            _ => Ok(()),
        }
    }
}
