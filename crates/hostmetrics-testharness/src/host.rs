//! ---
//! hm_section: "11-simulation"
//! hm_subsection: "04-host"
//! hm_type: "source"
//! hm_scope: "code"
//! hm_description: "In-process simulated host driving units the way a servlet-style container does."
//! hm_version: "v0.1.0"
//! hm_owner: "tbd"
//! ---
//! Simulated host.
//!
//! Start order for an application deployment:
//! lifecycle starting, config steps (PRE then MAIN), stages, startup
//! handlers, config steps (POST), lifecycle started. A plain runtime context
//! skips the config steps. Lazily loaded handlers are wrapped and initialised
//! on the first request that reaches them, before the stage chain runs.

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use thiserror::Error;

use hostmetrics_core::{
    ApplicationContext, Chain, ConfigPhase, ConfigStep, ConnectorTarget, ContextTarget, Failure,
    LifecycleListener, LifecycleSubject, PipelineStage, Request, RequestHandler, RequestHooks,
    Response, RuntimeContext, UnitResult, WrapHooks,
};
use hostmetrics_logging::{hm_debug, hm_info, LogContext};

#[derive(Debug, Error)]
pub enum HostError {
    #[error("unknown connector '{0}'")]
    UnknownConnector(String),
    #[error("context {0} is not started")]
    NotStarted(String),
    #[error("context {context} failed to start: {cause}")]
    StartFailed { context: String, cause: Failure },
}

/// A server connector. Only network connectors accept request hooks from
/// [`hostmetrics_core::MetricsHandler::attach_to_connectors`].
pub struct Connector {
    name: String,
    network: bool,
    hooks: Vec<Arc<dyn RequestHooks>>,
}

impl Connector {
    pub fn new(name: impl Into<String>, network: bool) -> Self {
        Self {
            name: name.into(),
            network,
            hooks: Vec::new(),
        }
    }

    pub fn hook_count(&self) -> usize {
        self.hooks.len()
    }
}

impl ConnectorTarget for Connector {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_network(&self) -> bool {
        self.network
    }

    fn add_request_hooks(&mut self, hooks: Arc<dyn RequestHooks>) {
        self.hooks.push(hooks);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Startup {
    /// Initialised while the context starts.
    Eager,
    /// Initialised by the first request mapped to it.
    Lazy,
}

#[derive(Debug, Clone)]
pub enum Deployment {
    Runtime(Arc<RuntimeContext>),
    Application(ApplicationContext),
}

impl Deployment {
    fn subject(&self) -> LifecycleSubject<'_> {
        match self {
            Deployment::Runtime(context) => LifecycleSubject::Runtime(context),
            Deployment::Application(app) => LifecycleSubject::Application(app),
        }
    }

    pub fn runtime(&self) -> &Arc<RuntimeContext> {
        match self {
            Deployment::Runtime(context) => context,
            Deployment::Application(app) => app.runtime(),
        }
    }
}

struct HandlerSlot {
    declared: Arc<dyn RequestHandler>,
    startup: Startup,
    installed: Mutex<Option<Arc<dyn RequestHandler>>>,
}

/// Units, hooks and listeners of one deployed context.
pub struct SimulatedContext {
    deployment: Deployment,
    wrap_hooks: Vec<Arc<dyn WrapHooks>>,
    lifecycle: Vec<Arc<dyn LifecycleListener>>,
    config_steps: Vec<Arc<dyn ConfigStep>>,
    stages: Vec<Arc<dyn PipelineStage>>,
    handlers: IndexMap<String, HandlerSlot>,
    installed_steps: Vec<Arc<dyn ConfigStep>>,
    installed_stages: Vec<Arc<dyn PipelineStage>>,
    started: bool,
}

impl SimulatedContext {
    fn new(deployment: Deployment) -> Self {
        Self {
            deployment,
            wrap_hooks: Vec::new(),
            lifecycle: Vec::new(),
            config_steps: Vec::new(),
            stages: Vec::new(),
            handlers: IndexMap::new(),
            installed_steps: Vec::new(),
            installed_stages: Vec::new(),
            started: false,
        }
    }

    pub fn deployment(&self) -> &Deployment {
        &self.deployment
    }

    pub fn add_config_step(&mut self, step: Arc<dyn ConfigStep>) -> &mut Self {
        self.config_steps.push(step);
        self
    }

    pub fn add_stage(&mut self, stage: Arc<dyn PipelineStage>) -> &mut Self {
        self.stages.push(stage);
        self
    }

    pub fn add_handler(
        &mut self,
        path: impl Into<String>,
        handler: Arc<dyn RequestHandler>,
        startup: Startup,
    ) -> &mut Self {
        self.handlers.insert(
            path.into(),
            HandlerSlot {
                declared: handler,
                startup,
                installed: Mutex::new(None),
            },
        );
        self
    }

    /// Stages as installed (after the wrap hooks ran).
    pub fn installed_stages(&self) -> &[Arc<dyn PipelineStage>] {
        &self.installed_stages
    }

    pub fn installed_config_steps(&self) -> &[Arc<dyn ConfigStep>] {
        &self.installed_steps
    }

    /// Handler installed for `path`, if it has been initialised.
    pub fn installed_handler(&self, path: &str) -> Option<Arc<dyn RequestHandler>> {
        self.handlers
            .get(path)
            .and_then(|slot| slot.installed.lock().clone())
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    fn wrap_stage(&self, stage: Arc<dyn PipelineStage>) -> Arc<dyn PipelineStage> {
        self.wrap_hooks
            .iter()
            .fold(stage, |unit, hooks| hooks.wrap_stage(unit))
    }

    fn wrap_handler(&self, handler: Arc<dyn RequestHandler>) -> Arc<dyn RequestHandler> {
        self.wrap_hooks
            .iter()
            .fold(handler, |unit, hooks| hooks.wrap_handler(unit))
    }

    fn wrap_config_step(&self, step: Arc<dyn ConfigStep>) -> Arc<dyn ConfigStep> {
        self.wrap_hooks
            .iter()
            .fold(step, |unit, hooks| hooks.wrap_config_step(unit))
    }

    fn configure(&self, app: &ApplicationContext, phase: ConfigPhase) -> UnitResult {
        for step in &self.installed_steps {
            step.configure(app, phase)?;
        }
        Ok(())
    }

    fn install_handler(&self, slot: &HandlerSlot) -> UnitResult<Arc<dyn RequestHandler>> {
        let mut installed = slot.installed.lock();
        if let Some(handler) = installed.as_ref() {
            return Ok(handler.clone());
        }
        let handler = self.wrap_handler(slot.declared.clone());
        handler.init(self.deployment.runtime())?;
        *installed = Some(handler.clone());
        Ok(handler)
    }

    fn boot(&mut self) -> UnitResult {
        if let Deployment::Application(app) = &self.deployment {
            self.installed_steps = self
                .config_steps
                .iter()
                .map(|step| self.wrap_config_step(step.clone()))
                .collect();
            self.configure(app, ConfigPhase::Pre)?;
            self.configure(app, ConfigPhase::Main)?;
        }

        self.installed_stages = self
            .stages
            .iter()
            .map(|stage| self.wrap_stage(stage.clone()))
            .collect();
        for stage in &self.installed_stages {
            stage.init(self.deployment.runtime())?;
        }

        for slot in self.handlers.values() {
            if slot.startup == Startup::Eager {
                self.install_handler(slot)?;
            }
        }

        if let Deployment::Application(app) = &self.deployment {
            self.configure(app, ConfigPhase::Post)?;
        }
        Ok(())
    }

    fn notify(&self, notify: impl Fn(&dyn LifecycleListener, LifecycleSubject<'_>)) {
        let subject = self.deployment.subject();
        for listener in &self.lifecycle {
            notify(listener.as_ref(), subject);
        }
    }

    fn start(&mut self) -> UnitResult {
        self.notify(|listener, subject| listener.lifecycle_starting(subject));
        match self.boot() {
            Ok(()) => {
                self.started = true;
                self.notify(|listener, subject| listener.lifecycle_started(subject));
                Ok(())
            }
            Err(failure) => {
                self.notify(|listener, subject| listener.lifecycle_failed(subject, &failure));
                Err(failure)
            }
        }
    }

    fn stop(&mut self) {
        self.notify(|listener, subject| listener.lifecycle_stopping(subject));
        self.started = false;
        self.installed_stages.clear();
        self.installed_steps.clear();
        for slot in self.handlers.values() {
            slot.installed.lock().take();
        }
        self.notify(|listener, subject| listener.lifecycle_stopped(subject));
    }
}

impl ContextTarget for SimulatedContext {
    fn add_wrap_hooks(&mut self, hooks: Arc<dyn WrapHooks>) {
        self.wrap_hooks.push(hooks);
    }

    fn add_lifecycle_listener(&mut self, listener: Arc<dyn LifecycleListener>) {
        self.lifecycle.push(listener);
    }
}

/// Continuation over the remaining stages, ending at the handler.
struct StageChain<'a> {
    stages: &'a [Arc<dyn PipelineStage>],
    handler: Option<&'a dyn RequestHandler>,
}

impl Chain for StageChain<'_> {
    fn proceed(&mut self, request: &Request) -> UnitResult {
        let stages = self.stages;
        match stages.split_first() {
            Some((stage, rest)) => {
                self.stages = rest;
                stage.process(request, self)
            }
            None => match self.handler {
                Some(handler) => handler.service(request),
                None => {
                    request.respond(404, "not found");
                    Ok(())
                }
            },
        }
    }
}

/// Outcome of one simulated request.
#[derive(Debug)]
pub struct Exchange {
    pub request: Request,
    pub result: UnitResult,
}

impl Exchange {
    pub fn response(&self) -> Response {
        self.request.response()
    }
}

/// A host with named connectors and a single deployed context.
pub struct SimulatedHost {
    connectors: Vec<Connector>,
    context: SimulatedContext,
}

impl SimulatedHost {
    pub fn runtime(context_path: impl Into<String>) -> Self {
        Self::with_deployment(Deployment::Runtime(Arc::new(RuntimeContext::new(
            context_path,
        ))))
    }

    pub fn application(name: impl Into<String>, context_path: impl Into<String>) -> Self {
        Self::with_deployment(Deployment::Application(ApplicationContext::new(
            name,
            context_path,
        )))
    }

    fn with_deployment(deployment: Deployment) -> Self {
        Self {
            connectors: Vec::new(),
            context: SimulatedContext::new(deployment),
        }
    }

    pub fn add_connector(&mut self, name: impl Into<String>, network: bool) -> &mut Self {
        self.connectors.push(Connector::new(name, network));
        self
    }

    pub fn connector(&self, name: &str) -> Option<&Connector> {
        self.connectors
            .iter()
            .find(|connector| connector.name == name)
    }

    pub fn connectors_mut(&mut self) -> impl Iterator<Item = &mut dyn ConnectorTarget> + '_ {
        self.connectors
            .iter_mut()
            .map(|connector| connector as &mut dyn ConnectorTarget)
    }

    pub fn context(&self) -> &SimulatedContext {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut SimulatedContext {
        &mut self.context
    }

    pub fn start(&mut self) -> Result<(), HostError> {
        let name = self.context.deployment.runtime().name().to_string();
        hm_info!(context = LogContext::new().with_context(&name), "starting simulated context");
        self.context
            .start()
            .map_err(|cause| HostError::StartFailed {
                context: name,
                cause,
            })
    }

    pub fn stop(&mut self) {
        hm_info!(
            context = LogContext::new().with_context(self.context.deployment.runtime().name()),
            "stopping simulated context"
        );
        self.context.stop();
    }

    /// Push one request for `path` through `connector`.
    ///
    /// Unit failures are returned inside the [`Exchange`] (with a 500
    /// response); only host-level problems are errors.
    pub fn dispatch(&self, connector: &str, path: &str) -> Result<Exchange, HostError> {
        let connector = self
            .connector(connector)
            .ok_or_else(|| HostError::UnknownConnector(connector.to_string()))?;
        let runtime = self.context.deployment.runtime();
        if !self.context.started {
            return Err(HostError::NotStarted(runtime.name().to_string()));
        }

        let request = Request::new(runtime.clone(), path);
        for hooks in &connector.hooks {
            hooks.on_request_begin(&request);
        }

        let handler = match self.context.handlers.get(path) {
            Some(slot) => match self.context.install_handler(slot) {
                Ok(handler) => Some(handler),
                Err(failure) => {
                    request.respond(503, failure.to_string());
                    return Ok(Exchange {
                        request,
                        result: Err(failure),
                    });
                }
            },
            None => None,
        };

        let mut chain = StageChain {
            stages: &self.context.installed_stages,
            handler: handler.as_deref(),
        };
        let result = chain.proceed(&request);
        if let Err(failure) = &result {
            request.respond(500, failure.to_string());
        }
        hm_debug!(
            context = LogContext::new().with_context(runtime.name()),
            "{} {} -> {}",
            connector.name,
            path,
            request.response().status
        );
        Ok(Exchange { request, result })
    }
}
