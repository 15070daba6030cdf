//! ---
//! hm_section: "01-core-instrumentation"
//! hm_subsection: "module"
//! hm_type: "source"
//! hm_scope: "code"
//! hm_description: "Host-side types and hook traits the instrumentation plugs into."
//! hm_version: "v0.0.0-prealpha"
//! hm_owner: "tbd"
//! ---
//! Typed seam between a request-processing host and the instrumentation.
//!
//! The host owns contexts, requests and units. The core only observes them
//! through the hook traits declared here, and the host only reaches the core
//! through [`ConnectorTarget`] and [`ContextTarget`] registrations.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::failure::{Failure, UnitResult};
use crate::unit::{ConfigStep, PipelineStage, RequestHandler};

/// Plain runtime scope a pipeline and its handlers live in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeContext {
    context_path: String,
}

impl RuntimeContext {
    pub fn new(context_path: impl Into<String>) -> Self {
        Self {
            context_path: context_path.into(),
        }
    }

    pub fn context_path(&self) -> &str {
        &self.context_path
    }

    /// Display name; the root context is reported as `/`.
    pub fn name(&self) -> &str {
        if self.context_path.is_empty() {
            "/"
        } else {
            &self.context_path
        }
    }
}

impl fmt::Display for RuntimeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RuntimeContext[{}]", self.name())
    }
}

/// Deployed application enclosing exactly one runtime context.
#[derive(Debug, Clone)]
pub struct ApplicationContext {
    name: String,
    runtime: Arc<RuntimeContext>,
}

impl ApplicationContext {
    pub fn new(name: impl Into<String>, context_path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            runtime: Arc::new(RuntimeContext::new(context_path)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn runtime(&self) -> &Arc<RuntimeContext> {
        &self.runtime
    }
}

impl fmt::Display for ApplicationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ApplicationContext[{}@{}]", self.name, self.runtime.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub body: String,
}

impl Default for Response {
    fn default() -> Self {
        Self {
            status: 200,
            body: String::new(),
        }
    }
}

/// Inbound request as seen by stages and handlers.
///
/// Every method takes `&self`; request-scoped state and the response slot use
/// interior mutability so a request can be shared down the stage chain.
#[derive(Debug)]
pub struct Request {
    context: Arc<RuntimeContext>,
    path: String,
    attributes: RwLock<HashMap<String, String>>,
    response: Mutex<Response>,
}

impl Request {
    pub fn new(context: Arc<RuntimeContext>, path: impl Into<String>) -> Self {
        Self {
            context,
            path: path.into(),
            attributes: RwLock::new(HashMap::new()),
            response: Mutex::new(Response::default()),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn context(&self) -> &Arc<RuntimeContext> {
        &self.context
    }

    pub fn attribute(&self, key: &str) -> Option<String> {
        self.attributes.read().get(key).cloned()
    }

    pub fn set_attribute(&self, key: impl Into<String>, value: impl Into<String>) {
        self.attributes.write().insert(key.into(), value.into());
    }

    pub fn respond(&self, status: u16, body: impl Into<String>) {
        let mut response = self.response.lock();
        response.status = status;
        response.body = body.into();
    }

    pub fn response(&self) -> Response {
        self.response.lock().clone()
    }
}

/// Remainder of the pipeline after the current stage.
pub trait Chain {
    fn proceed(&mut self, request: &Request) -> UnitResult;
}

/// Context object a lifecycle notification refers to.
#[derive(Debug, Clone, Copy)]
pub enum LifecycleSubject<'a> {
    Runtime(&'a RuntimeContext),
    Application(&'a ApplicationContext),
}

impl<'a> LifecycleSubject<'a> {
    /// Runtime context associated with the subject.
    pub fn runtime(&self) -> &'a RuntimeContext {
        match self {
            LifecycleSubject::Runtime(context) => context,
            LifecycleSubject::Application(app) => app.runtime(),
        }
    }
}

impl fmt::Display for LifecycleSubject<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleSubject::Runtime(context) => fmt::Display::fmt(context, f),
            LifecycleSubject::Application(app) => fmt::Display::fmt(app, f),
        }
    }
}

/// Wrap-on-construction hooks, called once per unit before the host installs it.
pub trait WrapHooks: Send + Sync {
    fn wrap_stage(&self, stage: Arc<dyn PipelineStage>) -> Arc<dyn PipelineStage>;
    fn wrap_handler(&self, handler: Arc<dyn RequestHandler>) -> Arc<dyn RequestHandler>;
    fn wrap_config_step(&self, step: Arc<dyn ConfigStep>) -> Arc<dyn ConfigStep>;
}

/// Called once per inbound request before any stage runs.
pub trait RequestHooks: Send + Sync {
    fn on_request_begin(&self, request: &Request);
}

/// Host lifecycle notifications for runtime and application contexts.
pub trait LifecycleListener: Send + Sync {
    fn lifecycle_starting(&self, subject: LifecycleSubject<'_>);
    fn lifecycle_started(&self, subject: LifecycleSubject<'_>);
    fn lifecycle_failed(&self, _subject: LifecycleSubject<'_>, _cause: &Failure) {}
    fn lifecycle_stopping(&self, _subject: LifecycleSubject<'_>) {}
    fn lifecycle_stopped(&self, _subject: LifecycleSubject<'_>) {}
}

/// A server connector accepting request hooks.
pub trait ConnectorTarget {
    fn name(&self) -> &str;
    /// Only network connectors carry inbound requests worth correlating.
    fn is_network(&self) -> bool;
    fn add_request_hooks(&mut self, hooks: Arc<dyn RequestHooks>);
}

/// A runtime or application context accepting wrap hooks and lifecycle listeners.
pub trait ContextTarget {
    fn add_wrap_hooks(&mut self, hooks: Arc<dyn WrapHooks>);
    fn add_lifecycle_listener(&mut self, listener: Arc<dyn LifecycleListener>);
}
