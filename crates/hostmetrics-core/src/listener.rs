//! ---
//! hm_section: "01-core-instrumentation"
//! hm_subsection: "module"
//! hm_type: "source"
//! hm_scope: "code"
//! hm_description: "Installed listener selection and guarded event delivery."
//! hm_version: "v0.0.0-prealpha"
//! hm_owner: "tbd"
//! ---
use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use hostmetrics_common::config::ListenerPanicPolicy;
use hostmetrics_logging::hm_warn;

use crate::events::{AppMetricsListener, EventKind, MetricsListener};

/// The installed listener, with its capability decided once at construction.
#[derive(Clone)]
pub enum Listener {
    Base(Arc<dyn MetricsListener>),
    Extended {
        base: Arc<dyn MetricsListener>,
        app: Arc<dyn AppMetricsListener>,
    },
}

impl Listener {
    pub fn base<L>(listener: Arc<L>) -> Self
    where
        L: MetricsListener + 'static,
    {
        Listener::Base(listener)
    }

    pub fn extended<L>(listener: Arc<L>) -> Self
    where
        L: AppMetricsListener + 'static,
    {
        Listener::Extended {
            base: listener.clone(),
            app: listener,
        }
    }

    pub fn is_extended(&self) -> bool {
        matches!(self, Listener::Extended { .. })
    }

    pub fn as_base(&self) -> &dyn MetricsListener {
        match self {
            Listener::Base(base) | Listener::Extended { base, .. } => base.as_ref(),
        }
    }

    pub fn as_extended(&self) -> Option<&dyn AppMetricsListener> {
        match self {
            Listener::Base(_) => None,
            Listener::Extended { app, .. } => Some(app.as_ref()),
        }
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Listener::Base(_) => f.write_str("Listener::Base"),
            Listener::Extended { .. } => f.write_str("Listener::Extended"),
        }
    }
}

/// Delivers events to the installed listener under the configured panic policy.
///
/// Shared by every decorator, the dispatcher and the router. No lock is held
/// around listener calls.
#[derive(Debug)]
pub struct EventSink {
    listener: Listener,
    policy: ListenerPanicPolicy,
}

impl EventSink {
    pub fn new(listener: Listener, policy: ListenerPanicPolicy) -> Self {
        Self { listener, policy }
    }

    pub fn listener(&self) -> &Listener {
        &self.listener
    }

    pub fn policy(&self) -> ListenerPanicPolicy {
        self.policy
    }

    pub fn is_extended(&self) -> bool {
        self.listener.is_extended()
    }

    pub fn base(&self, kind: EventKind, emit: impl FnOnce(&dyn MetricsListener)) {
        let listener = self.listener.as_base();
        self.deliver(kind, || emit(listener));
    }

    /// No-op when the installed listener only implements the base shape.
    pub fn extended(&self, kind: EventKind, emit: impl FnOnce(&dyn AppMetricsListener)) {
        if let Some(listener) = self.listener.as_extended() {
            self.deliver(kind, || emit(listener));
        }
    }

    fn deliver(&self, kind: EventKind, emit: impl FnOnce()) {
        match self.policy {
            ListenerPanicPolicy::Propagate => emit(),
            ListenerPanicPolicy::Isolate => {
                if let Err(payload) = catch_unwind(AssertUnwindSafe(emit)) {
                    hm_warn!(
                        "listener panicked while handling {}: {}",
                        kind,
                        panic_message(&*payload)
                    );
                }
            }
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use parking_lot::Mutex;

    use super::*;
    use crate::failure::Failure;
    use crate::host::{ApplicationContext, Request, RuntimeContext};
    use crate::unit::{ConfigPhase, ConfigStep, PipelineStage, RequestHandler};

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<&'static str>>,
        explode: bool,
    }

    impl Recorder {
        fn push(&self, label: &'static str) {
            if self.explode {
                panic!("recorder exploded on {label}");
            }
            self.seen.lock().push(label);
        }
    }

    impl MetricsListener for Recorder {
        fn on_context_starting(&self, _: &RuntimeContext) {
            self.push("context-starting");
        }
        fn on_context_ready(&self, _: &RuntimeContext) {
            self.push("context-ready");
        }
        fn on_stage_starting(&self, _: &RuntimeContext, _: &dyn PipelineStage) {}
        fn on_stage_ready(&self, _: &RuntimeContext, _: &dyn PipelineStage, _: Duration, _: Option<&Failure>) {}
        fn on_stage_enter(&self, _: &RuntimeContext, _: &dyn PipelineStage, _: &Request) {}
        fn on_stage_exit(&self, _: &RuntimeContext, _: &dyn PipelineStage, _: &Request, _: Duration, _: Option<&Failure>) {}
        fn on_handler_starting(&self, _: &RuntimeContext, _: &dyn RequestHandler) {}
        fn on_handler_ready(&self, _: &RuntimeContext, _: &dyn RequestHandler, _: Duration, _: Option<&Failure>) {}
        fn on_handler_enter(&self, _: &RuntimeContext, _: &dyn RequestHandler, _: &Request) {}
        fn on_handler_exit(&self, _: &RuntimeContext, _: &dyn RequestHandler, _: &Request, _: Duration, _: Option<&Failure>) {}
    }

    impl AppMetricsListener for Recorder {
        fn on_config_step_start(&self, _: &ApplicationContext, _: &dyn ConfigStep, _: ConfigPhase) {}
        fn on_config_step_finish(&self, _: &ApplicationContext, _: &dyn ConfigStep, _: ConfigPhase, _: Duration, _: Option<&Failure>) {}
        fn on_application_starting(&self, _: &ApplicationContext) {
            self.push("application-starting");
        }
        fn on_application_ready(&self, _: &ApplicationContext) {}
    }

    #[test]
    fn base_listener_never_sees_extended_calls() {
        let recorder = Arc::new(Recorder::default());
        let sink = EventSink::new(Listener::base(recorder.clone()), ListenerPanicPolicy::Propagate);
        let app = ApplicationContext::new("shop", "/shop");
        sink.extended(EventKind::ApplicationStarting, |l| l.on_application_starting(&app));
        sink.base(EventKind::ContextStarting, |l| l.on_context_starting(app.runtime()));
        assert!(!sink.is_extended());
        assert_eq!(*recorder.seen.lock(), vec!["context-starting"]);
    }

    #[test]
    fn extended_listener_receives_both_shapes() {
        let recorder = Arc::new(Recorder::default());
        let sink = EventSink::new(Listener::extended(recorder.clone()), ListenerPanicPolicy::Propagate);
        let app = ApplicationContext::new("shop", "/shop");
        sink.extended(EventKind::ApplicationStarting, |l| l.on_application_starting(&app));
        sink.base(EventKind::ContextStarting, |l| l.on_context_starting(app.runtime()));
        assert_eq!(
            *recorder.seen.lock(),
            vec!["application-starting", "context-starting"]
        );
    }

    #[test]
    fn isolate_policy_swallows_listener_panics() {
        let recorder = Arc::new(Recorder {
            explode: true,
            ..Recorder::default()
        });
        let sink = EventSink::new(Listener::base(recorder), ListenerPanicPolicy::Isolate);
        let context = RuntimeContext::new("/shop");
        sink.base(EventKind::ContextReady, |l| l.on_context_ready(&context));
    }

    #[test]
    fn propagate_policy_lets_listener_panics_through() {
        let recorder = Arc::new(Recorder {
            explode: true,
            ..Recorder::default()
        });
        let sink = EventSink::new(Listener::base(recorder), ListenerPanicPolicy::Propagate);
        let context = RuntimeContext::new("/shop");
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            sink.base(EventKind::ContextReady, |l| l.on_context_ready(&context));
        }));
        let payload = outcome.expect_err("panic should reach the caller");
        assert_eq!(panic_message(&*payload), "recorder exploded on context-ready");
    }
}
