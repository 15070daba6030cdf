//! ---
//! hm_section: "01-core-instrumentation"
//! hm_subsection: "module"
//! hm_type: "source"
//! hm_scope: "code"
//! hm_description: "Transparent timing decorators for stages, handlers and config steps."
//! hm_version: "v0.0.0-prealpha"
//! hm_owner: "tbd"
//! ---
//! Timing decorator.
//!
//! One generic [`TimingDecorator`] serves all three unit kinds. Each call is
//! bracketed by an [`ExitScope`] guard: the closing event is emitted when the
//! guard drops, so it fires on a normal return, on an `Err` return and while
//! unwinding from a panic in the delegate. The delegate's result is handed
//! back untouched.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use hostmetrics_common::time::{elapsed_since, monotonic_now};

use crate::events::EventKind;
use crate::failure::{Failure, UnitResult};
use crate::host::{ApplicationContext, Chain, Request, RuntimeContext};
use crate::listener::EventSink;
use crate::unit::{
    ConfigPhase, ConfigStep, ConfigStepKind, HandlerKind, Layer, PipelineStage, RequestHandler,
    StageKind, UnitKind,
};

pub struct TimingDecorator<K: UnitKind> {
    delegate: Arc<K::Unit>,
    sink: Arc<EventSink>,
}

impl<K: UnitKind> TimingDecorator<K> {
    pub fn new(delegate: Arc<K::Unit>, sink: Arc<EventSink>) -> Self {
        Self { delegate, sink }
    }

    pub fn delegate(&self) -> &Arc<K::Unit> {
        &self.delegate
    }

    /// Runs `call` between `enter` and `exit`, timing it on the monotonic clock.
    fn observe<T>(
        &self,
        enter: impl FnOnce(),
        call: impl FnOnce() -> UnitResult<T>,
        exit: impl FnOnce(Duration, Option<&Failure>),
    ) -> UnitResult<T> {
        let mut scope = ExitScope::new(exit);
        enter();
        let result = call();
        scope.complete(result.as_ref().err());
        drop(scope);
        result
    }
}

impl<K: UnitKind> fmt::Debug for TimingDecorator<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimingDecorator")
            .field("kind", &K::CATEGORY)
            .field("delegate", &K::name(&*self.delegate))
            .finish()
    }
}

/// Emits the closing event of a bracketed call when dropped.
struct ExitScope<F>
where
    F: FnOnce(Duration, Option<&Failure>),
{
    start: Instant,
    exit: Option<F>,
    outcome: Option<Option<Failure>>,
}

impl<F> ExitScope<F>
where
    F: FnOnce(Duration, Option<&Failure>),
{
    fn new(exit: F) -> Self {
        Self {
            start: monotonic_now(),
            exit: Some(exit),
            outcome: None,
        }
    }

    fn complete(&mut self, failure: Option<&Failure>) {
        self.outcome = Some(failure.cloned());
    }
}

impl<F> Drop for ExitScope<F>
where
    F: FnOnce(Duration, Option<&Failure>),
{
    fn drop(&mut self) {
        let duration = elapsed_since(self.start);
        let Some(exit) = self.exit.take() else {
            return;
        };
        match self.outcome.take() {
            Some(failure) => exit(duration, failure.as_ref()),
            None => {
                let interrupted = Failure::interrupted();
                if thread::panicking() {
                    // A second panic here would abort; the delegate's unwind wins.
                    let _ = catch_unwind(AssertUnwindSafe(|| exit(duration, Some(&interrupted))));
                } else {
                    exit(duration, Some(&interrupted));
                }
            }
        }
    }
}

impl PipelineStage for TimingDecorator<StageKind> {
    fn name(&self) -> &str {
        self.delegate.name()
    }

    fn layer(&self) -> Layer<'_, dyn PipelineStage> {
        Layer::Timing(&self.delegate)
    }

    fn init(&self, context: &RuntimeContext) -> UnitResult {
        let stage = &*self.delegate;
        self.observe(
            || self.sink.base(EventKind::StageStarting, |l| l.on_stage_starting(context, stage)),
            || stage.init(context),
            |duration, failure| {
                self.sink.base(EventKind::StageReady, |l| {
                    l.on_stage_ready(context, stage, duration, failure)
                })
            },
        )
    }

    fn process(&self, request: &Request, chain: &mut dyn Chain) -> UnitResult {
        let stage = &*self.delegate;
        let context: &RuntimeContext = request.context();
        self.observe(
            || {
                self.sink.base(EventKind::StageEnter, |l| {
                    l.on_stage_enter(context, stage, request)
                })
            },
            || stage.process(request, chain),
            |duration, failure| {
                self.sink.base(EventKind::StageExit, |l| {
                    l.on_stage_exit(context, stage, request, duration, failure)
                })
            },
        )
    }
}

impl RequestHandler for TimingDecorator<HandlerKind> {
    fn name(&self) -> &str {
        self.delegate.name()
    }

    fn layer(&self) -> Layer<'_, dyn RequestHandler> {
        Layer::Timing(&self.delegate)
    }

    fn init(&self, context: &RuntimeContext) -> UnitResult {
        let handler = &*self.delegate;
        self.observe(
            || {
                self.sink.base(EventKind::HandlerStarting, |l| {
                    l.on_handler_starting(context, handler)
                })
            },
            || handler.init(context),
            |duration, failure| {
                self.sink.base(EventKind::HandlerReady, |l| {
                    l.on_handler_ready(context, handler, duration, failure)
                })
            },
        )
    }

    fn service(&self, request: &Request) -> UnitResult {
        let handler = &*self.delegate;
        let context: &RuntimeContext = request.context();
        self.observe(
            || {
                self.sink.base(EventKind::HandlerEnter, |l| {
                    l.on_handler_enter(context, handler, request)
                })
            },
            || handler.service(request),
            |duration, failure| {
                self.sink.base(EventKind::HandlerExit, |l| {
                    l.on_handler_exit(context, handler, request, duration, failure)
                })
            },
        )
    }
}

impl ConfigStep for TimingDecorator<ConfigStepKind> {
    fn name(&self) -> &str {
        self.delegate.name()
    }

    fn layer(&self) -> Layer<'_, dyn ConfigStep> {
        Layer::Timing(&self.delegate)
    }

    fn configure(&self, app: &ApplicationContext, phase: ConfigPhase) -> UnitResult {
        let step = &*self.delegate;
        self.observe(
            || {
                self.sink.extended(EventKind::ConfigStepStart, |l| {
                    l.on_config_step_start(app, step, phase)
                })
            },
            || step.configure(app, phase),
            |duration, failure| {
                self.sink.extended(EventKind::ConfigStepFinish, |l| {
                    l.on_config_step_finish(app, step, phase, duration, failure)
                })
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use hostmetrics_common::config::ListenerPanicPolicy;

    use super::*;
    use crate::events::{AppMetricsListener, MetricsListener};
    use crate::listener::Listener;

    #[derive(Default)]
    struct Journal {
        entries: Mutex<Vec<(String, Option<Duration>, Option<Failure>)>>,
        panic_on_enter: bool,
    }

    impl Journal {
        fn push(&self, label: &str, duration: Option<Duration>, failure: Option<&Failure>) {
            self.entries
                .lock()
                .push((label.to_string(), duration, failure.cloned()));
        }

        fn labels(&self) -> Vec<String> {
            self.entries.lock().iter().map(|(label, _, _)| label.clone()).collect()
        }
    }

    impl MetricsListener for Journal {
        fn on_context_starting(&self, _: &RuntimeContext) {}
        fn on_context_ready(&self, _: &RuntimeContext) {}
        fn on_stage_starting(&self, _: &RuntimeContext, _: &dyn PipelineStage) {
            self.push("stage-starting", None, None);
        }
        fn on_stage_ready(&self, _: &RuntimeContext, _: &dyn PipelineStage, d: Duration, f: Option<&Failure>) {
            self.push("stage-ready", Some(d), f);
        }
        fn on_stage_enter(&self, _: &RuntimeContext, _: &dyn PipelineStage, _: &Request) {
            self.push("stage-enter", None, None);
        }
        fn on_stage_exit(&self, _: &RuntimeContext, _: &dyn PipelineStage, _: &Request, d: Duration, f: Option<&Failure>) {
            self.push("stage-exit", Some(d), f);
        }
        fn on_handler_starting(&self, _: &RuntimeContext, _: &dyn RequestHandler) {
            self.push("handler-starting", None, None);
        }
        fn on_handler_ready(&self, _: &RuntimeContext, _: &dyn RequestHandler, d: Duration, f: Option<&Failure>) {
            self.push("handler-ready", Some(d), f);
        }
        fn on_handler_enter(&self, _: &RuntimeContext, _: &dyn RequestHandler, _: &Request) {
            if self.panic_on_enter {
                panic!("listener rejected enter");
            }
            self.push("handler-enter", None, None);
        }
        fn on_handler_exit(&self, _: &RuntimeContext, _: &dyn RequestHandler, _: &Request, d: Duration, f: Option<&Failure>) {
            self.push("handler-exit", Some(d), f);
        }
    }

    impl AppMetricsListener for Journal {
        fn on_config_step_start(&self, _: &ApplicationContext, _: &dyn ConfigStep, phase: ConfigPhase) {
            self.push(&format!("config-step-start:{phase}"), None, None);
        }
        fn on_config_step_finish(&self, _: &ApplicationContext, _: &dyn ConfigStep, phase: ConfigPhase, d: Duration, f: Option<&Failure>) {
            self.push(&format!("config-step-finish:{phase}"), Some(d), f);
        }
        fn on_application_starting(&self, _: &ApplicationContext) {}
        fn on_application_ready(&self, _: &ApplicationContext) {}
    }

    struct Scripted {
        failure: Option<Failure>,
        panics: bool,
    }

    impl RequestHandler for Scripted {
        fn init(&self, _: &RuntimeContext) -> UnitResult {
            match &self.failure {
                Some(failure) => Err(failure.clone()),
                None => Ok(()),
            }
        }

        fn service(&self, request: &Request) -> UnitResult {
            if self.panics {
                panic!("handler blew up");
            }
            request.respond(201, "created");
            match &self.failure {
                Some(failure) => Err(failure.clone()),
                None => Ok(()),
            }
        }
    }

    struct Step;

    impl ConfigStep for Step {
        fn configure(&self, _: &ApplicationContext, _: ConfigPhase) -> UnitResult {
            Ok(())
        }
    }

    fn sink(journal: &Arc<Journal>, extended: bool) -> Arc<EventSink> {
        let listener = if extended {
            Listener::extended(journal.clone())
        } else {
            Listener::base(journal.clone())
        };
        Arc::new(EventSink::new(listener, ListenerPanicPolicy::Propagate))
    }

    fn handler(failure: Option<Failure>, panics: bool, sink: Arc<EventSink>) -> TimingDecorator<HandlerKind> {
        TimingDecorator::<HandlerKind>::new(Arc::new(Scripted { failure, panics }), sink)
    }

    fn request() -> Request {
        Request::new(Arc::new(RuntimeContext::new("/shop")), "/cart")
    }

    #[test]
    fn successful_service_is_bracketed_and_untouched() {
        let journal = Arc::new(Journal::default());
        let decorated = handler(None, false, sink(&journal, false));
        let request = request();
        decorated.service(&request).unwrap();
        assert_eq!(journal.labels(), ["handler-enter", "handler-exit"]);
        let entries = journal.entries.lock();
        assert!(entries[1].1.is_some());
        assert!(entries[1].2.is_none());
        assert_eq!(request.response().status, 201);
    }

    #[test]
    fn service_failure_reaches_caller_and_exit_event_unchanged() {
        let journal = Arc::new(Journal::default());
        let failure = Failure::msg("cart unavailable");
        let decorated = handler(Some(failure.clone()), false, sink(&journal, false));
        let returned = decorated.service(&request()).unwrap_err();
        assert!(returned.same_as(&failure));
        let entries = journal.entries.lock();
        let reported = entries[1].2.as_ref().expect("exit carries the failure");
        assert!(reported.same_as(&failure));
    }

    #[test]
    fn init_failure_still_reports_ready_with_duration() {
        let journal = Arc::new(Journal::default());
        let failure = Failure::msg("missing template");
        let decorated = handler(Some(failure.clone()), false, sink(&journal, false));
        let returned = decorated.init(&RuntimeContext::new("/shop")).unwrap_err();
        assert!(returned.same_as(&failure));
        assert_eq!(journal.labels(), ["handler-starting", "handler-ready"]);
        let entries = journal.entries.lock();
        assert!(entries[1].1.is_some());
        assert!(entries[1].2.as_ref().is_some_and(|f| f.same_as(&failure)));
    }

    #[test]
    fn unwinding_delegate_still_closes_the_pair() {
        let journal = Arc::new(Journal::default());
        let decorated = handler(None, true, sink(&journal, false));
        let request = request();
        let outcome = catch_unwind(AssertUnwindSafe(|| decorated.service(&request)));
        assert!(outcome.is_err(), "panic continues to the caller");
        assert_eq!(journal.labels(), ["handler-enter", "handler-exit"]);
        let entries = journal.entries.lock();
        assert!(entries[1].2.as_ref().is_some_and(Failure::is_interrupted));
    }

    #[test]
    fn enter_callback_panic_closes_the_pair_as_interrupted() {
        let journal = Arc::new(Journal {
            panic_on_enter: true,
            ..Journal::default()
        });
        let decorated = handler(None, false, sink(&journal, false));
        let request = request();
        let outcome = catch_unwind(AssertUnwindSafe(|| decorated.service(&request)));
        assert!(outcome.is_err());
        assert_eq!(journal.labels(), ["handler-exit"]);
        let entries = journal.entries.lock();
        assert!(entries[0].2.as_ref().is_some_and(Failure::is_interrupted));
        assert_ne!(request.response().status, 201, "delegate never ran");
    }

    #[test]
    fn decorator_is_transparent_about_name_and_marks_its_layer() {
        let journal = Arc::new(Journal::default());
        let decorated = handler(None, false, sink(&journal, false));
        assert!(decorated.name().ends_with("Scripted"));
        assert!(matches!(decorated.layer(), Layer::Timing(_)));
    }

    #[test]
    fn config_step_events_follow_listener_capability() {
        let journal = Arc::new(Journal::default());
        let app = ApplicationContext::new("shop", "/shop");
        let base_only =
            TimingDecorator::<ConfigStepKind>::new(Arc::new(Step), sink(&journal, false));
        base_only.configure(&app, ConfigPhase::Pre).unwrap();
        assert!(journal.labels().is_empty());

        let extended =
            TimingDecorator::<ConfigStepKind>::new(Arc::new(Step), sink(&journal, true));
        extended.configure(&app, ConfigPhase::Main).unwrap();
        assert_eq!(
            journal.labels(),
            ["config-step-start:main", "config-step-finish:main"]
        );
    }

    #[test]
    fn stage_init_failure_still_reports_ready_with_duration() {
        struct Unbuildable(Failure);
        impl PipelineStage for Unbuildable {
            fn init(&self, _: &RuntimeContext) -> UnitResult {
                Err(self.0.clone())
            }

            fn process(&self, request: &Request, chain: &mut dyn Chain) -> UnitResult {
                chain.proceed(request)
            }
        }

        let journal = Arc::new(Journal::default());
        let failure = Failure::msg("rate table unreadable");
        let decorated = TimingDecorator::<StageKind>::new(
            Arc::new(Unbuildable(failure.clone())),
            sink(&journal, false),
        );
        let returned = decorated.init(&RuntimeContext::new("/shop")).unwrap_err();
        assert!(returned.same_as(&failure));
        assert_eq!(journal.labels(), ["stage-starting", "stage-ready"]);
        let entries = journal.entries.lock();
        assert!(entries[1].1.is_some());
        assert!(entries[1].2.as_ref().is_some_and(|f| f.same_as(&failure)));
    }

    #[test]
    fn stage_process_brackets_the_rest_of_the_chain() {
        struct Pass;
        impl PipelineStage for Pass {
            fn process(&self, request: &Request, chain: &mut dyn Chain) -> UnitResult {
                chain.proceed(request)
            }
        }
        struct Tail<'a>(&'a Journal);
        impl Chain for Tail<'_> {
            fn proceed(&mut self, _: &Request) -> UnitResult {
                self.0.push("tail", None, None);
                Ok(())
            }
        }

        let journal = Arc::new(Journal::default());
        let decorated =
            TimingDecorator::<StageKind>::new(Arc::new(Pass), sink(&journal, false));
        decorated.process(&request(), &mut Tail(&journal)).unwrap();
        assert_eq!(journal.labels(), ["stage-enter", "tail", "stage-exit"]);
    }
}
