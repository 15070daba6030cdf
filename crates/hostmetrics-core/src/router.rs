//! ---
//! hm_section: "01-core-instrumentation"
//! hm_subsection: "module"
//! hm_type: "source"
//! hm_scope: "code"
//! hm_description: "Routes host lifecycle notifications into contract events."
//! hm_version: "v0.0.0-prealpha"
//! hm_owner: "tbd"
//! ---
use std::sync::Arc;

use crate::events::EventKind;
use crate::failure::Failure;
use crate::host::{LifecycleListener, LifecycleSubject};
use crate::listener::EventSink;

/// Forwards `starting`/`started` transitions; every other transition is
/// accepted and dropped.
#[derive(Debug)]
pub struct LifecycleRouter {
    sink: Arc<EventSink>,
}

impl LifecycleRouter {
    pub fn new(sink: Arc<EventSink>) -> Self {
        Self { sink }
    }

    fn ignored(&self, transition: &str, subject: LifecycleSubject<'_>) {
        tracing::trace!(%subject, transition, "lifecycle transition not forwarded");
    }
}

impl LifecycleListener for LifecycleRouter {
    fn lifecycle_starting(&self, subject: LifecycleSubject<'_>) {
        if let LifecycleSubject::Application(app) = subject {
            self.sink
                .extended(EventKind::ApplicationStarting, |l| l.on_application_starting(app));
        }
        let runtime = subject.runtime();
        self.sink
            .base(EventKind::ContextStarting, |l| l.on_context_starting(runtime));
    }

    fn lifecycle_started(&self, subject: LifecycleSubject<'_>) {
        if let LifecycleSubject::Application(app) = subject {
            self.sink
                .extended(EventKind::ApplicationReady, |l| l.on_application_ready(app));
        }
        let runtime = subject.runtime();
        self.sink
            .base(EventKind::ContextReady, |l| l.on_context_ready(runtime));
    }

    fn lifecycle_failed(&self, subject: LifecycleSubject<'_>, cause: &Failure) {
        tracing::trace!(%subject, %cause, "lifecycle failure observed");
        self.ignored("failed", subject);
    }

    fn lifecycle_stopping(&self, subject: LifecycleSubject<'_>) {
        self.ignored("stopping", subject);
    }

    fn lifecycle_stopped(&self, subject: LifecycleSubject<'_>) {
        self.ignored("stopped", subject);
    }
}
