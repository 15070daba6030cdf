//! ---
//! hm_section: "01-core-instrumentation"
//! hm_subsection: "module"
//! hm_type: "source"
//! hm_scope: "code"
//! hm_description: "Idempotent wrap hooks and request correlation."
//! hm_version: "v0.0.0-prealpha"
//! hm_owner: "tbd"
//! ---
//! Wrap dispatcher.
//!
//! Each wrap hook walks the candidate's decorator chain through
//! [`Layer`] before adding a timing layer. A chain holds at most one
//! [`TimingDecorator`] per unit kind; a chain that cannot be walked to its
//! innermost delegate is left unwrapped.

use std::sync::Arc;

use hostmetrics_common::config::InstrumentationConfig;
use hostmetrics_logging::{hm_debug, hm_info, hm_warn, LogContext};
use uuid::Uuid;

use crate::decorator::TimingDecorator;
use crate::host::{Request, RequestHooks, WrapHooks};
use crate::listener::EventSink;
use crate::unit::{
    ConfigStep, ConfigStepKind, HandlerKind, Layer, PipelineStage, RequestHandler, StageKind,
    UnitCategory, UnitKind,
};

/// Deepest decorator chain walked before giving up.
pub const MAX_CHAIN_DEPTH: usize = 64;

/// Result of walking a candidate's decorator chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainWalk {
    /// Reached the innermost delegate without meeting a timing layer.
    Clean { depth: usize },
    /// A timing layer of this kind is already present.
    Instrumented { depth: usize },
    /// An opaque decorator or an overly deep chain.
    Opaque { depth: usize },
}

/// Walk `candidate` toward its innermost delegate.
pub fn walk_chain<K: UnitKind>(candidate: &Arc<K::Unit>) -> ChainWalk {
    let mut current: &Arc<K::Unit> = candidate;
    for depth in 0..MAX_CHAIN_DEPTH {
        match K::layer(&**current) {
            Layer::Delegate => return ChainWalk::Clean { depth },
            Layer::Timing(_) => return ChainWalk::Instrumented { depth },
            Layer::Unrecognized => return ChainWalk::Opaque { depth },
            Layer::Decorator(inner) => current = inner,
        }
    }
    ChainWalk::Opaque {
        depth: MAX_CHAIN_DEPTH,
    }
}

/// What a wrap hook did with its candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrapDecision {
    Wrapped,
    AlreadyInstrumented,
    FailedClosed,
    Disabled,
}

impl WrapDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            WrapDecision::Wrapped => "wrapped",
            WrapDecision::AlreadyInstrumented => "already instrumented",
            WrapDecision::FailedClosed => "unrecognized decorator chain, left unwrapped",
            WrapDecision::Disabled => "instrumentation disabled for this kind",
        }
    }
}

#[derive(Debug)]
pub struct WrapDispatcher {
    sink: Arc<EventSink>,
    config: InstrumentationConfig,
}

impl WrapDispatcher {
    pub fn new(sink: Arc<EventSink>, config: InstrumentationConfig) -> Self {
        Self { sink, config }
    }

    pub fn config(&self) -> &InstrumentationConfig {
        &self.config
    }

    /// Generic wrap hook shared by all three kinds.
    pub fn wrap<K: UnitKind>(&self, candidate: Arc<K::Unit>) -> (Arc<K::Unit>, WrapDecision) {
        if !self.kind_enabled(K::CATEGORY) {
            self.log_decision::<K>(&candidate, WrapDecision::Disabled, 0);
            return (candidate, WrapDecision::Disabled);
        }
        let (decision, depth) = match walk_chain::<K>(&candidate) {
            ChainWalk::Clean { depth } => (WrapDecision::Wrapped, depth),
            ChainWalk::Instrumented { depth } => (WrapDecision::AlreadyInstrumented, depth),
            ChainWalk::Opaque { depth } => (WrapDecision::FailedClosed, depth),
        };
        self.log_decision::<K>(&candidate, decision, depth);
        match decision {
            WrapDecision::Wrapped => {
                let decorated = K::decorate(TimingDecorator::new(candidate, self.sink.clone()));
                (decorated, decision)
            }
            _ => (candidate, decision),
        }
    }

    fn kind_enabled(&self, category: UnitCategory) -> bool {
        match category {
            UnitCategory::PipelineStage => self.config.stages,
            UnitCategory::RequestHandler => self.config.handlers,
            // Config-step events only exist on the extended shape.
            UnitCategory::ConfigStep => self.config.config_steps && self.sink.is_extended(),
        }
    }

    fn log_decision<K: UnitKind>(&self, candidate: &Arc<K::Unit>, decision: WrapDecision, depth: usize) {
        let name = K::name(&**candidate);
        let ctx = LogContext::new().with_unit(name);
        if decision == WrapDecision::FailedClosed {
            hm_warn!(
                context = ctx,
                "wrap_{}({}): {} at depth {}",
                K::CATEGORY,
                name,
                decision.as_str(),
                depth
            );
        } else if self.config.log_wraps {
            hm_info!(context = ctx, "wrap_{}({}): {}", K::CATEGORY, name, decision.as_str());
        } else {
            hm_debug!(context = ctx, "wrap_{}({}): {}", K::CATEGORY, name, decision.as_str());
        }
    }
}

impl WrapHooks for WrapDispatcher {
    fn wrap_stage(&self, stage: Arc<dyn PipelineStage>) -> Arc<dyn PipelineStage> {
        self.wrap::<StageKind>(stage).0
    }

    fn wrap_handler(&self, handler: Arc<dyn RequestHandler>) -> Arc<dyn RequestHandler> {
        self.wrap::<HandlerKind>(handler).0
    }

    fn wrap_config_step(&self, step: Arc<dyn ConfigStep>) -> Arc<dyn ConfigStep> {
        self.wrap::<ConfigStepKind>(step).0
    }
}

impl RequestHooks for WrapDispatcher {
    /// Stamps a fresh correlation id on every call.
    fn on_request_begin(&self, request: &Request) {
        let id = Uuid::new_v4().to_string();
        tracing::trace!(
            path = request.path(),
            attribute = %self.config.request_id_attribute,
            request_id = %id,
            "request correlation id assigned"
        );
        request.set_attribute(self.config.request_id_attribute.as_str(), id);
    }
}
