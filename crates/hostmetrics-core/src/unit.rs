//! ---
//! hm_section: "01-core-instrumentation"
//! hm_subsection: "module"
//! hm_type: "source"
//! hm_scope: "code"
//! hm_description: "Unit kinds, decorator layers and unit identity."
//! hm_version: "v0.0.0-prealpha"
//! hm_owner: "tbd"
//! ---
//! The three kinds of host-managed units and the explicit unwrap operation
//! used to walk decorator chains.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::decorator::TimingDecorator;
use crate::failure::UnitResult;
use crate::host::{ApplicationContext, Chain, Request, RuntimeContext};

/// Phase of application initialisation a config step runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigPhase {
    Pre,
    Main,
    Post,
}

impl ConfigPhase {
    pub const ALL: [ConfigPhase; 3] = [ConfigPhase::Pre, ConfigPhase::Main, ConfigPhase::Post];

    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigPhase::Pre => "pre",
            ConfigPhase::Main => "main",
            ConfigPhase::Post => "post",
        }
    }
}

impl fmt::Display for ConfigPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a unit reveals about itself when a decorator chain is walked.
pub enum Layer<'a, U: ?Sized> {
    /// Innermost delegate; nothing further to unwrap.
    Delegate,
    /// Foreign decorator enclosing another unit of the same kind.
    Decorator(&'a Arc<U>),
    /// Timing decorator installed by this crate.
    Timing(&'a Arc<U>),
    /// Decorator whose inner unit cannot be reached.
    Unrecognized,
}

impl<U: ?Sized> fmt::Debug for Layer<'_, U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Layer::Delegate => "Delegate",
            Layer::Decorator(_) => "Decorator",
            Layer::Timing(_) => "Timing",
            Layer::Unrecognized => "Unrecognized",
        };
        f.write_str(label)
    }
}

/// Filter-style stage invoked in a chain ahead of the handler.
pub trait PipelineStage: Send + Sync {
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    fn layer(&self) -> Layer<'_, dyn PipelineStage> {
        Layer::Delegate
    }

    fn init(&self, _context: &RuntimeContext) -> UnitResult {
        Ok(())
    }

    fn process(&self, request: &Request, chain: &mut dyn Chain) -> UnitResult;
}

/// Terminal unit producing the response for a request.
pub trait RequestHandler: Send + Sync {
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    fn layer(&self) -> Layer<'_, dyn RequestHandler> {
        Layer::Delegate
    }

    fn init(&self, _context: &RuntimeContext) -> UnitResult {
        Ok(())
    }

    fn service(&self, request: &Request) -> UnitResult;
}

/// Application initialisation step, called once per [`ConfigPhase`].
pub trait ConfigStep: Send + Sync {
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    fn layer(&self) -> Layer<'_, dyn ConfigStep> {
        Layer::Delegate
    }

    fn configure(&self, app: &ApplicationContext, phase: ConfigPhase) -> UnitResult;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnitCategory {
    ConfigStep,
    PipelineStage,
    RequestHandler,
}

impl UnitCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitCategory::ConfigStep => "config-step",
            UnitCategory::PipelineStage => "stage",
            UnitCategory::RequestHandler => "handler",
        }
    }
}

impl fmt::Display for UnitCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference identity of a unit instance (its data pointer).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitId(usize);

impl UnitId {
    pub fn of_arc<U: ?Sized>(unit: &Arc<U>) -> Self {
        Self(Arc::as_ptr(unit) as *const () as usize)
    }

    pub fn of_ref<U: ?Sized>(unit: &U) -> Self {
        Self(unit as *const U as *const () as usize)
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Adapter letting the decorator and dispatcher treat the three unit
/// hierarchies through one generic code path.
pub trait UnitKind: Sized + Send + Sync + 'static {
    type Unit: ?Sized + Send + Sync + 'static;

    const CATEGORY: UnitCategory;

    fn layer(unit: &Self::Unit) -> Layer<'_, Self::Unit>;

    fn name(unit: &Self::Unit) -> &str;

    fn decorate(decorator: TimingDecorator<Self>) -> Arc<Self::Unit>;
}

#[derive(Debug)]
pub struct StageKind;

#[derive(Debug)]
pub struct HandlerKind;

#[derive(Debug)]
pub struct ConfigStepKind;

impl UnitKind for StageKind {
    type Unit = dyn PipelineStage;
    const CATEGORY: UnitCategory = UnitCategory::PipelineStage;

    fn layer(unit: &Self::Unit) -> Layer<'_, Self::Unit> {
        unit.layer()
    }

    fn name(unit: &Self::Unit) -> &str {
        unit.name()
    }

    fn decorate(decorator: TimingDecorator<Self>) -> Arc<Self::Unit> {
        Arc::new(decorator)
    }
}

impl UnitKind for HandlerKind {
    type Unit = dyn RequestHandler;
    const CATEGORY: UnitCategory = UnitCategory::RequestHandler;

    fn layer(unit: &Self::Unit) -> Layer<'_, Self::Unit> {
        unit.layer()
    }

    fn name(unit: &Self::Unit) -> &str {
        unit.name()
    }

    fn decorate(decorator: TimingDecorator<Self>) -> Arc<Self::Unit> {
        Arc::new(decorator)
    }
}

impl UnitKind for ConfigStepKind {
    type Unit = dyn ConfigStep;
    const CATEGORY: UnitCategory = UnitCategory::ConfigStep;

    fn layer(unit: &Self::Unit) -> Layer<'_, Self::Unit> {
        unit.layer()
    }

    fn name(unit: &Self::Unit) -> &str {
        unit.name()
    }

    fn decorate(decorator: TimingDecorator<Self>) -> Arc<Self::Unit> {
        Arc::new(decorator)
    }
}
