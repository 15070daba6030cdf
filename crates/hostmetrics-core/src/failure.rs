//! ---
//! hm_section: "01-core-instrumentation"
//! hm_subsection: "module"
//! hm_type: "source"
//! hm_scope: "code"
//! hm_description: "Failure handles shared between instrumented calls and events."
//! hm_version: "v0.0.0-prealpha"
//! hm_owner: "tbd"
//! ---
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// Result type returned by every unit call.
pub type UnitResult<T = ()> = std::result::Result<T, Failure>;

/// Failures raised by units or synthesised by the decorators.
#[derive(Debug, Error)]
pub enum UnitError {
    #[error("{0}")]
    Message(String),
    /// The delegate call unwound instead of returning.
    #[error("unit call interrupted before completion")]
    Interrupted,
}

/// Shared handle to a unit failure.
///
/// Clones point at the same underlying error, so the value handed back to the
/// caller and the one attached to an exit event can be compared with
/// [`Failure::same_as`].
#[derive(Clone)]
pub struct Failure {
    inner: Arc<dyn StdError + Send + Sync + 'static>,
}

impl Failure {
    pub fn new<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(error),
        }
    }

    pub fn msg(message: impl Into<String>) -> Self {
        Self::new(UnitError::Message(message.into()))
    }

    pub fn interrupted() -> Self {
        Self::new(UnitError::Interrupted)
    }

    /// Identity comparison: true only for clones of the same failure.
    pub fn same_as(&self, other: &Failure) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self.downcast_ref::<UnitError>(), Some(UnitError::Interrupted))
    }

    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: StdError + 'static,
    {
        self.inner.downcast_ref::<E>()
    }

    pub fn get_ref(&self) -> &(dyn StdError + Send + Sync + 'static) {
        self.inner.as_ref()
    }
}

impl fmt::Debug for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.inner, f)
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.inner, f)
    }
}

impl StdError for Failure {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.inner.source()
    }
}

impl From<UnitError> for Failure {
    fn from(error: UnitError) -> Self {
        Self::new(error)
    }
}

impl From<std::io::Error> for Failure {
    fn from(error: std::io::Error) -> Self {
        Self::new(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("template {name} missing")]
    struct TemplateMissing {
        name: String,
    }

    #[test]
    fn clones_share_identity_but_equal_messages_do_not() {
        let failure = Failure::msg("boom");
        let clone = failure.clone();
        let lookalike = Failure::msg("boom");
        assert!(failure.same_as(&clone));
        assert!(!failure.same_as(&lookalike));
        assert_eq!(failure.to_string(), lookalike.to_string());
    }

    #[test]
    fn concrete_error_survives_the_handle() {
        let failure = Failure::new(TemplateMissing {
            name: "index.html".into(),
        });
        let inner = failure
            .downcast_ref::<TemplateMissing>()
            .expect("concrete error type is preserved");
        assert_eq!(inner.name, "index.html");
        assert_eq!(failure.to_string(), "template index.html missing");
        assert!(!failure.is_interrupted());
        assert!(Failure::interrupted().is_interrupted());
    }
}
