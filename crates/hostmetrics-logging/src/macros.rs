//! ---
//! hm_section: "05-configuration-logging"
//! hm_subsection: "module"
//! hm_type: "source"
//! hm_scope: "code"
//! hm_description: "Structured logging adapters and sinks."
//! hm_version: "v0.0.0-prealpha"
//! hm_owner: "tbd"
//! ---
/// Shared expansion for the level-specific macros below.
#[doc(hidden)]
#[macro_export]
macro_rules! __hm_event {
    ($level:expr, context = $ctx:expr, $($arg:tt)+) => {{
        let ctx = &$ctx;
        $crate::tracing::event!(
            $level,
            context = ctx.context.unwrap_or(""),
            unit = ctx.unit.unwrap_or(""),
            request_id = ctx.request_id.unwrap_or(""),
            phase = ctx.phase.unwrap_or(""),
            message = %format_args!($($arg)+)
        );
    }};
    ($level:expr, $($arg:tt)+) => {{
        $crate::__hm_event!($level, context = $crate::LogContext::default(), $($arg)+)
    }};
}

/// Emit an informational log enriched with instrumentation context.
#[macro_export]
macro_rules! hm_info {
    ($($arg:tt)+) => {
        $crate::__hm_event!($crate::tracing::Level::INFO, $($arg)+)
    };
}

/// Emit a debug log enriched with instrumentation context.
#[macro_export]
macro_rules! hm_debug {
    ($($arg:tt)+) => {
        $crate::__hm_event!($crate::tracing::Level::DEBUG, $($arg)+)
    };
}

/// Emit a warning enriched with instrumentation context.
#[macro_export]
macro_rules! hm_warn {
    ($($arg:tt)+) => {
        $crate::__hm_event!($crate::tracing::Level::WARN, $($arg)+)
    };
}

/// Emit an error log enriched with instrumentation context.
#[macro_export]
macro_rules! hm_error {
    ($($arg:tt)+) => {
        $crate::__hm_event!($crate::tracing::Level::ERROR, $($arg)+)
    };
}
