//! ---
//! hm_section: "05-configuration-logging"
//! hm_subsection: "module"
//! hm_type: "source"
//! hm_scope: "code"
//! hm_description: "Shared primitives and utilities for the instrumentation layer."
//! hm_version: "v0.0.0-prealpha"
//! hm_owner: "tbd"
//! ---
use std::time::{Duration, Instant};

/// Capture a monotonic instant for elapsed-time measurements.
pub fn monotonic_now() -> Instant {
    Instant::now()
}

/// Elapsed time since `start`, clamped to zero if the clock reports otherwise.
pub fn elapsed_since(start: Instant) -> Duration {
    monotonic_now().saturating_duration_since(start)
}

/// Convert a duration into microseconds, saturating at `u64::MAX`.
pub fn duration_to_micros(duration: Duration) -> u64 {
    duration
        .as_secs()
        .saturating_mul(1_000_000)
        .saturating_add(u64::from(duration.subsec_micros()))
}

/// Convert a duration into nanoseconds, saturating at `u64::MAX`.
pub fn duration_to_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}
