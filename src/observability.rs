//! Structured log events emitted by the merge and the MySQL sources.
//!
//! Every event goes to target `timeweave` with a `component` (`merge` or
//! `mysql`) and a snake_case `event`. Per-source events add `source` and,
//! where known, `table` and `error`.
//!
//! | event | level | when |
//! |---|---|---|
//! | `source_registered` | info | a source was opened and primed with a row |
//! | `source_primed_empty` | info | the priming fetch hit end of data |
//! | `source_open_failed` | warn | the factory could not open the table |
//! | `fetch_failed` | warn | a priming (`phase = "prime"`) or refill fetch failed |
//! | `source_exhausted` | debug | a refill hit end of data |
//! | `source_retired` | info | a source was closed and removed |
//! | `close_failed` | error | a handle returned an error from `close` |
//! | `registry_closed` | info | every handle has been released |
//! | `scan_opened` | debug | a MySQL scan started (`sql` field) |
//! | `connection_close_failed` | debug | a drained MySQL scan could not close its connection |
//!
//! No subscriber is installed here; the `timeweave` binary sets up a `fmt`
//! subscriber on stderr.

/// Target for all timeweave log events.
pub(crate) const TIMEWEAVE_TARGET: &str = "timeweave";

/// Macro for info-level log events.
///
/// # Example
/// ```ignore
/// log_info!(
///     component = "merge",
///     event = "source_retired",
///     source = %name,
/// );
/// ```
macro_rules! log_info {
    ($($field:tt)*) => {
        ::tracing::info!(target: $crate::observability::TIMEWEAVE_TARGET, $($field)*)
    };
}

/// Macro for debug-level log events.
macro_rules! log_debug {
    ($($field:tt)*) => {
        ::tracing::debug!(target: $crate::observability::TIMEWEAVE_TARGET, $($field)*)
    };
}

/// Macro for warn-level log events.
macro_rules! log_warn {
    ($($field:tt)*) => {
        ::tracing::warn!(target: $crate::observability::TIMEWEAVE_TARGET, $($field)*)
    };
}

/// Macro for error-level log events.
macro_rules! log_error {
    ($($field:tt)*) => {
        ::tracing::error!(target: $crate::observability::TIMEWEAVE_TARGET, $($field)*)
    };
}

pub(crate) use log_debug;
pub(crate) use log_error;
pub(crate) use log_info;
pub(crate) use log_warn;
