#![warn(missing_docs)]
//! Time-ordered k-way merge over live, cursor-backed row sources.
//!
//! Each registered source is a forward-only cursor over one table whose rows
//! arrive in event-time order. A [`MergeRegistry`] keeps one unread row per
//! source and always advances the source whose pending row is earliest, so the
//! combined output is ordered by event time without loading any table into
//! memory.

mod error;
mod option;

pub(crate) mod observability;

/// Registry, selection and source lifecycle.
pub mod merge;

/// Convenience re-exports.
pub mod prelude;

/// Rows and cell values.
pub mod row;

/// Row sources and the factories that open them.
pub mod source;

/// Event-time parsing.
pub mod timestamp;

pub use crate::{
    error::MergeError,
    merge::{Merge, MergeRegistry},
    option::MergeOption,
};
