use thiserror::Error;

use crate::source::SourceError;

/// Caller-visible failures of registry operations.
///
/// Fetch failures during a merge are not reported here: they retire the
/// affected source and surface through [`crate::merge::Continuation::Failed`].
#[derive(Debug, Error)]
pub enum MergeError {
    /// A source with this name is already registered.
    #[error("source '{name}' is already registered")]
    DuplicateRegistration {
        /// Offending name.
        name: String,
    },
    /// The source could not be opened; it was not registered.
    #[error("failed to open source '{name}' on table '{table}': {source}")]
    SourceOpen {
        /// Source name.
        name: String,
        /// Table the factory tried to open.
        table: String,
        /// Underlying failure.
        #[source]
        source: SourceError,
    },
    /// No source holds a pending row.
    #[error("no source has a pending row")]
    EmptySelection,
    /// No source with this name is registered.
    #[error("unknown source '{name}'")]
    UnknownSource {
        /// Requested name.
        name: String,
    },
    /// Sources cannot be added once rows have been pulled.
    #[error("cannot register '{name}' after the merge has started")]
    RegistrationClosed {
        /// Rejected name.
        name: String,
    },
    /// The registry has been closed.
    #[error("registry is closed")]
    Closed,
}
