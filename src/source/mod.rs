//! Row sources consumed by the merge.
//!
//! A [`RowSource`] is a forward-only cursor over one table. The merge never
//! rewinds a source and never asks for more than one row ahead of what it has
//! already handed out. Sources are opened through a [`SourceFactory`], which
//! owns whatever connection parameters the backend needs.

mod descriptor;
pub mod memory;
#[cfg(feature = "mysql")]
pub mod mysql;

use std::{future::Future, time::Duration};

pub use descriptor::{DescriptorParseError, SourceDescriptor};
use thiserror::Error;

use crate::{row::Row, timestamp::TimestampError};

/// Outcome of a single fetch.
///
/// End of data and failures are ordinary values here; whether they are fatal
/// is decided by the caller.
#[derive(Debug)]
pub enum Fetch {
    /// The next row of the source.
    Row(Row),
    /// The cursor has no further rows.
    EndOfData,
    /// The fetch failed; the cursor should not be used again.
    Error(SourceError),
}

/// Errors produced by sources and factories.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The factory knows no table by this name.
    #[error("unknown table: {0}")]
    UnknownTable(String),
    /// The handle was used after `close`.
    #[error("source handle is closed")]
    Closed,
    /// A fetch did not complete within the configured timeout.
    #[error("fetch timed out after {0:?}")]
    Timeout(Duration),
    /// The fetched row carries no usable event time.
    #[error("invalid event time: {0}")]
    Timestamp(#[from] TimestampError),
    /// Failure scripted into an in-memory table.
    #[error("injected failure: {0}")]
    Injected(String),
    /// Driver level failure.
    #[cfg(feature = "mysql")]
    #[error("sql error: {0}")]
    Sql(#[from] sqlx::Error),
    /// A column could not be converted into a [`crate::row::Value`].
    #[cfg(feature = "mysql")]
    #[error("cannot decode column '{column}' of type {type_name}: {message}")]
    Decode {
        /// Column name.
        column: String,
        /// Database type name of the column.
        type_name: String,
        /// Driver message.
        message: String,
    },
}

/// Forward-only cursor over one table.
pub trait RowSource: Send {
    /// Fetch the row after the last one returned.
    fn fetch_next(&mut self) -> impl Future<Output = Fetch> + Send;

    /// Release the underlying handle. Closing twice must be harmless.
    fn close(&mut self) -> impl Future<Output = Result<(), SourceError>> + Send;
}

/// Opens [`RowSource`]s for registered descriptors.
pub trait SourceFactory: Send + Sync {
    /// The source type this factory opens.
    type Source: RowSource;

    /// Open a dedicated cursor positioned before the first row of
    /// `descriptor`'s table.
    fn open(
        &self,
        descriptor: &SourceDescriptor,
    ) -> impl Future<Output = Result<Self::Source, SourceError>> + Send;
}
