//! Scripted in-memory tables.
//!
//! Each table is a fixed script of rows, injected failures and stalls that a
//! [`MemorySource`] replays in order. Factories are cheap to clone and clones
//! share their handle accounting, so a caller can keep one around after moving
//! another into a registry.

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use super::{Fetch, RowSource, SourceDescriptor, SourceError, SourceFactory};
use crate::row::Row;

#[derive(Clone, Debug)]
enum Scripted {
    Row(Row),
    Fail(String),
    Stall,
}

/// Script for one in-memory table.
#[derive(Clone, Debug, Default)]
pub struct MemoryTable {
    script: Vec<Scripted>,
    close_error: Option<String>,
}

impl MemoryTable {
    /// An empty table; its first fetch reports end of data.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a row.
    pub fn row(mut self, row: Row) -> Self {
        self.script.push(Scripted::Row(row));
        self
    }

    /// Append several rows.
    pub fn rows(mut self, rows: impl IntoIterator<Item = Row>) -> Self {
        self.script.extend(rows.into_iter().map(Scripted::Row));
        self
    }

    /// Append a fetch that fails with `message`.
    pub fn fail(mut self, message: impl Into<String>) -> Self {
        self.script.push(Scripted::Fail(message.into()));
        self
    }

    /// Append a fetch that never completes.
    pub fn stall(mut self) -> Self {
        self.script.push(Scripted::Stall);
        self
    }

    /// Make `close` fail with `message`. The handle stops serving rows but is
    /// never released, so it stays counted in
    /// [`MemorySourceFactory::open_handles`].
    pub fn fail_close(mut self, message: impl Into<String>) -> Self {
        self.close_error = Some(message.into());
        self
    }
}

#[derive(Debug, Default)]
struct Counters {
    open_handles: AtomicUsize,
    rows_fetched: AtomicUsize,
    failed_closes: AtomicUsize,
}

/// [`SourceFactory`] over named [`MemoryTable`]s.
#[derive(Clone, Debug, Default)]
pub struct MemorySourceFactory {
    tables: Arc<HashMap<String, MemoryTable>>,
    counters: Arc<Counters>,
}

impl MemorySourceFactory {
    /// A factory with no tables.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace `name`.
    ///
    /// Only valid before the factory is cloned; clones share one table set.
    pub fn table(mut self, name: impl Into<String>, table: MemoryTable) -> Self {
        Arc::make_mut(&mut self.tables).insert(name.into(), table);
        self
    }

    /// Handles opened and not yet closed.
    pub fn open_handles(&self) -> usize {
        self.counters.open_handles.load(Ordering::Acquire)
    }

    /// Rows handed out across every source of this factory.
    pub fn rows_fetched(&self) -> usize {
        self.counters.rows_fetched.load(Ordering::Acquire)
    }

    /// `close` calls that returned an error.
    pub fn failed_closes(&self) -> usize {
        self.counters.failed_closes.load(Ordering::Acquire)
    }
}

impl SourceFactory for MemorySourceFactory {
    type Source = MemorySource;

    async fn open(&self, descriptor: &SourceDescriptor) -> Result<MemorySource, SourceError> {
        let table = self
            .tables
            .get(descriptor.table())
            .ok_or_else(|| SourceError::UnknownTable(descriptor.table().to_owned()))?;
        self.counters.open_handles.fetch_add(1, Ordering::AcqRel);
        Ok(MemorySource {
            pending: table.script.iter().cloned().collect(),
            close_error: table.close_error.clone(),
            closed: false,
            counters: Arc::clone(&self.counters),
        })
    }
}

/// Cursor over one [`MemoryTable`].
#[derive(Debug)]
pub struct MemorySource {
    pending: VecDeque<Scripted>,
    close_error: Option<String>,
    closed: bool,
    counters: Arc<Counters>,
}

impl RowSource for MemorySource {
    async fn fetch_next(&mut self) -> Fetch {
        if self.closed {
            return Fetch::Error(SourceError::Closed);
        }
        match self.pending.pop_front() {
            Some(Scripted::Row(row)) => {
                self.counters.rows_fetched.fetch_add(1, Ordering::AcqRel);
                Fetch::Row(row)
            }
            Some(Scripted::Fail(message)) => Fetch::Error(SourceError::Injected(message)),
            Some(Scripted::Stall) => std::future::pending().await,
            None => Fetch::EndOfData,
        }
    }

    async fn close(&mut self) -> Result<(), SourceError> {
        if let Some(message) = &self.close_error {
            self.closed = true;
            self.pending.clear();
            self.counters.failed_closes.fetch_add(1, Ordering::AcqRel);
            return Err(SourceError::Injected(message.clone()));
        }
        if !self.closed {
            self.closed = true;
            self.pending.clear();
            self.counters.open_handles.fetch_sub(1, Ordering::AcqRel);
        }
        Ok(())
    }
}
