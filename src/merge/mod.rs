//! Time-ordered merge across registered sources.
//!
//! A [`MergeRegistry`] owns one cursor per registered source and keeps exactly
//! one unread row (the look-ahead) for every source that is not exhausted.
//! Each [`Merge::pop_next`] hands out the look-ahead with the earliest event
//! time and refills only that source, so the emitted sequence is
//! non-decreasing in event time as long as every source is.
//!
//! Equal event times are resolved by source name: the lexicographically
//! smallest name wins. This does not depend on registration order.
//!
//! A failing source never fails the merge. Its error is logged, the source is
//! marked exhausted and the failure stays queryable via
//! [`MergeRegistry::failure`].

mod heap;
mod state;

use std::{
    cmp::Reverse,
    collections::{BinaryHeap, HashMap},
    fmt,
    future::Future,
    mem,
};

use async_stream::stream;
use futures_core::Stream;

use self::{
    heap::HeapEntry,
    state::{Cursor, Exhaustion, Lookahead, SourceState},
};
use crate::{
    error::MergeError,
    observability::{log_debug, log_error, log_info, log_warn},
    option::MergeOption,
    row::Row,
    source::{Fetch, RowSource, SourceDescriptor, SourceError, SourceFactory},
    timestamp::EventTime,
};

/// The capability set of a merge engine.
pub trait Merge {
    /// Open and prime a new source.
    fn register(
        &mut self,
        descriptor: SourceDescriptor,
    ) -> impl Future<Output = Result<(), MergeError>> + Send;

    /// Hand out the earliest pending row across all sources.
    fn pop_next(&mut self) -> impl Future<Output = Result<Popped, MergeError>> + Send;

    /// Release every source handle. Calling it again is a no-op.
    fn close(&mut self) -> impl Future<Output = ()> + Send;
}

/// State of the popped source after its row was handed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Continuation {
    /// The source has another row pending.
    More,
    /// The source reached the end of its data.
    EndOfData,
    /// Refilling the source failed; it has been retired from selection.
    Failed,
}

/// One row of the merged sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct Popped {
    /// Name of the source the row came from.
    pub source: String,
    /// The row itself.
    pub row: Row,
    /// Whether that source can still be selected.
    pub continuation: Continuation,
}

impl Popped {
    /// True when the popped source still has a pending row.
    ///
    /// This describes the popped source only; other sources may still have
    /// rows when this is false.
    pub fn has_more(&self) -> bool {
        self.continuation == Continuation::More
    }

    /// Split into `(has_more, source, row)`.
    pub fn into_parts(self) -> (bool, String, Row) {
        (self.has_more(), self.source, self.row)
    }
}

/// Registry of per-source cursors merged by event time.
pub struct MergeRegistry<F>
where
    F: SourceFactory,
{
    factory: F,
    option: MergeOption,
    sources: HashMap<String, SourceState<F::Source>>,
    peeked: BinaryHeap<Reverse<HeapEntry>>,
    started: bool,
    closed: bool,
}

impl<F> MergeRegistry<F>
where
    F: SourceFactory,
{
    /// An empty registry opening sources through `factory`.
    pub fn new(factory: F) -> Self {
        Self::with_option(factory, MergeOption::default())
    }

    /// An empty registry with explicit tuning.
    pub fn with_option(factory: F, option: MergeOption) -> Self {
        Self {
            factory,
            option,
            sources: HashMap::new(),
            peeked: BinaryHeap::new(),
            started: false,
            closed: false,
        }
    }

    /// Number of registered sources, exhausted ones included.
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// True when no source is registered.
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// True when `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.sources.contains_key(name)
    }

    /// Registered names in lexicographic order.
    pub fn source_names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.sources.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// The row most recently handed out for `name`.
    pub fn current(&self, name: &str) -> Option<&Row> {
        self.sources.get(name)?.current.as_ref()
    }

    /// The unread row buffered for `name`, if it is still pending.
    pub fn lookahead(&self, name: &str) -> Option<&Row> {
        match &self.sources.get(name)?.cursor {
            Cursor::Pending(lookahead) => Some(&lookahead.row),
            Cursor::Exhausted(_) => None,
        }
    }

    /// `Some(true)` once `name` can no longer be selected, `None` if unknown.
    pub fn is_exhausted(&self, name: &str) -> Option<bool> {
        self.sources.get(name).map(SourceState::is_exhausted)
    }

    /// The error that retired `name`, if it failed rather than ran dry.
    pub fn failure(&self, name: &str) -> Option<&SourceError> {
        self.sources.get(name)?.failure()
    }

    /// Sources that can no longer be selected.
    pub fn exhausted_count(&self) -> usize {
        self.sources
            .values()
            .filter(|state| state.is_exhausted())
            .count()
    }

    /// Sources holding a pending row. This is also the number of buffered rows.
    pub fn active_count(&self) -> usize {
        self.sources.len() - self.exhausted_count()
    }

    /// True once every registered source is exhausted.
    pub fn is_drained(&self) -> bool {
        self.sources.values().all(SourceState::is_exhausted)
    }

    /// Close and drop a single source.
    pub async fn retire(&mut self, name: &str) -> Result<(), MergeError> {
        let mut state = self
            .sources
            .remove(name)
            .ok_or_else(|| MergeError::UnknownSource {
                name: name.to_owned(),
            })?;
        self.peeked.retain(|Reverse(entry)| entry.source != name);
        close_source(name, &mut state).await;
        log_info!(component = "merge", event = "source_retired", source = %name);
        Ok(())
    }

    /// Consume the registry as a stream of merged rows.
    ///
    /// The stream ends once no source has a pending row, after which every
    /// handle is closed.
    pub fn into_stream(mut self) -> impl Stream<Item = Popped> + Send {
        stream! {
            while let Ok(popped) = self.pop_next().await {
                yield popped;
            }
            self.close().await;
        }
    }

    /// Name of the pending source to advance next. Stale heap entries (left by
    /// a retired or closed source) are discarded on the way.
    fn select(&mut self) -> Result<String, MergeError> {
        loop {
            let Reverse(entry) = self.peeked.peek().ok_or(MergeError::EmptySelection)?;
            if self
                .sources
                .get(&entry.source)
                .is_some_and(|state| !state.is_exhausted())
            {
                return Ok(entry.source.clone());
            }
            self.peeked.pop();
        }
    }
}

impl<F> Merge for MergeRegistry<F>
where
    F: SourceFactory,
{
    async fn register(&mut self, descriptor: SourceDescriptor) -> Result<(), MergeError> {
        if self.closed {
            return Err(MergeError::Closed);
        }
        if self.sources.contains_key(descriptor.name()) {
            return Err(MergeError::DuplicateRegistration {
                name: descriptor.name().to_owned(),
            });
        }
        if self.started {
            return Err(MergeError::RegistrationClosed {
                name: descriptor.name().to_owned(),
            });
        }

        let mut source = match self.factory.open(&descriptor).await {
            Ok(source) => source,
            Err(err) => {
                log_warn!(
                    component = "merge",
                    event = "source_open_failed",
                    source = %descriptor.name(),
                    table = %descriptor.table(),
                    error = %err,
                );
                return Err(MergeError::SourceOpen {
                    name: descriptor.name().to_owned(),
                    table: descriptor.table().to_owned(),
                    source: err,
                });
            }
        };

        let fetched = fetch(&mut source, &self.option).await;
        let cursor = advance(&descriptor, fetched);
        match &cursor {
            Cursor::Pending(lookahead) => {
                self.peeked
                    .push(Reverse(HeapEntry::new(lookahead.ts, descriptor.name())));
                log_info!(
                    component = "merge",
                    event = "source_registered",
                    source = %descriptor.name(),
                    table = %descriptor.table(),
                    first_ts = %lookahead.ts,
                );
            }
            Cursor::Exhausted(Exhaustion::EndOfData) => {
                log_info!(
                    component = "merge",
                    event = "source_primed_empty",
                    source = %descriptor.name(),
                    table = %descriptor.table(),
                );
            }
            Cursor::Exhausted(Exhaustion::Failed(err)) => {
                log_warn!(
                    component = "merge",
                    event = "fetch_failed",
                    phase = "prime",
                    source = %descriptor.name(),
                    table = %descriptor.table(),
                    error = %err,
                );
            }
        }

        self.sources.insert(
            descriptor.name().to_owned(),
            SourceState::new(descriptor, source, cursor),
        );
        Ok(())
    }

    async fn pop_next(&mut self) -> Result<Popped, MergeError> {
        self.started = true;
        // The heap entry stays in place until the refill completes, so a
        // cancelled fetch leaves the source selectable with its row intact.
        let name = self.select()?;
        let state = self
            .sources
            .get_mut(&name)
            .ok_or_else(|| MergeError::UnknownSource { name: name.clone() })?;

        let fetched = fetch(&mut state.source, &self.option).await;
        let next = advance(&state.descriptor, fetched);
        self.peeked.pop();

        let continuation = match &next {
            Cursor::Pending(lookahead) => {
                self.peeked
                    .push(Reverse(HeapEntry::new(lookahead.ts, name.as_str())));
                Continuation::More
            }
            Cursor::Exhausted(Exhaustion::EndOfData) => {
                log_debug!(component = "merge", event = "source_exhausted", source = %name);
                Continuation::EndOfData
            }
            Cursor::Exhausted(Exhaustion::Failed(err)) => {
                log_warn!(
                    component = "merge",
                    event = "fetch_failed",
                    phase = "refill",
                    source = %name,
                    table = %state.descriptor.table(),
                    error = %err,
                );
                Continuation::Failed
            }
        };

        let row = match mem::replace(&mut state.cursor, next) {
            Cursor::Pending(Lookahead { row, .. }) => row,
            Cursor::Exhausted(_) => unreachable!("selected source '{name}' had no pending row"),
        };
        state.current = Some(row.clone());

        Ok(Popped {
            source: name,
            row,
            continuation,
        })
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.peeked.clear();

        let mut states: Vec<_> = self.sources.iter_mut().collect();
        states.sort_unstable_by(|(a, _), (b, _)| a.cmp(b));
        for (name, state) in states {
            close_source(name, state).await;
            if let Cursor::Pending(_) = state.cursor {
                state.cursor = Cursor::Exhausted(Exhaustion::EndOfData);
            }
        }
        log_info!(
            component = "merge",
            event = "registry_closed",
            sources = self.sources.len(),
        );
    }
}

impl<F> fmt::Debug for MergeRegistry<F>
where
    F: SourceFactory,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MergeRegistry")
            .field("sources", &self.source_names())
            .field("pending", &self.peeked.len())
            .field("started", &self.started)
            .field("closed", &self.closed)
            .finish()
    }
}

async fn fetch<S>(source: &mut S, option: &MergeOption) -> Fetch
where
    S: RowSource,
{
    match option.fetch_timeout {
        Some(limit) => tokio::time::timeout(limit, source.fetch_next())
            .await
            .unwrap_or(Fetch::Error(SourceError::Timeout(limit))),
        None => source.fetch_next().await,
    }
}

/// Turn a fetch outcome into the next cursor state. Rows whose event time
/// cannot be read retire the source like any other fetch failure.
fn advance(descriptor: &SourceDescriptor, fetched: Fetch) -> Cursor {
    match fetched {
        Fetch::Row(row) => match EventTime::extract(
            &row,
            descriptor.timestamp_field(),
            descriptor.timestamp_format(),
        ) {
            Ok(ts) => Cursor::Pending(Lookahead { ts, row }),
            Err(err) => Cursor::Exhausted(Exhaustion::Failed(err.into())),
        },
        Fetch::EndOfData => Cursor::Exhausted(Exhaustion::EndOfData),
        Fetch::Error(err) => Cursor::Exhausted(Exhaustion::Failed(err)),
    }
}

async fn close_source<S>(name: &str, state: &mut SourceState<S>)
where
    S: RowSource,
{
    if state.closed {
        return;
    }
    state.closed = true;
    if let Err(err) = state.source.close().await {
        log_error!(
            component = "merge",
            event = "close_failed",
            source = %name,
            error = %err,
        );
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{Continuation, Merge, MergeRegistry};
    use crate::{
        error::MergeError,
        option::MergeOption,
        row::Row,
        source::{
            memory::{MemorySourceFactory, MemoryTable},
            SourceDescriptor, SourceError,
        },
    };

    const FORMAT: &str = "%H:%M";

    fn row(ts: &str, n: i64) -> Row {
        Row::new().with("ts", ts).with("n", n)
    }

    fn descriptor(name: &str) -> SourceDescriptor {
        SourceDescriptor::new(name, name, "ts", FORMAT)
    }

    #[tokio::test]
    async fn pop_refills_only_the_selected_source() {
        let factory = MemorySourceFactory::new()
            .table("a", MemoryTable::new().rows([row("10:00", 1), row("10:03", 2)]))
            .table("b", MemoryTable::new().rows([row("10:01", 1), row("10:02", 2)]));
        let mut registry = MergeRegistry::new(factory.clone());
        registry.register(descriptor("a")).await.expect("a");
        registry.register(descriptor("b")).await.expect("b");
        assert_eq!(factory.rows_fetched(), 2);

        let popped = registry.pop_next().await.expect("pop");
        assert_eq!(popped.source, "a");
        assert_eq!(factory.rows_fetched(), 3);
        assert_eq!(registry.current("a"), Some(&row("10:00", 1)));
        assert_eq!(registry.lookahead("a"), Some(&row("10:03", 2)));
        assert_eq!(registry.lookahead("b"), Some(&row("10:01", 1)));
        assert!(registry.current("b").is_none());
    }

    #[tokio::test]
    async fn duplicate_registration_leaves_state_untouched() {
        let factory = MemorySourceFactory::new()
            .table("a", MemoryTable::new().row(row("10:00", 1)))
            .table("other", MemoryTable::new().row(row("09:00", 1)));
        let mut registry = MergeRegistry::new(factory.clone());
        registry.register(descriptor("a")).await.expect("a");

        let again = SourceDescriptor::new("a", "other", "ts", FORMAT);
        let err = registry.register(again).await.expect_err("duplicate");
        assert!(matches!(err, MergeError::DuplicateRegistration { name } if name == "a"));
        assert_eq!(registry.len(), 1);
        assert_eq!(factory.open_handles(), 1);
        assert_eq!(registry.lookahead("a"), Some(&row("10:00", 1)));
    }

    #[tokio::test]
    async fn open_failure_is_surfaced_and_not_registered() {
        let mut registry = MergeRegistry::new(MemorySourceFactory::new());
        let err = registry
            .register(descriptor("ghost"))
            .await
            .expect_err("missing table");
        assert!(matches!(
            err,
            MergeError::SourceOpen { name, source: SourceError::UnknownTable(_), .. } if name == "ghost"
        ));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn unparseable_timestamp_retires_the_source() {
        let factory = MemorySourceFactory::new().table(
            "a",
            MemoryTable::new().rows([row("10:00", 1), row("not a time", 2), row("10:05", 3)]),
        );
        let mut registry = MergeRegistry::new(factory);
        registry.register(descriptor("a")).await.expect("a");

        let popped = registry.pop_next().await.expect("pop");
        assert_eq!(popped.continuation, Continuation::Failed);
        assert!(matches!(
            registry.failure("a"),
            Some(SourceError::Timestamp(_))
        ));
        assert!(matches!(
            registry.pop_next().await,
            Err(MergeError::EmptySelection)
        ));
    }

    #[tokio::test]
    async fn registration_is_fixed_once_pulling_starts() {
        let factory = MemorySourceFactory::new()
            .table("a", MemoryTable::new().row(row("10:00", 1)))
            .table("b", MemoryTable::new().row(row("10:00", 1)));
        let mut registry = MergeRegistry::new(factory);
        registry.register(descriptor("a")).await.expect("a");
        registry.pop_next().await.expect("pop");

        let err = registry.register(descriptor("b")).await.expect_err("late");
        assert!(matches!(err, MergeError::RegistrationClosed { name } if name == "b"));
    }

    #[tokio::test]
    async fn retire_closes_and_removes_one_source() {
        let factory = MemorySourceFactory::new()
            .table("a", MemoryTable::new().row(row("10:00", 1)))
            .table("b", MemoryTable::new().row(row("10:05", 1)));
        let mut registry = MergeRegistry::new(factory.clone());
        registry.register(descriptor("a")).await.expect("a");
        registry.register(descriptor("b")).await.expect("b");

        registry.retire("a").await.expect("retire");
        assert_eq!(factory.open_handles(), 1);
        assert!(!registry.contains("a"));
        assert_eq!(registry.pop_next().await.expect("pop").source, "b");

        let err = registry.retire("a").await.expect_err("gone");
        assert!(matches!(err, MergeError::UnknownSource { .. }));
    }

    #[tokio::test]
    async fn stalled_fetch_times_out_as_failure() {
        let factory = MemorySourceFactory::new()
            .table("slow", MemoryTable::new().row(row("10:00", 1)).stall())
            .table("fast", MemoryTable::new().rows([row("10:01", 1), row("10:02", 2)]));
        let option = MergeOption::default().fetch_timeout(Duration::from_millis(20));
        let mut registry = MergeRegistry::with_option(factory, option);
        registry.register(descriptor("slow")).await.expect("slow");
        registry.register(descriptor("fast")).await.expect("fast");

        let popped = registry.pop_next().await.expect("pop slow");
        assert_eq!(popped.source, "slow");
        assert_eq!(popped.continuation, Continuation::Failed);
        assert!(matches!(
            registry.failure("slow"),
            Some(SourceError::Timeout(_))
        ));

        let sources: Vec<_> = [
            registry.pop_next().await.expect("fast 1"),
            registry.pop_next().await.expect("fast 2"),
        ]
        .into_iter()
        .map(|p| p.source)
        .collect();
        assert_eq!(sources, ["fast", "fast"]);
    }

    #[tokio::test]
    async fn close_failure_does_not_stop_other_handles_closing() {
        let factory = MemorySourceFactory::new()
            .table("a", MemoryTable::new().row(row("10:00", 1)))
            .table("b", MemoryTable::new().row(row("10:01", 1)).fail_close("b stuck"))
            .table("c", MemoryTable::new().row(row("10:02", 1)));
        let mut registry = MergeRegistry::new(factory.clone());
        for name in ["a", "b", "c"] {
            registry.register(descriptor(name)).await.expect("register");
        }
        assert_eq!(factory.open_handles(), 3);

        registry.close().await;
        assert_eq!(factory.failed_closes(), 1);
        assert_eq!(factory.open_handles(), 1);
        assert!(registry.is_drained());

        registry.close().await;
        assert_eq!(factory.failed_closes(), 1);
        assert!(matches!(
            registry.pop_next().await,
            Err(MergeError::EmptySelection)
        ));
    }

    #[tokio::test]
    async fn retire_removes_a_source_whose_close_fails() {
        let factory = MemorySourceFactory::new()
            .table("a", MemoryTable::new().row(row("10:00", 1)).fail_close("a stuck"))
            .table("b", MemoryTable::new().row(row("10:05", 1)));
        let mut registry = MergeRegistry::new(factory.clone());
        registry.register(descriptor("a")).await.expect("a");
        registry.register(descriptor("b")).await.expect("b");

        registry.retire("a").await.expect("retire");
        assert_eq!(factory.failed_closes(), 1);
        assert!(!registry.contains("a"));
        assert_eq!(registry.pop_next().await.expect("pop").source, "b");

        registry.close().await;
        assert_eq!(factory.failed_closes(), 1);
        assert_eq!(factory.open_handles(), 1);
    }

    #[tokio::test]
    async fn close_is_idempotent_and_blocks_further_use() {
        let factory = MemorySourceFactory::new()
            .table("a", MemoryTable::new().rows([row("10:00", 1), row("10:01", 2)]));
        let mut registry = MergeRegistry::new(factory.clone());
        registry.register(descriptor("a")).await.expect("a");

        registry.close().await;
        registry.close().await;
        assert_eq!(factory.open_handles(), 0);
        assert!(registry.is_drained());
        assert!(matches!(
            registry.pop_next().await,
            Err(MergeError::EmptySelection)
        ));
        assert!(matches!(
            registry.register(descriptor("b")).await,
            Err(MergeError::Closed)
        ));
    }
}
