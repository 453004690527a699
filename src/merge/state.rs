use crate::{
    row::Row,
    source::{SourceDescriptor, SourceError},
    timestamp::EventTime,
};

/// Row read ahead of the caller, with its event time already parsed.
#[derive(Debug)]
pub(crate) struct Lookahead {
    pub(crate) ts: EventTime,
    pub(crate) row: Row,
}

/// Why a source stopped participating in selection.
#[derive(Debug)]
pub(crate) enum Exhaustion {
    EndOfData,
    Failed(SourceError),
}

/// A source either holds exactly one unread row or is exhausted, never both.
#[derive(Debug)]
pub(crate) enum Cursor {
    Pending(Lookahead),
    Exhausted(Exhaustion),
}

/// Per-source bookkeeping owned by the registry.
#[derive(Debug)]
pub(crate) struct SourceState<S> {
    pub(crate) descriptor: SourceDescriptor,
    pub(crate) source: S,
    pub(crate) current: Option<Row>,
    pub(crate) cursor: Cursor,
    pub(crate) closed: bool,
}

impl<S> SourceState<S> {
    pub(crate) fn new(descriptor: SourceDescriptor, source: S, cursor: Cursor) -> Self {
        Self {
            descriptor,
            source,
            current: None,
            cursor,
            closed: false,
        }
    }

    pub(crate) fn is_exhausted(&self) -> bool {
        matches!(self.cursor, Cursor::Exhausted(_))
    }

    pub(crate) fn failure(&self) -> Option<&SourceError> {
        match &self.cursor {
            Cursor::Exhausted(Exhaustion::Failed(err)) => Some(err),
            _ => None,
        }
    }
}
