use std::cmp::Ordering;

use crate::timestamp::EventTime;

/// Selection key for one pending source.
///
/// Ordered by event time, then by source name, so equal timestamps always
/// resolve to the lexicographically smallest name. The heap stores these in
/// `Reverse` to pop the minimum.
#[derive(Debug, Clone)]
pub(crate) struct HeapEntry {
    pub(crate) ts: EventTime,
    pub(crate) source: String,
}

impl HeapEntry {
    pub(crate) fn new(ts: EventTime, source: impl Into<String>) -> Self {
        Self {
            ts,
            source: source.into(),
        }
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.ts
            .cmp(&other.ts)
            .then_with(|| self.source.cmp(&other.source))
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry {}
