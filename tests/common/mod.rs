//! Shared helpers for merge integration tests.

#![allow(dead_code)]

use timeweave::{
    merge::Popped,
    row::Row,
    source::SourceDescriptor,
    timestamp::EventTime,
    Merge, MergeError, MergeRegistry,
};

/// Clock-only format used by most scenarios.
pub const HM: &str = "%H:%M";

/// Row stamped `ts` (in [`HM`]) carrying a per-source sequence number.
pub fn row(ts: &str, seq: i64) -> Row {
    Row::new().with("ts", ts).with("seq", seq)
}

/// Descriptor whose name and table coincide.
pub fn descriptor(name: &str) -> SourceDescriptor {
    SourceDescriptor::new(name, name, "ts", HM)
}

/// Event time of a popped row under [`HM`].
pub fn event_time(popped: &Popped) -> EventTime {
    EventTime::extract(&popped.row, "ts", HM).expect("popped rows carry a valid ts")
}

/// Render a pop as `(has_more, source, ts)` for compact assertions.
pub fn summary(popped: &Popped) -> (bool, String, String) {
    let ts = popped
        .row
        .get("ts")
        .map(ToString::to_string)
        .unwrap_or_default();
    (popped.has_more(), popped.source.clone(), ts)
}

/// Pop until the registry reports an empty selection.
pub async fn drain<F>(registry: &mut MergeRegistry<F>) -> Vec<Popped>
where
    F: timeweave::source::SourceFactory,
{
    let mut out = Vec::new();
    loop {
        match registry.pop_next().await {
            Ok(popped) => out.push(popped),
            Err(MergeError::EmptySelection) => return out,
            Err(err) => panic!("unexpected merge error: {err}"),
        }
    }
}
