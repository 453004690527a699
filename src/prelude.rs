//! Convenience re-exports for common timeweave usage.
//!
//! # Usage
//!
//! ```rust,ignore
//! use timeweave::prelude::*;
//!
//! let mut registry = MergeRegistry::new(factory);
//! registry
//!     .register(SourceDescriptor::new("orders", "orders", "created_at", "%Y-%m-%d %H:%M:%S"))
//!     .await?;
//! while let Ok(popped) = registry.pop_next().await {
//!     println!("{} {:?}", popped.source, popped.row);
//! }
//! registry.close().await;
//! ```

pub use crate::{
    merge::{Continuation, Merge, MergeRegistry, Popped},
    row::{Row, Value},
    source::{Fetch, RowSource, SourceDescriptor, SourceFactory},
    MergeError, MergeOption,
};
