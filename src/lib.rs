//! Page-oriented heap storage with a secondary index layer.
//!
//! Rows live in append-only heap files made of fixed 8192-byte pages; each
//! indexed column gets a durable ordered key-to-page-id map plus a catalog
//! entry tracking its usage counters.

#![warn(missing_docs)]

/// Filesystem layout and engine tuning.
pub mod config;

/// Error taxonomy and the crate-wide result alias.
pub mod error;

/// Append-only heap files and the page codec.
pub mod heap;

/// Index entry coordination and the per-table metadata catalog.
pub mod index;

/// Ordered-map engine contract and the default file-backed engine.
pub mod tree;

pub use config::StoreConfig;
pub use error::{Result, StoreError};
pub use heap::{HeapHeader, HeapStore, RecordPage, HEAP_HEADER_SIZE, MAX_ROW_LEN, PAGE_SIZE};
pub use index::{IndexMeta, IndexStore, IndexTarget, INDEX_REBUILD_THRESHOLD};
pub use tree::{FileTree, OrderedTree};
