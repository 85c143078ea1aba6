//! Filesystem search engine core: incremental indexing, persistent
//! snapshots, and query evaluation over one or more watched roots.
//!
//! - [`store`] / [`index`]: the live in-memory index and its per-root
//!   building blocks (scanning, monitoring, entry storage).
//! - [`codec`]: binary snapshot persistence (§5).
//! - [`search`]: the Search View Registry, the query-facing read model
//!   over a running [`store::IndexStore`].
//! - [`scheduler`]: the Work Scheduler, the single-writer queue every
//!   mutating operation goes through.
//! - [`events`]: the Event Bus callers observe scheduler work through.
//! - [`query`]: the `QueryMatcher` trait boundary a query engine plugs
//!   into; this crate's own query language is out of scope.

pub mod cancel;
pub mod codec;
pub mod container;
pub mod entry;
pub mod error;
pub mod events;
pub mod include;
pub mod index;
pub mod namepool;
pub mod query;
pub mod scheduler;
pub mod search;
pub mod slab;
pub mod store;

pub use cancel::{CancelHandle, CancellationToken};
pub use entry::{EntryKind, EntryRef, PropertyFlags, SortProperty, SortType};
pub use error::{FsIndexError, Result};
pub use events::{ChannelEventContext, Event, EventContext};
pub use include::{Exclude, Include, IncludeManager, ExcludeManager, VecExcludeManager, VecIncludeManager};
pub use index::{DefaultWalker, EntryView, ExternalWalker, Index, IndexEvent, IndexEventKind};
pub use query::{EverythingMatcher, QueryMatcher, SubstringMatcher};
pub use scheduler::{DatabaseInfo, DatabaseState, Work, WorkScheduler};
pub use search::{EntryInfo, EntryInfoFlags, SearchInfo, SearchViewRegistry, SelectionOp, ViewId};
pub use store::IndexStore;
