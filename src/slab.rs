//! Memory-mapped slab allocator used to back each `Index`'s entry pool.
//!
//! This allows the OS to page large indices in and out of memory, so a
//! single scanned root can hold millions of entries without the process
//! heap growing by a matching amount.
//!
//! ## Module Structure
//!
//! - `index_types` - Compact index types (`SlabIndex`, `OptionSlabIndex`)
//! - `mmap` - Memory-mapped slab allocator (`Slab<T>`, internal `Slot<T>`)
//! - `thin` - High-level wrapper (`ThinSlab<T>`) keyed by `SlabIndex`

mod index_types;
mod mmap;
mod thin;

pub use index_types::{OptionSlabIndex, SlabIndex};
pub use thin::ThinSlab;
