//! A B-tree map backed by raw, unmanaged byte storage.
//!
//! Keys and values never live behind `Box`, `Rc`, or any other Rust-managed allocation.
//! They're [`mem::FixedSize`] data copied directly into and out of node byte regions handed
//! out by a [`mem::RawAllocator`]. The default backend is a thin wrapper over the system
//! allocator ([`mem::HeapAllocator`]); [`mem::slab::SlabAllocator`] recycles same-sized node
//! regions for insert/remove-heavy workloads instead of round-tripping through `malloc`/`free`
//! on every split, merge, and shrink.
//!
//! ```
//! use raw_btree_map::collections::btree_map::BTreeMap;
//!
//! let mut map: BTreeMap<u32, u32> = BTreeMap::new();
//! map.add(1, 100).unwrap();
//! map.set(1, 200);
//! assert_eq!(map.get(&1), Ok(200));
//! ```

pub mod collections;
pub mod comparator;
pub mod error;
pub mod mem;

pub use collections::btree_map::BTreeMap;
pub use comparator::{KeyComparator, OrdComparator};
pub use error::{BTreeError, OutOfMemory};
pub use mem::{slab::SlabAllocator, FixedSize, HeapAllocator, RawAllocator};
