//! A size-keyed pool allocator: one pool per distinct node byte-size, each pool carving
//! bump-cursor slabs out of a backing allocator rather than forwarding every request to it
//! (§4.2).
//!
//! Grounded on `ic-stable-memory`'s `mem::allocator::StableMemoryAllocator`, which keeps a
//! `BTreeMap<u64, Vec<FreeBlock>>` of free blocks bucketed by size and serves `allocate` out
//! of the matching bucket before ever touching the backing store
//! (`push_free_block`/`pop_free_block`). This engine only ever asks for one of a handful of
//! distinct sizes (small-leaf-root, leaf, internal), so a pool is created lazily the first
//! time its size is requested rather than up front; within a pool, a slab's worth of items is
//! carved from the backing allocator in one request and handed out one bump at a time, which
//! is that "allocate big, subdivide small" shape generalized from a single free-list
//! bucket to the slab-vector-plus-cursor described in §4.2.

use std::collections::HashMap;

use crate::error::OutOfMemory;
use crate::mem::{HeapAllocator, NodeAddr, RawAllocator};

/// Default item count carved into a single slab allocation (§4.2).
pub const DEFAULT_ITEMS_PER_SLAB: usize = 1024;

/// One contiguous `items_per_slab · item_size` byte region with a bump cursor. Items never
/// move once handed out; the slab layout never compacts (§4.2).
struct Slab {
    base: NodeAddr,
    cursor: usize,
    capacity: usize,
}

impl Slab {
    fn next(&mut self, item_size: usize) -> Option<NodeAddr> {
        if self.cursor >= self.capacity {
            return None;
        }
        let addr = NodeAddr::from_raw_usize(self.base.as_ptr() as usize + self.cursor * item_size);
        self.cursor += 1;
        Some(addr)
    }
}

/// The pool for a single item size: a growable vector of slabs plus a growable free list.
struct SlabPool {
    item_size: usize,
    items_per_slab: usize,
    max_slab_bytes: usize,
    slabs: Vec<Slab>,
    current: usize,
    free: Vec<NodeAddr>,
}

impl SlabPool {
    fn new(item_size: usize, items_per_slab: usize, max_slab_bytes: usize) -> Self {
        Self {
            item_size,
            items_per_slab,
            max_slab_bytes,
            slabs: Vec::new(),
            current: 0,
            free: Vec::new(),
        }
    }

    /// Items per slab, capped so a slab never exceeds `max_slab_bytes` (0 means uncapped).
    fn slab_capacity(&self) -> usize {
        if self.max_slab_bytes == 0 {
            self.items_per_slab
        } else {
            self.items_per_slab
                .min((self.max_slab_bytes / self.item_size).max(1))
        }
    }

    fn grow(&mut self, backing: &mut impl RawAllocator) -> Result<(), OutOfMemory> {
        let capacity = self.slab_capacity();
        let base = backing.allocate(capacity * self.item_size)?;
        // `Vec::push` doubles its own capacity as needed. That's the slab-vector growth
        // named in §4.2, not a separate mechanism.
        self.slabs.push(Slab {
            base,
            cursor: 0,
            capacity,
        });
        Ok(())
    }

    fn ensure_initial_slabs(
        &mut self,
        initial_slab_count: usize,
        backing: &mut impl RawAllocator,
    ) -> Result<(), OutOfMemory> {
        while self.slabs.len() < initial_slab_count.max(1) {
            self.grow(backing)?;
        }
        Ok(())
    }

    fn allocate(&mut self, backing: &mut impl RawAllocator) -> Result<NodeAddr, OutOfMemory> {
        if let Some(addr) = self.free.pop() {
            return Ok(addr);
        }

        loop {
            if self.current >= self.slabs.len() {
                self.grow(backing)?;
            }
            if let Some(addr) = self.slabs[self.current].next(self.item_size) {
                return Ok(addr);
            }
            self.current += 1;
        }
    }

    fn deallocate(&mut self, addr: NodeAddr) {
        self.free.push(addr);
    }

    fn dispose(self, backing: &mut impl RawAllocator) {
        let item_size = self.item_size;
        for slab in self.slabs {
            unsafe { backing.deallocate(slab.base, slab.capacity * item_size) };
        }
    }
}

/// A [`RawAllocator`] that carves fixed-size items out of bulk-allocated slabs, bucketed per
/// distinct item size (§4.2: "one pool per distinct item size").
///
/// This is the allocator backend named "Slab" in the configuration table: it trades a slab's
/// worth of retained memory (a slab is never partially released; freed items stay in the
/// pool's free list until the whole pool is disposed) for avoiding a `malloc`/`free` round
/// trip on every node split, merge, and shrink, the dominant allocation pattern this engine
/// produces.
pub struct SlabAllocator<A: RawAllocator = HeapAllocator> {
    backing: A,
    items_per_slab: usize,
    max_slab_bytes: usize,
    initial_slab_count: usize,
    pools: HashMap<usize, SlabPool>,
}

impl SlabAllocator<HeapAllocator> {
    pub fn new() -> Self {
        Self::with_backing(HeapAllocator::new())
    }
}

impl Default for SlabAllocator<HeapAllocator> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: RawAllocator> SlabAllocator<A> {
    /// Defaults: 1024 items per slab, no per-slab byte cap, one slab pre-allocated per pool
    /// on first use (§4.2's stated factory defaults).
    pub fn with_backing(backing: A) -> Self {
        Self::with_params(backing, DEFAULT_ITEMS_PER_SLAB, 0, 1)
    }

    /// `max_slab_bytes == 0` means uncapped (a slab always holds `items_per_slab` items).
    pub fn with_params(
        backing: A,
        items_per_slab: usize,
        max_slab_bytes: usize,
        initial_slab_count: usize,
    ) -> Self {
        Self {
            backing,
            items_per_slab,
            max_slab_bytes,
            initial_slab_count,
            pools: HashMap::new(),
        }
    }

    /// How many item-size pools have been created so far. Exposed for introspection and
    /// tests; not part of the allocator contract.
    pub fn pool_count(&self) -> usize {
        self.pools.len()
    }

    /// Releases every slab across every pool back to the backing allocator (§4.2's
    /// `dispose`). Freed-but-not-yet-recycled items are not individually tracked past this
    /// point; their whole containing slab goes back to `backing` in one call.
    pub fn dispose(mut self) {
        for (_, pool) in self.pools.drain() {
            pool.dispose(&mut self.backing);
        }
    }
}

impl<A: RawAllocator> RawAllocator for SlabAllocator<A> {
    fn allocate(&mut self, size: usize) -> Result<NodeAddr, OutOfMemory> {
        let items_per_slab = self.items_per_slab;
        let max_slab_bytes = self.max_slab_bytes;
        let initial_slab_count = self.initial_slab_count;
        let backing = &mut self.backing;

        let pool = self
            .pools
            .entry(size)
            .or_insert_with(|| SlabPool::new(size, items_per_slab, max_slab_bytes));

        if pool.slabs.is_empty() {
            pool.ensure_initial_slabs(initial_slab_count, backing)?;
        }
        pool.allocate(backing)
    }

    unsafe fn deallocate(&mut self, addr: NodeAddr, size: usize) {
        let items_per_slab = self.items_per_slab;
        let max_slab_bytes = self.max_slab_bytes;
        self.pools
            .entry(size)
            .or_insert_with(|| SlabPool::new(size, items_per_slab, max_slab_bytes))
            .deallocate(addr);
    }
}
