//! Node header layout and the capacity constants derived from a configured node byte budget.
//!
//! Grounded on `ic-stable-memory`'s offset-constant idiom in `collections/btree_map/internal_node.rs`
//! and `leaf_node.rs` (`PARENT_OFFSET`, `LEN_OFFSET`, `KEYS_OFFSET`, `VALUES_OFFSET::<K>()`,
//! `NODE_TYPE_OFFSET`), generalized to this engine's single packed `(key, value)` entry array
//! (rather than its parallel key/value arrays) and its three node shapes.

use std::marker::PhantomData;
use std::mem::size_of;

use crate::mem::{self, FixedSize, NodeAddr};

/// The header tag replacing parent-pointer aliasing for root detection (§9 REDESIGN FLAG,
/// §10.1). `SmallLeafRoot` and `InternalRoot` are the two shapes a root can take;
/// `Leaf`/`Internal` are always non-root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum NodeKind {
    SmallLeafRoot = 0,
    Leaf = 1,
    Internal = 2,
    InternalRoot = 3,
}

impl NodeKind {
    #[inline]
    pub fn is_leaf(self) -> bool {
        matches!(self, NodeKind::SmallLeafRoot | NodeKind::Leaf)
    }

    #[inline]
    pub fn is_root(self) -> bool {
        matches!(self, NodeKind::SmallLeafRoot | NodeKind::InternalRoot)
    }

    #[inline]
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => NodeKind::SmallLeafRoot,
            1 => NodeKind::Leaf,
            2 => NodeKind::Internal,
            3 => NodeKind::InternalRoot,
            other => unreachable!("invalid node kind tag: {other}"),
        }
    }
}

const KIND_OFFSET: usize = 0;
const COUNT_OFFSET: usize = KIND_OFFSET + size_of::<u8>();
const MAX_COUNT_OFFSET: usize = COUNT_OFFSET + size_of::<u32>();
const POSITION_OFFSET: usize = MAX_COUNT_OFFSET + size_of::<u32>();
const PARENT_OFFSET: usize = POSITION_OFFSET + size_of::<u32>();
const HEADER_SIZE: usize = PARENT_OFFSET + size_of::<usize>();

/// Capacity constants derived once from a configured target node byte budget (§3), plus
/// the `K`/`V` byte sizes needed to interpret a node's entry array.
#[derive(Debug, Clone, Copy)]
pub struct NodeLayout {
    key_size: usize,
    value_size: usize,
    entry_size: usize,
    ptr_size: usize,
    node_kv_count: usize,
    min_node_kv_count: usize,
}

impl NodeLayout {
    /// `target_node_bytes` is the `target_node_bytes` construction option (§6); default 256.
    pub fn new(target_node_bytes: usize, key_size: usize, value_size: usize) -> Self {
        let entry_size = key_size + value_size;
        let budget = target_node_bytes.saturating_sub(HEADER_SIZE);
        let node_kv_count = (budget / entry_size).max(3);
        let min_node_kv_count = node_kv_count / 2;

        Self {
            key_size,
            value_size,
            entry_size,
            ptr_size: size_of::<usize>(),
            node_kv_count,
            min_node_kv_count,
        }
    }

    pub fn for_types<K: FixedSize, V: FixedSize>(target_node_bytes: usize) -> Self {
        Self::new(target_node_bytes, K::SIZE, V::SIZE)
    }

    #[inline]
    pub fn node_kv_count(&self) -> usize {
        self.node_kv_count
    }

    #[inline]
    pub fn min_node_kv_count(&self) -> usize {
        self.min_node_kv_count
    }

    #[inline]
    pub fn entry_size(&self) -> usize {
        self.entry_size
    }

    #[inline]
    fn entries_offset(&self) -> usize {
        HEADER_SIZE
    }

    #[inline]
    fn children_offset(&self, max_count: usize) -> usize {
        self.entries_offset() + max_count * self.entry_size
    }

    /// Byte size of a regular (non-root) leaf: always sized for `node_kv_count` entries.
    #[inline]
    pub fn leaf_bytes(&self) -> usize {
        self.entries_offset() + self.node_kv_count * self.entry_size
    }

    /// Byte size of an internal node (root or not; the footer that once distinguished
    /// them moved into the tree handle, so both shapes share this formula).
    #[inline]
    pub fn internal_bytes(&self) -> usize {
        self.leaf_bytes() + (self.node_kv_count + 1) * self.ptr_size
    }

    /// Byte size of a small-leaf root currently sized for `max_count` entries
    /// (`max_count` grows 1, 2, 4, … up to `node_kv_count`, §3).
    #[inline]
    pub fn small_leaf_root_bytes(&self, max_count: usize) -> usize {
        self.entries_offset() + max_count * self.entry_size
    }

    /// The exact allocated size of a node, recomputed from its own header fields rather
    /// than threaded through the call stack (§9 REDESIGN FLAG on dynamic node sizing).
    pub fn bytes_for(&self, kind: NodeKind, max_count: usize) -> usize {
        match kind {
            NodeKind::SmallLeafRoot => self.small_leaf_root_bytes(max_count),
            NodeKind::Leaf => self.leaf_bytes(),
            NodeKind::Internal | NodeKind::InternalRoot => self.internal_bytes(),
        }
    }
}

/// An accessor over a node's byte region: the header fields plus the packed entry array
/// and, for internal nodes, the child pointer array.
///
/// This is a thin, `Copy` view. It never owns the underlying bytes, and it carries its
/// own copy of the (cheap, `Copy`) [`NodeLayout`] rather than borrowing one, so a view
/// never ties up a borrow of whatever it was obtained from.
#[derive(Clone, Copy)]
pub struct NodeView<K, V> {
    addr: NodeAddr,
    layout: NodeLayout,
    _marker: PhantomData<(K, V)>,
}

impl<K: FixedSize, V: FixedSize> NodeView<K, V> {
    pub fn new(addr: NodeAddr, layout: NodeLayout) -> Self {
        Self {
            addr,
            layout,
            _marker: PhantomData,
        }
    }

    #[inline]
    pub fn addr(&self) -> NodeAddr {
        self.addr
    }

    #[inline]
    pub fn layout(&self) -> NodeLayout {
        self.layout
    }

    #[inline]
    pub fn kind(&self) -> NodeKind {
        NodeKind::from_u8(unsafe { mem::read_fixed::<u8>(self.addr, KIND_OFFSET) })
    }

    #[inline]
    pub fn set_kind(&self, kind: NodeKind) {
        unsafe { mem::write_fixed(self.addr, KIND_OFFSET, kind as u8) }
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.kind().is_leaf()
    }

    #[inline]
    pub fn is_root(&self) -> bool {
        self.kind().is_root()
    }

    #[inline]
    pub fn count(&self) -> usize {
        unsafe { mem::read_fixed::<u32>(self.addr, COUNT_OFFSET) as usize }
    }

    #[inline]
    pub fn set_count(&self, count: usize) {
        unsafe { mem::write_fixed(self.addr, COUNT_OFFSET, count as u32) }
    }

    #[inline]
    pub fn max_count(&self) -> usize {
        unsafe { mem::read_fixed::<u32>(self.addr, MAX_COUNT_OFFSET) as usize }
    }

    #[inline]
    pub fn set_max_count(&self, max_count: usize) {
        unsafe { mem::write_fixed(self.addr, MAX_COUNT_OFFSET, max_count as u32) }
    }

    #[inline]
    pub fn position(&self) -> usize {
        unsafe { mem::read_fixed::<u32>(self.addr, POSITION_OFFSET) as usize }
    }

    #[inline]
    pub fn set_position(&self, position: usize) {
        unsafe { mem::write_fixed(self.addr, POSITION_OFFSET, position as u32) }
    }

    #[inline]
    pub fn parent_addr(&self) -> NodeAddr {
        let raw = unsafe { mem::read_fixed::<usize>(self.addr, PARENT_OFFSET) };
        addr_from_usize(raw)
    }

    #[inline]
    pub fn set_parent_addr(&self, parent: NodeAddr) {
        unsafe { mem::write_fixed(self.addr, PARENT_OFFSET, addr_to_usize(parent)) }
    }

    /// True for the small-leaf root's self-referential sentinel (§3). Kept as a
    /// debug-asserted secondary invariant; no code path depends on it for correctness.
    #[inline]
    pub fn is_self_parented(&self) -> bool {
        self.parent_addr() == self.addr
    }

    fn entry_offset(&self, i: usize) -> usize {
        self.layout.entries_offset() + i * self.layout.entry_size
    }

    #[inline]
    pub fn key(&self, i: usize) -> K {
        unsafe { mem::read_fixed::<K>(self.addr, self.entry_offset(i)) }
    }

    #[inline]
    pub fn value(&self, i: usize) -> V {
        unsafe { mem::read_fixed::<V>(self.addr, self.entry_offset(i) + self.layout.key_size) }
    }

    #[inline]
    pub fn set_key(&self, i: usize, key: K) {
        unsafe { mem::write_fixed(self.addr, self.entry_offset(i), key) }
    }

    #[inline]
    pub fn set_value(&self, i: usize, value: V) {
        unsafe {
            mem::write_fixed(
                self.addr,
                self.entry_offset(i) + self.layout.key_size,
                value,
            )
        }
    }

    #[inline]
    pub fn set_entry(&self, i: usize, key: K, value: V) {
        self.set_key(i, key);
        self.set_value(i, value);
    }

    fn child_offset(&self, i: usize) -> usize {
        self.layout.children_offset(self.max_count()) + i * self.layout.ptr_size
    }

    #[inline]
    pub fn child(&self, i: usize) -> NodeAddr {
        debug_assert!(!self.is_leaf(), "leaf nodes have no children");
        let raw = unsafe { mem::read_fixed::<usize>(self.addr, self.child_offset(i)) };
        addr_from_usize(raw)
    }

    #[inline]
    pub fn set_child(&self, i: usize, child: NodeAddr) {
        debug_assert!(!self.is_leaf(), "leaf nodes have no children");
        unsafe { mem::write_fixed(self.addr, self.child_offset(i), addr_to_usize(child)) }
    }

    /// Copies `count` raw entry-array bytes starting at `from` to starting at `to`
    /// (may overlap); used by the shift-in-place node mutations.
    pub(crate) fn move_entries(&self, from: usize, to: usize, count: usize) {
        if count == 0 {
            return;
        }
        unsafe {
            mem::move_bytes(
                self.addr,
                self.entry_offset(from),
                self.entry_offset(to),
                count * self.layout.entry_size,
            )
        }
    }

    pub(crate) fn move_children(&self, from: usize, to: usize, count: usize) {
        if count == 0 {
            return;
        }
        unsafe {
            mem::move_bytes(
                self.addr,
                self.child_offset(from),
                self.child_offset(to),
                count * self.layout.ptr_size,
            )
        }
    }

    /// The exact allocated byte size of this node, recomputed from its own header.
    #[inline]
    pub fn byte_size(&self) -> usize {
        self.layout.bytes_for(self.kind(), self.max_count())
    }
}

#[inline]
fn addr_to_usize(addr: NodeAddr) -> usize {
    addr.as_ptr() as usize
}

#[inline]
fn addr_from_usize(raw: usize) -> NodeAddr {
    NodeAddr::from_raw_usize(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mem::{HeapAllocator, RawAllocator};

    fn layout() -> NodeLayout {
        NodeLayout::for_types::<u64, u64>(256)
    }

    #[test]
    fn derives_sane_capacity_constants() {
        let l = layout();
        assert!(l.node_kv_count() >= 3);
        assert_eq!(l.min_node_kv_count(), l.node_kv_count() / 2);
        assert!(l.internal_bytes() > l.leaf_bytes());
    }

    #[test]
    fn header_fields_roundtrip() {
        let l = layout();
        let mut alloc = HeapAllocator::new();
        let addr = alloc.allocate(l.internal_bytes()).unwrap();
        let view: NodeView<u64, u64> = NodeView::new(addr, l);

        view.set_kind(NodeKind::InternalRoot);
        view.set_count(3);
        view.set_max_count(l.node_kv_count());
        view.set_position(0);
        view.set_parent_addr(addr);

        assert_eq!(view.kind(), NodeKind::InternalRoot);
        assert!(view.is_root());
        assert!(!view.is_leaf());
        assert_eq!(view.count(), 3);
        assert!(view.is_self_parented());

        view.set_entry(0, 10u64, 100u64);
        view.set_entry(1, 20u64, 200u64);
        assert_eq!(view.key(0), 10);
        assert_eq!(view.value(1), 200);

        view.set_child(0, addr);
        assert_eq!(view.child(0), addr);

        unsafe { alloc.deallocate(addr, l.internal_bytes()) };
    }
}
