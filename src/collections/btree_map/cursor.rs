//! Bidirectional positional traversal over the tree (§4.5).
//!
//! A cursor is conceptually a `(node, position)` pair; `position` may legally equal a
//! node's `count` (meaning "between this node and the next in traversal order") and, only
//! transiently while [`decrement`](Cursor::decrement) walks off the front of the tree, −1.
//! The public types here borrow the map for their lifetime, `Cursor` immutably and `CursorMut`
//! mutably, so the borrow checker rejects a cursor that outlives a structural mutation,
//! rather than a runtime generation check.

use crate::error::BTreeError;
use crate::mem::{FixedSize, NodeAddr, RawAllocator};

use super::node_ops::{linear_search, linear_search_upper};
use super::BTreeMap;
use crate::comparator::KeyComparator;

/// The raw `(node, position)` state shared by [`Cursor`] and [`CursorMut`]. Not exposed
/// directly; it has no idea whether it's allowed to mutate the map it points into.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct RawCursor {
    pub(crate) node: Option<NodeAddr>,
    pub(crate) position: isize,
}

impl RawCursor {
    pub(crate) fn empty() -> Self {
        Self {
            node: None,
            position: 0,
        }
    }

    pub(crate) fn begin<K: FixedSize, V: FixedSize, C: KeyComparator<K>, A: RawAllocator>(
        map: &BTreeMap<K, V, C, A>,
    ) -> Self {
        match map.leftmost {
            Some(addr) => Self {
                node: Some(addr),
                position: 0,
            },
            None => Self::empty(),
        }
    }

    pub(crate) fn end<K: FixedSize, V: FixedSize, C: KeyComparator<K>, A: RawAllocator>(
        map: &BTreeMap<K, V, C, A>,
    ) -> Self {
        match map.rightmost {
            Some(addr) => {
                let count = map.view(addr).count();
                Self {
                    node: Some(addr),
                    position: count as isize,
                }
            }
            None => Self::empty(),
        }
    }

    pub(crate) fn is_valid<K: FixedSize, V: FixedSize, C: KeyComparator<K>, A: RawAllocator>(
        &self,
        map: &BTreeMap<K, V, C, A>,
    ) -> bool {
        match self.node {
            Some(addr) => {
                self.position >= 0 && (self.position as usize) < map.view(addr).count()
            }
            None => false,
        }
    }

    pub(crate) fn key<K: FixedSize, V: FixedSize, C: KeyComparator<K>, A: RawAllocator>(
        &self,
        map: &BTreeMap<K, V, C, A>,
    ) -> K {
        map.view(self.node.expect("key() on an empty cursor"))
            .key(self.position as usize)
    }

    pub(crate) fn value<K: FixedSize, V: FixedSize, C: KeyComparator<K>, A: RawAllocator>(
        &self,
        map: &BTreeMap<K, V, C, A>,
    ) -> V {
        map.view(self.node.expect("value() on an empty cursor"))
            .value(self.position as usize)
    }

    /// While `position` sits at a node's `count` and that node is not the root, bubbles up
    /// to the parent, taking the parent's child-index as the new position. Terminates at
    /// an explicit [`RawCursor::end`] once bubbling reaches the root with nothing greater
    /// above it.
    fn normalize<K: FixedSize, V: FixedSize, C: KeyComparator<K>, A: RawAllocator>(
        &mut self,
        map: &BTreeMap<K, V, C, A>,
    ) {
        loop {
            let Some(addr) = self.node else { return };
            let view = map.view(addr);
            let count = view.count() as isize;

            if self.position < count {
                return;
            }
            if view.is_root() {
                *self = RawCursor::end(map);
                return;
            }

            let parent = view.parent_addr();
            let idx = view.position();
            self.node = Some(parent);
            self.position = idx as isize;
        }
    }

    pub(crate) fn lower_bound<K: FixedSize, V: FixedSize, C: KeyComparator<K>, A: RawAllocator>(
        map: &BTreeMap<K, V, C, A>,
        key: &K,
    ) -> Self {
        let Some(mut node) = map.root else {
            return Self::empty();
        };

        loop {
            let view = map.view(node);
            let pos = linear_search(&view, key, &map.comparator);

            if view.is_leaf() {
                let mut cursor = Self {
                    node: Some(node),
                    position: pos as isize,
                };
                cursor.normalize(map);
                return cursor;
            }

            node = view.child(pos);
        }
    }

    pub(crate) fn upper_bound<K: FixedSize, V: FixedSize, C: KeyComparator<K>, A: RawAllocator>(
        map: &BTreeMap<K, V, C, A>,
        key: &K,
    ) -> Self {
        let Some(mut node) = map.root else {
            return Self::empty();
        };

        loop {
            let view = map.view(node);

            if view.is_leaf() {
                let pos = linear_search_upper(&view, key, &map.comparator);
                let mut cursor = Self {
                    node: Some(node),
                    position: pos as isize,
                };
                cursor.normalize(map);
                return cursor;
            }

            let pos = linear_search(&view, key, &map.comparator);
            node = view.child(pos);
        }
    }

    fn leftmost_leaf_from<K: FixedSize, V: FixedSize, C: KeyComparator<K>, A: RawAllocator>(
        map: &BTreeMap<K, V, C, A>,
        mut node: NodeAddr,
    ) -> NodeAddr {
        loop {
            let view = map.view(node);
            if view.is_leaf() {
                return node;
            }
            node = view.child(0);
        }
    }

    fn rightmost_leaf_from<K: FixedSize, V: FixedSize, C: KeyComparator<K>, A: RawAllocator>(
        map: &BTreeMap<K, V, C, A>,
        mut node: NodeAddr,
    ) -> NodeAddr {
        loop {
            let view = map.view(node);
            if view.is_leaf() {
                return node;
            }
            let last_child = view.count();
            node = view.child(last_child);
        }
    }

    pub(crate) fn increment<K: FixedSize, V: FixedSize, C: KeyComparator<K>, A: RawAllocator>(
        &mut self,
        map: &BTreeMap<K, V, C, A>,
    ) {
        let Some(addr) = self.node else { return };
        let view = map.view(addr);

        if view.is_leaf() {
            if self.position + 1 < view.count() as isize {
                self.position += 1;
                return;
            }

            let mut cur = addr;
            loop {
                let cur_view = map.view(cur);
                if cur_view.is_root() {
                    *self = RawCursor::end(map);
                    return;
                }

                let parent_addr = cur_view.parent_addr();
                let idx = cur_view.position();
                let parent_view = map.view(parent_addr);

                if idx < parent_view.count() {
                    self.node = Some(parent_addr);
                    self.position = idx as isize;
                    return;
                }

                cur = parent_addr;
            }
        } else {
            let child = view.child((self.position + 1) as usize);
            self.node = Some(Self::leftmost_leaf_from(map, child));
            self.position = 0;
        }
    }

    pub(crate) fn decrement<K: FixedSize, V: FixedSize, C: KeyComparator<K>, A: RawAllocator>(
        &mut self,
        map: &BTreeMap<K, V, C, A>,
    ) {
        let Some(addr) = self.node else {
            // empty tree: nothing to decrement onto.
            return;
        };
        let view = map.view(addr);

        if view.is_leaf() {
            if self.position - 1 >= 0 {
                self.position -= 1;
                return;
            }

            let mut cur = addr;
            loop {
                let cur_view = map.view(cur);
                if cur_view.is_root() {
                    // transiently before Begin; the node stays put so a subsequent
                    // increment() can recover the original leaf.
                    self.position = -1;
                    return;
                }

                let parent_addr = cur_view.parent_addr();
                let idx = cur_view.position();

                if idx > 0 {
                    self.node = Some(parent_addr);
                    self.position = idx as isize - 1;
                    return;
                }

                cur = parent_addr;
            }
        } else {
            let child = view.child(self.position as usize);
            let leaf = Self::rightmost_leaf_from(map, child);
            let leaf_count = map.view(leaf).count();
            self.node = Some(leaf);
            self.position = leaf_count as isize - 1;
        }
    }
}

/// A read-only bidirectional cursor into a [`BTreeMap`].
pub struct Cursor<'a, K, V, C, A> {
    map: &'a BTreeMap<K, V, C, A>,
    raw: RawCursor,
}

impl<'a, K: FixedSize, V: FixedSize, C: KeyComparator<K>, A: RawAllocator> Cursor<'a, K, V, C, A> {
    pub(crate) fn from_raw(map: &'a BTreeMap<K, V, C, A>, raw: RawCursor) -> Self {
        Self { map, raw }
    }

    pub fn begin(map: &'a BTreeMap<K, V, C, A>) -> Self {
        Self::from_raw(map, RawCursor::begin(map))
    }

    pub fn end(map: &'a BTreeMap<K, V, C, A>) -> Self {
        Self::from_raw(map, RawCursor::end(map))
    }

    pub fn lower_bound(map: &'a BTreeMap<K, V, C, A>, key: &K) -> Self {
        Self::from_raw(map, RawCursor::lower_bound(map, key))
    }

    pub fn upper_bound(map: &'a BTreeMap<K, V, C, A>, key: &K) -> Self {
        Self::from_raw(map, RawCursor::upper_bound(map, key))
    }

    pub fn is_valid(&self) -> bool {
        self.raw.is_valid(self.map)
    }

    pub fn key(&self) -> K {
        self.raw.key(self.map)
    }

    pub fn value(&self) -> V {
        self.raw.value(self.map)
    }

    pub fn increment(&mut self) {
        self.raw.increment(self.map)
    }

    pub fn decrement(&mut self) {
        self.raw.decrement(self.map)
    }

    pub(crate) fn raw(&self) -> RawCursor {
        self.raw
    }
}

/// A mutable bidirectional cursor into a [`BTreeMap`], able to overwrite the value at its
/// current position.
pub struct CursorMut<'a, K, V, C, A> {
    map: &'a mut BTreeMap<K, V, C, A>,
    raw: RawCursor,
}

impl<'a, K: FixedSize, V: FixedSize, C: KeyComparator<K>, A: RawAllocator> CursorMut<'a, K, V, C, A> {
    pub(crate) fn from_raw(map: &'a mut BTreeMap<K, V, C, A>, raw: RawCursor) -> Self {
        Self { map, raw }
    }

    pub fn is_valid(&self) -> bool {
        self.raw.is_valid(self.map)
    }

    pub fn key(&self) -> K {
        self.raw.key(self.map)
    }

    pub fn value(&self) -> V {
        self.raw.value(self.map)
    }

    pub fn increment(&mut self) {
        self.raw.increment(self.map)
    }

    pub fn decrement(&mut self) {
        self.raw.decrement(self.map)
    }

    /// Overwrites the value at the cursor's current position.
    ///
    /// Fails with [`BTreeError::InvalidCursor`] when the cursor does not currently point
    /// at a valid entry.
    pub fn set_value(&mut self, value: V) -> Result<(), BTreeError> {
        if !self.is_valid() {
            return Err(BTreeError::InvalidCursor);
        }
        let addr = self.raw.node.expect("validated above");
        self.map.view(addr).set_value(self.raw.position as usize, value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collections::btree_map::BTreeMap;

    #[test]
    fn begin_end_and_traversal_over_a_single_leaf() {
        let mut map: BTreeMap<u32, u32> = BTreeMap::new();
        for k in [10u32, 20, 30] {
            map.add(k, k * 10).unwrap();
        }

        let mut cur = Cursor::begin(&map);
        let mut seen = vec![];
        while cur.is_valid() {
            seen.push(cur.key());
            cur.increment();
        }
        assert_eq!(seen, vec![10, 20, 30]);
    }

    #[test]
    fn bidirectional_round_trip_returns_to_begin() {
        let mut map: BTreeMap<u32, u32> = BTreeMap::new();
        for k in 0..50u32 {
            map.add(k, k).unwrap();
        }

        let begin = RawCursor::begin(&map);
        let mut cur = begin;
        for _ in 0..20 {
            cur.increment(&map);
        }
        for _ in 0..20 {
            cur.decrement(&map);
        }
        assert_eq!(cur.node, begin.node);
        assert_eq!(cur.position, begin.position);
    }
}
