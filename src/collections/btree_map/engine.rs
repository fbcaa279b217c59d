//! Tree-wide insert/remove driving logic (§4.4): locates the target leaf, grows the
//! small-leaf root, rebalances against a sibling or splits when a node is full, and on
//! removal walks back up the ancestry merging or rebalancing underflowed nodes before
//! trying to shrink the root.
//!
//! This is new logic rather than a direct port: `ic-stable-memory`'s own `collections::btree_map`
//! insert/remove is a textbook fixed-arity B+tree descent (`_stack: Vec<(InternalBTreeNode,
//! usize, usize)>`), whereas this engine's growing small-leaf root, biased split, and
//! skip-rebalance-at-the-edges behavior described have no counterpart there. It's written
//! in that crate's low-level-accessor style, reading and writing header fields directly with
//! no intermediate owned representation of a node, rather than its specific algorithm.

use crate::comparator::KeyComparator;
use crate::error::OutOfMemory;
use crate::mem::{FixedSize, NodeAddr, RawAllocator};

use super::cursor::RawCursor;
use super::layout::NodeKind;
use super::node_ops;
use super::BTreeMap;

/// What happened when the engine tried to place a key: either it was inserted fresh, or
/// it was already present, in which case the caller gets back exactly where (so `set` can
/// overwrite it without a second descent).
pub(crate) enum InsertOutcome {
    Inserted,
    AlreadyPresent(NodeAddr, usize),
}

impl<K: FixedSize, V: FixedSize, C: KeyComparator<K>, A: RawAllocator> BTreeMap<K, V, C, A> {
    pub(crate) fn insert_impl(&mut self, key: K, value: V) -> Result<InsertOutcome, OutOfMemory> {
        let Some(root) = self.root else {
            let addr = self.alloc_node(NodeKind::SmallLeafRoot, 1)?;
            let view = self.view(addr);
            view.set_parent_addr(addr);
            view.set_position(0);
            node_ops::insert_entry(&view, 0, key, value);

            self.root = Some(addr);
            self.leftmost = Some(addr);
            self.rightmost = Some(addr);
            self.size = 1;
            return Ok(InsertOutcome::Inserted);
        };

        let mut node = root;
        let (leaf_addr, leaf_pos) = loop {
            let view = self.view(node);
            let pos = node_ops::linear_search(&view, &key, &self.comparator);
            if view.is_leaf() {
                break (node, pos);
            }
            node = view.child(pos);
        };

        let mut probe = RawCursor {
            node: Some(leaf_addr),
            position: leaf_pos as isize,
        };
        probe.normalize(self);

        if probe.is_valid(self) && self.comparator.eq(&probe.key(self), &key) {
            let addr = probe.node.expect("validated by is_valid");
            return Ok(InsertOutcome::AlreadyPresent(addr, probe.position as usize));
        }

        self.internal_insert(leaf_addr, leaf_pos, key, value)
    }

    fn internal_insert(
        &mut self,
        mut node_addr: NodeAddr,
        mut pos: usize,
        key: K,
        value: V,
    ) -> Result<InsertOutcome, OutOfMemory> {
        loop {
            let view = self.view(node_addr);
            if view.count() < view.max_count() {
                node_ops::insert_entry(&view, pos, key, value);
                self.size += 1;
                return Ok(InsertOutcome::Inserted);
            }

            let (new_addr, new_pos) = self.make_room(node_addr, pos)?;
            node_addr = new_addr;
            pos = new_pos;
        }
    }

    /// Relieves pressure on a full `node_addr` by exactly one of: growing the small-leaf
    /// root in place, rebalancing entries from a sibling with spare capacity, or splitting
    /// (recursively making room in the parent first, if needed). Returns where the pending
    /// insert at `pos` now belongs, since a rebalance or split may have moved it to a
    /// sibling.
    fn make_room(
        &mut self,
        node_addr: NodeAddr,
        pos: usize,
    ) -> Result<(NodeAddr, usize), OutOfMemory> {
        let view = self.view(node_addr);

        if view.kind() == NodeKind::SmallLeafRoot && view.max_count() < self.layout.node_kv_count() {
            return Ok((self.grow_small_root(node_addr)?, pos));
        }

        if !view.is_root() {
            let parent_addr = view.parent_addr();
            let my_pos = view.position();
            let parent_view = self.view(parent_addr);

            if my_pos > 0 {
                let left_addr = parent_view.child(my_pos - 1);
                let left_view = self.view(left_addr);
                let free = left_view.max_count() - left_view.count();
                if free > 0 {
                    let n = free.div_ceil(2).max(1).min(view.count());
                    node_ops::rebalance_right_to_left(&left_view, &view, &parent_view, my_pos - 1, n);
                    // `left_view.count()` is now `old_left_count + n`; entries `[0, n)` of the
                    // pre-rebalance right node landed at left indices `[old_left_count + 1, ..]`
                    // (index `old_left_count` itself is the rotated-down former delimiter).
                    return Ok(if pos < n {
                        (left_addr, left_view.count() - n + 1 + pos)
                    } else {
                        (node_addr, pos - n)
                    });
                }
            }

            if my_pos < parent_view.count() {
                let right_addr = parent_view.child(my_pos + 1);
                let right_view = self.view(right_addr);
                let free = right_view.max_count() - right_view.count();
                if free > 0 {
                    let n = free.div_ceil(2).max(1).min(view.count());
                    let count_before = view.count();
                    node_ops::rebalance_left_to_right(&view, &right_view, &parent_view, my_pos, n);
                    // Position `count_before - n` in the pre-rebalance left node is the entry
                    // promoted up as the new delimiter, so it belongs at the very end of the
                    // shrunk left node rather than the start of right. The boundary is
                    // inclusive on the left side, and the right-side mapping shifts by one.
                    return Ok(if pos <= count_before - n {
                        (node_addr, pos)
                    } else {
                        (right_addr, pos - (count_before - n) - 1)
                    });
                }
            }

            self.ensure_parent_capacity(parent_addr)?;
        }

        self.split_and_place(node_addr, pos)
    }

    fn grow_small_root(&mut self, node_addr: NodeAddr) -> Result<NodeAddr, OutOfMemory> {
        let view = self.view(node_addr);
        let count = view.count();
        let new_max = (view.max_count() * 2).min(self.layout.node_kv_count());

        let new_addr = self.alloc_node(NodeKind::SmallLeafRoot, new_max)?;
        let new_view = self.view(new_addr);
        new_view.set_parent_addr(new_addr);
        new_view.set_position(0);
        for i in 0..count {
            new_view.set_entry(i, view.key(i), view.value(i));
        }
        new_view.set_count(count);

        self.free_node(node_addr);
        self.root = Some(new_addr);
        self.leftmost = Some(new_addr);
        self.rightmost = Some(new_addr);
        Ok(new_addr)
    }

    /// Ensures `addr`'s parent has a free entry slot, recursively splitting ancestors
    /// (ensuring each one's own parent has room first) as needed. A no-op when `addr` is
    /// the root (nothing to promote into).
    fn ensure_parent_capacity(&mut self, addr: NodeAddr) -> Result<(), OutOfMemory> {
        let view = self.view(addr);
        if view.is_root() {
            return Ok(());
        }

        let parent_addr = view.parent_addr();
        let parent_view = self.view(parent_addr);
        if parent_view.count() < parent_view.max_count() {
            return Ok(());
        }

        self.ensure_parent_capacity(parent_addr)?;
        let mid = parent_view.max_count() / 2;
        self.split_and_place(parent_addr, mid)?;
        Ok(())
    }

    /// Splits `node_addr` (allocating a same-shape sibling), promotes the delimiter into
    /// the parent, and reports which side of the split the entry meant for `pos` now
    /// belongs on. When `node_addr` is the root, grows the tree's height first.
    fn split_and_place(
        &mut self,
        node_addr: NodeAddr,
        pos: usize,
    ) -> Result<(NodeAddr, usize), OutOfMemory> {
        let view = self.view(node_addr);
        if view.is_root() {
            return self.split_root(node_addr, pos);
        }

        let kind = view.kind();
        let max_count = view.max_count();
        let new_addr = self.alloc_node(kind, max_count)?;
        let dst_view = self.view(new_addr);
        let result = node_ops::split(&view, &dst_view, pos);

        let parent_addr = view.parent_addr();
        let my_pos = view.position();
        let parent_view = self.view(parent_addr);
        node_ops::insert_entry(&parent_view, my_pos, result.promoted_key, result.promoted_value);
        parent_view.set_child(my_pos + 1, new_addr);
        self.bump_sibling_positions(parent_addr, my_pos + 2);

        if view.is_leaf() && self.rightmost == Some(node_addr) {
            self.rightmost = Some(new_addr);
        }

        let keep_count = view.count();
        Ok(if pos <= keep_count {
            (node_addr, pos)
        } else {
            (new_addr, pos - keep_count - 1)
        })
    }

    /// Grows the tree's height by one level: the current root is demoted to a plain
    /// leaf/internal node and installed as child 0 of a freshly allocated root, which is
    /// then split against (the old root, now a demoted non-root node, is still full).
    fn split_root(&mut self, root_addr: NodeAddr, pos: usize) -> Result<(NodeAddr, usize), OutOfMemory> {
        let view = self.view(root_addr);
        let demoted_kind = if view.is_leaf() {
            NodeKind::Leaf
        } else {
            NodeKind::Internal
        };

        let new_root_addr = self.alloc_node(NodeKind::InternalRoot, self.layout.node_kv_count())?;
        let new_root_view = self.view(new_root_addr);
        new_root_view.set_parent_addr(new_root_addr);
        new_root_view.set_position(0);
        new_root_view.set_count(0);
        new_root_view.set_child(0, root_addr);

        view.set_kind(demoted_kind);
        view.set_parent_addr(new_root_addr);
        view.set_position(0);

        self.root = Some(new_root_addr);

        self.split_and_place(root_addr, pos)
    }

    /// Re-syncs the `position` header field of every child of `parent_addr` starting at
    /// `from_idx`, after an insert/remove shifted the child array underneath them.
    fn bump_sibling_positions(&mut self, parent_addr: NodeAddr, from_idx: usize) {
        let parent_view = self.view(parent_addr);
        let count = parent_view.count();
        for i in from_idx..=count {
            let child = parent_view.child(i);
            self.view(child).set_position(i);
        }
    }

    pub(crate) fn remove_impl(&mut self, key: &K) -> bool {
        let Some(root) = self.root else {
            return false;
        };

        let mut node = root;
        let (found_addr, found_pos) = loop {
            let view = self.view(node);
            let pos = node_ops::linear_search(&view, key, &self.comparator);
            if pos < view.count() && self.comparator.eq(&view.key(pos), key) {
                break (node, pos);
            }
            if view.is_leaf() {
                return false;
            }
            node = view.child(pos);
        };

        let was_internal = !self.view(found_addr).is_leaf();
        let (delete_addr, removed_pos) = if was_internal {
            let mut pred = RawCursor {
                node: Some(found_addr),
                position: found_pos as isize,
            };
            pred.decrement(self);
            let pred_addr = pred.node.expect("an internal entry always has a left subtree");
            let pred_pos = pred.position as usize;

            let (pk, pv) = {
                let pred_view = self.view(pred_addr);
                (pred_view.key(pred_pos), pred_view.value(pred_pos))
            };
            let (fk, fv) = {
                let found_view = self.view(found_addr);
                (found_view.key(found_pos), found_view.value(found_pos))
            };
            self.view(found_addr).set_entry(found_pos, pk, pv);
            self.view(pred_addr).set_entry(pred_pos, fk, fv);

            node_ops::remove_entry(&self.view(pred_addr), pred_pos);
            (pred_addr, pred_pos)
        } else {
            node_ops::remove_entry(&self.view(found_addr), found_pos);
            (found_addr, found_pos)
        };

        self.size -= 1;

        // §4.4: skip rebalancing (but not merging) against the sibling a pop-front/pop-back
        // workload would otherwise thrash, since that sibling would just get drawn from again
        // on the very next removal. A front deletion (removed_pos == 0) skips the right-sibling
        // rebalance; a back deletion skips the left-sibling rebalance. Only the leaf the entry
        // was actually removed from gets this treatment; ascent past a merge uses the ordinary
        // prefer-merge-else-rebalance-from-the-fuller-sibling rule.
        let leaf_count_after = self.view(delete_addr).count();
        let skip_left = removed_pos == leaf_count_after;
        let skip_right = removed_pos == 0;

        self.try_merge_or_rebalance_ascend(delete_addr, (skip_left, skip_right));
        self.try_shrink_root();
        true
    }

    fn try_merge_or_rebalance_ascend(&mut self, mut node_addr: NodeAddr, skip_rebalance: (bool, bool)) {
        let mut skip = skip_rebalance;
        loop {
            let view = self.view(node_addr);
            if view.is_root() || view.count() >= self.layout.min_node_kv_count() {
                return;
            }
            match self.try_merge_or_rebalance(node_addr, skip) {
                Some(parent_addr) => {
                    node_addr = parent_addr;
                    // The skip only applies to the node the deletion actually touched;
                    // once a merge has happened the parent's own fullness relative to
                    // its siblings is unrelated to where in the child the key was.
                    skip = (false, false);
                }
                None => return,
            }
        }
    }

    /// Prefers merging with an adjacent sibling if the combined size fits in one node;
    /// otherwise rebalances a single entry from whichever sibling has slack above
    /// `min_node_kv_count`, unless `skip_rebalance` says to skip that side (§4.4: a
    /// deletion at the very front/back of the node skips rebalancing from that sibling,
    /// since a pop-front/pop-back workload would just thrash it back below `min` next time).
    /// The skip is only honored when the other side can still repair the deficiency; a node
    /// is never left below `min_node_kv_count` while a donor sibling exists, so the skip
    /// falls back to the "wrong" side rather than leave a real underflow unfixed.
    /// Returns the parent address if a merge happened (the caller ascends to check the
    /// parent too), or `None` if a rebalance happened or neither was possible.
    fn try_merge_or_rebalance(
        &mut self,
        node_addr: NodeAddr,
        skip_rebalance: (bool, bool),
    ) -> Option<NodeAddr> {
        let view = self.view(node_addr);
        let parent_addr = view.parent_addr();
        let my_pos = view.position();
        let parent_view = self.view(parent_addr);
        let cap = self.layout.node_kv_count();
        let min = self.layout.min_node_kv_count();

        if my_pos > 0 {
            let left_addr = parent_view.child(my_pos - 1);
            let left_view = self.view(left_addr);
            if left_view.count() + 1 + view.count() <= cap {
                node_ops::merge(&left_view, &view, &parent_view, my_pos - 1);
                self.bump_sibling_positions(parent_addr, my_pos);
                if self.rightmost == Some(node_addr) {
                    self.rightmost = Some(left_addr);
                }
                self.free_node(node_addr);
                return Some(parent_addr);
            }
        }

        if my_pos < parent_view.count() {
            let right_addr = parent_view.child(my_pos + 1);
            let right_view = self.view(right_addr);
            if view.count() + 1 + right_view.count() <= cap {
                node_ops::merge(&view, &right_view, &parent_view, my_pos);
                self.bump_sibling_positions(parent_addr, my_pos + 1);
                if self.rightmost == Some(right_addr) {
                    self.rightmost = Some(node_addr);
                }
                self.free_node(right_addr);
                return Some(parent_addr);
            }
        }

        let left_has_donor = my_pos > 0 && self.view(parent_view.child(my_pos - 1)).count() > min;
        let right_has_donor =
            my_pos < parent_view.count() && self.view(parent_view.child(my_pos + 1)).count() > min;

        // Honor the skip only when the other side can actually take over the repair;
        // otherwise fall back to the skipped side so the node never stays below `min`.
        if left_has_donor && (!skip_rebalance.0 || !right_has_donor) {
            let left_addr = parent_view.child(my_pos - 1);
            let left_view = self.view(left_addr);
            node_ops::rebalance_left_to_right(&left_view, &view, &parent_view, my_pos - 1, 1);
            return None;
        }

        if right_has_donor && (!skip_rebalance.1 || !left_has_donor) {
            let right_addr = parent_view.child(my_pos + 1);
            let right_view = self.view(right_addr);
            node_ops::rebalance_right_to_left(&view, &right_view, &parent_view, my_pos, 1);
            return None;
        }

        None
    }

    fn try_shrink_root(&mut self) {
        let Some(root_addr) = self.root else {
            return;
        };
        let view = self.view(root_addr);
        if view.count() > 0 {
            return;
        }

        if view.is_leaf() {
            self.free_node(root_addr);
            self.root = None;
            self.leftmost = None;
            self.rightmost = None;
            return;
        }

        let sole_child = view.child(0);
        let child_view = self.view(sole_child);
        if child_view.is_leaf() {
            child_view.set_kind(NodeKind::SmallLeafRoot);
            child_view.set_parent_addr(sole_child);
            self.leftmost = Some(sole_child);
            self.rightmost = Some(sole_child);
        } else {
            child_view.set_kind(NodeKind::InternalRoot);
            child_view.set_parent_addr(sole_child);
        }
        child_view.set_position(0);

        self.free_node(root_addr);
        self.root = Some(sole_child);
    }
}
