//! Per-node mutations: search, insert/remove entry, split, rebalance, merge, swap (§4.3).
//!
//! Every function here is purely local: it reads and writes a node plus, at most, its
//! parent or one immediate sibling, and it assumes the caller supplies valid indices. None
//! of them enforce tree-wide invariants; that's [`super::engine`]'s job. Grounded on the
//! teacher's `insert_key_buf`/`remove_key_buf`/`split_max_len`/`merge_min_len`/
//! `steal_from_left`/`steal_from_right` in `collections/btree_map/{internal_node,leaf_node}.rs`.

use crate::comparator::KeyComparator;
use crate::mem::FixedSize;

use super::layout::NodeView;

/// Smallest `i ∈ [0, count]` with `node.key(i) >= k`, found by linear scan using only `lt`
/// (deliberately not binary search: at the target node byte budget the comparison count is
/// small enough that avoiding branch mispredictions wins).
pub fn linear_search<K: FixedSize, V: FixedSize, C: KeyComparator<K>>(
    node: &NodeView<K, V>,
    key: &K,
    cmp: &C,
) -> usize {
    let count = node.count();
    for i in 0..count {
        if !cmp.lt(&node.key(i), key) {
            return i;
        }
    }
    count
}

/// Smallest `i ∈ [0, count]` with `node.key(i) > k`, used by upper-bound lookups where
/// `linear_search` (which stops at the first key `>= k`) would land one slot too early.
pub fn linear_search_upper<K: FixedSize, V: FixedSize, C: KeyComparator<K>>(
    node: &NodeView<K, V>,
    key: &K,
    cmp: &C,
) -> usize {
    let count = node.count();
    for i in 0..count {
        if cmp.lt(key, &node.key(i)) {
            return i;
        }
    }
    count
}

/// Shifts entries `[i, count)` right by one, writes `(key, value)` at `i`, increments
/// `count`. For an internal node, also shifts child pointers `[i+1, count]` right by one;
/// the freshly opened child slot at `i+1` is left as-is. The caller must fill it before
/// any read.
pub fn insert_entry<K: FixedSize, V: FixedSize>(node: &NodeView<K, V>, i: usize, key: K, value: V) {
    let count = node.count();
    debug_assert!(i <= count);

    node.move_entries(i, i + 1, count - i);
    node.set_entry(i, key, value);

    if !node.is_leaf() {
        node.move_children(i + 1, i + 2, count - i);
    }

    node.set_count(count + 1);
}

/// Removes the entry at `i`, shifting entries `[i+1, count)` down by one and decrementing
/// `count`. For an internal node, the child at `i+1` is assumed already logically empty
/// (its contents merged elsewhere by the caller) and is dropped from the child array by
/// shifting `[i+2, count+1)` down to `[i+1, count)`.
pub fn remove_entry<K: FixedSize, V: FixedSize>(node: &NodeView<K, V>, i: usize) {
    let count = node.count();
    debug_assert!(i < count);

    if !node.is_leaf() {
        node.move_children(i + 2, i + 1, count - i - 1);
    }

    node.move_entries(i + 1, i, count - i - 1);
    node.set_count(count - 1);
}

/// Reparents `dst`'s freshly-received children (indices `[0, n)`) to point at `dst` with
/// sequential positions, after a move of raw child bytes from some source node.
fn reparent_children<K: FixedSize, V: FixedSize>(dst: &NodeView<K, V>, start: usize, n: usize) {
    for i in 0..n {
        let child = dst.child(start + i);
        let child_view = NodeView::<K, V>::new(child, dst.layout());
        child_view.set_parent_addr(dst.addr());
        child_view.set_position(start + i);
    }
}

/// The outcome of a [`split`]: the delimiter entry that must be promoted into the parent
/// at `src`'s position, with `dst` installed as the new child at `src.position() + 1`.
pub struct SplitResult<K, V> {
    pub promoted_key: K,
    pub promoted_value: V,
}

/// Biased split: moves entries (and, for internal nodes, children) from `src` into the
/// freshly allocated `dst`, then promotes the delimiter entry that separates them.
///
/// `insert_pos` is where the caller's pending insert will land once this split completes;
/// it determines the bias: inserting at the front (`insert_pos == 0`) pushes almost every
/// entry into `dst`, leaving `src` nearly empty for prepend-heavy workloads; inserting at
/// the back (`insert_pos == max_count`) keeps everything in `src` and leaves `dst` empty
/// for append-heavy workloads; anything in between splits roughly in half.
///
/// `dst` must already be allocated in the same shape as `src` (same `NodeKind`,
/// `max_count`) before this is called. This function sets `dst`'s header (`parent`,
/// `position`) but does not touch `src`'s parent. The caller inserts the promoted entry
/// into the parent and writes `dst`'s child pointer there (inserting into the parent's
/// entry array naturally opens that child slot via [`insert_entry`]).
pub fn split<K: FixedSize, V: FixedSize>(
    src: &NodeView<K, V>,
    dst: &NodeView<K, V>,
    insert_pos: usize,
) -> SplitResult<K, V> {
    let count = src.count();
    let max_count = src.max_count();
    debug_assert_eq!(count, max_count, "split is only valid on a full node");

    let move_count = if insert_pos == 0 {
        count - 1
    } else if insert_pos == max_count {
        0
    } else {
        count / 2
    };
    let keep_count = count - move_count - 1;
    let promoted_idx = keep_count;

    for i in 0..move_count {
        let src_idx = keep_count + 1 + i;
        dst.set_entry(i, src.key(src_idx), src.value(src_idx));
    }

    if !src.is_leaf() {
        for i in 0..=move_count {
            let child = src.child(keep_count + 1 + i);
            dst.set_child(i, child);
        }
    }

    let promoted_key = src.key(promoted_idx);
    let promoted_value = src.value(promoted_idx);

    dst.set_parent_addr(src.parent_addr());
    dst.set_position(src.position() + 1);
    dst.set_count(move_count);

    if !src.is_leaf() {
        reparent_children(dst, 0, move_count + 1);
    }

    src.set_count(keep_count);

    SplitResult {
        promoted_key,
        promoted_value,
    }
}

/// Rotates the parent's delimiter key down into the tail of `left`, pulls `n - 1` entries
/// off `right`'s head into `left`'s tail, and promotes `right`'s new head (its former
/// `(n-1)`-th entry) back up as the delimiter. For internal nodes, also moves the first `n`
/// children of `right` onto `left`'s tail.
pub fn rebalance_right_to_left<K: FixedSize, V: FixedSize>(
    left: &NodeView<K, V>,
    right: &NodeView<K, V>,
    parent: &NodeView<K, V>,
    delimiter_idx: usize,
    n: usize,
) {
    debug_assert!(n >= 1 && n <= right.count());

    let left_count = left.count();
    left.set_entry(
        left_count,
        parent.key(delimiter_idx),
        parent.value(delimiter_idx),
    );
    for i in 0..n - 1 {
        left.set_entry(left_count + 1 + i, right.key(i), right.value(i));
    }

    let new_delimiter_key = right.key(n - 1);
    let new_delimiter_value = right.value(n - 1);

    if !left.is_leaf() {
        for i in 0..n {
            left.set_child(left_count + 1 + i, right.child(i));
        }
        reparent_children(left, left_count + 1, n);
        let remaining = right.count() + 1 - n;
        right.move_children(n, 0, remaining);
        // The children that stayed in `right` shifted down within its own child array;
        // their `position` header field must follow, not just the transplanted ones.
        reparent_children(right, 0, remaining);
    }

    right.move_entries(n, 0, right.count() - n);

    left.set_count(left_count + n);
    right.set_count(right.count() - n);

    parent.set_entry(delimiter_idx, new_delimiter_key, new_delimiter_value);
}

/// Symmetric to [`rebalance_right_to_left`]: pulls `n - 1` entries off `left`'s tail into
/// `right`'s head, rotating the parent's delimiter down into `right`'s new head and
/// promoting `left`'s former tail back up as the delimiter.
pub fn rebalance_left_to_right<K: FixedSize, V: FixedSize>(
    left: &NodeView<K, V>,
    right: &NodeView<K, V>,
    parent: &NodeView<K, V>,
    delimiter_idx: usize,
    n: usize,
) {
    debug_assert!(n >= 1 && n <= left.count());

    let right_count = right.count();
    right.move_entries(0, n, right_count);
    right.set_entry(n - 1, parent.key(delimiter_idx), parent.value(delimiter_idx));

    let left_count = left.count();
    for i in 0..n - 1 {
        right.set_entry(i, left.key(left_count - n + 1 + i), left.value(left_count - n + 1 + i));
    }

    let new_delimiter_key = left.key(left_count - n);
    let new_delimiter_value = left.value(left_count - n);

    if !left.is_leaf() {
        right.move_children(0, n, right_count + 1);
        for i in 0..n {
            right.set_child(i, left.child(left_count - n + 1 + i));
        }
        reparent_children(right, 0, n);
        // `right`'s original children shifted up within its own child array to make room;
        // their `position` header field must follow, not just the transplanted ones.
        reparent_children(right, n, right_count + 1);
    }

    left.set_count(left_count - n);
    right.set_count(right_count + n);

    parent.set_entry(delimiter_idx, new_delimiter_key, new_delimiter_value);
}

/// Absorbs the parent's delimiter plus all of `right`'s entries (and, for internal nodes,
/// children) into `left`'s tail, then removes the delimiter from `parent`. The caller is
/// responsible for freeing `right` at its own allocated size afterward.
pub fn merge<K: FixedSize, V: FixedSize>(
    left: &NodeView<K, V>,
    right: &NodeView<K, V>,
    parent: &NodeView<K, V>,
    delimiter_idx: usize,
) {
    let left_count = left.count();
    let right_count = right.count();

    left.set_entry(
        left_count,
        parent.key(delimiter_idx),
        parent.value(delimiter_idx),
    );
    for i in 0..right_count {
        left.set_entry(left_count + 1 + i, right.key(i), right.value(i));
    }

    if !left.is_leaf() {
        for i in 0..=right_count {
            left.set_child(left_count + 1 + i, right.child(i));
        }
        reparent_children(left, left_count + 1, right_count + 1);
    }

    left.set_count(left_count + 1 + right_count);

    remove_entry(parent, delimiter_idx);
}

/// Entry-wise and child-wise swap of `a` and `b`'s contents, updating every moved child's
/// `parent`/`position` to its new home. Used exclusively on root promotion/demotion, where
/// the tree handle's `root_addr` must end up pointing at whichever of the two nodes is
/// meant to remain addressable as the root.
pub fn swap<K: FixedSize, V: FixedSize>(a: &NodeView<K, V>, b: &NodeView<K, V>) {
    debug_assert_eq!(a.max_count(), b.max_count());
    debug_assert_eq!(a.is_leaf(), b.is_leaf());

    let count = a.count();
    debug_assert_eq!(count, b.count());

    for i in 0..count {
        let (ak, av) = (a.key(i), a.value(i));
        let (bk, bv) = (b.key(i), b.value(i));
        a.set_entry(i, bk, bv);
        b.set_entry(i, ak, av);
    }

    if !a.is_leaf() {
        for i in 0..=count {
            let (ac, bc) = (a.child(i), b.child(i));
            a.set_child(i, bc);
            b.set_child(i, ac);
        }
        reparent_children(a, 0, count + 1);
        reparent_children(b, 0, count + 1);
    }
}
