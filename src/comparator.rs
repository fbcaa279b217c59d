//! The comparator contract the tree engine is built against.
//!
//! Comparators are injected as a zero-size generic type parameter to avoid virtual
//! dispatch; in Rust that's a type parameter bound by a trait rather than an interface
//! or function pointer.

use std::cmp::Ordering;

/// A total strict order over `K`.
///
/// The engine only ever calls [`lt`](KeyComparator::lt) and [`eq`](KeyComparator::eq) on
/// hot paths; `gt` is part of the contract (and used by a handful of symmetry checks) but
/// never required for correctness on its own. Implementations must be internally
/// consistent:
///
/// - `gt(a, b) == lt(b, a)`
/// - `eq(a, b) == (!lt(a, b) && !lt(b, a))`
pub trait KeyComparator<K: ?Sized> {
    fn lt(&self, a: &K, b: &K) -> bool;
    fn gt(&self, a: &K, b: &K) -> bool {
        self.lt(b, a)
    }
    fn eq(&self, a: &K, b: &K) -> bool {
        !self.lt(a, b) && !self.lt(b, a)
    }
}

/// The default comparator: `K`'s natural [`Ord`] impl.
///
/// Zero-sized, so monomorphizing a tree over it elides the comparator entirely: there is
/// no function pointer, no vtable, nothing to dereference at each comparison.
///
/// Earlier default comparators in this lineage tested inequality as `compare(a, b) == 1` /
/// `== -1`, which only happens to work for comparators that return exactly `{-1, 0, 1}`.
/// This impl inspects only the [`Ordering`] variant, which is the actual three-way-compare
/// contract and holds for any `Ord` implementation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct OrdComparator;

impl<K: Ord + ?Sized> KeyComparator<K> for OrdComparator {
    #[inline]
    fn lt(&self, a: &K, b: &K) -> bool {
        a.cmp(b) == Ordering::Less
    }

    #[inline]
    fn gt(&self, a: &K, b: &K) -> bool {
        a.cmp(b) == Ordering::Greater
    }

    #[inline]
    fn eq(&self, a: &K, b: &K) -> bool {
        a.cmp(b) == Ordering::Equal
    }
}
