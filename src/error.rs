//! Error types raised by the map's public surface.
//!
//! None of these are retried, logged, or recovered from internally. Every non-fatal
//! failure surfaces synchronously at the call site, before any mutation is visible to
//! subsequent operations, and the caller decides what to do next.

use std::fmt::Debug;

/// A non-fatal failure raised by a [`BTreeMap`](crate::collections::btree_map::BTreeMap) operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BTreeError {
    /// Raised by [`add`](crate::collections::btree_map::BTreeMap::add) when the key is already present.
    #[error("key already present in the map")]
    DuplicateKey,

    /// Raised by [`get`](crate::collections::btree_map::BTreeMap::get) when the key is absent.
    #[error("key not found in the map")]
    KeyNotFound,

    /// Raised by [`range`](crate::collections::btree_map::BTreeMap::range) when `end < start`.
    #[error("invalid range: end is before start")]
    InvalidRange,

    /// Raised by a cursor write on a position that is not [`is_valid`](crate::collections::btree_map::cursor::Cursor::is_valid).
    #[error("cursor does not point at a valid entry")]
    InvalidCursor,
}

/// The allocator could not satisfy a request for a byte region.
///
/// This is the one failure this crate treats as fatal: there is no recovery path,
/// because a node mid-mutation has nowhere else to put its data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("allocator could not satisfy an allocation request")]
pub struct OutOfMemory;
