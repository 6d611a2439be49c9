// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Chain identity and index sentinels.

use core::fmt;

/// Sentinel value indicating "no chain" or "no element" in index fields.
pub const INVALID: u32 = u32::MAX;

/// Modifier position meaning "append after the last modifier" (for
/// insertion) or "the last modifier" (for removal and replacement).
pub const END: u32 = u32::MAX;

/// Stage index naming the proxy stage.
///
/// Accepted wherever a stage index is: invalidating or pulling an element at
/// `PROXY` addresses stage 0, whose values come from the predecessor chain
/// or from built-in defaults.
pub const PROXY: u32 = u32::MAX - 1;

/// A handle to a chain in a [`ChainStore`](super::ChainStore).
///
/// Contains both a slot index and a generation counter so that stale handles
/// can be detected after a chain is destroyed and the slot is reused.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChainId {
    /// Slot index into the store's arrays.
    pub(crate) idx: u32,
    /// Generation counter, must match the store's generation for this slot.
    pub(crate) generation: u32,
}

impl ChainId {
    /// Returns the raw slot index (for diagnostics only).
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.idx
    }

    /// Returns the generation counter.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChainId({}@gen{})", self.idx, self.generation)
    }
}

/// Maps [`PROXY`] to stage 0 and passes every other index through.
#[inline]
pub(crate) const fn resolve_stage(stage: u32) -> u32 {
    if stage == PROXY { 0 } else { stage }
}
