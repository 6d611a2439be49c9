// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Error type shared by chain building and evaluation.
//!
//! Build-time errors (returned by the chain store's edit operations) always
//! leave every chain exactly as it was before the edit. Pull-time errors
//! (returned by [`process_dependencies`](crate::chain::ChainStore::process_dependencies))
//! only mark the offending element and never roll a chain back.

use crate::did::Did;

/// Errors reported by the chain store.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// An allocation failed while building a chain state; nothing was kept.
    #[error("out of memory while building chain state")]
    OutOfMemory,

    /// An index was outside the valid range.
    #[error("index {index} out of range (len {len})")]
    InvalidRange {
        /// The rejected index.
        index: u32,
        /// The number of valid positions.
        len: u32,
    },

    /// A previously enabled stage lost one of its inputs under strict
    /// validation.
    #[error("stage {stage} requires {did:?}, which no earlier stage provides")]
    DependencyUnsatisfied {
        /// The stage whose input could not be resolved.
        stage: u32,
        /// The missing input.
        did: Did,
    },

    /// Generating an element failed, or it failed in an earlier pull and
    /// has not been invalidated since.
    #[error("element {element} at stage {stage} failed validation")]
    ValidationFailed {
        /// Stage the element was requested at.
        stage: u32,
        /// Element index.
        element: u32,
    },

    /// The element has been consumed by an earlier stage.
    #[error("element {element} was consumed at stage {stage}")]
    EntryConsumed {
        /// Stage that consumed the element.
        stage: u32,
        /// Element index.
        element: u32,
    },

    /// A removal was requested on a chain without modifiers.
    #[error("chain has no modifiers")]
    EmptyChain,

    /// Prepending would make a chain its own predecessor.
    #[error("prepending would create a chain cycle")]
    CyclicChain,

    /// The element was requested while its generating stage was busy
    /// producing it.
    #[error("element {element} requested while stage {stage} is generating it")]
    Reentrant {
        /// The generating stage.
        stage: u32,
        /// Element index.
        element: u32,
    },
}

impl From<alloc::collections::TryReserveError> for Error {
    fn from(_: alloc::collections::TryReserveError) -> Self {
        Self::OutOfMemory
    }
}
