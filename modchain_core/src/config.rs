// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Chain store configuration.

use crate::time::SimTime;

/// Tunable behaviour of a [`ChainStore`](crate::chain::ChainStore).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StoreConfig {
    /// Initial capacity of the stack each invalidation walk allocates.
    pub walk_capacity: usize,
    /// Whether rebuilds triggered by
    /// [`prepend_modifier_chain`](crate::chain::ChainStore::prepend_modifier_chain)
    /// fail when a previously enabled stage loses an input.
    ///
    /// When `false`, such stages are disabled instead.
    pub rebase_validation: bool,
    /// Simulation time the store clock starts at.
    pub initial_time: SimTime,
}

impl StoreConfig {
    /// Lenient rebasing, clock at zero.
    pub const DEFAULT: Self = Self {
        walk_capacity: 32,
        rebase_validation: false,
        initial_time: SimTime::ZERO,
    };

    /// Like [`DEFAULT`](Self::DEFAULT), but rebasing a chain never silently
    /// disables a stage that was enabled before.
    #[must_use]
    pub const fn strict() -> Self {
        Self {
            rebase_validation: true,
            ..Self::DEFAULT
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}
