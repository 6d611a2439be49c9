// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Dirty-tracking channel constants for the chain forest.
//!
//! Chains form a forest: an *appended* chain reads the output packet of its
//! predecessor. The chain store records these links in an
//! [`understory_dirty`] tracker keyed by chain slot, with a dependency edge
//! from every appended chain to its base.
//!
//! # Uses
//!
//! - **Cycle rejection**: links are added with
//!   [`CycleHandling::Error`](understory_dirty::CycleHandling::Error), so
//!   prepending a chain onto one of its own descendants fails before any
//!   state is built.
//! - **Transaction participants**: marking a chain with
//!   [`EagerPolicy`](understory_dirty::EagerPolicy) on [`STRUCTURE`] and
//!   draining it yields the chain and every transitively appended chain,
//!   bases before the chains appended to them. That is the order in which
//!   a reconfiguration rebuilds states.

use understory_dirty::Channel;

/// The chain's stage layout or base changed; appended chains must rebuild.
pub const STRUCTURE: Channel = Channel::new(0);
