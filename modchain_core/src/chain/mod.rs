// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Modifier chains.
//!
//! A *chain* is an ordered list of modifiers turning a set of named data
//! elements into another. Each chain has:
//!
//! - An identity ([`ChainId`]), a generational handle that becomes stale when
//!   the chain is destroyed.
//! - A **current state**: stage 0 (the proxy stage) followed by one stage per
//!   modifier. Every stage holds a record for each element the chain knows,
//!   with a validity state, a value, a change counter and the stage that
//!   generates it.
//! - An optional **base** chain whose final output seeds its proxy stage, and
//!   any number of **appended** chains that use it as their base.
//!
//! Chains are stored in struct-of-arrays layout in a [`ChainStore`].
//!
//! # Editing
//!
//! [`add_modifier`](ChainStore::add_modifier),
//! [`set_modifier`](ChainStore::set_modifier),
//! [`remove_modifier`](ChainStore::remove_modifier) and
//! [`prepend_modifier_chain`](ChainStore::prepend_modifier_chain) rebuild the
//! edited chain and every chain appended to it, base before appended. Either
//! every rebuild is adopted or none is: a failure anywhere restores all
//! participants and the caller sees the error.
//!
//! A stage whose input is missing is disabled. With strict validation, a
//! stage that was enabled before the edit may not become disabled; that is
//! an error instead.
//!
//! # Invalidation and re-validation
//!
//! [`invalidate`](ChainStore::invalidate) (push) marks an element and
//! everything derived from it Invalid, across appended chains, using edges
//! recorded at build time. [`process_dependencies`](ChainStore::process_dependencies)
//! (pull) regenerates exactly what an element needs, at most once per
//! invalidation.
//!
//! # Time
//!
//! A chain is subscribed to the store clock while it, or a chain appended to
//! it, reads simulation time. [`advance_time`](ChainStore::advance_time)
//! invalidates the time element of every subscribed forest.

mod build;
mod clock;
mod evaluate;
mod id;
mod invalidate;
mod state;
mod store;
mod transaction;

#[cfg(test)]
mod testing;

pub use evaluate::Resolved;
pub use id::{ChainId, END, INVALID, PROXY};
pub use store::{ChainStore, PacketNotification};
