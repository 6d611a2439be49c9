// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Dependency tracking and invalidation for chains of modifiers.
//!
//! `modchain_core` keeps track of which data a pipeline of modifiers
//! produces, what each piece depends on, and what becomes stale when
//! something changes. It is `no_std` compatible (with `alloc`) and uses
//! struct-of-arrays storage with generational index handles.
//!
//! # Architecture
//!
//! ```text
//!   Modifier (outputs, dependencies)
//!       │
//!       ▼
//!   ChainStore::add_modifier() ──► build ──► ChainState (stages, edges)
//!                                              │
//!          ┌───────────────────────────────────┤
//!          ▼                                   ▼
//!   ChainStore::invalidate()          ChainStore::process_dependencies()
//!     (push: mark Invalid,              (pull: regenerate on demand via
//!      notify observers)                 Modifier::generate_output)
//! ```
//!
//! **[`chain`]**: The [`ChainStore`](chain::ChainStore), with chain lifecycle,
//! transactional edits, invalidation walks, on-demand regeneration and the
//! simulation clock.
//!
//! **[`modifier`]**: The [`Modifier`](modifier::Modifier) trait clients
//! implement, the [`Palette`](modifier::Palette) that owns modifiers, and the
//! declarations modifiers return.
//!
//! **[`packet`]**: Per-stage element records and their invalidation edges.
//!
//! **[`did`]**: Data identifiers and the registry of their capability flags.
//!
//! **[`notify`]**: Batched observer notification.
//!
//! **[`dirty`]**: Chain-forest tracking via `understory_dirty`.
//!
//! **[`trace`]**: [`TraceSink`](trace::TraceSink) trait and event types for
//! build, commit and evaluation instrumentation, with a zero-overhead
//! [`Tracer`](trace::Tracer) wrapper.
//!
//! # Crate features
//!
//! - `std` (disabled by default): Enables `std` support in dependencies.
//! - `trace` (disabled by default): Enables `Tracer` method bodies (one branch
//!   per call site).

#![no_std]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

extern crate alloc;

pub mod chain;
pub mod config;
pub mod did;
pub mod dirty;
pub mod error;
pub mod modifier;
pub mod notify;
pub mod packet;
pub mod time;
pub mod trace;

pub use error::Error;
