// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Recording, pretty-printing, and Chrome trace export for modchain
//! diagnostics.
//!
//! This crate provides [`TraceSink`](modchain_core::trace::TraceSink)
//! implementations for development and post-mortem analysis:
//!
//! - [`pretty::PrettyPrintSink`]: human-readable one-line-per-event output.
//! - [`recorder::RecorderSink`]: compact binary recording with
//!   [`recorder::decode`] for playback.
//! - [`chrome::export`]: writes Chrome Trace Event Format JSON from recorded
//!   bytes.
//!
//! Install a sink with
//! [`ChainStore::set_trace_sink`](modchain_core::chain::ChainStore::set_trace_sink).

pub mod chrome;
pub mod pretty;
pub mod recorder;
