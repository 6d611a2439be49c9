// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tracing and diagnostics for chain building and evaluation.
//!
//! This module provides a [`TraceSink`] trait with one method per event the
//! chain store reports. All method bodies default to no-ops, so implementing
//! only the events you care about is fine.
//!
//! [`Tracer`] wraps an optional `&mut dyn TraceSink`. When the `trace` feature
//! is **off**, every `Tracer` method compiles to nothing. When **on**, each
//! method performs a single `Option` branch before dispatching.
//!
//! # Crate features
//!
//! - `trace`: enables the `Tracer` method bodies (one branch per call).

use crate::error::Error;
use crate::time::SimTime;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Which edit produced a chain state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EditKind {
    /// A modifier was inserted.
    Insert,
    /// A modifier was replaced.
    Replace,
    /// A modifier was removed.
    Remove,
    /// The stages were rebuilt against a new or changed base.
    Rebase,
}

/// Outcome of one [`Modifier::generate_output`](crate::modifier::Modifier::generate_output) call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GenerateOutcome {
    /// A new value was produced.
    Value,
    /// The previous value was kept.
    Unchanged,
    /// Generation failed.
    Failed,
}

// ---------------------------------------------------------------------------
// Event structs
// ---------------------------------------------------------------------------

/// Emitted when a chain state was built.
#[derive(Clone, Copy, Debug)]
pub struct BuildEvent {
    /// Slot index of the chain.
    pub chain: u32,
    /// The edit that was applied.
    pub edit: EditKind,
    /// Number of stages, proxy stage included.
    pub stages: u32,
    /// Number of stages disabled for unresolved inputs.
    pub disabled: u32,
    /// Whether the state was built for an appended chain on behalf of a
    /// transaction rooted elsewhere.
    pub speculative: bool,
}

/// Emitted when building a chain state was rejected.
#[derive(Clone, Debug)]
pub struct BuildFailedEvent {
    /// Slot index of the chain.
    pub chain: u32,
    /// The edit that was attempted.
    pub edit: EditKind,
    /// Why the build failed.
    pub error: Error,
}

/// Emitted when a transaction adopted every participant's new state.
#[derive(Clone, Copy, Debug)]
pub struct CommitEvent {
    /// Slot index of the edited chain.
    pub root: u32,
    /// Number of chains that adopted a new state, root included.
    pub participants: u32,
}

/// Emitted when a transaction restored every participant's prior state.
#[derive(Clone, Copy, Debug)]
pub struct RollbackEvent {
    /// Slot index of the edited chain.
    pub root: u32,
    /// Number of chains that had already adopted and were restored.
    pub restored: u32,
}

/// Emitted when an invalidation walk finished.
#[derive(Clone, Copy, Debug)]
pub struct InvalidateEvent {
    /// Slot index of the chain the walk started in.
    pub chain: u32,
    /// Starting stage.
    pub stage: u32,
    /// Starting element.
    pub element: u32,
    /// Records that went from valid (or failed) to invalid.
    pub invalidated: u32,
    /// Proxy elements of appended chains the walk was forwarded to.
    pub forwarded: u32,
}

/// Emitted after a modifier was asked for an output.
#[derive(Clone, Copy, Debug)]
pub struct GenerateEvent {
    /// Slot index of the chain.
    pub chain: u32,
    /// Generating stage.
    pub stage: u32,
    /// Generated element.
    pub element: u32,
    /// What the modifier returned.
    pub outcome: GenerateOutcome,
}

/// Emitted when the store clock advanced.
#[derive(Clone, Copy, Debug)]
pub struct ClockEvent {
    /// The new simulation time.
    pub time: SimTime,
    /// Number of subscribed chains that were updated.
    pub notified: u32,
}

// ---------------------------------------------------------------------------
// TraceSink trait
// ---------------------------------------------------------------------------

/// Receives trace events from the chain store.
///
/// All methods have default no-op implementations, so you only need to
/// override the events you care about.
pub trait TraceSink {
    /// Called when a chain state was built.
    fn on_build(&mut self, e: &BuildEvent) {
        _ = e;
    }

    /// Called when building a chain state failed.
    fn on_build_failed(&mut self, e: &BuildFailedEvent) {
        _ = e;
    }

    /// Called when a transaction committed.
    fn on_commit(&mut self, e: &CommitEvent) {
        _ = e;
    }

    /// Called when a transaction rolled back.
    fn on_rollback(&mut self, e: &RollbackEvent) {
        _ = e;
    }

    /// Called when an invalidation walk finished.
    fn on_invalidate(&mut self, e: &InvalidateEvent) {
        _ = e;
    }

    /// Called after a modifier generated (or failed to generate) an output.
    fn on_generate(&mut self, e: &GenerateEvent) {
        _ = e;
    }

    /// Called when the store clock advanced.
    fn on_clock(&mut self, e: &ClockEvent) {
        _ = e;
    }
}

// ---------------------------------------------------------------------------
// NoopSink
// ---------------------------------------------------------------------------

/// A [`TraceSink`] that discards all events.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

impl TraceSink for NoopSink {}

// ---------------------------------------------------------------------------
// Tracer wrapper
// ---------------------------------------------------------------------------

/// Thin wrapper around an optional [`TraceSink`].
///
/// When the `trace` feature is **off**, every method compiles to nothing. When
/// **on**, each method checks the inner `Option` (one branch) before
/// dispatching to the sink.
pub struct Tracer<'a> {
    #[cfg(feature = "trace")]
    sink: Option<&'a mut dyn TraceSink>,
    #[cfg(not(feature = "trace"))]
    _marker: core::marker::PhantomData<&'a mut dyn TraceSink>,
}

impl core::fmt::Debug for Tracer<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Tracer").finish_non_exhaustive()
    }
}

impl<'a> Tracer<'a> {
    /// Creates a tracer that dispatches to the given sink.
    #[inline]
    #[must_use]
    pub fn new(sink: &'a mut dyn TraceSink) -> Self {
        #[cfg(feature = "trace")]
        {
            Self { sink: Some(sink) }
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = sink;
            Self {
                _marker: core::marker::PhantomData,
            }
        }
    }

    /// Creates a tracer that discards all events.
    #[inline]
    #[must_use]
    pub fn none() -> Self {
        #[cfg(feature = "trace")]
        {
            Self { sink: None }
        }
        #[cfg(not(feature = "trace"))]
        {
            Self {
                _marker: core::marker::PhantomData,
            }
        }
    }

    /// Emits a [`BuildEvent`].
    #[inline]
    pub fn build(&mut self, e: &BuildEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_build(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`BuildFailedEvent`].
    #[inline]
    pub fn build_failed(&mut self, e: &BuildFailedEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_build_failed(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`CommitEvent`].
    #[inline]
    pub fn commit(&mut self, e: &CommitEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_commit(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`RollbackEvent`].
    #[inline]
    pub fn rollback(&mut self, e: &RollbackEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_rollback(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits an [`InvalidateEvent`].
    #[inline]
    pub fn invalidate(&mut self, e: &InvalidateEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_invalidate(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`GenerateEvent`].
    #[inline]
    pub fn generate(&mut self, e: &GenerateEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_generate(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`ClockEvent`].
    #[inline]
    pub fn clock(&mut self, e: &ClockEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_clock(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Counting {
        builds: u32,
        clocks: u32,
    }

    impl TraceSink for Counting {
        fn on_build(&mut self, _e: &BuildEvent) {
            self.builds += 1;
        }

        fn on_clock(&mut self, _e: &ClockEvent) {
            self.clocks += 1;
        }
    }

    fn build_event() -> BuildEvent {
        BuildEvent {
            chain: 0,
            edit: EditKind::Insert,
            stages: 2,
            disabled: 0,
            speculative: false,
        }
    }

    #[test]
    fn none_tracer_discards() {
        let mut tracer = Tracer::none();
        tracer.build(&build_event());
        tracer.clock(&ClockEvent {
            time: SimTime(1),
            notified: 0,
        });
    }

    #[test]
    fn noop_sink_accepts_everything() {
        let mut sink = NoopSink;
        let mut tracer = Tracer::new(&mut sink);
        tracer.build(&build_event());
        tracer.rollback(&RollbackEvent {
            root: 0,
            restored: 1,
        });
    }

    #[test]
    fn tracer_dispatches_when_enabled() {
        let mut sink = Counting::default();
        {
            let mut tracer = Tracer::new(&mut sink);
            tracer.build(&build_event());
            tracer.clock(&ClockEvent {
                time: SimTime(2),
                notified: 1,
            });
        }
        let expected = u32::from(cfg!(feature = "trace"));
        assert_eq!(sink.builds, expected);
        assert_eq!(sink.clocks, expected);
    }
}
