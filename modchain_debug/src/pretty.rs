// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Human-readable trace output.
//!
//! [`PrettyPrintSink`] implements [`TraceSink`] and writes one line per event
//! to a [`Write`](std::io::Write) destination (default: stderr).

use std::io::Write;

use modchain_core::trace::{
    BuildEvent, BuildFailedEvent, ClockEvent, CommitEvent, EditKind, GenerateEvent,
    GenerateOutcome, InvalidateEvent, RollbackEvent, TraceSink,
};

/// Writes human-readable trace lines to a [`Write`](std::io::Write) destination.
pub struct PrettyPrintSink<W: Write = Box<dyn Write>> {
    writer: W,
}

impl<W: Write> std::fmt::Debug for PrettyPrintSink<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrettyPrintSink").finish_non_exhaustive()
    }
}

impl PrettyPrintSink {
    /// Creates a sink that writes to stderr.
    #[must_use]
    pub fn stderr() -> Self {
        Self {
            writer: Box::new(std::io::stderr()),
        }
    }

    /// Creates a sink that writes to a boxed writer.
    #[must_use]
    pub fn new(writer: Box<dyn Write>) -> Self {
        Self { writer }
    }
}

impl<W: Write> PrettyPrintSink<W> {
    /// Creates a sink that writes to the given destination.
    #[must_use]
    pub fn with_writer(writer: W) -> Self {
        Self { writer }
    }

    /// Consumes the sink and returns its writer.
    #[must_use]
    pub fn into_writer(self) -> W {
        self.writer
    }
}

fn edit_name(edit: EditKind) -> &'static str {
    match edit {
        EditKind::Insert => "insert",
        EditKind::Replace => "replace",
        EditKind::Remove => "remove",
        EditKind::Rebase => "rebase",
    }
}

impl<W: Write> TraceSink for PrettyPrintSink<W> {
    fn on_build(&mut self, e: &BuildEvent) {
        let speculative = if e.speculative { " speculative" } else { "" };
        let _ = writeln!(
            self.writer,
            "[build] chain={} {} stages={} disabled={}{speculative}",
            e.chain,
            edit_name(e.edit),
            e.stages,
            e.disabled,
        );
    }

    fn on_build_failed(&mut self, e: &BuildFailedEvent) {
        let _ = writeln!(
            self.writer,
            "[build:FAILED] chain={} {}: {}",
            e.chain,
            edit_name(e.edit),
            e.error,
        );
    }

    fn on_commit(&mut self, e: &CommitEvent) {
        let _ = writeln!(
            self.writer,
            "[commit] root={} participants={}",
            e.root, e.participants,
        );
    }

    fn on_rollback(&mut self, e: &RollbackEvent) {
        let _ = writeln!(
            self.writer,
            "[rollback] root={} restored={}",
            e.root, e.restored,
        );
    }

    fn on_invalidate(&mut self, e: &InvalidateEvent) {
        let _ = writeln!(
            self.writer,
            "[invalidate] chain={} stage={} element={} invalidated={} forwarded={}",
            e.chain, e.stage, e.element, e.invalidated, e.forwarded,
        );
    }

    fn on_generate(&mut self, e: &GenerateEvent) {
        let outcome = match e.outcome {
            GenerateOutcome::Value => "value",
            GenerateOutcome::Unchanged => "unchanged",
            GenerateOutcome::Failed => "FAILED",
        };
        let _ = writeln!(
            self.writer,
            "[generate] chain={} stage={} element={} {outcome}",
            e.chain, e.stage, e.element,
        );
    }

    fn on_clock(&mut self, e: &ClockEvent) {
        let _ = writeln!(
            self.writer,
            "[clock] time={} notified={}",
            e.time.0, e.notified,
        );
    }
}
