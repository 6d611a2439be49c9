// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Compact binary event recording and decoding.
//!
//! [`RecorderSink`] implements [`TraceSink`] and encodes events into a
//! `Vec<u8>` as fixed-size little-endian records. [`decode`] reads them back
//! as an iterator of [`RecordedEvent`].
//!
//! [`on_build_failed`](TraceSink::on_build_failed) stores only the kind of
//! error, as an [`ErrorKind`].

use modchain_core::Error;
use modchain_core::time::SimTime;
use modchain_core::trace::{
    BuildEvent, BuildFailedEvent, ClockEvent, CommitEvent, EditKind, GenerateEvent,
    GenerateOutcome, InvalidateEvent, RollbackEvent, TraceSink,
};

// ---------------------------------------------------------------------------
// Event type discriminants
// ---------------------------------------------------------------------------

const TAG_BUILD: u8 = 1;
const TAG_BUILD_FAILED: u8 = 2;
const TAG_COMMIT: u8 = 3;
const TAG_ROLLBACK: u8 = 4;
const TAG_INVALIDATE: u8 = 5;
const TAG_GENERATE: u8 = 6;
const TAG_CLOCK: u8 = 7;

/// The variant of an [`Error`], without its payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// [`Error::OutOfMemory`].
    OutOfMemory,
    /// [`Error::InvalidRange`].
    InvalidRange,
    /// [`Error::DependencyUnsatisfied`].
    DependencyUnsatisfied,
    /// [`Error::ValidationFailed`].
    ValidationFailed,
    /// [`Error::EntryConsumed`].
    EntryConsumed,
    /// [`Error::EmptyChain`].
    EmptyChain,
    /// [`Error::CyclicChain`].
    CyclicChain,
    /// [`Error::Reentrant`].
    Reentrant,
}

impl ErrorKind {
    /// Returns the kind of `error`.
    #[must_use]
    pub fn of(error: &Error) -> Self {
        match error {
            Error::OutOfMemory => Self::OutOfMemory,
            Error::InvalidRange { .. } => Self::InvalidRange,
            Error::DependencyUnsatisfied { .. } => Self::DependencyUnsatisfied,
            Error::ValidationFailed { .. } => Self::ValidationFailed,
            Error::EntryConsumed { .. } => Self::EntryConsumed,
            Error::EmptyChain => Self::EmptyChain,
            Error::CyclicChain => Self::CyclicChain,
            Error::Reentrant { .. } => Self::Reentrant,
        }
    }

    fn code(self) -> u8 {
        match self {
            Self::OutOfMemory => 0,
            Self::InvalidRange => 1,
            Self::DependencyUnsatisfied => 2,
            Self::ValidationFailed => 3,
            Self::EntryConsumed => 4,
            Self::EmptyChain => 5,
            Self::CyclicChain => 6,
            Self::Reentrant => 7,
        }
    }

    fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => Self::OutOfMemory,
            1 => Self::InvalidRange,
            2 => Self::DependencyUnsatisfied,
            3 => Self::ValidationFailed,
            4 => Self::EntryConsumed,
            5 => Self::EmptyChain,
            6 => Self::CyclicChain,
            7 => Self::Reentrant,
            _ => return None,
        })
    }
}

// ---------------------------------------------------------------------------
// RecorderSink
// ---------------------------------------------------------------------------

/// A [`TraceSink`] that encodes events into a compact binary buffer.
#[derive(Debug, Default)]
pub struct RecorderSink {
    buf: Vec<u8>,
}

impl RecorderSink {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a view of the recorded bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Consumes the recorder and returns the recorded bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    // -- encoding helpers --------------------------------------------------

    fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_i64(&mut self, v: i64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_edit(&mut self, e: EditKind) {
        self.write_u8(match e {
            EditKind::Insert => 0,
            EditKind::Replace => 1,
            EditKind::Remove => 2,
            EditKind::Rebase => 3,
        });
    }

    fn write_outcome(&mut self, o: GenerateOutcome) {
        self.write_u8(match o {
            GenerateOutcome::Value => 0,
            GenerateOutcome::Unchanged => 1,
            GenerateOutcome::Failed => 2,
        });
    }
}

impl TraceSink for RecorderSink {
    fn on_build(&mut self, e: &BuildEvent) {
        self.write_u8(TAG_BUILD);
        self.write_u32(e.chain);
        self.write_edit(e.edit);
        self.write_u32(e.stages);
        self.write_u32(e.disabled);
        self.write_u8(u8::from(e.speculative));
    }

    fn on_build_failed(&mut self, e: &BuildFailedEvent) {
        self.write_u8(TAG_BUILD_FAILED);
        self.write_u32(e.chain);
        self.write_edit(e.edit);
        self.write_u8(ErrorKind::of(&e.error).code());
    }

    fn on_commit(&mut self, e: &CommitEvent) {
        self.write_u8(TAG_COMMIT);
        self.write_u32(e.root);
        self.write_u32(e.participants);
    }

    fn on_rollback(&mut self, e: &RollbackEvent) {
        self.write_u8(TAG_ROLLBACK);
        self.write_u32(e.root);
        self.write_u32(e.restored);
    }

    fn on_invalidate(&mut self, e: &InvalidateEvent) {
        self.write_u8(TAG_INVALIDATE);
        self.write_u32(e.chain);
        self.write_u32(e.stage);
        self.write_u32(e.element);
        self.write_u32(e.invalidated);
        self.write_u32(e.forwarded);
    }

    fn on_generate(&mut self, e: &GenerateEvent) {
        self.write_u8(TAG_GENERATE);
        self.write_u32(e.chain);
        self.write_u32(e.stage);
        self.write_u32(e.element);
        self.write_outcome(e.outcome);
    }

    fn on_clock(&mut self, e: &ClockEvent) {
        self.write_u8(TAG_CLOCK);
        self.write_i64(e.time.0);
        self.write_u32(e.notified);
    }
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

/// A decoded event from a binary recording.
#[derive(Clone, Debug)]
pub enum RecordedEvent {
    /// A [`BuildEvent`].
    Build(BuildEvent),
    /// A failed build.
    BuildFailed {
        /// Slot index of the chain.
        chain: u32,
        /// The edit that was attempted.
        edit: EditKind,
        /// Kind of error that rejected the build.
        error: ErrorKind,
    },
    /// A [`CommitEvent`].
    Commit(CommitEvent),
    /// A [`RollbackEvent`].
    Rollback(RollbackEvent),
    /// An [`InvalidateEvent`].
    Invalidate(InvalidateEvent),
    /// A [`GenerateEvent`].
    Generate(GenerateEvent),
    /// A [`ClockEvent`].
    Clock(ClockEvent),
}

/// Decodes a byte slice produced by [`RecorderSink`] into an iterator of
/// [`RecordedEvent`].
pub fn decode(bytes: &[u8]) -> DecodeIter<'_> {
    DecodeIter {
        data: bytes,
        pos: 0,
    }
}

/// Iterator over decoded events.
#[derive(Debug)]
pub struct DecodeIter<'a> {
    data: &'a [u8],
    pos: usize,
}

impl DecodeIter<'_> {
    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn read_u8(&mut self) -> Option<u8> {
        if self.remaining() < 1 {
            return None;
        }
        let v = self.data[self.pos];
        self.pos += 1;
        Some(v)
    }

    fn read_u32(&mut self) -> Option<u32> {
        if self.remaining() < 4 {
            return None;
        }
        let v = u32::from_le_bytes(self.data[self.pos..self.pos + 4].try_into().ok()?);
        self.pos += 4;
        Some(v)
    }

    fn read_i64(&mut self) -> Option<i64> {
        if self.remaining() < 8 {
            return None;
        }
        let v = i64::from_le_bytes(self.data[self.pos..self.pos + 8].try_into().ok()?);
        self.pos += 8;
        Some(v)
    }

    fn read_edit(&mut self) -> Option<EditKind> {
        Some(match self.read_u8()? {
            0 => EditKind::Insert,
            1 => EditKind::Replace,
            2 => EditKind::Remove,
            _ => EditKind::Rebase,
        })
    }

    fn read_outcome(&mut self) -> Option<GenerateOutcome> {
        Some(match self.read_u8()? {
            0 => GenerateOutcome::Value,
            1 => GenerateOutcome::Unchanged,
            _ => GenerateOutcome::Failed,
        })
    }

    fn decode_build(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::Build(BuildEvent {
            chain: self.read_u32()?,
            edit: self.read_edit()?,
            stages: self.read_u32()?,
            disabled: self.read_u32()?,
            speculative: self.read_u8()? != 0,
        }))
    }

    fn decode_build_failed(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::BuildFailed {
            chain: self.read_u32()?,
            edit: self.read_edit()?,
            error: ErrorKind::from_code(self.read_u8()?)?,
        })
    }

    fn decode_commit(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::Commit(CommitEvent {
            root: self.read_u32()?,
            participants: self.read_u32()?,
        }))
    }

    fn decode_rollback(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::Rollback(RollbackEvent {
            root: self.read_u32()?,
            restored: self.read_u32()?,
        }))
    }

    fn decode_invalidate(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::Invalidate(InvalidateEvent {
            chain: self.read_u32()?,
            stage: self.read_u32()?,
            element: self.read_u32()?,
            invalidated: self.read_u32()?,
            forwarded: self.read_u32()?,
        }))
    }

    fn decode_generate(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::Generate(GenerateEvent {
            chain: self.read_u32()?,
            stage: self.read_u32()?,
            element: self.read_u32()?,
            outcome: self.read_outcome()?,
        }))
    }

    fn decode_clock(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::Clock(ClockEvent {
            time: SimTime(self.read_i64()?),
            notified: self.read_u32()?,
        }))
    }
}

impl Iterator for DecodeIter<'_> {
    type Item = RecordedEvent;

    fn next(&mut self) -> Option<Self::Item> {
        let tag = self.read_u8()?;
        match tag {
            TAG_BUILD => self.decode_build(),
            TAG_BUILD_FAILED => self.decode_build_failed(),
            TAG_COMMIT => self.decode_commit(),
            TAG_ROLLBACK => self.decode_rollback(),
            TAG_INVALIDATE => self.decode_invalidate(),
            TAG_GENERATE => self.decode_generate(),
            TAG_CLOCK => self.decode_clock(),
            _ => None, // unknown tag → stop iteration
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
