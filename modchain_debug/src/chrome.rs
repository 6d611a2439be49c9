// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Chrome Trace Event Format exporter.
//!
//! [`export`] reads recorded bytes from a [`RecorderSink`](super::recorder::RecorderSink)
//! and writes [Chrome Trace Event Format][spec] JSON to the given writer.
//!
//! Recordings carry no wall-clock timestamps, so each event is placed one
//! microsecond after the previous one. Events of a chain share a track
//! (`tid` is the chain slot).
//!
//! [spec]: https://docs.google.com/document/d/1CvAClvFfyA5R-PhYUmn5OOQtYMH4h6I0nSsKchNAySU

use std::io::{self, Write};

use serde_json::{Value, json};

use crate::recorder::{RecordedEvent, decode};

/// Exports recorded events as Chrome Trace Event Format JSON.
///
/// The output is a complete JSON array of instant events, suitable for
/// loading into `chrome://tracing` or [Perfetto](https://ui.perfetto.dev/).
pub fn export(bytes: &[u8], writer: &mut dyn Write) -> io::Result<()> {
    let mut events: Vec<Value> = Vec::new();

    for (ts, recorded) in decode(bytes).enumerate() {
        let event = match recorded {
            RecordedEvent::Build(e) => json!({
                "ph": "i",
                "name": "Build",
                "cat": "Build",
                "ts": ts,
                "pid": 0,
                "tid": e.chain,
                "s": "t",
                "args": {
                    "edit": format!("{:?}", e.edit),
                    "stages": e.stages,
                    "disabled": e.disabled,
                    "speculative": e.speculative,
                }
            }),
            RecordedEvent::BuildFailed { chain, edit, error } => json!({
                "ph": "i",
                "name": "BuildFailed",
                "cat": "Build",
                "ts": ts,
                "pid": 0,
                "tid": chain,
                "s": "t",
                "args": {
                    "edit": format!("{edit:?}"),
                    "error": format!("{error:?}"),
                }
            }),
            RecordedEvent::Commit(e) => json!({
                "ph": "i",
                "name": "Commit",
                "cat": "Transaction",
                "ts": ts,
                "pid": 0,
                "tid": e.root,
                "s": "p",
                "args": {
                    "participants": e.participants,
                }
            }),
            RecordedEvent::Rollback(e) => json!({
                "ph": "i",
                "name": "Rollback",
                "cat": "Transaction",
                "ts": ts,
                "pid": 0,
                "tid": e.root,
                "s": "p",
                "args": {
                    "restored": e.restored,
                }
            }),
            RecordedEvent::Invalidate(e) => json!({
                "ph": "i",
                "name": "Invalidate",
                "cat": "Evaluate",
                "ts": ts,
                "pid": 0,
                "tid": e.chain,
                "s": "t",
                "args": {
                    "stage": e.stage,
                    "element": e.element,
                    "invalidated": e.invalidated,
                    "forwarded": e.forwarded,
                }
            }),
            RecordedEvent::Generate(e) => json!({
                "ph": "i",
                "name": "Generate",
                "cat": "Evaluate",
                "ts": ts,
                "pid": 0,
                "tid": e.chain,
                "s": "t",
                "args": {
                    "stage": e.stage,
                    "element": e.element,
                    "outcome": format!("{:?}", e.outcome),
                }
            }),
            RecordedEvent::Clock(e) => json!({
                "ph": "i",
                "name": "Clock",
                "cat": "Clock",
                "ts": ts,
                "pid": 0,
                "tid": 0,
                "s": "g",
                "args": {
                    "time": e.time.0,
                    "notified": e.notified,
                }
            }),
        };
        events.push(event);
    }

    serde_json::to_writer_pretty(writer, &events)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::RecorderSink;
    use modchain_core::time::SimTime;
    use modchain_core::trace::{
        BuildEvent, ClockEvent, EditKind, GenerateEvent, GenerateOutcome, TraceSink,
    };

    #[test]
    fn export_produces_valid_json() {
        let mut rec = RecorderSink::new();
        rec.on_build(&BuildEvent {
            chain: 2,
            edit: EditKind::Insert,
            stages: 2,
            disabled: 0,
            speculative: false,
        });
        rec.on_generate(&GenerateEvent {
            chain: 2,
            stage: 1,
            element: 0,
            outcome: GenerateOutcome::Value,
        });
        rec.on_clock(&ClockEvent {
            time: SimTime(33),
            notified: 1,
        });

        let mut out = Vec::new();
        export(rec.as_bytes(), &mut out).unwrap();
        let json_str = String::from_utf8(out).unwrap();

        // Should parse as a JSON array.
        let parsed: Vec<Value> = serde_json::from_str(&json_str).unwrap();
        assert_eq!(parsed.len(), 3);

        assert_eq!(parsed[0]["name"], "Build");
        assert_eq!(parsed[0]["tid"], 2);
        assert_eq!(parsed[0]["args"]["edit"], "Insert");

        assert_eq!(parsed[1]["name"], "Generate");
        assert_eq!(parsed[1]["ts"], 1);
        assert_eq!(parsed[1]["args"]["outcome"], "Value");

        assert_eq!(parsed[2]["name"], "Clock");
        assert_eq!(parsed[2]["args"]["time"], 33);
    }

    #[test]
    fn export_empty_recording() {
        let mut out = Vec::new();
        export(&[], &mut out).unwrap();
        let json_str = String::from_utf8(out).unwrap();
        let parsed: Vec<Value> = serde_json::from_str(&json_str).unwrap();
        assert!(parsed.is_empty());
    }
}
