// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Invalidation (push).
//!
//! Invalidating an element marks it Invalid and walks the edges recorded on
//! its generating record with an explicit stack:
//!
//! - [`Edge::Local`] targets are invalidated if they are currently valid
//!   (or failed), and their own edges are pushed in turn.
//! - [`Edge::Appended`] forwards the element to the proxy stage of every
//!   appended chain, after clearing stale copies between the generating
//!   stage and the chain's final stage.
//!
//! An Invalid record is never revisited within one walk, so every element of
//! every reachable chain is processed at most once. Consumed records are
//! never touched. Modifiers are not called.

use alloc::vec::Vec;

use super::id::ChainId;
use super::store::{ChainStore, PacketNotification};
use crate::error::Error;
use crate::packet::{Edge, ElementState, Generator};
use crate::trace::InvalidateEvent;

#[derive(Clone, Copy, Debug)]
enum Step {
    Local { chain: u32, stage: u32, element: u32 },
    Forward { chain: u32, origin: u32, element: u32 },
}

/// Scratch state of one walk.
#[derive(Debug)]
pub(crate) struct Walk {
    stack: Vec<Step>,
    /// Chains whose subject has a batch open.
    notified: Vec<u32>,
    invalidated: u32,
    forwarded: u32,
}

impl Walk {
    fn new(capacity: usize) -> Self {
        Self {
            stack: Vec::with_capacity(capacity),
            notified: Vec::new(),
            invalidated: 0,
            forwarded: 0,
        }
    }
}

impl ChainStore {
    /// Invalidates `element` at `stage` and everything derived from it.
    ///
    /// `stage` may be [`PROXY`](super::PROXY) (stage 0) or
    /// [`END`](super::END) (the final stage). The element is marked Invalid
    /// even if it already was, so its edges are walked again. Returns the
    /// number of records that stopped being valid.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidRange`] if the chain has no such stage or element.
    pub fn invalidate(&mut self, id: ChainId, element: u32, stage: u32) -> Result<u32, Error> {
        self.validate(id);
        let stage = self.locate(id.idx, element, stage)?;
        Ok(self.invalidate_idx(id.idx, stage, element))
    }

    pub(crate) fn invalidate_idx(&mut self, idx: u32, stage: u32, element: u32) -> u32 {
        let mut walk = Walk::new(self.config.walk_capacity);
        self.invalidate_record(&mut walk, idx, stage, element, true);
        while let Some(step) = walk.stack.pop() {
            match step {
                Step::Local {
                    chain,
                    stage,
                    element,
                } => self.invalidate_record(&mut walk, chain, stage, element, false),
                Step::Forward {
                    chain,
                    origin,
                    element,
                } => self.forward(&mut walk, chain, origin, element),
            }
        }
        self.close_batches(&walk);

        let event = InvalidateEvent {
            chain: idx,
            stage,
            element,
            invalidated: walk.invalidated,
            forwarded: walk.forwarded,
        };
        self.tracer().invalidate(&event);
        walk.invalidated
    }

    fn invalidate_record(&mut self, walk: &mut Walk, c: u32, s: u32, e: u32, force: bool) {
        let Some(el) = self.current[c as usize]
            .as_mut()
            .and_then(|state| state.packet_mut(s))
            .and_then(|packet| packet.elements.get_mut(e as usize))
        else {
            return;
        };
        match el.state {
            ElementState::Consumed => return,
            ElementState::Invalid if !force => return,
            _ => {}
        }
        let changed = el.state != ElementState::Invalid;
        el.state = ElementState::Invalid;
        let notify = el.notify;
        let generator = el.generator;
        let is_generator = el.is_generator_at(s);
        if is_generator {
            walk.stack.extend(el.edges.iter().map(|edge| match *edge {
                Edge::Local { stage, element } => Step::Local {
                    chain: c,
                    stage,
                    element,
                },
                Edge::Appended { origin } => Step::Forward {
                    chain: c,
                    origin,
                    element: e,
                },
            }));
        }

        if changed {
            walk.invalidated += 1;
        }
        if changed || force {
            self.notify_packet(walk, c, notify);
        }
        if is_generator {
            self.invalidate_copies(walk, c, s, e, generator);
        }
    }

    /// Invalidates the cached copies that follow a generating record.
    fn invalidate_copies(&mut self, walk: &mut Walk, c: u32, s: u32, e: u32, generator: Generator) {
        let Some(state) = self.current[c as usize].as_mut() else {
            return;
        };
        let mut bits = 0;
        for packet in state.stages.iter_mut().skip(s as usize + 1) {
            let Some(el) = packet.elements.get_mut(e as usize) else {
                break;
            };
            if el.generator != generator || el.state == ElementState::Consumed {
                break;
            }
            if el.state != ElementState::Invalid {
                el.state = ElementState::Invalid;
                walk.invalidated += 1;
                bits |= el.notify;
            }
        }
        self.notify_packet(walk, c, bits);
    }

    /// Handles an [`Edge::Appended`] sentinel.
    fn forward(&mut self, walk: &mut Walk, c: u32, origin: u32, e: u32) {
        if let Some(state) = self.current[c as usize].as_mut() {
            let mut bits = 0;
            for (t, packet) in state.stages.iter_mut().enumerate().skip(origin as usize + 1) {
                let Some(el) = packet.elements.get_mut(e as usize) else {
                    continue;
                };
                #[expect(
                    clippy::cast_possible_truncation,
                    reason = "stage counts stay far below u32::MAX"
                )]
                let t = t as u32;
                if el.state == ElementState::Valid && !el.is_generator_at(t) {
                    el.state = ElementState::Invalid;
                    walk.invalidated += 1;
                    bits |= el.notify;
                }
            }
            self.notify_packet(walk, c, bits);
        }
        for &a in &self.appended[c as usize] {
            walk.forwarded += 1;
            walk.stack.push(Step::Local {
                chain: a,
                stage: 0,
                element: e,
            });
        }
    }

    fn notify_packet(&mut self, walk: &mut Walk, c: u32, bits: u32) {
        if bits == 0 {
            return;
        }
        let subject = &mut self.subjects[c as usize];
        if subject.is_empty() {
            return;
        }
        if !subject.in_batch() {
            subject.begin_batch();
            walk.notified.push(c);
        }
        subject.notify(bits);
    }

    fn close_batches(&mut self, walk: &Walk) {
        for &c in &walk.notified {
            let chain = self.handle(c);
            for delivery in self.subjects[c as usize].end_batch() {
                self.pending_notifications.push(PacketNotification {
                    chain,
                    observer: delivery.observer,
                    bits: delivery.bits,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec;
    use alloc::vec::Vec;

    use super::*;
    use crate::chain::testing::{Log, Probe};
    use crate::chain::{END, PROXY};
    use crate::did::{Did, DidFlags, TRANSFORM};
    use crate::modifier::{AttrMask, ModifierPalette};
    use crate::notify::ObserverKey;

    const X: Did = Did::new("X");
    const Y: Did = Did::new("Y");

    /// Two-stage chain M0 → X, M1: X → Y, everything pulled valid.
    fn pulled_chain() -> (ChainStore, ModifierPalette, ChainId, u32, u32) {
        let log = Log::default();
        let mut palette = ModifierPalette::new();
        let m0 = Probe::new("m0", &log).output(X).insert(&mut palette);
        let m1 = Probe::new("m1", &log).input(X).output(Y).insert(&mut palette);
        let mut store = ChainStore::new();
        let id = store.create_chain();
        store.add_modifier(&mut palette, id, END, m0, true).unwrap();
        store.add_modifier(&mut palette, id, END, m1, true).unwrap();
        let x = store.element_index(id, X).unwrap();
        let y = store.element_index(id, Y).unwrap();
        store.process_dependencies(&mut palette, id, y, END).unwrap();
        store.process_dependencies(&mut palette, id, x, END).unwrap();
        (store, palette, id, x, y)
    }

    fn invalid_set(store: &ChainStore, id: ChainId) -> Vec<(u32, u32)> {
        let mut out = Vec::new();
        for s in 0..store.stage_count(id) {
            let packet = store.data_packet(id, s).unwrap();
            for (e, el) in packet.elements().iter().enumerate() {
                if el.state() == ElementState::Invalid {
                    out.push((s, e as u32));
                }
            }
        }
        out
    }

    #[test]
    fn walk_follows_edges_and_copies() {
        let (mut store, _palette, id, x, y) = pulled_chain();
        assert_eq!(store.element(id, y, 2).unwrap().state(), ElementState::Valid);
        assert_eq!(store.element(id, x, 2).unwrap().state(), ElementState::Valid);

        let n = store.invalidate(id, x, 1).unwrap();
        // X at 1, its copy at 2, and Y at 2.
        assert_eq!(n, 3);
        for s in 1..=2 {
            assert_eq!(store.element(id, x, s).unwrap().state(), ElementState::Invalid);
        }
        assert_eq!(store.element(id, y, 2).unwrap().state(), ElementState::Invalid);
    }

    #[test]
    fn invalidation_is_idempotent() {
        let (mut store, _palette, id, x, _y) = pulled_chain();
        store.invalidate(id, x, 1).unwrap();
        let once = invalid_set(&store, id);
        assert_eq!(store.invalidate(id, x, 1).unwrap(), 0);
        assert_eq!(invalid_set(&store, id), once);
    }

    #[test]
    fn unrelated_elements_stay_valid() {
        let (mut store, _palette, id, x, y) = pulled_chain();
        store.invalidate(id, y, 2).unwrap();
        assert_eq!(store.element(id, x, 2).unwrap().state(), ElementState::Valid);
        assert_eq!(store.element(id, x, 1).unwrap().state(), ElementState::Valid);
    }

    #[test]
    fn bad_indices_are_rejected() {
        let (mut store, _palette, id, _x, _y) = pulled_chain();
        assert_eq!(
            store.invalidate(id, 0, 9),
            Err(Error::InvalidRange { index: 9, len: 3 })
        );
        assert_eq!(
            store.invalidate(id, 40, PROXY),
            Err(Error::InvalidRange { index: 40, len: 2 })
        );
    }

    #[test]
    fn fan_out_reaches_each_appended_proxy_once() {
        let log = Log::default();
        let mut palette = ModifierPalette::new();
        let m0 = Probe::new("m0", &log).output(X).insert(&mut palette);
        let mut store = ChainStore::new();
        let a = store.create_chain();
        store.add_modifier(&mut palette, a, END, m0, true).unwrap();
        let b = store.create_chain();
        let c = store.create_chain();
        let d = store.create_chain();
        store.prepend_modifier_chain(&mut palette, b, Some(a)).unwrap();
        store.prepend_modifier_chain(&mut palette, c, Some(a)).unwrap();
        store.prepend_modifier_chain(&mut palette, d, Some(b)).unwrap();

        let x = store.element_index(a, X).unwrap();
        for chain in [b, c, d] {
            store.process_dependencies(&mut palette, chain, x, END).unwrap();
            assert_eq!(store.element(chain, x, PROXY).unwrap().state(), ElementState::Valid);
        }

        let n = store.invalidate(a, x, 1).unwrap();
        for chain in [b, c, d] {
            assert_eq!(
                store.element(chain, x, PROXY).unwrap().state(),
                ElementState::Invalid
            );
        }
        // a: X at 1; b, c, d: proxy X each.
        assert_eq!(n, 4);
    }

    #[test]
    fn overridden_output_ignores_earlier_relation_in_appended_chain() {
        let log = Log::default();
        let mut palette = ModifierPalette::new();
        let mesh = Probe::new("mesh", &log)
            .output(X)
            .output(Y)
            .output_dependency(Y, X, AttrMask::ALL)
            .insert(&mut palette);
        let fresh = Probe::new("fresh", &log).output(Y).insert(&mut palette);
        let mut store = ChainStore::new();
        let a = store.create_chain();
        let b = store.create_chain();
        store.add_modifier(&mut palette, a, END, mesh, true).unwrap();
        store.add_modifier(&mut palette, a, END, fresh, true).unwrap();
        store.prepend_modifier_chain(&mut palette, b, Some(a)).unwrap();

        let x = store.element_index(b, X).unwrap();
        let y = store.element_index(b, Y).unwrap();
        store.process_dependencies(&mut palette, b, x, PROXY).unwrap();
        store.process_dependencies(&mut palette, b, y, PROXY).unwrap();

        // Y at the end of `a` comes from `fresh`, which never reads X.
        store.invalidate(a, x, 1).unwrap();
        assert_eq!(store.element(b, x, PROXY).unwrap().state(), ElementState::Invalid);
        assert_eq!(store.element(b, y, PROXY).unwrap().state(), ElementState::Valid);
        assert_eq!(store.element(a, y, END).unwrap().state(), ElementState::Valid);
    }

    #[test]
    fn observers_get_one_delivery_per_walk() {
        let mut palette = ModifierPalette::new();
        let mut store = ChainStore::new();
        let id = store.create_chain();
        store.initialize(id).unwrap();
        let xf = store.element_index(id, TRANSFORM).unwrap();
        store.process_dependencies(&mut palette, id, xf, PROXY).unwrap();

        store.observe(id, ObserverKey(1), DidFlags::RENDERABLE.bits(), 0);
        store.observe(id, ObserverKey(2), DidFlags::TIME.bits(), 0);
        store.invalidate(id, xf, PROXY).unwrap();
        assert_eq!(
            store.drain_notifications(),
            vec![PacketNotification {
                chain: id,
                observer: ObserverKey(1),
                bits: DidFlags::RENDERABLE.bits(),
            }]
        );
        assert!(store.drain_notifications().is_empty());
    }
}
