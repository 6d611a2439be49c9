// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Re-validation (pull).
//!
//! [`ChainStore::process_dependencies`] brings one element record up to date:
//!
//! 1. A Valid record is returned as is. Consumed and failed records are
//!    errors.
//! 2. Otherwise its generator is resolved. Proxy-generated elements are
//!    pulled from the predecessor chain's final stage (or synthesized as a
//!    built-in when there is none); stage-generated elements pull the
//!    stage's inputs from the previous stage and then ask the modifier,
//!    with the stage locked against re-entry.
//! 3. The outcome is stored on the generating record and copied to the
//!    requested record, which ends Valid or ValidationFailed, never in
//!    between.
//!
//! A generating record that is already Valid is reused, so each element is
//! generated at most once between two invalidations.

use alloc::rc::Rc;
use alloc::vec::Vec;

use super::id::{ChainId, INVALID};
use super::store::ChainStore;
use crate::did::{Did, SIMULATION_TIME, TRANSFORM};
use crate::error::Error;
use crate::modifier::{Generated, InputValue, Inputs, Palette, Value};
use crate::packet::{DataElement, ElementState, Generator};
use crate::trace::{GenerateEvent, GenerateOutcome};

/// A resolved element value.
#[derive(Clone, Debug)]
pub struct Resolved {
    /// The value, if the generator produced one.
    pub value: Option<Value>,
    /// Change counter of the value.
    pub change: u64,
}

impl Resolved {
    /// Returns the value downcast to `T`.
    #[must_use]
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.value.as_ref()?.downcast_ref::<T>()
    }

    fn of(el: &DataElement) -> Self {
        Self {
            value: el.value.clone(),
            change: el.change,
        }
    }
}

impl ChainStore {
    /// Brings `element` at `stage` up to date and returns its value.
    ///
    /// `stage` may be [`PROXY`](super::PROXY) (stage 0) or
    /// [`END`](super::END) (the final stage).
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidRange`] if the chain has no such stage or element.
    /// - [`Error::EntryConsumed`] if an earlier stage consumed the element.
    /// - [`Error::ValidationFailed`] if generating the element, or one of
    ///   its inputs, failed. The record stays failed until invalidated.
    /// - [`Error::DependencyUnsatisfied`] if nothing generates the element.
    /// - [`Error::Reentrant`] if the element's stage is already generating it.
    ///
    /// # Panics
    ///
    /// Panics if the handle is stale or a modifier of the chain is missing
    /// from `palette`.
    pub fn process_dependencies<P: Palette + ?Sized>(
        &mut self,
        palette: &mut P,
        id: ChainId,
        element: u32,
        stage: u32,
    ) -> Result<Resolved, Error> {
        self.validate(id);
        let stage = self.locate(id.idx, element, stage)?;
        self.pull(palette, id.idx, stage, element)
    }

    fn record(&self, c: u32, s: u32, e: u32) -> Option<&DataElement> {
        self.current[c as usize]
            .as_ref()?
            .stages
            .get(s as usize)?
            .elements
            .get(e as usize)
    }

    fn record_mut(&mut self, c: u32, s: u32, e: u32) -> Option<&mut DataElement> {
        self.current[c as usize]
            .as_mut()?
            .packet_mut(s)?
            .elements
            .get_mut(e as usize)
    }

    fn did_of(&self, c: u32, e: u32) -> Option<Did> {
        self.current[c as usize].as_ref()?.dids.get(e as usize).copied()
    }

    fn pull<P: Palette + ?Sized>(
        &mut self,
        palette: &mut P,
        c: u32,
        s: u32,
        e: u32,
    ) -> Result<Resolved, Error> {
        let Some(el) = self.record(c, s, e) else {
            return Err(Error::InvalidRange { index: e, len: 0 });
        };
        let generator = el.generator;
        match el.state {
            ElementState::Valid => return Ok(Resolved::of(el)),
            ElementState::Consumed => {
                return Err(Error::EntryConsumed {
                    stage: generator.stage().unwrap_or(s),
                    element: e,
                });
            }
            ElementState::ValidationFailed => {
                return Err(Error::ValidationFailed {
                    stage: s,
                    element: e,
                });
            }
            ElementState::Invalid => {}
        }

        let result = match generator {
            Generator::None => {
                let did = self.did_of(c, e).unwrap_or(SIMULATION_TIME);
                let result = Err(Error::DependencyUnsatisfied { stage: s, did });
                self.settle(c, s, e, &result);
                return result;
            }
            Generator::Proxy | Generator::Stage(0) => self.resolve_proxy(palette, c, e),
            Generator::Stage(g) => self.generate(palette, c, g, e),
        };
        if generator.stage() != Some(s) {
            self.settle(c, s, e, &result);
        }
        result
    }

    /// Resolves a stage-0 element from the predecessor or a built-in.
    fn resolve_proxy<P: Palette + ?Sized>(
        &mut self,
        palette: &mut P,
        c: u32,
        e: u32,
    ) -> Result<Resolved, Error> {
        if let Some(el) = self.record(c, 0, e) {
            match el.state {
                ElementState::Valid => return Ok(Resolved::of(el)),
                ElementState::ValidationFailed => {
                    return Err(Error::ValidationFailed {
                        stage: 0,
                        element: e,
                    });
                }
                _ => {}
            }
        }
        let base = self.base[c as usize];
        let result = if base == INVALID {
            self.builtin(c, e)
        } else {
            match self.current[base as usize].as_ref().map(|s| s.last_stage()) {
                Some(last) => self.pull(palette, base, last, e),
                None => Err(Error::InvalidRange { index: e, len: 0 }),
            }
        };
        self.settle(c, 0, e, &result);
        result
    }

    fn builtin(&mut self, c: u32, e: u32) -> Result<Resolved, Error> {
        let Some(did) = self.did_of(c, e) else {
            return Err(Error::InvalidRange { index: e, len: 0 });
        };
        let value: Value = if did == SIMULATION_TIME {
            Rc::new(self.time)
        } else if did == TRANSFORM {
            let transform = self.current[c as usize]
                .as_ref()
                .map_or(self.default_transform[c as usize], |s| s.default_transform);
            Rc::new(transform)
        } else {
            return Err(Error::DependencyUnsatisfied { stage: 0, did });
        };
        Ok(Resolved {
            value: Some(value),
            change: self.next_stamp(),
        })
    }

    fn generate<P: Palette + ?Sized>(
        &mut self,
        palette: &mut P,
        c: u32,
        g: u32,
        e: u32,
    ) -> Result<Resolved, Error> {
        let (modifier, did, inputs, input_dids) = {
            let Some(state) = self.current[c as usize].as_ref() else {
                return Err(Error::InvalidRange { index: g, len: 0 });
            };
            let packet = &state.stages[g as usize];
            let el = &packet.elements[e as usize];
            match el.state {
                ElementState::Valid => return Ok(Resolved::of(el)),
                ElementState::ValidationFailed => {
                    return Err(Error::ValidationFailed {
                        stage: g,
                        element: e,
                    });
                }
                ElementState::Consumed => {
                    return Err(Error::EntryConsumed {
                        stage: g,
                        element: e,
                    });
                }
                ElementState::Invalid => {}
            }
            // Only a palette that calls back into the store can get here.
            if packet.locked == e {
                return Err(Error::Reentrant {
                    stage: g,
                    element: e,
                });
            }
            let did = state.dids[e as usize];
            let Some(modifier) = packet.modifier else {
                return Err(Error::DependencyUnsatisfied { stage: g, did });
            };
            (modifier, did, packet.inputs.clone(), packet.input_dids.clone())
        };

        let outer = self.lock(c, g, e);
        let mut values = Vec::with_capacity(inputs.len());
        for (&input, &input_did) in inputs.iter().zip(&input_dids) {
            match self.pull(palette, c, g - 1, input) {
                Ok(r) => values.push(InputValue {
                    did: input_did,
                    value: r.value,
                    change: r.change,
                }),
                Err(error) => {
                    self.lock(c, g, outer);
                    let result = Err(error);
                    self.settle(c, g, e, &result);
                    return result;
                }
            }
        }

        let Some(m) = palette.modifier_mut(modifier) else {
            panic!("{modifier:?} is not in the palette");
        };
        let generated = m.generate_output(did, &Inputs::new(&values));
        self.lock(c, g, outer);

        let (result, outcome) = match generated {
            Generated::Value(value) => (
                Ok(Resolved {
                    value: Some(value),
                    change: self.next_stamp(),
                }),
                GenerateOutcome::Value,
            ),
            Generated::Unchanged => {
                let prior = self.record(c, g, e).map(Resolved::of);
                let resolved = match prior {
                    Some(prior) if prior.change != 0 => prior,
                    prior => Resolved {
                        value: prior.and_then(|p| p.value),
                        change: self.next_stamp(),
                    },
                };
                (Ok(resolved), GenerateOutcome::Unchanged)
            }
            Generated::Failed => (
                Err(Error::ValidationFailed {
                    stage: g,
                    element: e,
                }),
                GenerateOutcome::Failed,
            ),
        };
        self.settle(c, g, e, &result);
        self.tracer().generate(&GenerateEvent {
            chain: c,
            stage: g,
            element: e,
            outcome,
        });
        result
    }

    /// Sets the stage's locked element, returning the previous one.
    fn lock(&mut self, c: u32, g: u32, e: u32) -> u32 {
        match self.current[c as usize]
            .as_mut()
            .and_then(|s| s.packet_mut(g))
        {
            Some(packet) => core::mem::replace(&mut packet.locked, e),
            None => INVALID,
        }
    }

    /// Stores an outcome on one record: Valid with the value, or
    /// ValidationFailed with the value released.
    fn settle(&mut self, c: u32, s: u32, e: u32, result: &Result<Resolved, Error>) {
        let Some(el) = self.record_mut(c, s, e) else {
            return;
        };
        match result {
            Ok(r) => {
                el.value = r.value.clone();
                el.change = r.change;
                el.state = ElementState::Valid;
            }
            Err(_) => {
                el.value = None;
                el.state = ElementState::ValidationFailed;
            }
        }
    }
}
