// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Chain-state builder.
//!
//! [`build_state`] turns (previous state, edit, base packet) into a complete,
//! fully wired [`ChainState`] or an error. It never touches a live state: on
//! failure the partially built state is simply dropped.
//!
//! The build runs stage by stage:
//!
//! 1. **Stage 0** copies the base packet (every element Invalid, generated by
//!    the proxy) or, without a base, synthesizes the built-in
//!    `SimulationTime` and `Transform` elements.
//! 2. **Each later stage** copies the previous table forward. If a modifier
//!    occupies it, the builder resolves the modifier's inputs, allocates its
//!    outputs, applies its consumptions and records the invalidation edges
//!    between them.
//! 3. **The final stage** gets an [`Edge::Appended`] sentinel on the
//!    generating record of every element still readable, so invalidations
//!    reach appended chains without them knowing internal indices.

use alloc::vec::Vec;

use hashbrown::HashMap;
use kurbo::Affine;

use crate::did::{Did, DidRegistry, SIMULATION_TIME, TRANSFORM};
use crate::error::Error;
use crate::modifier::{AttrMask, ModifierId, OutputTarget, Palette};
use crate::packet::{DataElement, DataPacket, Edge, ElementState, Generator, IntraDependencies};
use crate::trace::EditKind;

use super::state::ChainState;

/// A structural change to a chain. Indices are modifier positions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Edit {
    Insert { index: u32, modifier: ModifierId },
    Replace { index: u32, modifier: ModifierId },
    Remove { index: u32 },
    /// Keep the modifiers, rebuild against the (possibly new) base.
    Rebase,
}

impl Edit {
    pub(crate) fn kind(self) -> EditKind {
        match self {
            Self::Insert { .. } => EditKind::Insert,
            Self::Replace { .. } => EditKind::Replace,
            Self::Remove { .. } => EditKind::Remove,
            Self::Rebase => EditKind::Rebase,
        }
    }
}

/// The output packet of a predecessor chain.
#[derive(Clone, Copy, Debug)]
pub(crate) struct BasePacket<'a> {
    pub(crate) dids: &'a [Did],
    pub(crate) packet: &'a DataPacket,
    pub(crate) intra: &'a IntraDependencies,
}

impl<'a> BasePacket<'a> {
    pub(crate) fn of(state: &'a ChainState) -> Self {
        Self {
            dids: &state.dids,
            packet: state.last_packet(),
            intra: &state.intra,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct BuildRequest<'a> {
    pub(crate) old: Option<&'a ChainState>,
    pub(crate) base: Option<BasePacket<'a>>,
    pub(crate) edit: Edit,
    /// Fail instead of disabling a previously enabled stage.
    pub(crate) strict: bool,
    pub(crate) default_transform: Affine,
}

#[derive(Debug)]
pub(crate) struct Built {
    pub(crate) state: ChainState,
    /// Stages disabled for unresolved inputs.
    pub(crate) disabled: u32,
}

#[derive(Clone, Copy, Debug)]
struct StageSpec {
    modifier: Option<ModifierId>,
    was_enabled: bool,
}

/// Builds a new chain state.
///
/// # Panics
///
/// Panics if a stage names a modifier the palette does not hold, or if the
/// edit's index is out of range (the store validates indices first).
pub(crate) fn build_state<P: Palette + ?Sized>(
    req: &BuildRequest<'_>,
    registry: &DidRegistry,
    palette: &P,
) -> Result<Built, Error> {
    let specs = stage_specs(req.old, req.edit)?;
    let mut builder = Builder::new(registry);
    builder.seed(req.base)?;
    for (i, spec) in specs.iter().enumerate() {
        #[expect(
            clippy::cast_possible_truncation,
            reason = "stage counts stay far below u32::MAX"
        )]
        let stage = i as u32 + 1;
        builder.push_stage(stage, *spec, req.strict, palette)?;
    }
    builder.add_sentinels()?;
    Ok(builder.finish(req.default_transform))
}

fn stage_specs(old: Option<&ChainState>, edit: Edit) -> Result<Vec<StageSpec>, Error> {
    let existing = old.map_or(&[][..], |s| &s.stages[1..]);
    let mut specs = Vec::new();
    specs.try_reserve(existing.len() + 1)?;
    specs.extend(existing.iter().map(|p| StageSpec {
        modifier: p.modifier,
        was_enabled: p.enabled,
    }));
    let fresh = |modifier| StageSpec {
        modifier: Some(modifier),
        was_enabled: true,
    };
    match edit {
        Edit::Insert { index, modifier } => specs.insert(index as usize, fresh(modifier)),
        Edit::Replace { index, modifier } => specs[index as usize] = fresh(modifier),
        Edit::Remove { index } => {
            specs.remove(index as usize);
        }
        Edit::Rebase => {}
    }
    Ok(specs)
}

struct Builder<'r> {
    registry: &'r DidRegistry,
    dids: Vec<Did>,
    index: HashMap<Did, u32>,
    stages: Vec<DataPacket>,
    intra: IntraDependencies,
    needs_time: bool,
    disabled: u32,
}

impl<'r> Builder<'r> {
    fn new(registry: &'r DidRegistry) -> Self {
        Self {
            registry,
            dids: Vec::new(),
            index: HashMap::new(),
            stages: Vec::new(),
            intra: IntraDependencies::new(),
            needs_time: false,
            disabled: 0,
        }
    }

    fn intern(&mut self, did: Did) -> Result<u32, Error> {
        if let Some(&e) = self.index.get(&did) {
            return Ok(e);
        }
        self.dids.try_reserve(1)?;
        #[expect(
            clippy::cast_possible_truncation,
            reason = "element tables stay far below u32::MAX entries"
        )]
        let e = self.dids.len() as u32;
        self.dids.push(did);
        self.index.insert(did, e);
        Ok(e)
    }

    fn flags_of(&self, e: usize) -> u32 {
        self.registry.did_flags(self.dids[e]).bits()
    }

    fn seed(&mut self, base: Option<BasePacket<'_>>) -> Result<(), Error> {
        let mut elements = Vec::new();
        match base {
            Some(base) => {
                let n = base.packet.elements.len();
                elements.try_reserve(n)?;
                for (e, el) in base.packet.elements.iter().enumerate() {
                    self.intern(base.dids[e])?;
                    let mut proxy = DataElement::new(Generator::Proxy, el.notify);
                    if el.state == ElementState::Consumed {
                        proxy.state = ElementState::Consumed;
                    }
                    elements.push(proxy);
                }
                // Relations between inherited elements become proxy-stage edges.
                self.intra = base.intra.clone();
                for (e, el) in elements.iter_mut().enumerate() {
                    #[expect(
                        clippy::cast_possible_truncation,
                        reason = "element tables stay far below u32::MAX entries"
                    )]
                    let e = e as u32;
                    for &(dependent, _) in base.intra.dependents(e) {
                        if (dependent as usize) < n {
                            el.add_edge(Edge::Local {
                                stage: 0,
                                element: dependent,
                            })?;
                        }
                    }
                }
            }
            None => {
                for did in [SIMULATION_TIME, TRANSFORM] {
                    let e = self.intern(did)?;
                    elements.try_reserve(1)?;
                    elements.push(DataElement::new(Generator::Stage(0), self.flags_of(e as usize)));
                }
            }
        }
        self.intra.ensure_len(self.dids.len())?;
        self.stages.try_reserve(1)?;
        self.stages.push(DataPacket::new(None, elements));
        Ok(())
    }

    /// Returns the element `did` resolves to in the latest stage, if it can
    /// be read there.
    fn resolve_input(&self, did: Did) -> Option<u32> {
        let e = *self.index.get(&did)?;
        let el = self.stages.last()?.elements.get(e as usize)?;
        (el.state != ElementState::Consumed && el.generator != Generator::None).then_some(e)
    }

    fn push_stage<P: Palette + ?Sized>(
        &mut self,
        stage: u32,
        spec: StageSpec,
        strict: bool,
        palette: &P,
    ) -> Result<(), Error> {
        let prev = &self.stages[self.stages.len() - 1];
        let mut elements = Vec::new();
        elements.try_reserve(prev.elements.len())?;
        elements.extend(prev.elements.iter().map(DataElement::copy_forward));
        let mut packet = DataPacket::new(spec.modifier, elements);

        let Some(id) = spec.modifier else {
            return self.push_packet(packet);
        };
        let Some(modifier) = palette.modifier(id) else {
            panic!("{id:?} is not in the palette");
        };
        let outputs = modifier.outputs();
        let deps = modifier.dependencies();

        let mut inputs = Vec::new();
        inputs.try_reserve(deps.inputs.len())?;
        for &did in &deps.inputs {
            let Some(e) = self.resolve_input(did) else {
                if strict && spec.was_enabled {
                    return Err(Error::DependencyUnsatisfied { stage, did });
                }
                packet.enabled = false;
                self.disabled += 1;
                return self.push_packet(packet);
            };
            inputs.push(e);
        }

        // Outputs, expanding wildcards over what this stage already knows.
        let mut produced: Vec<u32> = Vec::new();
        let mut unchanged = AttrMask::NONE;
        for decl in &outputs {
            unchanged = AttrMask(unchanged.0 | decl.unchanged.0);
            match decl.target {
                OutputTarget::Did(did) => {
                    let e = self.intern(did)?;
                    push_unique(&mut produced, e)?;
                }
                OutputTarget::Capable(flags) => {
                    for (e, el) in packet.elements.iter().enumerate() {
                        let readable = el.state != ElementState::Consumed
                            && el.generator != Generator::None;
                        if readable && self.registry.did_flags(self.dids[e]).intersects(flags) {
                            #[expect(
                                clippy::cast_possible_truncation,
                                reason = "element tables stay far below u32::MAX entries"
                            )]
                            let e = e as u32;
                            push_unique(&mut produced, e)?;
                        }
                    }
                }
            }
        }
        let missing = self.dids.len() - packet.elements.len();
        packet.elements.try_reserve(missing)?;
        while packet.elements.len() < self.dids.len() {
            let notify = self.flags_of(packet.elements.len());
            packet.elements.push(DataElement::new(Generator::None, notify));
        }
        self.intra.ensure_len(self.dids.len())?;
        for &e in &produced {
            let el = &mut packet.elements[e as usize];
            el.generator = Generator::Stage(stage);
            el.state = ElementState::Invalid;
            // Earlier generators' relations no longer describe the output.
            self.intra.remove_dependent(e);
        }

        // Consumption. Relations on a consumed element survive only if this
        // modifier leaves every attribute they read untouched.
        for &did in &deps.consumes {
            let Some(&e) = self.index.get(&did) else {
                continue;
            };
            let Some(el) = packet.elements.get_mut(e as usize) else {
                continue;
            };
            if el.state == ElementState::Consumed {
                continue;
            }
            el.state = ElementState::Consumed;
            el.generator = Generator::Stage(stage);
            self.intra
                .retain_dependents(e, |attrs| unchanged.contains(attrs));
        }
        produced.retain(|&e| packet.elements[e as usize].state != ElementState::Consumed);

        // Input edges hang off each input's generating record.
        let prev = self.stages.len() - 1;
        for &input in &inputs {
            let Some(g) = self.stages[prev].elements[input as usize].generator.stage() else {
                continue;
            };
            let record = &mut self.stages[g as usize].elements[input as usize];
            for &output in &produced {
                record.add_edge(Edge::Local {
                    stage,
                    element: output,
                })?;
            }
        }

        for dep in &deps.output_deps {
            let (Some(&output), Some(&on)) =
                (self.index.get(&dep.output), self.index.get(&dep.depends_on))
            else {
                continue;
            };
            if output == on || !produced.contains(&output) {
                continue;
            }
            let Some(el) = packet.elements.get(on as usize) else {
                continue;
            };
            if el.state == ElementState::Consumed {
                continue;
            }
            let edge = Edge::Local {
                stage,
                element: output,
            };
            match el.generator.stage() {
                Some(g) if g == stage => packet.elements[on as usize].add_edge(edge)?,
                Some(g) => self.stages[g as usize].elements[on as usize].add_edge(edge)?,
                None => continue,
            }
            self.intra.add(on, output, dep.attrs)?;
        }

        packet.needs_time = deps.inputs.contains(&SIMULATION_TIME);
        self.needs_time |= packet.needs_time;
        packet.inputs = inputs;
        packet.input_dids = deps.inputs;
        packet.outputs = produced;
        self.push_packet(packet)
    }

    fn push_packet(&mut self, packet: DataPacket) -> Result<(), Error> {
        self.stages.try_reserve(1)?;
        self.stages.push(packet);
        Ok(())
    }

    fn add_sentinels(&mut self) -> Result<(), Error> {
        let last = self.stages.len() - 1;
        for e in 0..self.stages[last].elements.len() {
            let el = &self.stages[last].elements[e];
            if el.state == ElementState::Consumed {
                continue;
            }
            let Some(origin) = el.generator.stage() else {
                continue;
            };
            self.stages[origin as usize].elements[e].add_edge(Edge::Appended { origin })?;
        }
        Ok(())
    }

    fn finish(self, default_transform: Affine) -> Built {
        Built {
            state: ChainState {
                dids: self.dids,
                index: self.index,
                stages: self.stages,
                intra: self.intra,
                default_transform,
                needs_time: self.needs_time,
            },
            disabled: self.disabled,
        }
    }
}

fn push_unique(list: &mut Vec<u32>, e: u32) -> Result<(), Error> {
    if !list.contains(&e) {
        list.try_reserve(1)?;
        list.push(e);
    }
    Ok(())
}
