// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Struct-of-arrays chain storage with allocation, forest links, and read access.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt;

use kurbo::Affine;
use understory_dirty::{CycleHandling, DirtyTracker};

use super::id::{ChainId, END, INVALID, resolve_stage};
use super::state::ChainState;
use crate::config::StoreConfig;
use crate::did::{Did, DidRegistry, TRANSFORM};
use crate::error::Error;
use crate::modifier::{ChainEvent, ModifierId, Palette};
use crate::notify::{ObserverKey, Subject};
use crate::packet::{DataElement, DataPacket};
use crate::time::SimTime;
use crate::trace::{TraceSink, Tracer};

/// A change notification for an observer of a chain's packets.
///
/// Produced by invalidation walks and by transactions that replace a
/// chain's state; collected until [`ChainStore::drain_notifications`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PacketNotification {
    /// The chain whose elements changed.
    pub chain: ChainId,
    /// The observer registered with [`ChainStore::observe`].
    pub observer: ObserverKey,
    /// Changed bits in the observer's own bit space, or
    /// [`Delivery::GONE`](crate::notify::Delivery::GONE) when the chain was
    /// destroyed.
    pub bits: u32,
}

/// Struct-of-arrays storage for all chains.
///
/// Chains are addressed by [`ChainId`] handles. Internally, each chain
/// occupies a slot in parallel arrays. Destroyed chains are recycled via a
/// free list, and generation counters prevent stale handle access.
pub struct ChainStore {
    // -- Chain states --
    pub(crate) current: Vec<Option<ChainState>>,
    /// Prior state of a chain that adopted inside an open transaction.
    pub(crate) rollback: Vec<Option<ChainState>>,
    /// Built but not yet adopted.
    pub(crate) speculative: Vec<Option<ChainState>>,

    // -- Forest links --
    pub(crate) base: Vec<u32>,
    pub(crate) appended: Vec<Vec<u32>>,

    // -- Per-chain properties --
    pub(crate) default_transform: Vec<Affine>,
    pub(crate) clocked: Vec<bool>,
    pub(crate) subjects: Vec<Subject>,

    // -- Allocation --
    pub(crate) generation: Vec<u32>,
    pub(crate) free_list: Vec<u32>,
    pub(crate) len: u32,

    // -- Forest dirty tracking --
    pub(crate) forest: DirtyTracker<u32>,

    // -- Shared evaluation state --
    pub(crate) registry: DidRegistry,
    pub(crate) next_change: u64,
    pub(crate) time: SimTime,
    pub(crate) clock: Subject,
    pub(crate) pending_notifications: Vec<PacketNotification>,
    pub(crate) config: StoreConfig,
    sink: Option<Box<dyn TraceSink>>,
}

impl fmt::Debug for ChainStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainStore")
            .field("len", &self.len)
            .field("free", &self.free_list.len())
            .field("time", &self.time)
            .field("next_change", &self.next_change)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Default for ChainStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ChainStore {
    /// Creates an empty chain store with the default configuration and the
    /// built-in DIDs registered.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(StoreConfig::DEFAULT)
    }

    /// Creates an empty chain store with the given configuration.
    #[must_use]
    pub fn with_config(config: StoreConfig) -> Self {
        Self {
            current: Vec::new(),
            rollback: Vec::new(),
            speculative: Vec::new(),
            base: Vec::new(),
            appended: Vec::new(),
            default_transform: Vec::new(),
            clocked: Vec::new(),
            subjects: Vec::new(),
            generation: Vec::new(),
            free_list: Vec::new(),
            len: 0,
            forest: DirtyTracker::with_cycle_handling(CycleHandling::Error),
            registry: DidRegistry::new(),
            next_change: 0,
            time: config.initial_time,
            clock: Subject::new(),
            pending_notifications: Vec::new(),
            config,
            sink: None,
        }
    }

    /// Returns the store configuration.
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Returns the DID registry.
    #[must_use]
    pub fn registry(&self) -> &DidRegistry {
        &self.registry
    }

    /// Returns the DID registry for registering new DIDs.
    ///
    /// Flags are read when chain states are built; changing the flags of a
    /// DID already in use takes effect at the next rebuild.
    pub fn registry_mut(&mut self) -> &mut DidRegistry {
        &mut self.registry
    }

    /// Installs (or removes) the trace sink, returning the previous one.
    pub fn set_trace_sink(
        &mut self,
        sink: Option<Box<dyn TraceSink>>,
    ) -> Option<Box<dyn TraceSink>> {
        core::mem::replace(&mut self.sink, sink)
    }

    pub(crate) fn tracer(&mut self) -> Tracer<'_> {
        match self.sink.as_deref_mut() {
            Some(sink) => Tracer::new(sink),
            None => Tracer::none(),
        }
    }

    // -- Allocation API --

    /// Creates a new, uninitialized chain and returns its handle.
    ///
    /// The chain has no state until it is [initialized](Self::initialize)
    /// or first edited, no base, an identity default transform, and no
    /// clock.
    pub fn create_chain(&mut self) -> ChainId {
        let idx = if let Some(idx) = self.free_list.pop() {
            // Reuse a freed slot.
            let i = idx as usize;
            self.generation[i] += 1;
            self.current[i] = None;
            self.rollback[i] = None;
            self.speculative[i] = None;
            self.base[i] = INVALID;
            self.appended[i].clear();
            self.default_transform[i] = Affine::IDENTITY;
            self.clocked[i] = false;
            self.subjects[i] = Subject::new();
            idx
        } else {
            let idx = self.len;
            self.len += 1;
            self.current.push(None);
            self.rollback.push(None);
            self.speculative.push(None);
            self.base.push(INVALID);
            self.appended.push(Vec::new());
            self.default_transform.push(Affine::IDENTITY);
            self.clocked.push(false);
            self.subjects.push(Subject::new());
            self.generation.push(0);
            idx
        };

        self.handle(idx)
    }

    /// Destroys a chain, freeing its slot for reuse.
    ///
    /// Detaches the chain from its base, tells every modifier it held that
    /// it was detached, and reports [`Delivery::GONE`] to its observers.
    ///
    /// # Panics
    ///
    /// Panics if chains are still appended to this one (destroy or rebase
    /// them first), if the handle is stale, or if a modifier of the chain is
    /// missing from `palette`.
    ///
    /// [`Delivery::GONE`]: crate::notify::Delivery::GONE
    pub fn destroy_chain<P: Palette + ?Sized>(&mut self, palette: &mut P, id: ChainId) {
        self.validate(id);
        let idx = id.idx;
        let i = idx as usize;
        assert!(
            self.appended[i].is_empty(),
            "cannot destroy chain with appended chains"
        );

        let old_base = self.base[i];
        if old_base != INVALID {
            self.appended[old_base as usize].retain(|&a| a != idx);
            self.base[i] = INVALID;
        }
        self.forest.remove_key(idx);

        if let Some(state) = self.current[i].take() {
            for (_, m) in state.modifiers() {
                notify_modifier(palette, m, ChainEvent::Detached { chain: id });
            }
        }
        self.rollback[i] = None;
        self.speculative[i] = None;

        self.clocked[i] = false;
        self.clock.detach(ObserverKey(idx));
        let subject = core::mem::take(&mut self.subjects[i]);
        for delivery in subject.shutdown() {
            self.pending_notifications.push(PacketNotification {
                chain: id,
                observer: delivery.observer,
                bits: delivery.bits,
            });
        }

        // Bump generation so old handles immediately fail validation.
        self.generation[i] += 1;
        self.free_list.push(idx);

        if old_base != INVALID {
            self.recheck_lineage(old_base);
        }
    }

    /// Returns whether the given handle refers to a live chain.
    #[must_use]
    pub fn is_alive(&self, id: ChainId) -> bool {
        (id.idx < self.len)
            && self.generation[id.idx as usize] == id.generation
            && !self.free_list.contains(&id.idx)
    }

    /// Returns whether the chain has a state yet.
    #[must_use]
    pub fn is_initialized(&self, id: ChainId) -> bool {
        self.validate(id);
        self.current[id.idx as usize].is_some()
    }

    // -- Read API --

    /// Returns the number of modifiers (0 for an uninitialized chain).
    #[must_use]
    pub fn modifier_count(&self, id: ChainId) -> u32 {
        self.validate(id);
        self.current[id.idx as usize]
            .as_ref()
            .map_or(0, ChainState::modifier_count)
    }

    /// Returns the modifier at position `index`; [`END`] names the last.
    #[must_use]
    pub fn modifier(&self, id: ChainId, index: u32) -> Option<ModifierId> {
        self.validate(id);
        let state = self.current[id.idx as usize].as_ref()?;
        let index = if index == END {
            state.modifier_count().checked_sub(1)?
        } else {
            index
        };
        state.modifier(index)
    }

    /// Returns the position of `modifier` in the chain, if it is there.
    #[must_use]
    pub fn chain_index(&self, id: ChainId, modifier: ModifierId) -> Option<u32> {
        self.validate(id);
        let state = self.current[id.idx as usize].as_ref()?;
        state
            .modifiers()
            .find(|&(_, m)| m == modifier)
            .map(|(stage, _)| stage - 1)
    }

    /// Returns the number of stages, proxy stage included (0 for an
    /// uninitialized chain).
    #[must_use]
    pub fn stage_count(&self, id: ChainId) -> u32 {
        self.validate(id);
        self.current[id.idx as usize]
            .as_ref()
            .map_or(0, |s| s.last_stage() + 1)
    }

    /// Returns the packet of `stage`. [`PROXY`](super::PROXY) names stage 0
    /// and [`END`] the final stage.
    #[must_use]
    pub fn data_packet(&self, id: ChainId, stage: u32) -> Option<&DataPacket> {
        self.validate(id);
        let state = self.current[id.idx as usize].as_ref()?;
        let stage = if stage == END {
            state.last_stage()
        } else {
            resolve_stage(stage)
        };
        state.stages.get(stage as usize)
    }

    /// Returns one element record.
    #[must_use]
    pub fn element(&self, id: ChainId, element: u32, stage: u32) -> Option<&DataElement> {
        self.data_packet(id, stage)?.element(element)
    }

    /// Returns the DID table shared by the chain's stages.
    #[must_use]
    pub fn dids(&self, id: ChainId) -> &[Did] {
        self.validate(id);
        self.current[id.idx as usize]
            .as_ref()
            .map_or(&[], |s| s.dids.as_slice())
    }

    /// Returns the element index of `did`, if any stage knows it.
    #[must_use]
    pub fn element_index(&self, id: ChainId, did: Did) -> Option<u32> {
        self.validate(id);
        self.current[id.idx as usize].as_ref()?.element_index(did)
    }

    /// Returns the chain this one is appended to.
    #[must_use]
    pub fn base(&self, id: ChainId) -> Option<ChainId> {
        self.validate(id);
        let b = self.base[id.idx as usize];
        (b != INVALID).then(|| self.handle(b))
    }

    /// Returns the chains appended to this one.
    #[must_use]
    pub fn appended(&self, id: ChainId) -> Vec<ChainId> {
        self.validate(id);
        self.appended[id.idx as usize]
            .iter()
            .map(|&a| self.handle(a))
            .collect()
    }

    /// Returns whether a prior state is still retained for rollback.
    ///
    /// Always `false` outside of a transaction.
    #[must_use]
    pub fn has_rollback_state(&self, id: ChainId) -> bool {
        self.validate(id);
        self.rollback[id.idx as usize].is_some()
    }

    /// Returns whether an unadopted state is pending.
    ///
    /// Always `false` outside of a transaction.
    #[must_use]
    pub fn has_speculative_state(&self, id: ChainId) -> bool {
        self.validate(id);
        self.speculative[id.idx as usize].is_some()
    }

    /// Returns the chain's default transform.
    #[must_use]
    pub fn default_transform(&self, id: ChainId) -> Affine {
        self.validate(id);
        self.default_transform[id.idx as usize]
    }

    /// Sets the value of the built-in `Transform` element and invalidates it.
    ///
    /// Only chains without a base synthesize the built-in; appended chains
    /// inherit `Transform` from their predecessor.
    pub fn set_default_transform(&mut self, id: ChainId, transform: Affine) {
        self.validate(id);
        let i = id.idx as usize;
        self.default_transform[i] = transform;
        let Some(state) = self.current[i].as_mut() else {
            return;
        };
        state.default_transform = transform;
        if let Some(e) = state.element_index(TRANSFORM) {
            _ = self.invalidate_idx(id.idx, 0, e);
        }
    }

    // -- Notification API --

    /// Registers `key` for change notifications on the chain's packets.
    ///
    /// `interest` is a set of notification bits (the [`DidFlags`] of the
    /// elements to watch) shifted left by `shift` into the subject's space.
    ///
    /// [`DidFlags`]: crate::did::DidFlags
    pub fn observe(&mut self, id: ChainId, key: ObserverKey, interest: u32, shift: u8) {
        self.validate(id);
        self.subjects[id.idx as usize].attach(key, interest, shift);
    }

    /// Unregisters `key`.
    pub fn unobserve(&mut self, id: ChainId, key: ObserverKey) {
        self.validate(id);
        self.subjects[id.idx as usize].detach(key);
    }

    /// Takes every notification produced since the last call.
    pub fn drain_notifications(&mut self) -> Vec<PacketNotification> {
        core::mem::take(&mut self.pending_notifications)
    }

    // -- Internal helpers --

    /// Panics if the handle is stale.
    pub(crate) fn validate(&self, id: ChainId) {
        assert!(
            id.idx < self.len && self.generation[id.idx as usize] == id.generation,
            "stale ChainId: {id:?} (current gen: {})",
            if id.idx < self.len {
                self.generation[id.idx as usize]
            } else {
                u32::MAX
            }
        );
    }

    pub(crate) fn handle(&self, idx: u32) -> ChainId {
        ChainId {
            idx,
            generation: self.generation[idx as usize],
        }
    }

    /// Returns a change counter value never handed out before.
    pub(crate) fn next_stamp(&mut self) -> u64 {
        self.next_change += 1;
        self.next_change
    }

    /// Resolves a caller-facing stage index and checks `element` exists
    /// there.
    pub(crate) fn locate(&self, idx: u32, element: u32, stage: u32) -> Result<u32, Error> {
        let Some(state) = self.current[idx as usize].as_ref() else {
            return Err(Error::InvalidRange {
                index: stage,
                len: 0,
            });
        };
        let stage = if stage == END {
            state.last_stage()
        } else {
            resolve_stage(stage)
        };
        let Some(packet) = state.stages.get(stage as usize) else {
            return Err(Error::InvalidRange {
                index: stage,
                len: state.last_stage() + 1,
            });
        };
        if element as usize >= packet.elements.len() {
            #[expect(
                clippy::cast_possible_truncation,
                reason = "element tables stay far below u32::MAX entries"
            )]
            let len = packet.elements.len() as u32;
            return Err(Error::InvalidRange {
                index: element,
                len,
            });
        }
        Ok(stage)
    }
}

/// Delivers a lifecycle event to a modifier held by `palette`.
///
/// # Panics
///
/// Panics if the modifier is not in the palette.
pub(crate) fn notify_modifier<P: Palette + ?Sized>(
    palette: &mut P,
    id: ModifierId,
    event: ChainEvent,
) {
    let Some(modifier) = palette.modifier_mut(id) else {
        panic!("{id:?} is not in the palette");
    };
    modifier.notify(event);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::PROXY;
    use crate::chain::testing::{Log, Probe};
    use crate::did::SIMULATION_TIME;
    use crate::modifier::ModifierPalette;
    use crate::notify::Delivery;
    use crate::packet::ElementState;

    const X: Did = Did::new("X");
    const Y: Did = Did::new("Y");
    const Z: Did = Did::new("Z");

    /// `(state, change)` of every record of every stage.
    fn snapshot(store: &ChainStore, id: ChainId) -> Vec<Vec<(ElementState, u64)>> {
        (0..store.stage_count(id))
            .map(|s| {
                store
                    .data_packet(id, s)
                    .map(|p| p.elements().iter().map(|e| (e.state(), e.change())).collect())
                    .unwrap_or_default()
            })
            .collect()
    }

    #[test]
    fn create_and_destroy() {
        let mut palette = ModifierPalette::new();
        let mut store = ChainStore::new();
        let id = store.create_chain();
        assert!(store.is_alive(id));
        assert!(!store.is_initialized(id));
        store.destroy_chain(&mut palette, id);
        assert!(!store.is_alive(id));
    }

    #[test]
    fn generation_prevents_stale_access() {
        let mut palette = ModifierPalette::new();
        let mut store = ChainStore::new();
        let id1 = store.create_chain();
        store.destroy_chain(&mut palette, id1);
        let id2 = store.create_chain();
        // id2 reuses the same slot but has a different generation.
        assert!(!store.is_alive(id1));
        assert!(store.is_alive(id2));
        assert_eq!(id1.idx, id2.idx);
        assert_ne!(id1.generation, id2.generation);
    }

    #[test]
    #[should_panic(expected = "stale ChainId")]
    fn destroyed_handle_panics_on_read() {
        let mut palette = ModifierPalette::new();
        let mut store = ChainStore::new();
        let id = store.create_chain();
        store.destroy_chain(&mut palette, id);
        let _ = store.modifier_count(id);
    }

    #[test]
    fn uninitialized_chain_reads_empty() {
        let mut store = ChainStore::new();
        let id = store.create_chain();
        assert_eq!(store.modifier_count(id), 0);
        assert_eq!(store.stage_count(id), 0);
        assert!(store.data_packet(id, PROXY).is_none());
        assert!(store.dids(id).is_empty());
        assert_eq!(store.modifier(id, END), None);
    }

    #[test]
    fn initialize_builds_proxy_stage() {
        let mut store = ChainStore::new();
        let id = store.create_chain();
        store.initialize(id).unwrap();
        assert_eq!(store.stage_count(id), 1);
        assert_eq!(store.dids(id), &[SIMULATION_TIME, TRANSFORM]);
        assert!(store.element_index(id, TRANSFORM).is_some());
        // Idempotent.
        store.initialize(id).unwrap();
        assert_eq!(store.stage_count(id), 1);
    }

    #[test]
    fn read_accessors() {
        let log = Log::default();
        let mut palette = ModifierPalette::new();
        let m = Probe::new("m", &log).output(X).insert(&mut palette);
        let mut store = ChainStore::new();
        let id = store.create_chain();
        store.add_modifier(&mut palette, id, END, m, true).unwrap();

        assert_eq!(store.modifier(id, 0), Some(m));
        assert_eq!(store.modifier(id, END), Some(m));
        assert_eq!(store.modifier(id, 1), None);
        assert_eq!(store.chain_index(id, m), Some(0));
        assert_eq!(store.chain_index(id, ModifierId(99)), None);
        let x = store.element_index(id, X).unwrap();
        assert_eq!(store.data_packet(id, END).unwrap().outputs(), &[x]);
        assert!(store.element(id, x, PROXY).is_none(), "X is unknown at stage 0");
        assert!(store.element(id, x, 1).is_some());
    }

    #[test]
    fn destroy_detaches_modifiers_and_observers() {
        let log = Log::default();
        let mut palette = ModifierPalette::new();
        let m = Probe::new("m", &log).output(X).insert(&mut palette);
        let mut store = ChainStore::new();
        let id = store.create_chain();
        store.add_modifier(&mut palette, id, END, m, true).unwrap();
        store.observe(id, ObserverKey(7), u32::MAX, 0);
        log.clear();

        store.destroy_chain(&mut palette, id);
        assert_eq!(log.events("m"), &[ChainEvent::Detached { chain: id }]);
        assert_eq!(
            store.drain_notifications(),
            &[PacketNotification {
                chain: id,
                observer: ObserverKey(7),
                bits: Delivery::GONE,
            }]
        );
    }

    #[test]
    #[should_panic(expected = "cannot destroy chain with appended chains")]
    fn destroy_with_appended_panics() {
        let mut palette = ModifierPalette::new();
        let mut store = ChainStore::new();
        let a = store.create_chain();
        let b = store.create_chain();
        store.prepend_modifier_chain(&mut palette, b, Some(a)).unwrap();
        store.destroy_chain(&mut palette, a);
    }

    #[test]
    fn locate_reports_ranges() {
        let mut store = ChainStore::new();
        let id = store.create_chain();
        assert_eq!(
            store.locate(id.idx, 0, 0),
            Err(Error::InvalidRange { index: 0, len: 0 })
        );
        store.initialize(id).unwrap();
        assert_eq!(store.locate(id.idx, 1, PROXY), Ok(0));
        assert_eq!(store.locate(id.idx, 0, END), Ok(0));
        assert_eq!(
            store.locate(id.idx, 0, 3),
            Err(Error::InvalidRange { index: 3, len: 1 })
        );
        assert_eq!(
            store.locate(id.idx, 5, 0),
            Err(Error::InvalidRange { index: 5, len: 2 })
        );
    }

    #[test]
    fn set_default_transform_invalidates_builtin() {
        let mut palette = ModifierPalette::new();
        let mut store = ChainStore::new();
        let id = store.create_chain();
        store.initialize(id).unwrap();
        let xf = store.element_index(id, TRANSFORM).unwrap();

        let first = store.process_dependencies(&mut palette, id, xf, PROXY).unwrap();
        assert_eq!(first.downcast_ref::<Affine>(), Some(&Affine::IDENTITY));

        let moved = Affine::translate((3.0, 4.0));
        store.set_default_transform(id, moved);
        let second = store.process_dependencies(&mut palette, id, xf, PROXY).unwrap();
        assert_eq!(second.downcast_ref::<Affine>(), Some(&moved));
        assert!(second.change > first.change);
        assert_eq!(store.default_transform(id), moved);
    }

    #[test]
    fn scenario_single_modifier_generates_once() {
        let log = Log::default();
        let mut palette = ModifierPalette::new();
        let m0 = Probe::new("m0", &log).output(X).insert(&mut palette);
        let mut store = ChainStore::new();
        let id = store.create_chain();
        store.add_modifier(&mut palette, id, END, m0, true).unwrap();
        assert_eq!(store.modifier_count(id), 1);

        let x = store.element_index(id, X).unwrap();
        store.process_dependencies(&mut palette, id, x, END).unwrap();
        assert_eq!(store.element(id, x, END).unwrap().state(), ElementState::Valid);
        store.process_dependencies(&mut palette, id, x, END).unwrap();
        assert_eq!(log.calls("m0"), 1);
    }

    #[test]
    fn scenario_invalidation_regenerates_in_order() {
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
        let first = store.process_dependencies(&mut palette, id, y, END).unwrap();
        log.clear();

        store.invalidate(id, x, 1).unwrap();
        let second = store.process_dependencies(&mut palette, id, y, END).unwrap();
        assert_eq!(log.order(), &["m0", "m1"]);
        assert!(second.change > first.change);
    }

    #[test]
    fn scenario_strict_missing_input_is_rejected() {
        let log = Log::default();
        let mut palette = ModifierPalette::new();
        let m0 = Probe::new("m0", &log).output(X).insert(&mut palette);
        let m2 = Probe::new("m2", &log).input(Z).output(Y).insert(&mut palette);
        let mut store = ChainStore::new();
        let id = store.create_chain();
        store.add_modifier(&mut palette, id, END, m0, true).unwrap();
        log.clear();

        assert_eq!(
            store.add_modifier(&mut palette, id, END, m2, true),
            Err(Error::DependencyUnsatisfied { stage: 2, did: Z })
        );
        assert_eq!(store.modifier_count(id), 1);
        assert!(log.events("m2").is_empty());
        assert!(!store.has_rollback_state(id));
        assert!(!store.has_speculative_state(id));
    }

    #[test]
    fn scenario_remove_last_modifier() {
        let log = Log::default();
        let mut palette = ModifierPalette::new();
        let m0 = Probe::new("m0", &log).output(X).insert(&mut palette);
        let mut store = ChainStore::new();
        let id = store.create_chain();
        store.add_modifier(&mut palette, id, END, m0, true).unwrap();

        store.remove_modifier(&mut palette, id, END, true).unwrap();
        assert_eq!(store.modifier_count(id), 0);
        assert_eq!(store.stage_count(id), 1);
        assert_eq!(
            store.remove_modifier(&mut palette, id, END, true),
            Err(Error::EmptyChain)
        );
    }

    #[test]
    fn scenario_breaking_edit_leaves_appended_chain_untouched() {
        let log = Log::default();
        let mut palette = ModifierPalette::new();
        let m0 = Probe::new("m0", &log).output(X).insert(&mut palette);
        let m1 = Probe::new("m1", &log).input(X).output(Y).insert(&mut palette);
        let mut store = ChainStore::new();
        let a = store.create_chain();
        let b = store.create_chain();
        store.add_modifier(&mut palette, a, END, m0, true).unwrap();
        store.prepend_modifier_chain(&mut palette, b, Some(a)).unwrap();
        store.add_modifier(&mut palette, b, END, m1, true).unwrap();
        let y = store.element_index(b, Y).unwrap();
        store.process_dependencies(&mut palette, b, y, END).unwrap();

        let a_before = snapshot(&store, a);
        let b_before = snapshot(&store, b);
        let b_dids = store.dids(b).to_vec();
        log.clear();

        // Removing m0 would strip X from b's input.
        assert_eq!(
            store.remove_modifier(&mut palette, a, END, true),
            Err(Error::DependencyUnsatisfied { stage: 1, did: X })
        );
        assert_eq!(store.modifier_count(a), 1);
        assert_eq!(store.modifier_count(b), 1);
        assert_eq!(snapshot(&store, a), a_before);
        assert_eq!(snapshot(&store, b), b_before);
        assert_eq!(store.dids(b), b_dids.as_slice());
        assert!(log.events("m0").is_empty());
        assert!(log.events("m1").is_empty());
        for id in [a, b] {
            assert!(!store.has_rollback_state(id));
            assert!(!store.has_speculative_state(id));
        }

        // Nothing regenerates: cached values survived.
        store.process_dependencies(&mut palette, b, y, END).unwrap();
        assert_eq!(log.calls("m0"), 0);
        assert_eq!(log.calls("m1"), 0);
    }

    #[test]
    fn lenient_breaking_edit_disables_appended_stage() {
        let log = Log::default();
        let mut palette = ModifierPalette::new();
        let m0 = Probe::new("m0", &log).output(X).insert(&mut palette);
        let m1 = Probe::new("m1", &log).input(X).output(Y).insert(&mut palette);
        let mut store = ChainStore::new();
        let a = store.create_chain();
        let b = store.create_chain();
        store.add_modifier(&mut palette, a, END, m0, true).unwrap();
        store.prepend_modifier_chain(&mut palette, b, Some(a)).unwrap();
        store.add_modifier(&mut palette, b, END, m1, true).unwrap();

        store.remove_modifier(&mut palette, a, END, false).unwrap();
        assert_eq!(store.modifier_count(a), 0);
        let packet = store.data_packet(b, 1).unwrap();
        assert!(!packet.is_enabled());
        assert_eq!(packet.modifier(), Some(m1));
        assert_eq!(store.element_index(b, Y), None);
    }

    #[test]
    fn change_counters_never_repeat() {
        let log = Log::default();
        let mut palette = ModifierPalette::new();
        let m0 = Probe::new("m0", &log).output(X).insert(&mut palette);
        let mut store = ChainStore::new();
        let id = store.create_chain();
        store.add_modifier(&mut palette, id, END, m0, true).unwrap();
        let x = store.element_index(id, X).unwrap();

        let mut seen = Vec::new();
        for _ in 0..4 {
            let r = store.process_dependencies(&mut palette, id, x, END).unwrap();
            assert!(!seen.contains(&r.change));
            seen.push(r.change);
            store.invalidate(id, x, END).unwrap();
        }
    }

    #[test]
    fn failed_rebase_leaves_new_base_uninitialized() {
        let log = Log::default();
        let mut palette = ModifierPalette::new();
        let m0 = Probe::new("m0", &log).output(X).insert(&mut palette);
        let m1 = Probe::new("m1", &log).input(X).output(Y).insert(&mut palette);
        let mut store = ChainStore::with_config(StoreConfig::strict());
        let c = store.create_chain();
        let b = store.create_chain();
        let a = store.create_chain();
        store.add_modifier(&mut palette, c, END, m0, true).unwrap();
        store.prepend_modifier_chain(&mut palette, b, Some(c)).unwrap();
        store.add_modifier(&mut palette, b, END, m1, true).unwrap();
        let b_before = snapshot(&store, b);

        // `a` has no modifiers, so nothing provides X.
        assert_eq!(
            store.prepend_modifier_chain(&mut palette, b, Some(a)),
            Err(Error::DependencyUnsatisfied { stage: 1, did: X })
        );
        assert!(!store.is_initialized(a));
        assert_eq!(store.base(b), Some(c));
        assert_eq!(store.appended(c), [b]);
        assert!(store.appended(a).is_empty());
        assert_eq!(snapshot(&store, b), b_before);
        for id in [a, b, c] {
            assert!(!store.has_rollback_state(id));
            assert!(!store.has_speculative_state(id));
        }

        // The failed attempt left no forest link behind.
        store.add_modifier(&mut palette, a, END, m0, true).unwrap();
        store.prepend_modifier_chain(&mut palette, b, Some(a)).unwrap();
        assert_eq!(store.base(b), Some(a));
    }
}
