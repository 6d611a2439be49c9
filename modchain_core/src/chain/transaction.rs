// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Transactional reconfiguration.
//!
//! Every structural edit goes through one transaction:
//!
//! 1. **Participants**: the edited chain plus every chain transitively
//!    appended to it, bases before the chains appended to them (drained
//!    from the forest tracker on [`STRUCTURE`](crate::dirty::STRUCTURE)).
//! 2. **Build and adopt**: each participant builds a new state off to the
//!    side ([`build_cached_state`](ChainStore::build_cached_state)); the
//!    edited chain applies the edit, appended chains rebuild against their
//!    base's freshly adopted output. A successful build is adopted at once so
//!    the next participant sees it; the prior state is retained for rollback.
//! 3. **Commit or roll back**: if every build succeeded the retained states
//!    are dropped ([`clear_old_state`](ChainStore::clear_old_state));
//!    otherwise every chain that already adopted gets its prior state back
//!    ([`restore_old_state`](ChainStore::restore_old_state)), in reverse
//!    order, and the error is returned.
//!
//! A failed transaction leaves every chain exactly as it was: same states,
//! same values, same change counters.

use alloc::vec::Vec;

use understory_dirty::EagerPolicy;

use super::build::{BasePacket, BuildRequest, Edit, build_state};
use super::id::{ChainId, END, INVALID};
use super::store::{ChainStore, PacketNotification, notify_modifier};
use crate::dirty;
use crate::error::Error;
use crate::modifier::{ChainEvent, ModifierId, ModifierPalette, Palette};
use crate::trace::{BuildEvent, BuildFailedEvent, CommitEvent, RollbackEvent};

impl ChainStore {
    /// Creates the chain's proxy-only state if it has none yet.
    pub fn initialize(&mut self, id: ChainId) -> Result<(), Error> {
        self.validate(id);
        self.initialize_idx(id.idx)
    }

    pub(crate) fn initialize_idx(&mut self, idx: u32) -> Result<(), Error> {
        if self.current[idx as usize].is_some() {
            return Ok(());
        }
        // No stages to build, so no modifier is ever looked up.
        let palette = ModifierPalette::new();
        self.build_cached_state(&palette, idx, Edit::Rebase, self.base[idx as usize], false, false)?;
        self.adopt_cached_state(idx);
        self.clear_old_state(idx);
        Ok(())
    }

    /// Inserts `modifier` at position `index` ([`END`] appends).
    ///
    /// With `strict`, the edit fails if any stage that was enabled, in this
    /// chain or any appended chain, would lose an input; otherwise such
    /// stages are disabled.
    pub fn add_modifier<P: Palette + ?Sized>(
        &mut self,
        palette: &mut P,
        id: ChainId,
        index: u32,
        modifier: ModifierId,
        strict: bool,
    ) -> Result<(), Error> {
        self.validate(id);
        let count = self.modifier_count(id);
        let index = if index == END { count } else { index };
        if index > count {
            return Err(Error::InvalidRange {
                index,
                len: count + 1,
            });
        }
        let base = self.base[id.idx as usize];
        self.transact(palette, id.idx, Edit::Insert { index, modifier }, base, strict)
    }

    /// Replaces the modifier at position `index` ([`END`] names the last).
    pub fn set_modifier<P: Palette + ?Sized>(
        &mut self,
        palette: &mut P,
        id: ChainId,
        index: u32,
        modifier: ModifierId,
        strict: bool,
    ) -> Result<(), Error> {
        self.validate(id);
        let count = self.modifier_count(id);
        let index = if index == END && count > 0 {
            count - 1
        } else {
            index
        };
        if index >= count {
            return Err(Error::InvalidRange { index, len: count });
        }
        let base = self.base[id.idx as usize];
        self.transact(palette, id.idx, Edit::Replace { index, modifier }, base, strict)
    }

    /// Removes the modifier at position `index` ([`END`] removes the last).
    pub fn remove_modifier<P: Palette + ?Sized>(
        &mut self,
        palette: &mut P,
        id: ChainId,
        index: u32,
        strict: bool,
    ) -> Result<(), Error> {
        self.validate(id);
        let count = self.modifier_count(id);
        if count == 0 {
            return Err(Error::EmptyChain);
        }
        let index = if index == END { count - 1 } else { index };
        if index >= count {
            return Err(Error::InvalidRange { index, len: count });
        }
        let base = self.base[id.idx as usize];
        self.transact(palette, id.idx, Edit::Remove { index }, base, strict)
    }

    /// Makes `base` the predecessor of `id` (or detaches it with `None`).
    ///
    /// Nothing happens if the predecessor does not change. Rebuilds use
    /// [`StoreConfig::rebase_validation`](crate::config::StoreConfig::rebase_validation).
    ///
    /// # Errors
    ///
    /// [`Error::CyclicChain`] if `base` is `id` or appended to it,
    /// transitively; any build error of the chain or its appended chains.
    pub fn prepend_modifier_chain<P: Palette + ?Sized>(
        &mut self,
        palette: &mut P,
        id: ChainId,
        base: Option<ChainId>,
    ) -> Result<(), Error> {
        self.validate(id);
        if let Some(b) = base {
            self.validate(b);
        }
        let c = id.idx;
        let new_base = base.map_or(INVALID, |b| b.idx);
        let old_base = self.base[c as usize];
        if new_base == old_base {
            return Ok(());
        }

        let base_was_initialized =
            new_base == INVALID || self.current[new_base as usize].is_some();
        if new_base != INVALID {
            let mut cursor = new_base;
            while cursor != INVALID {
                if cursor == c {
                    return Err(Error::CyclicChain);
                }
                cursor = self.base[cursor as usize];
            }
            if self.forest.add_dependency(c, new_base, dirty::STRUCTURE).is_err() {
                return Err(Error::CyclicChain);
            }
            if let Err(e) = self.initialize_idx(new_base) {
                self.forest.remove_dependency(c, new_base, dirty::STRUCTURE);
                return Err(e);
            }
        }

        let strict = self.config.rebase_validation;
        if let Err(e) = self.transact(palette, c, Edit::Rebase, new_base, strict) {
            if new_base != INVALID {
                self.forest.remove_dependency(c, new_base, dirty::STRUCTURE);
            }
            // A failed rebase leaves the base as uninitialized as it found it.
            if !base_was_initialized {
                self.current[new_base as usize] = None;
            }
            return Err(e);
        }

        if old_base != INVALID {
            self.forest.remove_dependency(c, old_base, dirty::STRUCTURE);
            self.appended[old_base as usize].retain(|&a| a != c);
            self.recheck_lineage(old_base);
        }
        self.base[c as usize] = new_base;
        if new_base != INVALID {
            self.appended[new_base as usize].push(c);
        }
        self.recheck_lineage(c);
        Ok(())
    }

    /// Builds a state for `idx` without adopting it.
    pub(crate) fn build_cached_state<P: Palette + ?Sized>(
        &mut self,
        palette: &P,
        idx: u32,
        edit: Edit,
        base: u32,
        strict: bool,
        speculative: bool,
    ) -> Result<(), Error> {
        let i = idx as usize;
        let built = {
            let base = if base == INVALID {
                None
            } else {
                self.current[base as usize].as_ref().map(BasePacket::of)
            };
            let req = BuildRequest {
                old: self.current[i].as_ref(),
                base,
                edit,
                strict,
                default_transform: self.default_transform[i],
            };
            build_state(&req, &self.registry, palette)
        };
        match built {
            Ok(built) => {
                let event = BuildEvent {
                    chain: idx,
                    edit: edit.kind(),
                    stages: built.state.last_stage() + 1,
                    disabled: built.disabled,
                    speculative,
                };
                self.tracer().build(&event);
                self.speculative[i] = Some(built.state);
                Ok(())
            }
            Err(error) => {
                let event = BuildFailedEvent {
                    chain: idx,
                    edit: edit.kind(),
                    error: error.clone(),
                };
                self.tracer().build_failed(&event);
                Err(error)
            }
        }
    }

    /// Makes the speculative state current, retaining the old one.
    pub(crate) fn adopt_cached_state(&mut self, idx: u32) {
        let i = idx as usize;
        debug_assert!(self.speculative[i].is_some(), "nothing to adopt");
        self.rollback[i] = self.current[i].take();
        self.current[i] = self.speculative[i].take();
    }

    /// Puts the retained state back and drops any speculative one.
    pub(crate) fn restore_old_state(&mut self, idx: u32) {
        let i = idx as usize;
        self.current[i] = self.rollback[i].take();
        self.speculative[i] = None;
    }

    /// Drops the retained state; the transaction committed.
    pub(crate) fn clear_old_state(&mut self, idx: u32) {
        self.rollback[idx as usize] = None;
    }

    /// Returns `root` followed by every chain transitively appended to it,
    /// bases first.
    fn participants(&mut self, root: u32) -> Vec<u32> {
        self.forest
            .mark_with(root, dirty::STRUCTURE, &EagerPolicy);
        let mut order: Vec<u32> = self
            .forest
            .drain(dirty::STRUCTURE)
            .affected()
            .deterministic()
            .run()
            .collect();
        if order.first() != Some(&root) {
            order.retain(|&c| c != root);
            order.insert(0, root);
        }
        order
    }

    fn transact<P: Palette + ?Sized>(
        &mut self,
        palette: &mut P,
        root: u32,
        edit: Edit,
        root_base: u32,
        strict: bool,
    ) -> Result<(), Error> {
        let participants = self.participants(root);
        let mut adopted: Vec<u32> = Vec::with_capacity(participants.len());
        for &c in &participants {
            let result = if c == root {
                self.build_cached_state(&*palette, c, edit, root_base, strict, false)
            } else {
                let base = self.base[c as usize];
                self.build_cached_state(&*palette, c, Edit::Rebase, base, strict, true)
            };
            if let Err(error) = result {
                for &a in adopted.iter().rev() {
                    self.restore_old_state(a);
                }
                #[expect(
                    clippy::cast_possible_truncation,
                    reason = "chain counts stay far below u32::MAX"
                )]
                let restored = adopted.len() as u32;
                self.tracer().rollback(&RollbackEvent { root, restored });
                return Err(error);
            }
            self.adopt_cached_state(c);
            adopted.push(c);
        }

        self.announce(palette, root);
        for &c in &adopted {
            self.clear_old_state(c);
            self.notify_replaced(c);
        }
        for &c in &adopted {
            self.recheck_need_time_idx(c);
        }
        self.recheck_lineage(root);

        #[expect(
            clippy::cast_possible_truncation,
            reason = "chain counts stay far below u32::MAX"
        )]
        let participants = adopted.len() as u32;
        self.tracer().commit(&CommitEvent { root, participants });
        Ok(())
    }

    /// Tells the edited chain's modifiers where they now sit.
    fn announce<P: Palette + ?Sized>(&mut self, palette: &mut P, idx: u32) {
        let i = idx as usize;
        let chain = self.handle(idx);
        let old: Vec<(u32, ModifierId)> = self.rollback[i]
            .as_ref()
            .map(|s| s.modifiers().collect())
            .unwrap_or_default();
        let new: Vec<(u32, ModifierId)> = self.current[i]
            .as_ref()
            .map(|s| s.modifiers().collect())
            .unwrap_or_default();
        for &(_, m) in &old {
            if !new.iter().any(|&(_, n)| n == m) {
                notify_modifier(palette, m, ChainEvent::Detached { chain });
            }
        }
        for &(stage, m) in &new {
            if !old.contains(&(stage, m)) {
                notify_modifier(palette, m, ChainEvent::Attached { chain, stage });
            }
        }
    }

    /// Reports every element of a freshly adopted state as changed.
    fn notify_replaced(&mut self, idx: u32) {
        let i = idx as usize;
        if self.subjects[i].is_empty() {
            return;
        }
        let Some(state) = self.current[i].as_ref() else {
            return;
        };
        let bits = state
            .last_packet()
            .elements
            .iter()
            .fold(0, |acc, e| acc | e.notify);
        if bits == 0 {
            return;
        }
        let chain = self.handle(idx);
        let subject = &mut self.subjects[i];
        subject.begin_batch();
        subject.notify(bits);
        for delivery in subject.end_batch() {
            self.pending_notifications.push(PacketNotification {
                chain,
                observer: delivery.observer,
                bits: delivery.bits,
            });
        }
    }
}
