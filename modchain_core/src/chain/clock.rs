// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Simulation time and clock subscriptions.
//!
//! The store owns one clock [`Subject`](crate::notify::Subject). A chain is
//! subscribed to it while any enabled stage, in the chain itself or in a
//! chain transitively appended to it, reads [`SIMULATION_TIME`]. The
//! subscription is re-evaluated after every successful edit.
//!
//! [`ChainStore::advance_time`] fires the clock; each subscribed chain then
//! invalidates the built-in time element at the root of its forest, which
//! forwards the change down every appended chain.

use alloc::vec::Vec;

use super::id::{ChainId, INVALID};
use super::store::ChainStore;
use crate::did::{DidFlags, SIMULATION_TIME};
use crate::notify::ObserverKey;
use crate::time::SimTime;
use crate::trace::ClockEvent;

impl ChainStore {
    /// Returns the current simulation time.
    #[must_use]
    pub fn time(&self) -> SimTime {
        self.time
    }

    /// Subscribes or unsubscribes a chain to the store clock.
    ///
    /// Normally driven by [`recheck_need_time`](Self::recheck_need_time);
    /// a manual subscription is dropped by the next recheck if nothing
    /// needs time.
    pub fn set_clock(&mut self, id: ChainId, enabled: bool) {
        self.validate(id);
        self.set_clock_idx(id.idx, enabled);
    }

    fn set_clock_idx(&mut self, idx: u32, enabled: bool) {
        let i = idx as usize;
        if self.clocked[i] == enabled {
            return;
        }
        self.clocked[i] = enabled;
        if enabled {
            self.clock
                .attach(ObserverKey(idx), DidFlags::TIME.bits(), 0);
        } else {
            self.clock.detach(ObserverKey(idx));
        }
    }

    /// Returns whether the chain is subscribed to the store clock.
    #[must_use]
    pub fn is_clock_subscribed(&self, id: ChainId) -> bool {
        self.validate(id);
        self.clocked[id.idx as usize]
    }

    /// Returns whether the chain, or any chain transitively appended to it,
    /// has an enabled stage that reads simulation time.
    #[must_use]
    pub fn needs_time(&self, id: ChainId) -> bool {
        self.validate(id);
        self.needs_time_idx(id.idx)
    }

    pub(crate) fn needs_time_idx(&self, idx: u32) -> bool {
        let mut stack = Vec::with_capacity(self.config.walk_capacity);
        stack.push(idx);
        while let Some(c) = stack.pop() {
            if self.current[c as usize]
                .as_ref()
                .is_some_and(|s| s.needs_time)
            {
                return true;
            }
            stack.extend_from_slice(&self.appended[c as usize]);
        }
        false
    }

    /// Brings the chain's clock subscription in line with
    /// [`needs_time`](Self::needs_time).
    pub fn recheck_need_time(&mut self, id: ChainId) {
        self.validate(id);
        self.recheck_need_time_idx(id.idx);
    }

    pub(crate) fn recheck_need_time_idx(&mut self, idx: u32) {
        let want = self.needs_time_idx(idx);
        self.set_clock_idx(idx, want);
    }

    /// Rechecks a chain and every chain it is appended to, nearest first.
    pub(crate) fn recheck_lineage(&mut self, idx: u32) {
        let mut c = idx;
        while c != INVALID {
            self.recheck_need_time_idx(c);
            c = self.base[c as usize];
        }
    }

    /// Sets the simulation time and updates every subscribed chain.
    ///
    /// Returns the number of chains the clock notified.
    pub fn advance_time(&mut self, time: SimTime) -> u32 {
        self.time = time;
        self.clock.begin_batch();
        self.clock.notify(DidFlags::TIME.bits());
        let deliveries = self.clock.end_batch();

        let mut roots: Vec<u32> = Vec::with_capacity(deliveries.len());
        for delivery in &deliveries {
            let root = self.forest_root(delivery.observer.0);
            if !roots.contains(&root) {
                roots.push(root);
            }
        }
        for root in roots {
            self.update(root);
        }

        #[expect(
            clippy::cast_possible_truncation,
            reason = "chain counts stay far below u32::MAX"
        )]
        let notified = deliveries.len() as u32;
        self.tracer().clock(&ClockEvent { time, notified });
        notified
    }

    /// Invalidates the built-in time element of a root chain.
    fn update(&mut self, root: u32) {
        let element = self.current[root as usize]
            .as_ref()
            .and_then(|s| s.element_index(SIMULATION_TIME));
        if let Some(element) = element {
            self.invalidate_idx(root, 0, element);
        }
    }

    fn forest_root(&self, idx: u32) -> u32 {
        let mut c = idx;
        while self.base[c as usize] != INVALID {
            c = self.base[c as usize];
        }
        c
    }
}
