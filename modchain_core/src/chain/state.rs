// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The immutable-once-built wiring of one chain.

use alloc::vec::Vec;

use hashbrown::HashMap;
use kurbo::Affine;

use crate::did::Did;
use crate::modifier::ModifierId;
use crate::packet::{DataPacket, IntraDependencies};

/// Every stage of a chain plus the DID table they share.
///
/// A state is produced in one piece by the builder and never rewired
/// afterwards; only element validity, values and change counters move while
/// it is current.
#[derive(Clone, Debug)]
pub(crate) struct ChainState {
    /// DID of each element index, shared by all stages.
    pub(crate) dids: Vec<Did>,
    pub(crate) index: HashMap<Did, u32>,
    /// Stage 0 is the proxy stage; stage `i + 1` holds modifier `i`.
    pub(crate) stages: Vec<DataPacket>,
    /// Reverse dependencies of the final stage.
    pub(crate) intra: IntraDependencies,
    /// Value of the built-in `Transform` element when there is no base.
    pub(crate) default_transform: Affine,
    /// Whether any enabled stage reads simulation time.
    pub(crate) needs_time: bool,
}

impl ChainState {
    /// Index of the final stage.
    #[expect(
        clippy::cast_possible_truncation,
        reason = "stage counts stay far below u32::MAX"
    )]
    pub(crate) fn last_stage(&self) -> u32 {
        (self.stages.len() - 1) as u32
    }

    pub(crate) fn last_packet(&self) -> &DataPacket {
        &self.stages[self.stages.len() - 1]
    }

    #[expect(
        clippy::cast_possible_truncation,
        reason = "stage counts stay far below u32::MAX"
    )]
    pub(crate) fn modifier_count(&self) -> u32 {
        (self.stages.len() - 1) as u32
    }

    /// Returns the modifier at position `index` (stage `index + 1`).
    pub(crate) fn modifier(&self, index: u32) -> Option<ModifierId> {
        self.stages.get(index as usize + 1)?.modifier
    }

    /// Iterates `(stage, modifier)` for every occupied stage.
    pub(crate) fn modifiers(&self) -> impl Iterator<Item = (u32, ModifierId)> + '_ {
        self.stages.iter().enumerate().filter_map(|(s, p)| {
            #[expect(
                clippy::cast_possible_truncation,
                reason = "stage counts stay far below u32::MAX"
            )]
            let s = s as u32;
            p.modifier.map(|m| (s, m))
        })
    }

    pub(crate) fn element_index(&self, did: Did) -> Option<u32> {
        self.index.get(&did).copied()
    }

    pub(crate) fn packet_mut(&mut self, stage: u32) -> Option<&mut DataPacket> {
        self.stages.get_mut(stage as usize)
    }
}
