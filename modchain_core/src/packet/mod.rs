// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Data packets: the per-stage snapshot of every element.
//!
//! A chain state holds one [`DataPacket`] per stage. Stage 0 is the proxy
//! stage; stage `i + 1` belongs to modifier `i`. Each packet stores one
//! [`DataElement`] per DID known at that stage, indexed through the DID
//! table shared by all stages of the state (later stages may know more DIDs
//! than earlier ones, never fewer).

mod element;
mod intra;

pub use element::{DataElement, ElementState, Edge, Generator};
pub use intra::IntraDependencies;

use alloc::vec::Vec;

use crate::chain::INVALID;
use crate::did::Did;
use crate::modifier::ModifierId;

/// One stage's element table plus its wiring.
#[derive(Clone, Debug)]
pub struct DataPacket {
    pub(crate) elements: Vec<DataElement>,
    pub(crate) enabled: bool,
    pub(crate) modifier: Option<ModifierId>,
    /// Element currently being generated by this stage, or [`INVALID`].
    pub(crate) locked: u32,
    /// Resolved input elements, indices into the previous stage.
    pub(crate) inputs: Vec<u32>,
    /// DIDs of `inputs`, in the same order.
    pub(crate) input_dids: Vec<Did>,
    /// Elements this stage generates.
    pub(crate) outputs: Vec<u32>,
    pub(crate) needs_time: bool,
}

impl DataPacket {
    pub(crate) fn new(modifier: Option<ModifierId>, elements: Vec<DataElement>) -> Self {
        Self {
            elements,
            enabled: true,
            modifier,
            locked: INVALID,
            inputs: Vec::new(),
            input_dids: Vec::new(),
            outputs: Vec::new(),
            needs_time: false,
        }
    }

    /// Returns the number of elements known at this stage.
    #[must_use]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Returns whether the stage knows no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Returns the element at `index`.
    #[must_use]
    pub fn element(&self, index: u32) -> Option<&DataElement> {
        self.elements.get(index as usize)
    }

    /// Returns every element of the stage.
    #[must_use]
    pub fn elements(&self) -> &[DataElement] {
        &self.elements
    }

    /// Returns whether the stage's modifier participates.
    ///
    /// A disabled stage (one whose inputs could not be resolved) passes its
    /// table through unchanged.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Returns the modifier occupying the stage, if any.
    #[must_use]
    pub fn modifier(&self) -> Option<ModifierId> {
        self.modifier
    }

    /// Returns the elements generated by this stage.
    #[must_use]
    pub fn outputs(&self) -> &[u32] {
        &self.outputs
    }

    /// Returns the input elements, as indices into the previous stage.
    #[must_use]
    pub fn inputs(&self) -> &[u32] {
        &self.inputs
    }

    /// Returns whether the stage reads simulation time.
    #[must_use]
    pub fn needs_time(&self) -> bool {
        self.needs_time
    }

    /// Returns whether the stage is currently generating an element.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.locked != INVALID
    }
}
