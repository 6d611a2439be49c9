// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-stage element records.

use alloc::vec::Vec;

use crate::error::Error;
use crate::modifier::Value;

/// Validity of one element at one stage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ElementState {
    /// Must be (re)generated before it can be read.
    #[default]
    Invalid,
    /// Holds an up-to-date value.
    Valid,
    /// Superseded by an earlier stage; reads are rejected.
    Consumed,
    /// The last generation attempt failed.
    ValidationFailed,
}

/// Who produces an element at a given stage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Generator {
    /// Nothing produces the element here.
    #[default]
    None,
    /// The value is inherited from the predecessor chain.
    Proxy,
    /// The stage with this index produces the value. Stage 0 means a
    /// built-in default.
    Stage(u32),
}

impl Generator {
    /// Returns the stage holding the generating record, if any.
    ///
    /// Proxy-generated elements live on stage 0.
    #[inline]
    #[must_use]
    pub const fn stage(self) -> Option<u32> {
        match self {
            Self::None => None,
            Self::Proxy => Some(0),
            Self::Stage(s) => Some(s),
        }
    }
}

/// A recorded invalidation target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Edge {
    /// Invalidate `element` at `stage` of the same chain.
    Local {
        /// Target stage.
        stage: u32,
        /// Target element.
        element: u32,
    },
    /// Forward the invalidation to every appended chain's proxy stage.
    Appended {
        /// Stage of the generating record the edge hangs off.
        origin: u32,
    },
}

/// One named slot of a stage.
///
/// Only the *generating* record of an element (the one on the stage named by
/// its [`Generator`]) carries invalidation edges. Records on later stages
/// that share the generator are cached copies, refreshed on demand by
/// [`process_dependencies`](crate::chain::ChainStore::process_dependencies).
#[derive(Clone, Debug, Default)]
pub struct DataElement {
    pub(crate) state: ElementState,
    pub(crate) value: Option<Value>,
    pub(crate) change: u64,
    pub(crate) generator: Generator,
    pub(crate) edges: Vec<Edge>,
    /// Notification bits reported when the element is invalidated.
    pub(crate) notify: u32,
}

impl DataElement {
    pub(crate) fn new(generator: Generator, notify: u32) -> Self {
        Self {
            generator,
            notify,
            ..Self::default()
        }
    }

    /// Returns the record the next stage starts from: same generator and
    /// notification bits, no value, no edges. Consumption is sticky.
    pub(crate) fn copy_forward(&self) -> Self {
        Self {
            state: if self.state == ElementState::Consumed {
                ElementState::Consumed
            } else {
                ElementState::Invalid
            },
            value: None,
            change: 0,
            generator: self.generator,
            edges: Vec::new(),
            notify: self.notify,
        }
    }

    /// Returns whether this is the generating record when stored at `stage`.
    #[inline]
    pub(crate) fn is_generator_at(&self, stage: u32) -> bool {
        self.generator.stage() == Some(stage)
    }

    /// Adds an edge unless it is already recorded.
    pub(crate) fn add_edge(&mut self, edge: Edge) -> Result<(), Error> {
        if !self.edges.contains(&edge) {
            self.edges.try_reserve(1)?;
            self.edges.push(edge);
        }
        Ok(())
    }

    /// Returns the validity state.
    #[must_use]
    pub fn state(&self) -> ElementState {
        self.state
    }

    /// Returns the cached value, if any.
    #[must_use]
    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    /// Returns the change counter of the cached value (0 if never set).
    #[must_use]
    pub fn change(&self) -> u64 {
        self.change
    }

    /// Returns who produces this element.
    #[must_use]
    pub fn generator(&self) -> Generator {
        self.generator
    }

    /// Returns the recorded invalidation edges.
    #[must_use]
    pub fn invalidates(&self) -> &[Edge] {
        &self.edges
    }

    /// Returns the notification bits.
    #[must_use]
    pub fn notify_bits(&self) -> u32 {
        self.notify
    }
}
