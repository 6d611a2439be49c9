// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The modifier boundary.
//!
//! A [`Modifier`] is one transformation stage. The chain store asks it, at
//! build time, which elements it [produces](Modifier::outputs) and which it
//! [depends on](Modifier::dependencies); at evaluation time it asks it to
//! [generate](Modifier::generate_output) one output from already-resolved
//! [`Inputs`]. Modifiers are never called while an invalidation walk is in
//! progress.
//!
//! Modifiers are owned by a [`Palette`]. Chains only store [`ModifierId`]s
//! and borrow the modifier from the palette for the duration of one call.

use alloc::boxed::Box;
use alloc::rc::Rc;
use alloc::vec::Vec;
use core::any::Any;
use core::fmt;

use crate::chain::ChainId;
use crate::did::{Did, DidFlags};
use crate::time::SimTime;

/// A reference-counted element value.
///
/// Cloning the handle is how values are shared between stages and chains;
/// dropping the last handle releases the value.
pub type Value = Rc<dyn Any>;

/// Identifies a modifier held by a [`Palette`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModifierId(pub u32);

impl fmt::Debug for ModifierId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ModifierId({})", self.0)
    }
}

/// Bitmask over the attributes of an element (e.g. positions, normals).
///
/// Attribute meaning is private to the modifiers that exchange the element;
/// the chain builder only compares masks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct AttrMask(pub u32);

impl AttrMask {
    /// No attributes.
    pub const NONE: Self = Self(0);
    /// Every attribute.
    pub const ALL: Self = Self(u32::MAX);

    /// Returns `true` if every bit of `other` is also set in `self`.
    #[inline]
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

/// What a declared output refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputTarget {
    /// One specific element.
    Did(Did),
    /// Every element known at this stage whose DID carries any of the flags.
    Capable(DidFlags),
}

/// One output declared by a modifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OutputDecl {
    /// Which element(s) the modifier produces.
    pub target: OutputTarget,
    /// Attributes the modifier leaves untouched when it has nothing to do.
    pub unchanged: AttrMask,
}

impl OutputDecl {
    /// Declares an output for a single DID.
    #[must_use]
    pub const fn did(did: Did) -> Self {
        Self {
            target: OutputTarget::Did(did),
            unchanged: AttrMask::NONE,
        }
    }

    /// Declares a wildcard output over every element with `flags`.
    #[must_use]
    pub const fn capable(flags: DidFlags) -> Self {
        Self {
            target: OutputTarget::Capable(flags),
            unchanged: AttrMask::NONE,
        }
    }

    /// Sets the attributes left untouched on a no-op.
    #[must_use]
    pub const fn with_unchanged(mut self, unchanged: AttrMask) -> Self {
        self.unchanged = unchanged;
        self
    }
}

/// "Output `output` reads attributes `attrs` of element `depends_on`."
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OutputDependency {
    /// The dependent output.
    pub output: Did,
    /// The element it reads.
    pub depends_on: Did,
    /// The attributes it reads.
    pub attrs: AttrMask,
}

/// Everything a modifier requires from, or takes away from, upstream.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Dependencies {
    /// Elements that must be produced by an earlier stage.
    pub inputs: Vec<Did>,
    /// Relations between this modifier's outputs and other elements.
    pub output_deps: Vec<OutputDependency>,
    /// Elements this modifier supersedes; later stages may not read them.
    pub consumes: Vec<Did>,
}

impl Dependencies {
    /// Creates an empty set of dependencies.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a required input.
    #[must_use]
    pub fn input(mut self, did: Did) -> Self {
        self.inputs.push(did);
        self
    }

    /// Adds an output dependency.
    #[must_use]
    pub fn output_dependency(mut self, output: Did, depends_on: Did, attrs: AttrMask) -> Self {
        self.output_deps.push(OutputDependency {
            output,
            depends_on,
            attrs,
        });
        self
    }

    /// Adds a consumed element.
    #[must_use]
    pub fn consume(mut self, did: Did) -> Self {
        self.consumes.push(did);
        self
    }
}

/// The result of [`Modifier::generate_output`].
#[derive(Clone)]
pub enum Generated {
    /// A freshly produced value.
    Value(Value),
    /// The previous value is still correct.
    Unchanged,
    /// The output could not be produced.
    Failed,
}

impl fmt::Debug for Generated {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(_) => f.write_str("Value(..)"),
            Self::Unchanged => f.write_str("Unchanged"),
            Self::Failed => f.write_str("Failed"),
        }
    }
}

/// Lifecycle events delivered through [`Modifier::notify`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChainEvent {
    /// The modifier now occupies `stage` of `chain`.
    Attached {
        /// The owning chain.
        chain: ChainId,
        /// Stage index (modifier `i` sits at stage `i + 1`).
        stage: u32,
    },
    /// The modifier no longer belongs to `chain`.
    Detached {
        /// The former owning chain.
        chain: ChainId,
    },
}

#[derive(Clone, Debug)]
pub(crate) struct InputValue {
    pub(crate) did: Did,
    pub(crate) value: Option<Value>,
    pub(crate) change: u64,
}

/// Resolved input values handed to [`Modifier::generate_output`].
#[derive(Clone, Copy, Debug)]
pub struct Inputs<'a> {
    entries: &'a [InputValue],
}

impl<'a> Inputs<'a> {
    pub(crate) fn new(entries: &'a [InputValue]) -> Self {
        Self { entries }
    }

    /// Returns the value of input `did`, if it was declared and is non-null.
    #[must_use]
    pub fn get(&self, did: Did) -> Option<&'a Value> {
        self.entries
            .iter()
            .find(|e| e.did == did)
            .and_then(|e| e.value.as_ref())
    }

    /// Returns the value of input `did` downcast to `T`.
    #[must_use]
    pub fn value<T: 'static>(&self, did: Did) -> Option<&'a T> {
        self.get(did).and_then(|v| v.downcast_ref::<T>())
    }

    /// Returns the change counter of input `did`.
    #[must_use]
    pub fn change(&self, did: Did) -> Option<u64> {
        self.entries.iter().find(|e| e.did == did).map(|e| e.change)
    }

    /// Returns the simulation time, if it is among the inputs.
    #[must_use]
    pub fn time(&self) -> Option<SimTime> {
        self.value::<SimTime>(crate::did::SIMULATION_TIME).copied()
    }

    /// Returns the number of inputs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns whether there are no inputs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One stage of a modifier chain.
pub trait Modifier {
    /// Returns the elements this modifier produces.
    fn outputs(&self) -> Vec<OutputDecl>;

    /// Returns what this modifier reads and supersedes.
    fn dependencies(&self) -> Dependencies;

    /// Produces the value of output `did` from resolved `inputs`.
    fn generate_output(&mut self, did: Did, inputs: &Inputs<'_>) -> Generated;

    /// Called when the modifier is attached to or detached from a chain.
    fn notify(&mut self, event: ChainEvent) {
        _ = event;
    }
}

/// Owner of the modifiers referenced by chains.
pub trait Palette {
    /// Borrows a modifier for a build-time query.
    fn modifier(&self, id: ModifierId) -> Option<&dyn Modifier>;

    /// Borrows a modifier for generation or notification.
    fn modifier_mut(&mut self, id: ModifierId) -> Option<&mut dyn Modifier>;
}

/// A slab of boxed modifiers.
#[derive(Default)]
pub struct ModifierPalette {
    slots: Vec<Option<Box<dyn Modifier>>>,
    free_list: Vec<u32>,
}

impl fmt::Debug for ModifierPalette {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModifierPalette")
            .field("len", &self.len())
            .field("free", &self.free_list.len())
            .finish()
    }
}

impl ModifierPalette {
    /// Creates an empty palette.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes ownership of `modifier` and returns its handle.
    pub fn insert(&mut self, modifier: Box<dyn Modifier>) -> ModifierId {
        if let Some(idx) = self.free_list.pop() {
            self.slots[idx as usize] = Some(modifier);
            return ModifierId(idx);
        }
        #[expect(
            clippy::cast_possible_truncation,
            reason = "palettes never hold u32::MAX modifiers"
        )]
        let idx = self.slots.len() as u32;
        self.slots.push(Some(modifier));
        ModifierId(idx)
    }

    /// Removes a modifier, returning it if it was present.
    ///
    /// The caller is responsible for first removing it from every chain.
    pub fn remove(&mut self, id: ModifierId) -> Option<Box<dyn Modifier>> {
        let taken = self.slots.get_mut(id.0 as usize)?.take();
        if taken.is_some() {
            self.free_list.push(id.0);
        }
        taken
    }

    /// Returns the number of live modifiers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len() - self.free_list.len()
    }

    /// Returns whether the palette holds no modifiers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Palette for ModifierPalette {
    fn modifier(&self, id: ModifierId) -> Option<&dyn Modifier> {
        let m: &dyn Modifier = self.slots.get(id.0 as usize)?.as_deref()?;
        Some(m)
    }

    fn modifier_mut(&mut self, id: ModifierId) -> Option<&mut dyn Modifier> {
        let m: &mut dyn Modifier = self.slots.get_mut(id.0 as usize)?.as_deref_mut()?;
        Some(m)
    }
}
