// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Data identifiers and their capability registry.
//!
//! A [`Did`] names a semantic kind of data (a transform, a mesh, the
//! simulation time, ...) that modifiers consume and produce. Each DID is
//! registered once in a [`DidRegistry`] together with static [`DidFlags`]
//! describing what the data is capable of. The flags drive two things in the
//! chain builder:
//!
//! - wildcard outputs ([`OutputTarget::Capable`](crate::modifier::OutputTarget::Capable))
//!   expand to every known element carrying a capability, and
//! - an element's notification bits, which are reported to packet observers
//!   when the element is invalidated.

use core::fmt;
use core::ops::{BitAnd, BitOr, BitOrAssign};

use hashbrown::HashMap;

/// An opaque, globally unique identifier naming a semantic data kind.
///
/// Two DIDs are equal when their names are equal; the name is also what
/// shows up in diagnostics.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Did(&'static str);

impl Did {
    /// Creates a DID with the given name.
    #[inline]
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    /// Returns the name this DID was created with.
    #[inline]
    #[must_use]
    pub const fn name(self) -> &'static str {
        self.0
    }
}

impl fmt::Debug for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Did({})", self.0)
    }
}

/// Built-in element carrying the current simulation time.
///
/// Synthesized on the proxy stage of every chain without a predecessor.
pub const SIMULATION_TIME: Did = Did::new("SimulationTime");

/// Built-in element carrying the chain's default transform.
///
/// Synthesized on the proxy stage of every chain without a predecessor.
pub const TRANSFORM: Did = Did::new("Transform");

/// Static capability flags attached to a [`Did`].
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct DidFlags(pub u32);

impl DidFlags {
    /// No capabilities.
    pub const EMPTY: Self = Self(0);
    /// The data contributes to rendering.
    pub const RENDERABLE: Self = Self(1 << 0);
    /// The data contributes to the bounding volume.
    pub const BOUND_VOLUME: Self = Self(1 << 1);
    /// The data changes with simulation time.
    pub const TIME: Self = Self(1 << 2);

    /// Returns the raw bits.
    #[inline]
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Returns `true` if no capability is set.
    #[inline]
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Returns `true` if every capability in `other` is also set in `self`.
    #[inline]
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns `true` if `self` and `other` share at least one capability.
    #[inline]
    #[must_use]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }
}

impl BitOr for DidFlags {
    type Output = Self;

    #[inline]
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for DidFlags {
    #[inline]
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for DidFlags {
    type Output = Self;

    #[inline]
    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl fmt::Debug for DidFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DidFlags({:#06b})", self.0)
    }
}

/// Maps each registered [`Did`] to its [`DidFlags`].
///
/// Registration is a caller contract: re-registering a DID overwrites its
/// flags, and nothing checks that two subsystems picked distinct names.
#[derive(Clone, Debug)]
pub struct DidRegistry {
    flags: HashMap<Did, DidFlags>,
}

impl Default for DidRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DidRegistry {
    /// Creates a registry holding the built-in [`SIMULATION_TIME`] and
    /// [`TRANSFORM`] DIDs.
    #[must_use]
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.add_did(SIMULATION_TIME, DidFlags::TIME);
        registry.add_did(TRANSFORM, DidFlags::RENDERABLE | DidFlags::BOUND_VOLUME);
        registry
    }

    /// Creates a registry with no DIDs at all.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            flags: HashMap::new(),
        }
    }

    /// Registers `id` with the given flags.
    pub fn add_did(&mut self, id: Did, flags: DidFlags) {
        self.flags.insert(id, flags);
    }

    /// Registers `target` with the flags of `template`.
    ///
    /// Returns `false` (and registers nothing) if `template` is unknown.
    pub fn copy_did(&mut self, target: Did, template: Did) -> bool {
        match self.flags.get(&template).copied() {
            Some(flags) => {
                self.flags.insert(target, flags);
                true
            }
            None => false,
        }
    }

    /// Returns the flags registered for `id`, or [`DidFlags::EMPTY`].
    #[must_use]
    pub fn did_flags(&self, id: Did) -> DidFlags {
        self.flags.get(&id).copied().unwrap_or_default()
    }

    /// Returns whether `id` has been registered.
    #[must_use]
    pub fn contains(&self, id: Did) -> bool {
        self.flags.contains_key(&id)
    }

    /// Returns the number of registered DIDs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.flags.len()
    }

    /// Returns whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MESH: Did = Did::new("Mesh");
    const SKIN: Did = Did::new("Skin");

    #[test]
    fn builtins_are_registered() {
        let registry = DidRegistry::new();
        assert_eq!(registry.did_flags(SIMULATION_TIME), DidFlags::TIME);
        assert!(
            registry
                .did_flags(TRANSFORM)
                .contains(DidFlags::RENDERABLE | DidFlags::BOUND_VOLUME),
            "transform is renderable and bounded"
        );
    }

    #[test]
    fn unknown_did_has_no_flags() {
        let registry = DidRegistry::empty();
        assert!(registry.is_empty());
        assert_eq!(registry.did_flags(MESH), DidFlags::EMPTY);
    }

    #[test]
    fn add_did_overwrites() {
        let mut registry = DidRegistry::empty();
        registry.add_did(MESH, DidFlags::RENDERABLE);
        registry.add_did(MESH, DidFlags::BOUND_VOLUME);
        assert_eq!(registry.did_flags(MESH), DidFlags::BOUND_VOLUME);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn copy_did_clones_flags() {
        let mut registry = DidRegistry::empty();
        registry.add_did(MESH, DidFlags::RENDERABLE | DidFlags::BOUND_VOLUME);
        assert!(registry.copy_did(SKIN, MESH));
        assert_eq!(registry.did_flags(SKIN), registry.did_flags(MESH));
    }

    #[test]
    fn copy_did_from_unknown_template_is_rejected() {
        let mut registry = DidRegistry::empty();
        assert!(!registry.copy_did(SKIN, MESH));
        assert!(!registry.contains(SKIN));
    }

    #[test]
    fn flag_queries() {
        let both = DidFlags::RENDERABLE | DidFlags::TIME;
        assert!(both.intersects(DidFlags::TIME));
        assert!(!both.contains(DidFlags::BOUND_VOLUME));
        assert!(DidFlags::EMPTY.is_empty());
        assert_eq!((both & DidFlags::TIME).bits(), DidFlags::TIME.bits());
    }
}
