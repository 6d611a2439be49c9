// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Reverse-dependency index for a chain's output packet.

use alloc::vec::Vec;

use crate::error::Error;
use crate::modifier::AttrMask;

/// For each element, the elements that depend on it and through which
/// attributes.
///
/// Built alongside a chain state and kept for its final stage only. Chains
/// appended to this one copy it onto their proxy stage, which re-derives the
/// forward invalidation edges between inherited elements without querying
/// any modifier again.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IntraDependencies {
    dependents: Vec<Vec<(u32, AttrMask)>>,
}

impl IntraDependencies {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Grows the index to cover `len` elements.
    pub(crate) fn ensure_len(&mut self, len: usize) -> Result<(), Error> {
        if self.dependents.len() < len {
            self.dependents.try_reserve(len - self.dependents.len())?;
            self.dependents.resize_with(len, Vec::new);
        }
        Ok(())
    }

    /// Records that `dependent` reads attributes `attrs` of `dependency`.
    ///
    /// Repeated relations merge their masks.
    pub(crate) fn add(
        &mut self,
        dependency: u32,
        dependent: u32,
        attrs: AttrMask,
    ) -> Result<(), Error> {
        self.ensure_len(dependency as usize + 1)?;
        let list = &mut self.dependents[dependency as usize];
        if let Some(entry) = list.iter_mut().find(|(d, _)| *d == dependent) {
            entry.1 = AttrMask(entry.1.0 | attrs.0);
        } else {
            list.try_reserve(1)?;
            list.push((dependent, attrs));
        }
        Ok(())
    }

    /// Keeps only the relations on `dependency` whose masks satisfy `keep`.
    pub(crate) fn retain_dependents(
        &mut self,
        dependency: u32,
        mut keep: impl FnMut(AttrMask) -> bool,
    ) {
        if let Some(list) = self.dependents.get_mut(dependency as usize) {
            list.retain(|&(_, attrs)| keep(attrs));
        }
    }

    /// Forgets every relation in which `dependent` is the reader.
    pub(crate) fn remove_dependent(&mut self, dependent: u32) {
        for list in &mut self.dependents {
            list.retain(|&(d, _)| d != dependent);
        }
    }

    /// Returns the elements depending on `dependency`.
    #[must_use]
    pub fn dependents(&self, dependency: u32) -> &[(u32, AttrMask)] {
        self.dependents
            .get(dependency as usize)
            .map_or(&[], Vec::as_slice)
    }

    /// Returns the number of elements covered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.dependents.len()
    }

    /// Returns whether the index covers no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dependents.is_empty()
    }
}
