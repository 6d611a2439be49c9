// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Recording modifiers shared by the chain tests.

use alloc::boxed::Box;
use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::{Cell, RefCell};

use crate::did::Did;
use crate::modifier::{
    AttrMask, ChainEvent, Dependencies, Generated, Inputs, Modifier, ModifierId,
    ModifierPalette, OutputDecl,
};

/// What a [`Probe`] returns from `generate_output`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Mode {
    /// `1 + sum of u64 inputs`.
    Value,
    Unchanged,
    Failed,
}

/// Shared record of every call made to the probes of one test.
#[derive(Clone, Default)]
pub(crate) struct Log {
    generated: Rc<RefCell<Vec<(&'static str, Did)>>>,
    events: Rc<RefCell<Vec<(&'static str, ChainEvent)>>>,
}

impl Log {
    /// Number of `generate_output` calls made to probe `name`.
    pub(crate) fn calls(&self, name: &str) -> usize {
        self.generated
            .borrow()
            .iter()
            .filter(|(n, _)| *n == name)
            .count()
    }

    /// Names of the probes that generated, in call order.
    pub(crate) fn order(&self) -> Vec<&'static str> {
        self.generated.borrow().iter().map(|(n, _)| *n).collect()
    }

    pub(crate) fn events(&self, name: &str) -> Vec<ChainEvent> {
        self.events
            .borrow()
            .iter()
            .filter(|(n, _)| *n == name)
            .map(|(_, e)| *e)
            .collect()
    }

    pub(crate) fn clear(&self) {
        self.generated.borrow_mut().clear();
        self.events.borrow_mut().clear();
    }
}

/// A configurable modifier that records its calls.
pub(crate) struct Probe {
    name: &'static str,
    outputs: Vec<OutputDecl>,
    deps: Dependencies,
    mode: Rc<Cell<Mode>>,
    log: Log,
}

impl Probe {
    pub(crate) fn new(name: &'static str, log: &Log) -> Self {
        Self {
            name,
            outputs: Vec::new(),
            deps: Dependencies::new(),
            mode: Rc::new(Cell::new(Mode::Value)),
            log: log.clone(),
        }
    }

    pub(crate) fn output(mut self, did: Did) -> Self {
        self.outputs.push(OutputDecl::did(did));
        self
    }

    pub(crate) fn output_decl(mut self, decl: OutputDecl) -> Self {
        self.outputs.push(decl);
        self
    }

    pub(crate) fn input(mut self, did: Did) -> Self {
        self.deps = self.deps.input(did);
        self
    }

    pub(crate) fn consume(mut self, did: Did) -> Self {
        self.deps = self.deps.consume(did);
        self
    }

    pub(crate) fn output_dependency(mut self, output: Did, on: Did, attrs: AttrMask) -> Self {
        self.deps = self.deps.output_dependency(output, on, attrs);
        self
    }

    /// Handle for switching the generation mode after insertion.
    pub(crate) fn mode(&self) -> Rc<Cell<Mode>> {
        self.mode.clone()
    }

    pub(crate) fn insert(self, palette: &mut ModifierPalette) -> ModifierId {
        palette.insert(Box::new(self))
    }
}

impl Modifier for Probe {
    fn outputs(&self) -> Vec<OutputDecl> {
        self.outputs.clone()
    }

    fn dependencies(&self) -> Dependencies {
        self.deps.clone()
    }

    fn generate_output(&mut self, did: Did, inputs: &Inputs<'_>) -> Generated {
        self.log.generated.borrow_mut().push((self.name, did));
        match self.mode.get() {
            Mode::Value => {
                let sum: u64 = self
                    .deps
                    .inputs
                    .iter()
                    .filter_map(|&d| inputs.value::<u64>(d))
                    .sum();
                Generated::Value(Rc::new(1 + sum))
            }
            Mode::Unchanged => Generated::Unchanged,
            Mode::Failed => Generated::Failed,
        }
    }

    fn notify(&mut self, event: ChainEvent) {
        self.log.events.borrow_mut().push((self.name, event));
    }
}
