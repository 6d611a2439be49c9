// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Simulation time.
//!
//! [`SimTime`] is the value carried by the built-in
//! [`SIMULATION_TIME`](crate::did::SIMULATION_TIME) element. It is an
//! abstract tick count; the driving caller decides what a tick means.

use core::fmt;
use core::ops::{Add, Sub};

/// A point in simulation time, in caller-defined ticks.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SimTime(pub i64);

impl SimTime {
    /// The start of simulation time.
    pub const ZERO: Self = Self(0);

    /// Returns the raw tick value.
    #[inline]
    #[must_use]
    pub const fn ticks(self) -> i64 {
        self.0
    }

    /// Returns the signed number of ticks from `earlier` to `self`,
    /// saturating at the `i64` range.
    #[inline]
    #[must_use]
    pub const fn saturating_ticks_since(self, earlier: Self) -> i64 {
        self.0.saturating_sub(earlier.0)
    }
}

impl Add<i64> for SimTime {
    type Output = Self;

    #[inline]
    fn add(self, rhs: i64) -> Self {
        Self(self.0 + rhs)
    }
}

impl Sub<i64> for SimTime {
    type Output = Self;

    #[inline]
    fn sub(self, rhs: i64) -> Self {
        Self(self.0 - rhs)
    }
}

impl fmt::Debug for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SimTime({})", self.0)
    }
}
