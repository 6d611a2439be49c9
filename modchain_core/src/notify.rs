// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Deduplicated change notification.
//!
//! A [`Subject`] keeps a list of observers, each with an interest bitmask.
//! Notifications are grouped into *batches*: within one batch every
//! interested observer is reported at most once, with the union of the bits
//! it was notified about. Deduplication uses a per-subject batch stamp
//! compared against the stamp each observer last saw, so no per-batch
//! clearing pass is needed.
//!
//! Deliveries are returned to the caller by [`Subject::end_batch`] instead of
//! being dispatched through callbacks. An observer detached while a batch is
//! open still receives that batch; the detach is replayed when the batch
//! ends.
//!
//! ```
//! use modchain_core::notify::{Delivery, ObserverKey, Subject};
//!
//! let mut subject = Subject::new();
//! subject.attach(ObserverKey(7), 0b01, 0);
//!
//! subject.begin_batch();
//! subject.notify(0b01);
//! subject.notify(0b11);
//! let deliveries = subject.end_batch();
//!
//! assert_eq!(deliveries, [Delivery { observer: ObserverKey(7), bits: 0b01 }]);
//! ```

use alloc::vec::Vec;

/// Caller-chosen identity of an observer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverKey(pub u32);

/// One notification handed to an observer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Delivery {
    /// Who is notified.
    pub observer: ObserverKey,
    /// Notified bits, shifted back into the observer's own bit space.
    ///
    /// [`Delivery::GONE`] (zero) means the subject has been shut down.
    pub bits: u32,
}

impl Delivery {
    /// Bits value reported when the subject goes away.
    pub const GONE: u32 = 0;
}

#[derive(Clone, Debug)]
struct Observer {
    key: ObserverKey,
    /// Interest in subject bit space (already shifted).
    mask: u64,
    shift: u8,
    /// Batch stamp this observer was last reported in.
    last_seen: u64,
    /// Bits accumulated during the current batch.
    pending: u32,
}

/// A source of deduplicated change notifications.
#[derive(Clone, Debug, Default)]
pub struct Subject {
    observers: Vec<Observer>,
    stamp: u64,
    in_batch: bool,
    /// Observers reported in the open batch, in first-notified order.
    touched: Vec<u32>,
    deferred_detach: Vec<ObserverKey>,
}

impl Subject {
    /// Creates a subject with no observers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `key` with interest bits `interest << shift`.
    ///
    /// Sub-interfaces of one observer can share a subject by using distinct
    /// shifts. Re-attaching an existing key replaces its interest.
    ///
    /// # Panics
    ///
    /// Panics if `shift` is 32 or more.
    pub fn attach(&mut self, key: ObserverKey, interest: u32, shift: u8) {
        assert!(shift < 32, "interest shift {shift} out of range");
        let mask = u64::from(interest) << shift;
        if let Some(obs) = self.observers.iter_mut().find(|o| o.key == key) {
            obs.mask = mask;
            obs.shift = shift;
            return;
        }
        self.observers.push(Observer {
            key,
            mask,
            shift,
            last_seen: 0,
            pending: 0,
        });
    }

    /// Unregisters `key`.
    ///
    /// Inside an open batch the removal is deferred until
    /// [`end_batch`](Self::end_batch).
    pub fn detach(&mut self, key: ObserverKey) {
        if self.in_batch {
            self.deferred_detach.push(key);
        } else {
            self.remove(key);
        }
    }

    /// Returns whether `key` is attached.
    #[must_use]
    pub fn is_attached(&self, key: ObserverKey) -> bool {
        self.observers.iter().any(|o| o.key == key)
    }

    /// Returns the number of attached observers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.observers.len()
    }

    /// Returns whether no observer is attached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    /// Returns whether a batch is open.
    #[must_use]
    pub fn in_batch(&self) -> bool {
        self.in_batch
    }

    /// Opens a new notification batch.
    ///
    /// # Panics
    ///
    /// Panics if a batch is already open.
    pub fn begin_batch(&mut self) {
        assert!(!self.in_batch, "notification batch already open");
        self.stamp += 1;
        self.in_batch = true;
    }

    /// Reports `bits` to every observer interested in any of them.
    ///
    /// # Panics
    ///
    /// Panics if no batch is open.
    pub fn notify(&mut self, bits: u32) {
        assert!(self.in_batch, "notify outside of a notification batch");
        let bits = u64::from(bits);
        for (i, obs) in self.observers.iter_mut().enumerate() {
            let hit = bits & obs.mask;
            if hit == 0 {
                continue;
            }
            #[expect(
                clippy::cast_possible_truncation,
                reason = "mask was built from a u32 interest shifted left by `shift`"
            )]
            let local = (hit >> obs.shift) as u32;
            if obs.last_seen == self.stamp {
                obs.pending |= local;
            } else {
                obs.last_seen = self.stamp;
                obs.pending = local;
                #[expect(
                    clippy::cast_possible_truncation,
                    reason = "observer counts stay far below u32::MAX"
                )]
                self.touched.push(i as u32);
            }
        }
    }

    /// Closes the open batch, returning one delivery per notified observer
    /// and applying deferred detaches.
    ///
    /// # Panics
    ///
    /// Panics if no batch is open.
    pub fn end_batch(&mut self) -> Vec<Delivery> {
        assert!(self.in_batch, "no notification batch open");
        let mut out = Vec::with_capacity(self.touched.len());
        for &i in &self.touched {
            let obs = &mut self.observers[i as usize];
            out.push(Delivery {
                observer: obs.key,
                bits: obs.pending,
            });
            obs.pending = 0;
        }
        self.touched.clear();
        self.in_batch = false;
        for key in core::mem::take(&mut self.deferred_detach) {
            self.remove(key);
        }
        out
    }

    /// Tears the subject down, reporting [`Delivery::GONE`] to every
    /// observer.
    #[must_use]
    pub fn shutdown(self) -> Vec<Delivery> {
        self.observers
            .into_iter()
            .map(|o| Delivery {
                observer: o.key,
                bits: Delivery::GONE,
            })
            .collect()
    }

    fn remove(&mut self, key: ObserverKey) {
        self.observers.retain(|o| o.key != key);
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec;

    use super::*;

    #[test]
    fn uninterested_observer_is_skipped() {
        let mut subject = Subject::new();
        subject.attach(ObserverKey(1), 0b10, 0);
        subject.begin_batch();
        subject.notify(0b01);
        assert!(subject.end_batch().is_empty());
    }

    #[test]
    fn batch_deduplicates_and_accumulates() {
        let mut subject = Subject::new();
        subject.attach(ObserverKey(1), 0b11, 0);
        subject.attach(ObserverKey(2), 0b10, 0);

        subject.begin_batch();
        subject.notify(0b01);
        subject.notify(0b10);
        subject.notify(0b10);
        let out = subject.end_batch();

        assert_eq!(
            out,
            vec![
                Delivery {
                    observer: ObserverKey(1),
                    bits: 0b11,
                },
                Delivery {
                    observer: ObserverKey(2),
                    bits: 0b10,
                },
            ]
        );
    }

    #[test]
    fn separate_batches_deliver_again() {
        let mut subject = Subject::new();
        subject.attach(ObserverKey(1), 0b1, 0);
        for _ in 0..3 {
            subject.begin_batch();
            subject.notify(0b1);
            assert_eq!(subject.end_batch().len(), 1, "one delivery per batch");
        }
    }

    #[test]
    fn shifted_interest_reports_local_bits() {
        let mut subject = Subject::new();
        subject.attach(ObserverKey(1), 0b1, 4);
        subject.begin_batch();
        subject.notify(0b1_0000);
        subject.notify(0b1);
        let out = subject.end_batch();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].bits, 0b1, "bits are shifted back for the observer");
    }

    #[test]
    fn detach_inside_batch_is_deferred() {
        let mut subject = Subject::new();
        subject.attach(ObserverKey(1), 0b1, 0);
        subject.begin_batch();
        subject.detach(ObserverKey(1));
        assert!(subject.is_attached(ObserverKey(1)));
        subject.notify(0b1);
        let out = subject.end_batch();
        assert_eq!(out.len(), 1, "detached observer still sees its batch");
        assert!(!subject.is_attached(ObserverKey(1)));
    }

    #[test]
    fn detach_outside_batch_is_immediate() {
        let mut subject = Subject::new();
        subject.attach(ObserverKey(1), 0b1, 0);
        subject.detach(ObserverKey(1));
        assert!(subject.is_empty());
    }

    #[test]
    fn reattach_replaces_interest() {
        let mut subject = Subject::new();
        subject.attach(ObserverKey(1), 0b1, 0);
        subject.attach(ObserverKey(1), 0b10, 0);
        assert_eq!(subject.len(), 1);
        subject.begin_batch();
        subject.notify(0b1);
        assert!(subject.end_batch().is_empty());
    }

    #[test]
    fn shutdown_reports_gone() {
        let mut subject = Subject::new();
        subject.attach(ObserverKey(1), 0b1, 0);
        subject.attach(ObserverKey(2), 0b10, 3);
        let out = subject.shutdown();
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|d| d.bits == Delivery::GONE));
    }

    #[test]
    #[should_panic(expected = "notify outside of a notification batch")]
    fn notify_requires_batch() {
        let mut subject = Subject::new();
        subject.notify(0b1);
    }
}
