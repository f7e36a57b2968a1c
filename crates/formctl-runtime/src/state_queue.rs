#![forbid(unsafe_code)]

//! Batched state notifications.
//!
//! Patches enqueued during one synchronous burst are merged per key, last
//! write wins, and delivered to the state subject as a single notification
//! from a microtask. An urgent enqueue delivers everything pending right away.
//!
//! # Invariants
//!
//! - At most one flush microtask is outstanding per queue.
//! - A flush with nothing pending notifies nobody.
//! - Patches merge in enqueue order, so a later patch overrides an earlier
//!   one key by key; nested values are replaced, never deep-merged.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use formctl_core::{Subject, Subscription};

use crate::scheduler::Scheduler;

/// A partial state that can absorb a newer partial.
pub trait Merge: Default + 'static {
    /// Overwrite every key present in `newer`.
    fn merge(&mut self, newer: Self);

    /// Whether no key is set.
    fn is_empty(&self) -> bool;
}

struct QueueInner<P> {
    pending: RefCell<Vec<P>>,
    scheduled: Cell<bool>,
    flushes: Cell<u64>,
    subject: Subject<P>,
    scheduler: Scheduler,
}

impl<P: Merge> QueueInner<P> {
    fn flush(&self) -> bool {
        let pending = std::mem::take(&mut *self.pending.borrow_mut());
        if pending.is_empty() {
            return false;
        }
        let count = pending.len();
        let merged = pending.into_iter().fold(P::default(), |mut acc, patch| {
            acc.merge(patch);
            acc
        });
        self.flushes.set(self.flushes.get() + 1);
        tracing::debug!(patches = count, flush = self.flushes.get(), "state flush");
        self.subject.next(&merged);
        true
    }
}

/// Merging queue in front of a state [`Subject`].
pub struct StateUpdateQueue<P> {
    inner: Rc<QueueInner<P>>,
}

impl<P> Clone for StateUpdateQueue<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<P> fmt::Debug for StateUpdateQueue<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateUpdateQueue")
            .field("pending", &self.inner.pending.borrow().len())
            .field("scheduled", &self.inner.scheduled.get())
            .field("flushes", &self.inner.flushes.get())
            .finish()
    }
}

impl<P: Merge> StateUpdateQueue<P> {
    #[must_use]
    pub fn new(scheduler: Scheduler, subject: Subject<P>) -> Self {
        Self {
            inner: Rc::new(QueueInner {
                pending: RefCell::new(Vec::new()),
                scheduled: Cell::new(false),
                flushes: Cell::new(0),
                subject,
                scheduler,
            }),
        }
    }

    /// Queue `patch`. Urgent patches flush synchronously along with anything
    /// already pending.
    pub fn enqueue(&self, patch: P, urgent: bool) {
        self.inner.pending.borrow_mut().push(patch);
        if urgent {
            self.inner.flush();
            return;
        }
        if self.inner.scheduled.replace(true) {
            return;
        }
        let weak: Weak<QueueInner<P>> = Rc::downgrade(&self.inner);
        self.inner.scheduler.queue_microtask(move || {
            if let Some(inner) = weak.upgrade() {
                inner.scheduled.set(false);
                inner.flush();
            }
        });
    }

    /// Deliver pending patches now. Returns whether anything was delivered.
    pub fn flush(&self) -> bool {
        self.inner.flush()
    }

    /// Drop pending patches without notifying.
    pub fn clear(&self) {
        let dropped = std::mem::take(&mut *self.inner.pending.borrow_mut()).len();
        if dropped > 0 {
            tracing::debug!(dropped, "state queue cleared");
        }
    }

    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.inner.pending.borrow().len()
    }

    #[must_use]
    pub fn is_scheduled(&self) -> bool {
        self.inner.scheduled.get()
    }

    /// Notifications delivered so far.
    #[must_use]
    pub fn flush_count(&self) -> u64 {
        self.inner.flushes.get()
    }

    pub fn subscribe(&self, observer: impl Fn(&P) + 'static) -> Subscription {
        self.inner.subject.subscribe(observer)
    }

    #[must_use]
    pub fn subject(&self) -> &Subject<P> {
        &self.inner.subject
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Patch(BTreeMap<&'static str, i32>);

    impl Patch {
        fn of(entries: &[(&'static str, i32)]) -> Self {
            Self(entries.iter().copied().collect())
        }
    }

    impl Merge for Patch {
        fn merge(&mut self, newer: Self) {
            self.0.extend(newer.0);
        }

        fn is_empty(&self) -> bool {
            self.0.is_empty()
        }
    }

    fn queue() -> (Scheduler, StateUpdateQueue<Patch>, Rc<RefCell<Vec<Patch>>>) {
        let scheduler = Scheduler::new();
        let queue = StateUpdateQueue::new(scheduler.clone(), Subject::new("state"));
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let _ = queue.subscribe(move |p: &Patch| sink.borrow_mut().push(p.clone()));
        (scheduler, queue, seen)
    }

    #[test]
    fn burst_merges_into_one_notification() {
        let (scheduler, queue, seen) = queue();
        queue.enqueue(Patch::of(&[("a", 1)]), false);
        queue.enqueue(Patch::of(&[("b", 2)]), false);
        queue.enqueue(Patch::of(&[("a", 3)]), false);
        assert_eq!(scheduler.pending_microtasks(), 1);
        assert!(seen.borrow().is_empty());
        scheduler.run_microtasks();
        assert_eq!(*seen.borrow(), vec![Patch::of(&[("a", 3), ("b", 2)])]);
    }

    #[test]
    fn urgent_flushes_everything_synchronously() {
        let (scheduler, queue, seen) = queue();
        queue.enqueue(Patch::of(&[("a", 1)]), false);
        queue.enqueue(Patch::of(&[("b", 2)]), false);
        queue.enqueue(Patch::of(&[("c", 3)]), true);
        assert_eq!(*seen.borrow(), vec![Patch::of(&[("a", 1), ("b", 2), ("c", 3)])]);
        scheduler.run_microtasks();
        assert_eq!(seen.borrow().len(), 1);
    }

    #[test]
    fn empty_flush_is_silent() {
        let (_scheduler, queue, seen) = queue();
        assert!(!queue.flush());
        assert!(seen.borrow().is_empty());
        assert_eq!(queue.flush_count(), 0);
    }

    #[test]
    fn clear_drops_pending() {
        let (scheduler, queue, seen) = queue();
        queue.enqueue(Patch::of(&[("a", 1)]), false);
        queue.clear();
        scheduler.run_microtasks();
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn next_burst_schedules_again() {
        let (scheduler, queue, seen) = queue();
        queue.enqueue(Patch::of(&[("a", 1)]), false);
        scheduler.run_microtasks();
        queue.enqueue(Patch::of(&[("a", 2)]), false);
        assert!(queue.is_scheduled());
        scheduler.run_microtasks();
        assert_eq!(seen.borrow().len(), 2);
    }
}
