#![forbid(unsafe_code)]

//! Minimal multicast observable.
//!
//! A [`Subject`] pushes each value to every registered observer, synchronously
//! and in registration order. There is no buffering: a late subscriber never
//! sees past values.
//!
//! # Invariants
//!
//! - Observer ids are strictly increasing per subject and never reused.
//! - `next` iterates over a snapshot of the observer list, so observers may
//!   subscribe or unsubscribe from inside a callback; changes take effect on
//!   the following `next`.
//! - A [`Subscription`] outliving its subject disposes as a no-op.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

/// Identifier of one observer within a subject.
pub type ObserverId = u64;

type Observer<T> = Rc<dyn Fn(&T)>;

struct SubjectInner<T> {
    label: &'static str,
    next_id: Cell<ObserverId>,
    observers: RefCell<Vec<(ObserverId, Observer<T>)>>,
}

impl<T> SubjectInner<T> {
    fn remove(&self, id: ObserverId) -> bool {
        let mut observers = self.observers.borrow_mut();
        let before = observers.len();
        observers.retain(|(existing, _)| *existing != id);
        before != observers.len()
    }
}

/// A push channel with any number of observers.
pub struct Subject<T> {
    inner: Rc<SubjectInner<T>>,
}

impl<T> Clone for Subject<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Subject<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subject")
            .field("label", &self.inner.label)
            .field("observers", &self.observer_count())
            .finish()
    }
}

impl<T: 'static> Subject<T> {
    /// Create a subject. `label` only appears in logs.
    #[must_use]
    pub fn new(label: &'static str) -> Self {
        Self {
            inner: Rc::new(SubjectInner {
                label,
                next_id: Cell::new(1),
                observers: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Register `observer` and return its disposer.
    pub fn subscribe(&self, observer: impl Fn(&T) + 'static) -> Subscription {
        let id = self.inner.next_id.get();
        self.inner.next_id.set(id + 1);
        self.inner.observers.borrow_mut().push((id, Rc::new(observer)));
        tracing::debug!(subject = self.inner.label, observer_id = id, "observer subscribed");

        let weak: Weak<SubjectInner<T>> = Rc::downgrade(&self.inner);
        Subscription {
            id,
            disposer: Some(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    if inner.remove(id) {
                        tracing::debug!(subject = inner.label, observer_id = id, "observer unsubscribed");
                    }
                }
            })),
        }
    }

    /// Deliver `value` to every observer.
    pub fn next(&self, value: &T) {
        let snapshot: Vec<Observer<T>> = self
            .inner
            .observers
            .borrow()
            .iter()
            .map(|(_, observer)| Rc::clone(observer))
            .collect();
        tracing::trace!(subject = self.inner.label, observers = snapshot.len(), "next");
        for observer in snapshot {
            observer(value);
        }
    }
}

impl<T> Subject<T> {
    /// Drop every observer.
    pub fn unsubscribe(&self) {
        let count = {
            let mut observers = self.inner.observers.borrow_mut();
            let count = observers.len();
            observers.clear();
            count
        };
        tracing::debug!(subject = self.inner.label, dropped = count, "subject cleared");
    }

    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.inner.observers.borrow().len()
    }

    #[must_use]
    pub fn is_observed(&self) -> bool {
        self.observer_count() > 0
    }
}

/// Handle for one observer. Dropping it keeps the observer registered; call
/// [`Subscription::unsubscribe`] to remove it.
pub struct Subscription {
    id: ObserverId,
    disposer: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    /// A handle that owns nothing.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            id: 0,
            disposer: None,
        }
    }

    /// Bundle several subscriptions under one disposer.
    #[must_use]
    pub fn merge(subscriptions: Vec<Subscription>) -> Self {
        let id = subscriptions.first().map_or(0, Subscription::id);
        Self {
            id,
            disposer: Some(Box::new(move || {
                for subscription in subscriptions {
                    subscription.unsubscribe();
                }
            })),
        }
    }

    #[must_use]
    pub fn id(&self) -> ObserverId {
        self.id
    }

    /// Remove the observer from its subject.
    pub fn unsubscribe(mut self) {
        if let Some(dispose) = self.disposer.take() {
            dispose();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.disposer.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivers_in_registration_order() {
        let subject = Subject::<i32>::new("test");
        let log = Rc::new(RefCell::new(Vec::new()));
        for tag in ["a", "b", "c"] {
            let log = Rc::clone(&log);
            let _ = subject.subscribe(move |v| log.borrow_mut().push(format!("{tag}{v}")));
        }
        subject.next(&1);
        assert_eq!(*log.borrow(), vec!["a1", "b1", "c1"]);
    }

    #[test]
    fn late_subscriber_misses_past_values() {
        let subject = Subject::<i32>::new("test");
        subject.next(&1);
        let seen = Rc::new(Cell::new(0));
        let sink = Rc::clone(&seen);
        let _ = subject.subscribe(move |v| sink.set(*v));
        assert_eq!(seen.get(), 0);
        subject.next(&2);
        assert_eq!(seen.get(), 2);
    }

    #[test]
    fn disposer_removes_only_its_observer() {
        let subject = Subject::<()>::new("test");
        let first = subject.subscribe(|_| {});
        let _second = subject.subscribe(|_| {});
        assert_eq!(subject.observer_count(), 2);
        first.unsubscribe();
        assert_eq!(subject.observer_count(), 1);
    }

    #[test]
    fn unsubscribe_all_clears() {
        let subject = Subject::<()>::new("test");
        let _a = subject.subscribe(|_| {});
        let _b = subject.subscribe(|_| {});
        subject.unsubscribe();
        assert!(!subject.is_observed());
    }

    #[test]
    fn observer_may_subscribe_during_next() {
        let subject = Subject::<i32>::new("test");
        let inner = subject.clone();
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        let _ = subject.subscribe(move |_| {
            let counter = Rc::clone(&counter);
            let _ = inner.subscribe(move |_| counter.set(counter.get() + 1));
        });
        subject.next(&1);
        assert_eq!(calls.get(), 0);
        subject.next(&2);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn disposing_after_subject_drop_is_noop() {
        let subject = Subject::<()>::new("test");
        let subscription = subject.subscribe(|_| {});
        drop(subject);
        subscription.unsubscribe();
    }
}
