//! Property-based invariant tests for the batching queues.
//!
//! 1. N non-urgent enqueues in one burst produce exactly one notification
//!    equal to the last-write-wins merge of all N patches.
//! 2. An urgent enqueue delivers everything pending synchronously, and the
//!    later microtask delivers nothing more.
//! 3. Validation passes never overlap and each field is validated once per
//!    burst no matter how often it was enqueued.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use formctl_core::Subject;
use formctl_runtime::{Merge, PassRequest, Scheduler, StateUpdateQueue, ValidationQueue};
use futures::FutureExt;
use proptest::prelude::*;

#[derive(Debug, Clone, Default, PartialEq)]
struct Patch(BTreeMap<u8, u32>);

impl Merge for Patch {
    fn merge(&mut self, newer: Self) {
        self.0.extend(newer.0);
    }

    fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// ── Strategies ────────────────────────────────────────────────────────────

fn patch() -> impl Strategy<Value = Patch> {
    prop::collection::btree_map(0u8..6, any::<u32>(), 1..4).prop_map(Patch)
}

fn harness() -> (Scheduler, StateUpdateQueue<Patch>, Rc<RefCell<Vec<Patch>>>) {
    let scheduler = Scheduler::new();
    let queue = StateUpdateQueue::new(scheduler.clone(), Subject::new("state"));
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    let _ = queue.subscribe(move |p: &Patch| sink.borrow_mut().push(p.clone()));
    (scheduler, queue, seen)
}

// ─── 1. Batching idempotence ──────────────────────────────────────────────

proptest! {
    #[test]
    fn burst_yields_one_merged_notification(patches in prop::collection::vec(patch(), 1..12)) {
        let (scheduler, queue, seen) = harness();
        let mut expected = Patch::default();
        for p in &patches {
            queue.enqueue(p.clone(), false);
            expected.merge(p.clone());
        }
        prop_assert!(seen.borrow().is_empty());
        scheduler.run_until_idle();
        prop_assert_eq!(seen.borrow().clone(), vec![expected]);
    }
}

// ─── 2. Urgent flush ordering ─────────────────────────────────────────────

proptest! {
    #[test]
    fn urgent_flush_is_a_boundary(
        before in prop::collection::vec(patch(), 0..6),
        urgent in patch(),
    ) {
        let (scheduler, queue, seen) = harness();
        let mut expected = Patch::default();
        for p in &before {
            queue.enqueue(p.clone(), false);
            expected.merge(p.clone());
        }
        queue.enqueue(urgent.clone(), true);
        expected.merge(urgent);
        prop_assert_eq!(seen.borrow().clone(), vec![expected]);
        scheduler.run_until_idle();
        prop_assert_eq!(seen.borrow().len(), 1);
    }
}

// ─── 3. Validation passes are serialized and deduplicated ─────────────────

proptest! {
    #[test]
    fn validation_burst_dedupes(names in prop::collection::vec("[a-d]", 1..20)) {
        let scheduler = Scheduler::new();
        let log: Rc<RefCell<Vec<PassRequest>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        let queue = ValidationQueue::new(scheduler.clone(), move |request: PassRequest| {
            sink.borrow_mut().push(request);
            futures::future::ready(Ok::<(), String>(())).boxed_local()
        });
        for name in &names {
            queue.enqueue(Some(name));
        }
        scheduler.run_until_idle();

        let log = log.borrow();
        prop_assert_eq!(log.len(), 1);
        let mut distinct: Vec<&str> = Vec::new();
        for name in &names {
            if !distinct.contains(&name.as_str()) {
                distinct.push(name);
            }
        }
        prop_assert_eq!(&log[0].fields, &distinct);
        prop_assert!(queue.trace().verify_invariants().is_empty());
    }
}
