#![forbid(unsafe_code)]

//! Deterministic single-threaded scheduler.
//!
//! Two kinds of work exist:
//!
//! | Kind | Queued by | Runs |
//! |------|-----------|------|
//! | microtask | [`Scheduler::queue_microtask`] | FIFO, to completion, before any task |
//! | task | [`Scheduler::spawn`] | on a `futures` [`LocalPool`] until stalled |
//!
//! Nothing runs on its own: the owner calls [`Scheduler::run_microtasks`] or
//! [`Scheduler::run_until_idle`] at the end of each synchronous burst. Work
//! queued while draining is picked up in the same call.
//!
//! # Failure Modes
//!
//! | Condition | Behavior |
//! |-----------|----------|
//! | `run_until_idle` re-entered from a task | the pool is skipped, microtasks still drain |
//! | spawn after the pool is gone | [`SpawnError`] |

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::pin::pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use futures::FutureExt;
use futures::executor::{LocalPool, LocalSpawner};
use futures::task::{LocalSpawnExt, SpawnError, noop_waker};

type Microtask = Box<dyn FnOnce()>;

struct SchedulerInner {
    microtasks: RefCell<VecDeque<Microtask>>,
    pool: RefCell<LocalPool>,
    spawner: LocalSpawner,
    completed_tasks: Rc<Cell<u64>>,
    spawned_tasks: Cell<u64>,
}

/// Cloneable handle to one scheduler.
#[derive(Clone)]
pub struct Scheduler {
    inner: Rc<SchedulerInner>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("microtasks", &self.pending_microtasks())
            .field("tasks_in_flight", &self.tasks_in_flight())
            .finish()
    }
}

impl Scheduler {
    #[must_use]
    pub fn new() -> Self {
        let pool = LocalPool::new();
        let spawner = pool.spawner();
        Self {
            inner: Rc::new(SchedulerInner {
                microtasks: RefCell::new(VecDeque::new()),
                pool: RefCell::new(pool),
                spawner,
                completed_tasks: Rc::new(Cell::new(0)),
                spawned_tasks: Cell::new(0),
            }),
        }
    }

    /// Queue `task` to run at the end of the current burst.
    pub fn queue_microtask(&self, task: impl FnOnce() + 'static) {
        self.inner.microtasks.borrow_mut().push_back(Box::new(task));
    }

    /// Spawn an asynchronous task.
    pub fn spawn(&self, task: impl Future<Output = ()> + 'static) -> Result<(), SpawnError> {
        let completed = Rc::clone(&self.inner.completed_tasks);
        self.inner.spawner.spawn_local(task.map(move |()| {
            completed.set(completed.get() + 1);
        }))?;
        self.inner.spawned_tasks.set(self.inner.spawned_tasks.get() + 1);
        Ok(())
    }

    #[must_use]
    pub fn pending_microtasks(&self) -> usize {
        self.inner.microtasks.borrow().len()
    }

    /// Spawned tasks that have not completed yet.
    #[must_use]
    pub fn tasks_in_flight(&self) -> u64 {
        self.inner.spawned_tasks.get() - self.inner.completed_tasks.get()
    }

    /// Drain the microtask queue, including microtasks queued while draining.
    /// Returns how many ran.
    pub fn run_microtasks(&self) -> usize {
        let mut ran = 0;
        loop {
            let next = self.inner.microtasks.borrow_mut().pop_front();
            let Some(task) = next else {
                break;
            };
            task();
            ran += 1;
        }
        if ran > 0 {
            tracing::trace!(ran, "microtasks drained");
        }
        ran
    }

    /// Run microtasks and tasks until neither can make progress. Returns the
    /// number of microtasks run plus tasks completed.
    pub fn run_until_idle(&self) -> usize {
        let mut work = 0;
        loop {
            work += self.run_microtasks();
            let before = self.inner.completed_tasks.get();
            match self.inner.pool.try_borrow_mut() {
                Ok(mut pool) => pool.run_until_stalled(),
                Err(_) => tracing::trace!("pool busy; re-entrant drive skipped"),
            }
            let finished = usize::try_from(self.inner.completed_tasks.get() - before).unwrap_or(usize::MAX);
            work += finished;
            if self.pending_microtasks() == 0 {
                break;
            }
        }
        work
    }

    /// Drive the scheduler until `future` resolves.
    ///
    /// When nothing local can make progress the thread parks on the pool until
    /// an external waker fires.
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        let mut future = pin!(future);
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        loop {
            if let Poll::Ready(output) = future.as_mut().poll(&mut cx) {
                self.run_until_idle();
                return output;
            }
            if self.run_until_idle() == 0 {
                let output = match self.inner.pool.try_borrow_mut() {
                    Ok(mut pool) => pool.run_until(future.as_mut()),
                    Err(_) => futures::executor::block_on(future.as_mut()),
                };
                self.run_until_idle();
                return output;
            }
        }
    }
}
