#![forbid(unsafe_code)]

//! Batched, serialized validation passes.
//!
//! Field names enqueued during a burst collect in an insertion-ordered set.
//! One microtask later the queue starts a single pass over everything pending.
//! Requests arriving while a pass is running wait for it and are picked up by
//! the same pass before it finishes, so two passes never overlap.
//!
//! Every pass gets a monotonic [`PassToken`] and leaves `Started` and
//! `Completed` (or `Faulted`) events in the [`PassTrace`].
//!
//! # Failure Modes
//!
//! | Condition | Behavior |
//! |-----------|----------|
//! | validate function returns `Err` | routed to `on_error`, pass continues with later requests |
//! | executor refuses the pass | logged; the pass still runs when a caller awaits [`ValidationQueue::flush`] |
//! | flush with nothing pending | resolves immediately |

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::collections::vec_deque;
use std::fmt;
use std::rc::Rc;

use futures::FutureExt;
use futures::future::{LocalBoxFuture, Shared};
use indexmap::IndexSet;

use crate::scheduler::Scheduler;

// ---------------------------------------------------------------------------
// PassToken / PassTrace
// ---------------------------------------------------------------------------

/// Monotonic identifier of one validation pass. Token 0 means "none".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct PassToken(u64);

impl PassToken {
    pub const NONE: Self = Self(0);

    #[must_use]
    pub const fn from_raw(value: u64) -> Self {
        Self(value)
    }

    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }

    #[must_use]
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for PassToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pass({})", self.0)
    }
}

/// One entry of the pass log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassEvent {
    Started {
        token: PassToken,
        fields: Vec<String>,
        whole_form: bool,
    },
    Completed {
        token: PassToken,
    },
    Faulted {
        token: PassToken,
        message: String,
    },
}

impl PassEvent {
    #[must_use]
    pub fn token(&self) -> PassToken {
        match self {
            Self::Started { token, .. } | Self::Completed { token } | Self::Faulted { token, .. } => {
                *token
            }
        }
    }

    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Started { .. } => "started",
            Self::Completed { .. } => "completed",
            Self::Faulted { .. } => "faulted",
        }
    }
}

/// Bounded log of pass events, oldest dropped first.
#[derive(Debug, Clone)]
pub struct PassTrace {
    events: VecDeque<PassEvent>,
    capacity: usize,
}

impl Default for PassTrace {
    fn default() -> Self {
        Self::with_capacity(256)
    }
}

impl PassTrace {
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, event: PassEvent) {
        if self.events.len() == self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    #[must_use]
    pub fn events(&self) -> vec_deque::Iter<'_, PassEvent> {
        self.events.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    #[must_use]
    pub fn contains_event_type(&self, token: PassToken, event_type: &str) -> bool {
        self.events
            .iter()
            .any(|e| e.token() == token && e.event_type() == event_type)
    }

    /// Passes started so far that are still in the log.
    #[must_use]
    pub fn started(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, PassEvent::Started { .. }))
            .count()
    }

    /// Check that start tokens increase and that no pass starts before the
    /// previous one ended. Returns the violations found.
    #[must_use]
    pub fn verify_invariants(&self) -> Vec<String> {
        let mut violations = Vec::new();
        let mut last = PassToken::NONE;
        let mut open: Option<PassToken> = None;
        for event in &self.events {
            match event {
                PassEvent::Started { token, .. } => {
                    if *token <= last {
                        violations.push(format!("non-monotonic start {token} after {last}"));
                    }
                    if let Some(running) = open {
                        violations.push(format!("{token} started while {running} was running"));
                    }
                    last = *token;
                    open = Some(*token);
                }
                PassEvent::Completed { token } | PassEvent::Faulted { token, .. } => {
                    if open != Some(*token) {
                        violations.push(format!("{token} ended without being the running pass"));
                    }
                    open = None;
                }
            }
        }
        violations
    }
}

// ---------------------------------------------------------------------------
// ValidationQueue
// ---------------------------------------------------------------------------

/// What one pass is asked to validate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassRequest {
    pub token: PassToken,
    /// Field names, deduplicated, in first-enqueue order.
    pub fields: Vec<String>,
    /// Whether a whole-form pass was requested.
    pub whole_form: bool,
}

type ValidateFn<E> = Rc<dyn Fn(PassRequest) -> LocalBoxFuture<'static, Result<(), E>>>;
type ErrorFn<E> = Rc<dyn Fn(&E)>;
/// A pass that callers can await together.
pub type PassFuture = Shared<LocalBoxFuture<'static, ()>>;

struct QueueInner<E> {
    scheduler: Scheduler,
    validate: ValidateFn<E>,
    on_error: RefCell<Option<ErrorFn<E>>>,
    pending: RefCell<IndexSet<String>>,
    whole_form: Cell<bool>,
    scheduled: Cell<bool>,
    in_flight: RefCell<Option<PassFuture>>,
    next_token: Cell<u64>,
    trace: RefCell<PassTrace>,
}

impl<E> QueueInner<E> {
    fn take_request(&self) -> Option<PassRequest> {
        let fields: Vec<String> = self.pending.borrow_mut().drain(..).collect();
        let whole_form = self.whole_form.replace(false);
        if fields.is_empty() && !whole_form {
            return None;
        }
        let token = PassToken(self.next_token.get() + 1);
        self.next_token.set(token.0);
        Some(PassRequest {
            token,
            fields,
            whole_form,
        })
    }
}

/// Deduplicating validation queue. `E` is the validate function's error type.
pub struct ValidationQueue<E> {
    inner: Rc<QueueInner<E>>,
}

impl<E> Clone for ValidationQueue<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<E> fmt::Debug for ValidationQueue<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationQueue")
            .field("pending", &self.inner.pending.borrow().len())
            .field("whole_form", &self.inner.whole_form.get())
            .field("running", &self.inner.in_flight.borrow().is_some())
            .finish()
    }
}

impl<E: fmt::Display + 'static> ValidationQueue<E> {
    /// Create a queue that runs `validate` for each pass.
    pub fn new(
        scheduler: Scheduler,
        validate: impl Fn(PassRequest) -> LocalBoxFuture<'static, Result<(), E>> + 'static,
    ) -> Self {
        Self {
            inner: Rc::new(QueueInner {
                scheduler,
                validate: Rc::new(validate),
                on_error: RefCell::new(None),
                pending: RefCell::new(IndexSet::new()),
                whole_form: Cell::new(false),
                scheduled: Cell::new(false),
                in_flight: RefCell::new(None),
                next_token: Cell::new(0),
                trace: RefCell::new(PassTrace::default()),
            }),
        }
    }

    /// Route validate-function errors to `handler`.
    pub fn set_on_error(&self, handler: impl Fn(&E) + 'static) {
        *self.inner.on_error.borrow_mut() = Some(Rc::new(handler));
    }

    /// Request validation of `field`, or of the whole form with `None`.
    pub fn enqueue(&self, field: Option<&str>) {
        match field {
            Some(name) => {
                self.inner.pending.borrow_mut().insert(name.to_owned());
            }
            None => self.inner.whole_form.set(true),
        }
        if self.inner.scheduled.replace(true) {
            return;
        }
        let queue = self.clone();
        self.inner.scheduler.queue_microtask(move || {
            queue.inner.scheduled.set(false);
            drop(queue.flush());
        });
    }

    /// Start a pass over everything pending, or join the running one.
    pub fn flush(&self) -> PassFuture {
        if let Some(running) = self.inner.in_flight.borrow().as_ref() {
            return running.clone();
        }
        let Some(first) = self.inner.take_request() else {
            return futures::future::ready(()).boxed_local().shared();
        };

        let inner = Rc::clone(&self.inner);
        let pass: LocalBoxFuture<'static, ()> = async move {
            let mut request = Some(first);
            while let Some(current) = request.take() {
                let token = current.token;
                tracing::debug!(
                    pass = token.raw(),
                    fields = current.fields.len(),
                    whole_form = current.whole_form,
                    "validation pass started"
                );
                inner.trace.borrow_mut().push(PassEvent::Started {
                    token,
                    fields: current.fields.clone(),
                    whole_form: current.whole_form,
                });
                let validate = Rc::clone(&inner.validate);
                match validate(current).await {
                    Ok(()) => {
                        tracing::debug!(pass = token.raw(), "validation pass completed");
                        inner.trace.borrow_mut().push(PassEvent::Completed { token });
                    }
                    Err(err) => {
                        tracing::warn!(pass = token.raw(), error = %err, "validation pass faulted");
                        inner.trace.borrow_mut().push(PassEvent::Faulted {
                            token,
                            message: err.to_string(),
                        });
                        let handler = inner.on_error.borrow().clone();
                        if let Some(handler) = handler {
                            handler(&err);
                        }
                    }
                }
                request = inner.take_request();
            }
            *inner.in_flight.borrow_mut() = None;
        }
        .boxed_local();

        let shared = pass.shared();
        *self.inner.in_flight.borrow_mut() = Some(shared.clone());
        if let Err(err) = self.inner.scheduler.spawn(shared.clone()) {
            tracing::warn!(error = %err, "validation pass not spawned; awaiting caller drives it");
        }
        shared
    }

    /// Drop pending requests. A running pass is not interrupted.
    pub fn clear(&self) {
        self.inner.pending.borrow_mut().clear();
        self.inner.whole_form.set(false);
    }

    /// Whether anything is waiting for the next pass.
    #[must_use]
    pub fn is_queued(&self) -> bool {
        !self.inner.pending.borrow().is_empty() || self.inner.whole_form.get()
    }

    /// Field names waiting for the next pass.
    #[must_use]
    pub fn pending_fields(&self) -> Vec<String> {
        self.inner.pending.borrow().iter().cloned().collect()
    }

    /// Whether a pass is in flight.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.in_flight.borrow().is_some()
    }

    /// Snapshot of the pass log.
    #[must_use]
    pub fn trace(&self) -> PassTrace {
        self.inner.trace.borrow().clone()
    }
}
