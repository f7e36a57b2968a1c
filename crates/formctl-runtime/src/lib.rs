#![forbid(unsafe_code)]

//! Cooperative runtime for formctl.
//!
//! Everything here runs on one thread. A [`Scheduler`] owns a FIFO of
//! microtasks plus a local executor for asynchronous validation passes; the
//! binding layer (or a test) drives it with [`Scheduler::run_until_idle`].
//!
//! The two queues defer work to the end of the current synchronous burst:
//!
//! - [`StateUpdateQueue`] merges state patches and delivers one notification.
//! - [`ValidationQueue`] deduplicates field names and runs one batched pass
//!   at a time, reusing the in-flight pass for concurrent flush requests.

pub mod scheduler;
pub mod state_queue;
pub mod validation_queue;

pub use scheduler::Scheduler;
pub use state_queue::{Merge, StateUpdateQueue};
pub use validation_queue::{PassEvent, PassFuture, PassRequest, PassToken, PassTrace, ValidationQueue};
