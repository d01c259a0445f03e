#![cfg_attr(docsrs, doc = include_str!("../README.md"))]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs, rustdoc::broken_intra_doc_links)]
//! A thread-safe deadline scheduler.
//!
//! A [`Scheduler`] lets any number of independent subsystems say "run this
//! callback at time _T_, and maybe again after that" without each of them
//! owning a timing thread. Pending tasks are kept in a binary min-heap ordered
//! by deadline, with a hash index on the side so that a task can be found or
//! cancelled by its [`TaskId`] without scanning the heap.
//!
//! # Driving a scheduler
//!
//! A scheduler at rest stays at rest. Due tasks only fire when something
//! calls [`Scheduler::run_queue`]. There are two ways to arrange that:
//!
//! - **Manually**, from an existing event loop: call [`Scheduler::wait`] to
//!   learn how long until the next deadline, sleep (or poll something else)
//!   for at most that long, then call [`Scheduler::run_queue`].
//! - **With a driver thread**, by calling [`Scheduler::start_thread`] (or
//!   [`Builder::start_thread`]). The driver sleeps on a condition variable
//!   until the next deadline, and is woken early whenever a task is added or
//!   removed.
//!
//! # Callbacks
//!
//! A task's callback is a plain function pointer, [`Callback<D>`], that
//! receives a reference to the data the task was added with. The callback's
//! return value decides what happens next:
//!
//! - `0` releases the task. It will not fire again.
//! - Any other value reschedules it. For tasks added with [`Scheduler::add`],
//!   the next deadline is the previous deadline plus the original delay. For
//!   tasks added with [`Scheduler::add_variable`] and `variable` set to
//!   `true`, the returned value is the number of milliseconds until the next
//!   firing.
//!
//! Callbacks always run with the scheduler's lock released, so a callback may
//! add, delete, or look up tasks on the same scheduler.
//!
//! # Cancellation
//!
//! [`Scheduler::delete`] never returns while the task's callback may still be
//! running on another thread. If the task is idle, it is removed immediately.
//! If it is executing, `delete` marks it as deleted and blocks until the
//! callback returns, so that once `delete` returns the caller may tear down
//! anything the callback touches.
//!
//! # Examples
//!
//! ```rust
//! use shimeji::Scheduler;
//! use std::{
//!     sync::atomic::{AtomicUsize, Ordering},
//!     time::Duration,
//! };
//!
//! let sched = Scheduler::<AtomicUsize>::new();
//! let id = sched
//!     .add(Duration::ZERO, |hits: &AtomicUsize| {
//!         hits.fetch_add(1, Ordering::Relaxed);
//!         0 // don't reschedule
//!     }, AtomicUsize::new(0))
//!     .expect("task should be scheduled");
//!
//! let hits = sched.find_data(id).expect("task is still pending");
//! assert_eq!(sched.run_queue(), 1);
//! assert_eq!(hits.load(Ordering::Relaxed), 1);
//! assert!(sched.find_data(id).is_none(), "one-shot tasks are released");
//! ```

#[macro_use]
pub(crate) mod util;
pub(crate) mod loom;

mod builder;
pub mod clock;
mod error;
pub mod report;
mod sched;
mod task;

pub use self::{
    builder::Builder,
    clock::{Clock, Instant, ManualClock},
    error::Error,
    report::{Dump, Report, Stats},
    sched::Scheduler,
    task::{Callback, TaskId},
};
