use crate::{
    clock::Instant,
    loom::sync::{Arc, Condvar},
};
use shimeji_heap::Slot;
use std::{fmt, num::NonZeroU64, time::Duration};

mod pool;
pub(crate) use self::pool::Pool;

/// A task's callback.
///
/// The callback receives a reference to the data the task was added with. A
/// return value of `0` releases the task; anything else reschedules it. See
/// the [crate-level documentation](crate#callbacks) for details.
///
/// Callbacks are plain function pointers, so any closure that does not
/// capture its environment can be used as one. State belongs in the task's
/// data.
pub type Callback<D> = fn(&D) -> i32;

/// Identifies a task within the [`Scheduler`](crate::Scheduler) that created
/// it.
///
/// Ids are assigned from a counter that starts at 1 and only goes up, so an id
/// is never handed out twice by the same scheduler.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct TaskId(NonZeroU64);

/// A pending or executing task.
pub(crate) struct Task<D> {
    pub(crate) id: TaskId,
    pub(crate) deadline: Instant,
    /// The delay the task was added with, reused when a fixed-interval task
    /// is rescheduled.
    pub(crate) interval: Duration,
    /// Whether the callback's return value is the next interval.
    pub(crate) variable: bool,
    /// `None` only while the record is parked in the [`Pool`].
    pub(crate) job: Option<Job<D>>,
    /// The task's position in the heap; `Some` only while it is pending.
    pub(crate) slot: Option<Slot>,
    /// Signalled when the task's callback returns, to wake a `delete` that is
    /// waiting on it.
    pub(crate) done: Arc<Condvar>,
}

pub(crate) struct Job<D> {
    pub(crate) callback: Callback<D>,
    pub(crate) data: std::sync::Arc<D>,
}

/// The heap key for a pending task.
///
/// Ordered by deadline; ties are broken by id only so that the derive is
/// total, not as an ordering guarantee.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub(crate) struct Pending {
    pub(crate) deadline: Instant,
    pub(crate) id: TaskId,
}

/// Returns a callback's address, for identity comparisons and dumps.
#[inline]
pub(crate) fn callback_addr<D>(callback: Callback<D>) -> usize {
    callback as usize
}

/// Formats an address as hex.
#[derive(Copy, Clone, Eq, PartialEq)]
pub(crate) struct Addr(pub(crate) usize);

// === impl TaskId ===

impl TaskId {
    pub(crate) const FIRST: Self = Self(NonZeroU64::MIN);

    /// Returns the id as a `u64`.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0.get()
    }

    pub(crate) fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

// === impl Addr ===

impl fmt::Debug for Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl fmt::Display for Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// === impl Job ===

impl<D> Clone for Job<D> {
    fn clone(&self) -> Self {
        Self {
            callback: self.callback,
            data: self.data.clone(),
        }
    }
}

// === impl Task ===

impl<D> Task<D> {
    pub(crate) fn pending(&self) -> Pending {
        Pending {
            deadline: self.deadline,
            id: self.id,
        }
    }

    pub(crate) fn callback(&self) -> Option<Callback<D>> {
        self.job.as_ref().map(|job| job.callback)
    }
}

impl<D> fmt::Debug for Task<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Self {
            id,
            deadline,
            interval,
            variable,
            job,
            slot,
            done: _,
        } = self;
        f.debug_struct("Task")
            .field("id", id)
            .field("deadline", deadline)
            .field("interval", interval)
            .field("variable", variable)
            .field(
                "callback",
                &job.as_ref().map(|job| Addr(callback_addr(job.callback))),
            )
            .field("slot", slot)
            .finish()
    }
}
