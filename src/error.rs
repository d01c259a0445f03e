use crate::task::TaskId;

/// Errors returned by [`Scheduler`](crate::Scheduler) operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// No pending or executing task has this id.
    ///
    /// This is an expected outcome when a one-shot task has already fired, or
    /// when two threads race to cancel the same task.
    #[error("no task with id {0} is scheduled")]
    NotFound(TaskId),

    /// The task is currently executing, and the caller asked not to wait for
    /// it.
    ///
    /// Returned by [`Scheduler::delete_nonrunning`](crate::Scheduler::delete_nonrunning).
    #[error("task {0} is currently executing")]
    Running(TaskId),

    /// A freshly assigned task id was already present in the id index.
    ///
    /// Ids are assigned from a monotonically increasing counter, so this
    /// indicates a bookkeeping bug. The task was not scheduled.
    #[error("task id {0} is already present in the id index")]
    DuplicateId(TaskId),

    /// A driver thread is already running for this scheduler.
    #[error("a driver thread is already running for this scheduler")]
    AlreadyStarted,

    /// The operating system refused to spawn the driver thread.
    #[error("failed to spawn driver thread")]
    SpawnThread(#[source] std::io::Error),
}
