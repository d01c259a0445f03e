use crate::{
    builder::{Builder, Settings},
    clock::{Clock, Instant},
    loom::{
        sync::{Arc, Condvar, Mutex, MutexGuard},
        thread,
    },
    report::{Dump, DumpEntry, Report, Stats},
    task::{callback_addr, Callback, Job, Pending, Pool, Task, TaskId},
    Error,
};
use shimeji_heap::Heap;
use std::{cell::Cell, collections::HashMap, fmt, sync::PoisonError, time::Duration};

#[cfg(not(loom))]
mod driver;
mod run;

/// A thread-safe deadline scheduler.
///
/// A `Scheduler` holds tasks, each made of a deadline, a [`Callback`], and a
/// piece of data of type `D`. When the scheduler is driven (see the
/// [crate-level documentation](crate#driving-a-scheduler)), every task whose
/// deadline has passed is fired by calling its callback with a reference to
/// its data.
///
/// All methods take `&self`; a `Scheduler` may be shared between threads
/// (for example, in an [`Arc`](std::sync::Arc)) as long as `D` is `Send` and
/// `Sync`.
///
/// Dropping a `Scheduler` stops and joins its driver thread, if one was
/// started, and then drops every pending task's data.
pub struct Scheduler<D> {
    shared: Arc<Shared<D>>,
    #[cfg(not(loom))]
    driver: std::sync::Mutex<Option<std::thread::JoinHandle<()>>>,
}

/// The part of a scheduler shared with its driver thread.
pub(crate) struct Shared<D> {
    name: &'static str,
    clock: Clock,
    batch_window: Duration,
    state: Mutex<State<D>>,
    /// Signalled whenever the earliest deadline may have changed, or the
    /// driver thread is asked to stop.
    wake: Condvar,
    /// Signalled when a run-queue pass finishes.
    idle: Condvar,
}

struct State<D> {
    next_id: TaskId,
    heap: Heap<Pending>,
    index: HashMap<TaskId, Box<Task<D>>>,
    pool: Pool<D>,
    /// Tasks rescheduled during the current run-queue pass. They are in the
    /// index, but are only pushed back onto the heap once the pass ends, so
    /// that each task fires at most once per pass.
    deferred: Vec<TaskId>,
    /// The task whose callback is executing right now, if any.
    running: Option<Running<D>>,
    /// The thread currently running a pass of the run queue.
    runner: Option<thread::ThreadId>,
    pass: u64,
    added: u64,
    fired: u64,
    high_water: usize,
    stop: bool,
}

/// What other threads may observe about the executing task.
///
/// The task record itself is owned by the thread running it; this keeps just
/// enough to answer lookups and to coordinate with `delete`.
struct Running<D> {
    id: TaskId,
    thread: thread::ThreadId,
    deadline: Instant,
    job: Job<D>,
    /// Set by `delete`; the task is released when its callback returns, no
    /// matter what the callback returned.
    deleted: bool,
    done: Arc<Condvar>,
}

std::thread_local! {
    /// The last id this thread deleted or failed to delete, so that deleting
    /// it again is logged quietly.
    static LAST_DELETED: Cell<Option<TaskId>> = const { Cell::new(None) };
}

// === impl Scheduler ===

impl<D> Scheduler<D> {
    /// Returns a new `Scheduler` with the default settings and no driver
    /// thread.
    ///
    /// Use [`Scheduler::builder`] to configure the scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self::with_settings(Settings::default())
    }

    /// Returns a [`Builder`] for configuring a new `Scheduler`.
    #[must_use]
    pub fn builder() -> Builder<D> {
        Builder::new()
    }

    pub(crate) fn with_settings(settings: Settings) -> Self {
        let Settings {
            name,
            cache_capacity,
            batch_window,
            clock,
        } = settings;
        tracing::debug!(
            sched = name,
            cache_capacity,
            ?batch_window,
            clock = clock.name(),
            "created scheduler"
        );
        Self {
            shared: Arc::new(Shared {
                name,
                clock,
                batch_window,
                state: Mutex::new(State::new(cache_capacity)),
                wake: Condvar::new(),
                idle: Condvar::new(),
            }),
            #[cfg(not(loom))]
            driver: std::sync::Mutex::new(None),
        }
    }

    /// Returns this scheduler's name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.shared.name
    }

    /// Returns the [`Clock`] this scheduler reads the current time from.
    #[must_use]
    pub fn clock(&self) -> &Clock {
        &self.shared.clock
    }

    /// Schedules `callback` to be called with `data` once `delay` has
    /// elapsed.
    ///
    /// If the callback returns a non-zero value, the task is rescheduled to
    /// fire again `delay` after its previous deadline. A `delay` of zero
    /// means "as soon as possible".
    ///
    /// The returned [`TaskId`] may be used immediately, from any thread, to
    /// [`delete`](Self::delete) or inspect the task.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateId`] if the scheduler's id bookkeeping is
    /// inconsistent. This indicates a bug in the scheduler; the task is not
    /// scheduled.
    pub fn add(
        &self,
        delay: Duration,
        callback: Callback<D>,
        data: impl Into<std::sync::Arc<D>>,
    ) -> Result<TaskId, Error> {
        self.add_variable(delay, callback, data, false)
    }

    /// Schedules `callback` to be called with `data` once `delay` has
    /// elapsed, optionally letting the callback choose its next interval.
    ///
    /// If `variable` is `true`, a non-zero value returned by the callback is
    /// the number of milliseconds until the task fires again, measured from
    /// its previous deadline. A negative return value reschedules the task
    /// immediately. If `variable` is `false`, this behaves exactly like
    /// [`add`](Self::add).
    ///
    /// # Errors
    ///
    /// See [`add`](Self::add).
    pub fn add_variable(
        &self,
        delay: Duration,
        callback: Callback<D>,
        data: impl Into<std::sync::Arc<D>>,
        variable: bool,
    ) -> Result<TaskId, Error> {
        let job = Job {
            callback,
            data: data.into(),
        };
        let id = {
            let mut state = self.shared.lock();
            let id = state.next_id;
            state.next_id = id.next();
            state.added += 1;

            let mut task = state.pool.acquire(id, job);
            task.deadline = self.shared.now() + delay;
            task.interval = delay;
            task.variable = variable;
            state.schedule(task)?
        };

        tracing::debug!(
            sched = self.name(),
            task.id = %id,
            ?delay,
            variable,
            "added task"
        );
        self.shared.wake.notify_one();
        Ok(id)
    }

    /// Deletes the task in `slot`, if there is one, and replaces it with a
    /// new task.
    ///
    /// This is the usual way to reschedule work that is tracked by a single
    /// id: whether or not the old task still existed, `slot` holds the new
    /// task's id when this returns `Ok`. If scheduling the new task fails,
    /// `slot` is left empty.
    ///
    /// # Errors
    ///
    /// See [`add`](Self::add). Failing to delete the old task is not an
    /// error.
    pub fn replace(
        &self,
        slot: &mut Option<TaskId>,
        delay: Duration,
        callback: Callback<D>,
        data: impl Into<std::sync::Arc<D>>,
    ) -> Result<TaskId, Error> {
        self.replace_variable(slot, delay, callback, data, false)
    }

    /// Like [`replace`](Self::replace), but adds the new task as if by
    /// [`add_variable`](Self::add_variable).
    ///
    /// # Errors
    ///
    /// See [`add`](Self::add).
    pub fn replace_variable(
        &self,
        slot: &mut Option<TaskId>,
        delay: Duration,
        callback: Callback<D>,
        data: impl Into<std::sync::Arc<D>>,
        variable: bool,
    ) -> Result<TaskId, Error> {
        // the old task being gone already is fine
        let _ = self.cancel(slot);
        let id = self.add_variable(delay, callback, data, variable)?;
        *slot = Some(id);
        Ok(id)
    }

    /// Deletes the task with the given id.
    ///
    /// If the task is pending, it is removed and its data dropped. If its
    /// callback is currently executing on another thread, this blocks until
    /// the callback returns, and the task is then released regardless of
    /// what the callback returned. Either way, once `delete` returns `Ok`,
    /// the callback is not running and will not run again.
    ///
    /// A callback may delete its own task. In that case `delete` cannot wait
    /// for the callback to finish, so it returns `Ok` immediately and the
    /// task is released once the callback returns.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no pending or executing task has this
    /// id. This is expected when a one-shot task has already fired.
    pub fn delete(&self, id: TaskId) -> Result<(), Error> {
        self.shared.delete(id, true)
    }

    /// Deletes the task with the given id, unless its callback is currently
    /// executing.
    ///
    /// # Errors
    ///
    /// - [`Error::Running`] if the task's callback is executing. The task is
    ///   left alone.
    /// - [`Error::NotFound`] if no pending or executing task has this id.
    pub fn delete_nonrunning(&self, id: TaskId) -> Result<(), Error> {
        self.shared.delete(id, false)
    }

    /// Takes the id out of `slot` and deletes it.
    ///
    /// An empty `slot` means there is nothing to cancel, and returns `Ok`.
    ///
    /// # Errors
    ///
    /// See [`delete`](Self::delete). `slot` is empty afterwards either way.
    pub fn cancel(&self, slot: &mut Option<TaskId>) -> Result<(), Error> {
        match slot.take() {
            Some(id) => self.delete(id),
            None => Ok(()),
        }
    }

    /// Removes every pending task whose callback is `callback`, passing each
    /// removed task's data to `cleanup`.
    ///
    /// A task that is executing when this is called is not affected.
    /// `cleanup` is called after the scheduler's lock is released, so it may
    /// use the scheduler. Returns the number of tasks removed.
    pub fn clean_by_callback(
        &self,
        callback: Callback<D>,
        mut cleanup: impl FnMut(std::sync::Arc<D>),
    ) -> usize {
        let target = callback_addr(callback);
        let removed = {
            let mut state = self.shared.lock();
            let ids = state
                .index
                .values()
                .filter(|task| task.callback().map(callback_addr) == Some(target))
                .map(|task| task.id)
                .collect::<Vec<_>>();
            let mut removed = Vec::with_capacity(ids.len());
            for id in ids {
                if let Some(mut task) = state.unschedule(id) {
                    if let Some(job) = task.job.take() {
                        removed.push(job.data);
                    }
                    state.pool.release(task);
                }
            }
            removed
        };

        let count = removed.len();
        if count > 0 {
            tracing::debug!(
                sched = self.name(),
                removed = count,
                "cleaned tasks by callback"
            );
            self.shared.wake.notify_one();
        }
        for data in removed {
            cleanup(data);
        }
        count
    }

    /// Returns the data of the task with the given id, if it is pending or
    /// executing.
    #[must_use]
    pub fn find_data(&self, id: TaskId) -> Option<std::sync::Arc<D>> {
        let state = self.shared.lock();
        if let Some(task) = state.index.get(&id) {
            return task.job.as_ref().map(|job| job.data.clone());
        }
        state
            .running
            .as_ref()
            .filter(|running| running.id == id)
            .map(|running| running.job.data.clone())
    }

    /// Returns how long until the task with the given id fires, or `None` if
    /// there is no such task.
    ///
    /// Overdue and executing tasks report [`Duration::ZERO`].
    #[must_use]
    pub fn when(&self, id: TaskId) -> Option<Duration> {
        let state = self.shared.lock();
        if let Some(task) = state.index.get(&id) {
            return Some(task.deadline.saturating_duration_since(self.shared.now()));
        }
        state
            .running
            .as_ref()
            .filter(|running| running.id == id)
            .map(|_| Duration::ZERO)
    }

    /// Returns how long until the earliest pending deadline, or `None` if no
    /// tasks are pending.
    ///
    /// If the earliest task is already due, this returns [`Duration::ZERO`].
    /// This never blocks other than to acquire the scheduler's lock.
    #[must_use]
    pub fn wait(&self) -> Option<Duration> {
        self.shared.lock().next_wait(self.shared.now())
    }

    /// Fires every task whose deadline has passed, returning the number of
    /// callbacks invoked.
    ///
    /// Tasks due within the scheduler's
    /// [batch window](Builder::batch_window) are fired in the same pass.
    /// Each task fires at most once per pass, so a task that reschedules
    /// itself with a zero interval fires again on the next call.
    ///
    /// Only one pass runs at a time. If another thread is running the queue,
    /// this waits for it to finish first. Calling `run_queue` from inside a
    /// callback does nothing and returns `0`.
    pub fn run_queue(&self) -> usize {
        self.shared.run_queue()
    }

    /// Returns a snapshot of this scheduler's counters.
    #[must_use]
    pub fn stats(&self) -> Stats {
        self.shared.lock().stats()
    }

    /// Returns a listing of every pending task, plus the executing one.
    ///
    /// The returned [`Dump`] is rendered with its `Display` implementation.
    #[must_use]
    pub fn dump(&self) -> Dump {
        let state = self.shared.lock();
        let now = self.shared.now();
        let mut entries = state
            .index
            .values()
            .map(|task| DumpEntry {
                id: task.id,
                callback: task.callback().map_or(0, callback_addr),
                remaining: task.deadline.saturating_duration_since(now),
            })
            .collect::<Vec<_>>();
        entries.sort_by_key(|entry| (entry.remaining, entry.id));
        let executing = state.running.as_ref().map(|running| DumpEntry {
            id: running.id,
            callback: callback_addr(running.job.callback),
            remaining: running.deadline.saturating_duration_since(now),
        });
        Dump {
            name: self.name(),
            stats: state.stats(),
            executing,
            entries,
        }
    }

    /// Returns the number of pending tasks for each of `categories`.
    ///
    /// Each category is a name and a callback; a task belongs to the first
    /// category whose callback is the task's callback. Tasks in no category
    /// are counted as `<unknown>`.
    #[must_use]
    pub fn report(&self, categories: &[(&str, Callback<D>)]) -> Report {
        let state = self.shared.lock();
        let mut counts = categories
            .iter()
            .map(|&(name, _)| (name.to_owned(), 0))
            .collect::<Vec<(String, usize)>>();
        let mut unknown = 0;
        for task in state.index.values() {
            let addr = task.callback().map(callback_addr);
            match categories
                .iter()
                .position(|&(_, callback)| Some(callback_addr(callback)) == addr)
            {
                Some(category) => counts[category].1 += 1,
                None => unknown += 1,
            }
        }
        Report {
            stats: state.stats(),
            categories: counts,
            unknown,
        }
    }
}

impl<D> Default for Scheduler<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D> Drop for Scheduler<D> {
    fn drop(&mut self) {
        #[cfg(not(loom))]
        self.stop_thread();

        let mut state = self.shared.lock();
        let pending = state.outstanding();
        state.heap.clear();
        state.deferred.clear();
        state.pool.clear();
        let tasks = std::mem::take(&mut state.index);
        drop(state);

        // the data may have arbitrary destructors, so drop it unlocked
        drop(tasks);
        tracing::debug!(sched = self.name(), pending, "destroyed scheduler");
    }
}

impl<D> fmt::Debug for Scheduler<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Scheduler");
        s.field("name", &self.shared.name)
            .field("clock", &self.shared.clock)
            .field("batch_window", &self.shared.batch_window);
        match self.shared.state.try_lock() {
            Ok(state) => s.field("stats", &state.stats()),
            Err(_) => s.field("stats", &format_args!("<locked>")),
        };
        s.finish()
    }
}

// === impl Shared ===

impl<D> Shared<D> {
    /// Callbacks never run with the lock held, so a poisoned lock still
    /// guards consistent state.
    fn lock(&self) -> MutexGuard<'_, State<D>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn now(&self) -> Instant {
        self.clock.now()
    }

    fn delete(&self, id: TaskId, wait: bool) -> Result<(), Error> {
        let mut state = self.lock();
        if let Some(task) = state.unschedule(id) {
            state.pool.release(task);
            drop(state);
            remember_deleted(id);
            tracing::debug!(sched = self.name, task.id = %id, "deleted task");
            self.wake.notify_one();
            return Ok(());
        }

        let me = thread::current().id();
        let done = match state.running.as_mut() {
            Some(running) if running.id == id => {
                if running.thread == me {
                    running.deleted = true;
                    tracing::error!(
                        sched = self.name,
                        task.id = %id,
                        "task deleted itself from inside its own callback; \
                        it will be released when the callback returns"
                    );
                    return Ok(());
                }
                if !wait {
                    tracing::debug!(
                        sched = self.name,
                        task.id = %id,
                        "not deleting task while its callback is executing"
                    );
                    return Err(Error::Running(id));
                }
                running.deleted = true;
                running.done.clone()
            }
            _ => return Err(self.not_found(id)),
        };

        tracing::debug!(
            sched = self.name,
            task.id = %id,
            "task is executing; waiting for its callback to return"
        );
        while state.running.as_ref().is_some_and(|running| running.id == id) {
            state = done.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
        drop(state);

        remember_deleted(id);
        tracing::debug!(sched = self.name, task.id = %id, "deleted executing task");
        Ok(())
    }

    fn not_found(&self, id: TaskId) -> Error {
        if recently_deleted(id) {
            tracing::trace!(sched = self.name, task.id = %id, "task was already deleted");
        } else {
            tracing::debug!(
                sched = self.name,
                task.id = %id,
                "tried to delete a task that does not exist"
            );
            remember_deleted(id);
        }
        Error::NotFound(id)
    }
}

fn recently_deleted(id: TaskId) -> bool {
    LAST_DELETED.with(|last| last.get() == Some(id))
}

fn remember_deleted(id: TaskId) {
    LAST_DELETED.with(|last| last.set(Some(id)));
}

// === impl State ===

impl<D> State<D> {
    fn new(cache_capacity: usize) -> Self {
        Self {
            next_id: TaskId::FIRST,
            heap: Heap::new_min(),
            index: HashMap::new(),
            pool: Pool::new(cache_capacity),
            deferred: Vec::new(),
            running: None,
            runner: None,
            pass: 0,
            added: 0,
            fired: 0,
            high_water: 0,
            stop: false,
        }
    }

    /// Makes a task pending, inserting it into both the heap and the index.
    fn schedule(&mut self, mut task: Box<Task<D>>) -> Result<TaskId, Error> {
        let id = task.id;
        if self.index.contains_key(&id) {
            tracing::warn!(task.id = %id, "task id is already in the id index; dropping task");
            self.pool.release(task);
            return Err(Error::DuplicateId(id));
        }

        task.slot = Some(self.heap.push(task.pending()));
        test_trace!(task.id = %id, deadline = %task.deadline, "scheduled task");
        self.index.insert(id, task);
        self.high_water = self.high_water.max(self.outstanding());
        Ok(id)
    }

    /// Makes a task that fired in the current pass pending again, without
    /// letting it fire again until the next pass.
    fn defer(&mut self, mut task: Box<Task<D>>) -> Result<TaskId, Error> {
        let id = task.id;
        if self.index.contains_key(&id) {
            tracing::warn!(task.id = %id, "task id is already in the id index; dropping task");
            self.pool.release(task);
            return Err(Error::DuplicateId(id));
        }

        task.slot = None;
        test_trace!(task.id = %id, deadline = %task.deadline, "deferred task");
        self.index.insert(id, task);
        self.deferred.push(id);
        self.high_water = self.high_water.max(self.outstanding());
        Ok(id)
    }

    /// Pushes the tasks deferred during a pass back onto the heap.
    fn requeue_deferred(&mut self) {
        for id in std::mem::take(&mut self.deferred) {
            // deleted during the pass
            let Some(task) = self.index.get_mut(&id) else {
                continue;
            };
            task.slot = Some(self.heap.push(task.pending()));
        }
    }

    /// Removes a pending task from the index, and from the heap or the
    /// deferred list.
    fn unschedule(&mut self, id: TaskId) -> Option<Box<Task<D>>> {
        let mut task = self.index.remove(&id)?;
        match task.slot.take() {
            Some(slot) => match self.heap.remove(slot) {
                Some(pending) => debug_assert_eq!(pending.id, id),
                None => tracing::warn!(
                    task.id = %id,
                    "task was in the id index, but its heap slot is stale"
                ),
            },
            None => match self.deferred.iter().position(|&deferred| deferred == id) {
                Some(i) => {
                    self.deferred.swap_remove(i);
                }
                None => tracing::warn!(
                    task.id = %id,
                    "task was in the id index, but not in the heap"
                ),
            },
        }
        Some(task)
    }

    fn outstanding(&self) -> usize {
        self.heap.len() + self.deferred.len()
    }

    fn next_wait(&self, now: Instant) -> Option<Duration> {
        self.heap
            .peek()
            .map(|next| next.deadline.saturating_duration_since(now))
    }

    fn stats(&self) -> Stats {
        Stats {
            added: self.added,
            fired: self.fired,
            outstanding: self.outstanding(),
            high_water: self.high_water,
            cached: self.pool.len(),
        }
    }
}
