use super::{Running, Shared};
use crate::{
    loom::thread,
    task::{callback_addr, Addr, TaskId},
};
use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    sync::PoisonError,
    time::Duration,
};

/// Clears the runner when a pass ends, even if it unwinds.
struct PassGuard<'a, D> {
    shared: &'a Shared<D>,
}

impl<D> Shared<D> {
    pub(super) fn run_queue(&self) -> usize {
        let me = thread::current().id();
        let Some(pass) = self.begin_pass(me) else {
            return 0;
        };
        let guard = PassGuard { shared: self };
        let fired = self.fire_due(me);
        drop(guard);

        if fired > 0 {
            tracing::debug!(sched = self.name, pass, fired, "ran queue");
        }
        fired
    }

    /// Claims the run queue for this thread, waiting for any other thread's
    /// pass to finish.
    fn begin_pass(&self, me: thread::ThreadId) -> Option<u64> {
        let mut state = self.lock();
        if state.runner == Some(me) {
            tracing::warn!(
                sched = self.name,
                "run_queue called from inside a task callback; ignoring"
            );
            return None;
        }
        while state.runner.is_some() {
            state = self.idle.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
        state.runner = Some(me);
        state.pass = state.pass.wrapping_add(1);
        Some(state.pass)
    }

    fn fire_due(&self, me: thread::ThreadId) -> usize {
        let mut fired = 0;
        let mut state = self.lock();
        loop {
            let horizon = self.now() + self.batch_window;
            let Some(&next) = state.heap.peek() else {
                break;
            };
            if test_dbg!(next.deadline) > horizon {
                break;
            }

            state.heap.pop();
            let Some(mut task) = state.index.remove(&next.id) else {
                tracing::warn!(
                    sched = self.name,
                    task.id = %next.id,
                    "heap entry has no task in the id index; skipping"
                );
                continue;
            };
            task.slot = None;
            let Some(job) = task.job.clone() else {
                tracing::warn!(sched = self.name, task.id = %task.id, "pending task has no callback");
                state.pool.release(task);
                continue;
            };

            state.running = Some(Running {
                id: task.id,
                thread: me,
                deadline: task.deadline,
                job: job.clone(),
                deleted: false,
                done: task.done.clone(),
            });
            drop(state);

            tracing::trace!(
                sched = self.name,
                task.id = %task.id,
                callback = %Addr(callback_addr(job.callback)),
                "firing task"
            );
            let ret = panic::catch_unwind(AssertUnwindSafe(|| (job.callback)(&job.data)));
            drop(job);

            state = self.lock();
            fired += 1;
            state.fired += 1;
            let deleted = match state.running.take() {
                Some(running) => {
                    running.done.notify_all();
                    running.deleted
                }
                None => false,
            };

            let ret = match ret {
                Ok(ret) => ret,
                Err(payload) => {
                    tracing::error!(
                        sched = self.name,
                        task.id = %task.id,
                        panic = panic_message(&*payload),
                        "task callback panicked; releasing task"
                    );
                    state.pool.release(task);
                    // drop the payload unlocked, it may have a destructor
                    drop(state);
                    drop(payload);
                    state = self.lock();
                    continue;
                }
            };
            if deleted {
                tracing::debug!(
                    sched = self.name,
                    task.id = %task.id,
                    "task was deleted while executing; releasing it"
                );
                state.pool.release(task);
                continue;
            }
            if ret == 0 {
                test_trace!(task.id = %task.id, "task finished");
                state.pool.release(task);
                continue;
            }

            let interval = if task.variable {
                self.returned_interval(task.id, ret)
            } else {
                task.interval
            };
            // measure from the previous deadline so periodic tasks don't
            // drift, but never schedule into the past
            task.deadline = (task.deadline + interval).max(self.now());
            if let Err(error) = state.defer(task) {
                tracing::warn!(sched = self.name, %error, "failed to reschedule task");
            }
        }
        fired
    }

    fn returned_interval(&self, id: TaskId, ret: i32) -> Duration {
        match u64::try_from(ret) {
            Ok(ms) => Duration::from_millis(ms),
            Err(_) => {
                tracing::warn!(
                    sched = self.name,
                    task.id = %id,
                    interval = ret,
                    "callback returned a negative interval; rescheduling immediately"
                );
                Duration::ZERO
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(msg) = panic.downcast_ref::<&'static str>() {
        msg
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "<non-string panic payload>"
    }
}

impl<D> Drop for PassGuard<'_, D> {
    fn drop(&mut self) {
        let mut state = self.shared.lock();
        state.requeue_deferred();
        state.runner = None;
        // only set if the pass unwound while a callback was running
        if let Some(running) = state.running.take() {
            tracing::warn!(
                sched = self.shared.name,
                task.id = %running.id,
                "pass unwound while a task was executing; dropping task"
            );
            running.done.notify_all();
        }
        drop(state);
        self.shared.idle.notify_all();
        // rescheduled tasks may have moved the earliest deadline
        self.shared.wake.notify_one();
    }
}
