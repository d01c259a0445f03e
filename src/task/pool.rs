use super::{Job, Task, TaskId};
use crate::{
    clock::Instant,
    loom::sync::{Arc, Condvar},
};
use std::time::Duration;

/// A bounded cache of retired task records.
///
/// Tasks are added and released constantly on a busy scheduler, so released
/// records are parked here and handed out again rather than freed. Once the
/// cache holds `capacity` records, further releases are simply dropped.
///
/// The pool is not synchronized; it lives inside the scheduler's state and is
/// only touched with the scheduler lock held.
pub(crate) struct Pool<D> {
    free: Vec<Box<Task<D>>>,
    capacity: usize,
}

impl<D> Pool<D> {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            free: Vec::new(),
            capacity,
        }
    }

    /// Returns a record for a new task with the given id and job.
    ///
    /// The caller is responsible for setting the deadline and interval.
    pub(crate) fn acquire(&mut self, id: TaskId, job: Job<D>) -> Box<Task<D>> {
        match self.free.pop() {
            Some(mut task) => {
                test_trace!(task.id = %id, cached = self.free.len(), "reusing cached task record");
                task.id = id;
                task.job = Some(job);
                task
            }
            None => Box::new(Task {
                id,
                deadline: Instant::from_epoch(Duration::ZERO),
                interval: Duration::ZERO,
                variable: false,
                job: Some(job),
                slot: None,
                done: Arc::new(Condvar::new()),
            }),
        }
    }

    /// Returns a task record to the pool, dropping the task's data.
    pub(crate) fn release(&mut self, mut task: Box<Task<D>>) {
        task.job = None;
        task.slot = None;
        if self.free.len() < self.capacity {
            self.free.push(task);
        } else {
            test_trace!(task.id = %task.id, capacity = self.capacity, "task cache full, freeing record");
        }
    }

    /// Returns the number of cached records.
    pub(crate) fn len(&self) -> usize {
        self.free.len()
    }

    pub(crate) fn clear(&mut self) {
        self.free.clear();
    }
}
