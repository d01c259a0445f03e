//! The optional background thread that drives a scheduler.
use super::{Scheduler, Shared};
use crate::Error;
use std::sync::PoisonError;

impl<D: Send + Sync + 'static> Scheduler<D> {
    /// Starts a background thread that drives this scheduler.
    ///
    /// The driver thread sleeps until the earliest pending deadline, then
    /// calls [`run_queue`](Self::run_queue). Adding or deleting a task wakes
    /// it early, since the earliest deadline may have changed. The thread is
    /// named after the scheduler, and runs until the scheduler is dropped.
    ///
    /// Callers may still call [`run_queue`](Self::run_queue) themselves while
    /// the driver thread is running; passes never overlap.
    ///
    /// # Errors
    ///
    /// - [`Error::AlreadyStarted`] if this scheduler already has a driver
    ///   thread.
    /// - [`Error::SpawnThread`] if the thread could not be spawned.
    pub fn start_thread(&self) -> Result<(), Error> {
        let mut driver = self.driver.lock().unwrap_or_else(PoisonError::into_inner);
        if driver.is_some() {
            tracing::warn!(sched = self.name(), "driver thread is already running");
            return Err(Error::AlreadyStarted);
        }

        self.shared.lock().stop = false;
        let shared = self.shared.clone();
        let handle = std::thread::Builder::new()
            .name(format!("{}-driver", self.name()))
            .spawn(move || shared.drive())
            .map_err(Error::SpawnThread)?;
        tracing::debug!(sched = self.name(), "started driver thread");
        *driver = Some(handle);
        Ok(())
    }
}

impl<D> Scheduler<D> {
    /// Stops the driver thread, if there is one, and waits for it to exit.
    pub(super) fn stop_thread(&self) {
        let handle = self
            .driver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(handle) = handle else {
            return;
        };

        self.shared.lock().stop = true;
        self.shared.wake.notify_all();
        if handle.thread().id() == std::thread::current().id() {
            // the last reference was dropped by a callback on the driver
            // thread, which will exit once that callback returns
            tracing::warn!(
                sched = self.name(),
                "scheduler dropped on its own driver thread; not joining it"
            );
            return;
        }
        if handle.join().is_err() {
            tracing::warn!(sched = self.name(), "driver thread panicked");
        }
    }
}

impl<D> Shared<D> {
    fn drive(&self) {
        let _span = tracing::debug_span!("driver", sched = self.name).entered();
        tracing::debug!("driver thread running");

        let mut state = self.lock();
        while !state.stop {
            state = match state.next_wait(self.now()) {
                None => {
                    test_trace!("no pending tasks; sleeping until woken");
                    self.wake.wait(state).unwrap_or_else(PoisonError::into_inner)
                }
                Some(timeout) if !timeout.is_zero() => {
                    test_trace!(?timeout, "sleeping until the next deadline");
                    self.wake
                        .wait_timeout(state, timeout)
                        .map(|(state, _)| state)
                        .unwrap_or_else(|poisoned| poisoned.into_inner().0)
                }
                Some(_) => {
                    drop(state);
                    self.run_queue();
                    self.lock()
                }
            };
        }

        tracing::debug!("driver thread stopping");
    }
}
