use crate::{clock::Clock, Error, Scheduler};
use std::{fmt, marker::PhantomData, time::Duration};

/// Configures a new [`Scheduler`] prior to creating it.
///
/// A `Builder` is returned by [`Scheduler::builder`].
///
/// # Examples
///
/// ```rust
/// use shimeji::Scheduler;
/// use std::time::Duration;
///
/// let sched = Scheduler::<String>::builder()
///     .name("registrations")
///     .cache_capacity(32)
///     .batch_window(Duration::from_micros(500))
///     .build()
///     .expect("scheduler should be built");
/// # drop(sched);
/// ```
pub struct Builder<D> {
    settings: Settings,
    start_thread: bool,
    _data: PhantomData<fn() -> D>,
}

/// Settings shared by a scheduler and its driver thread.
#[derive(Clone, Debug)]
pub(crate) struct Settings {
    pub(crate) name: &'static str,
    pub(crate) cache_capacity: usize,
    pub(crate) batch_window: Duration,
    pub(crate) clock: Clock,
}

impl<D> Builder<D> {
    /// Returns a new `Builder` with the default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            settings: Settings::default(),
            start_thread: false,
            _data: PhantomData,
        }
    }

    /// Adds a name to the scheduler.
    ///
    /// The name is recorded as the `sched` field on the scheduler's `tracing`
    /// events, and is used to name the driver thread.
    ///
    /// By default, schedulers are named `"sched"`.
    #[must_use]
    pub fn name(self, name: &'static str) -> Self {
        Self {
            settings: Settings {
                name,
                ..self.settings
            },
            ..self
        }
    }

    /// Sets how many retired task records the scheduler keeps for reuse.
    ///
    /// Released tasks beyond this bound are freed. A capacity of zero
    /// disables the cache.
    ///
    /// By default, up to 128 records are cached.
    #[must_use]
    pub fn cache_capacity(self, cache_capacity: usize) -> Self {
        Self {
            settings: Settings {
                cache_capacity,
                ..self.settings
            },
            ..self
        }
    }

    /// Sets how far ahead of the current time a task's deadline may be for it
    /// to fire in the current [`run_queue`](Scheduler::run_queue) pass.
    ///
    /// A small window lets tasks whose deadlines are nearly simultaneous fire
    /// in one pass, rather than each requiring another trip through the run
    /// loop. Tasks within the window may fire slightly before their deadline,
    /// in no particular relative order.
    ///
    /// By default, the window is one millisecond.
    #[must_use]
    pub fn batch_window(self, batch_window: Duration) -> Self {
        Self {
            settings: Settings {
                batch_window,
                ..self.settings
            },
            ..self
        }
    }

    /// Sets the [`Clock`] used to determine the current time.
    ///
    /// By default, schedulers use [`Clock::system`].
    #[must_use]
    pub fn clock(self, clock: Clock) -> Self {
        Self {
            settings: Settings {
                clock,
                ..self.settings
            },
            ..self
        }
    }

    /// Sets whether [`Builder::build`] starts a driver thread for the new
    /// scheduler.
    ///
    /// See [`Scheduler::start_thread`] for details. By default, no driver
    /// thread is started, and the scheduler must be driven by calling
    /// [`Scheduler::run_queue`].
    #[must_use]
    pub fn start_thread(self, start_thread: bool) -> Self {
        Self {
            start_thread,
            ..self
        }
    }
}

impl<D: Send + Sync + 'static> Builder<D> {
    /// Returns a new [`Scheduler`] with this builder's settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SpawnThread`] if a driver thread was requested and
    /// could not be spawned.
    pub fn build(self) -> Result<Scheduler<D>, Error> {
        let sched = Scheduler::with_settings(self.settings);
        #[cfg(not(loom))]
        if self.start_thread {
            sched.start_thread()?;
        }
        Ok(sched)
    }
}

impl<D> Default for Builder<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D> Clone for Builder<D> {
    fn clone(&self) -> Self {
        Self {
            settings: self.settings.clone(),
            start_thread: self.start_thread,
            _data: PhantomData,
        }
    }
}

impl<D> fmt::Debug for Builder<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Builder")
            .field("settings", &self.settings)
            .field("start_thread", &self.start_thread)
            .finish()
    }
}

// === impl Settings ===

impl Settings {
    pub(crate) const DEFAULT_CACHE_CAPACITY: usize = 128;

    pub(crate) const DEFAULT_BATCH_WINDOW: Duration = Duration::from_millis(1);
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            name: "sched",
            cache_capacity: Self::DEFAULT_CACHE_CAPACITY,
            batch_window: Self::DEFAULT_BATCH_WINDOW,
            clock: Clock::system(),
        }
    }
}
