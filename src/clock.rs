//! [`Clock`]s provide a mechanism for tracking the current time.
//!
//! A [`Scheduler`](crate::Scheduler) reads its clock whenever it needs to know
//! "now": to turn a relative delay into an absolute deadline, to decide which
//! tasks are due, and to compute how long the driver thread may sleep. By
//! default, schedulers use [`Clock::system`], a monotonic clock backed by
//! [`std::time::Instant`]. Tests that need to control the passage of time can
//! use a [`ManualClock`] instead.
use std::{
    fmt,
    ops::{Add, AddAssign},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

/// A source of monotonic timestamps.
///
/// A `Clock` wraps a `now()` function that returns the time elapsed since
/// some fixed, clock-specific epoch. The [`Instant`]s produced by a clock are
/// only comparable with other [`Instant`]s from the same clock.
///
/// # Monotonicity
///
/// Implementations of `now()` MUST be [monotonically non-decreasing]: a call
/// to `now()` must never return a value less than one returned by a previous
/// call. A clock that goes backwards will not corrupt a scheduler, but tasks
/// may fire late.
///
/// [monotonically non-decreasing]: https://en.wikipedia.org/wiki/Monotonic_function
#[derive(Clone)]
pub struct Clock {
    now: Arc<dyn Fn() -> Duration + Send + Sync>,
    name: &'static str,
}

/// A measurement of a monotonically nondecreasing [`Clock`].
/// Opaque and useful only with [`Duration`].
///
/// Internally, an `Instant` is the [`Duration`] since its clock's epoch, so it
/// keeps nanosecond precision.
#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord, Hash)]
pub struct Instant(Duration);

/// A [`Clock`] that only moves when told to.
///
/// Cloning a `ManualClock` returns a handle to the same time source, so a test
/// can keep one handle to [advance](ManualClock::advance) time while a
/// scheduler reads from the [`Clock`] returned by [`ManualClock::clock`].
///
/// # Examples
///
/// ```rust
/// use shimeji::{ManualClock, Scheduler};
/// use std::time::Duration;
///
/// let time = ManualClock::new();
/// let sched = Scheduler::<()>::builder()
///     .clock(time.clock())
///     .build()
///     .unwrap();
///
/// sched.add(Duration::from_millis(10), |_| 0, ()).unwrap();
/// assert_eq!(sched.run_queue(), 0, "task is not due yet");
///
/// time.advance(Duration::from_millis(10));
/// assert_eq!(sched.run_queue(), 1);
/// ```
#[derive(Clone, Debug, Default)]
pub struct ManualClock {
    nanos: Arc<AtomicU64>,
}

// === impl Clock ===

impl Clock {
    /// Returns a new `Clock` that reads the current time from `now`.
    ///
    /// `now` returns the time elapsed since the clock's epoch. See the
    /// [type-level documentation](Self#monotonicity) for the requirements on
    /// `now`.
    #[must_use]
    pub fn new(now: impl Fn() -> Duration + Send + Sync + 'static) -> Self {
        Self {
            now: Arc::new(now),
            name: "<unnamed mystery clock>",
        }
    }

    /// Returns a monotonic clock backed by [`std::time::Instant`], whose epoch
    /// is the moment this function was called.
    #[must_use]
    pub fn system() -> Self {
        let epoch = std::time::Instant::now();
        Self::new(move || epoch.elapsed()).named("system")
    }

    /// Add an arbitrary user-defined name to this `Clock`.
    ///
    /// This is generally used to describe the time source used by the
    /// `now()` function, and shows up in `fmt::Debug` output.
    #[must_use]
    pub fn named(self, name: &'static str) -> Self {
        Self { name, ..self }
    }

    /// Returns an [`Instant`] representing the current time according to
    /// this clock.
    #[must_use]
    pub fn now(&self) -> Instant {
        Instant((self.now)())
    }

    /// Returns this `Clock`'s name, if it was given one using the
    /// [`Clock::named`] method.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::system()
    }
}

impl fmt::Debug for Clock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Clock")
            .field("name", &self.name)
            .field("now", &format_args!("{:p}", Arc::as_ptr(&self.now)))
            .finish()
    }
}

// === impl Instant ===

impl Instant {
    /// Returns the `Instant` that lies `elapsed` after its clock's epoch.
    #[must_use]
    pub const fn from_epoch(elapsed: Duration) -> Self {
        Self(elapsed)
    }

    /// Returns the time elapsed between this clock's epoch and `self`.
    #[must_use]
    pub const fn since_epoch(&self) -> Duration {
        self.0
    }

    /// Returns the amount of time elapsed from `earlier` to `self`, or
    /// [`None`] if `earlier` is later than `self`.
    #[must_use]
    pub fn checked_duration_since(&self, earlier: Instant) -> Option<Duration> {
        self.0.checked_sub(earlier.0)
    }

    /// Returns the amount of time elapsed from `earlier` to `self`, or zero
    /// if `earlier` is later than `self`.
    #[must_use]
    pub fn saturating_duration_since(&self, earlier: Instant) -> Duration {
        self.0.saturating_sub(earlier.0)
    }
}

/// Adding a [`Duration`] saturates rather than overflowing.
impl Add<Duration> for Instant {
    type Output = Instant;

    fn add(self, rhs: Duration) -> Instant {
        Instant(self.0.saturating_add(rhs))
    }
}

impl AddAssign<Duration> for Instant {
    fn add_assign(&mut self, rhs: Duration) {
        *self = *self + rhs;
    }
}

impl fmt::Display for Instant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let micros = self.0.subsec_micros();
        write!(f, "{}.{micros:06}s", self.0.as_secs())
    }
}

// === impl ManualClock ===

impl ManualClock {
    /// Returns a new `ManualClock` that starts at its epoch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a [`Clock`] that reads from this `ManualClock`.
    #[must_use]
    pub fn clock(&self) -> Clock {
        let nanos = self.nanos.clone();
        Clock::new(move || Duration::from_nanos(nanos.load(Ordering::Acquire))).named("manual")
    }

    /// Moves the clock forward by `elapsed`.
    pub fn advance(&self, elapsed: Duration) {
        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.nanos
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |now| {
                Some(now.saturating_add(nanos))
            })
            .ok();
    }

    /// Returns the current time according to this clock.
    #[must_use]
    pub fn now(&self) -> Instant {
        Instant(Duration::from_nanos(self.nanos.load(Ordering::Acquire)))
    }
}
