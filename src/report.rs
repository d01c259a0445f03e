//! Human-readable snapshots of a [`Scheduler`](crate::Scheduler)'s contents.
//!
//! These are intended for debug output and operator consoles. Their text
//! format is not stable, and should not be parsed.
use crate::task::{Addr, TaskId};
use std::{fmt, time::Duration};

/// A snapshot of a scheduler's counters, returned by
/// [`Scheduler::stats`](crate::Scheduler::stats).
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[non_exhaustive]
pub struct Stats {
    /// The total number of tasks ever added.
    pub added: u64,
    /// The total number of callbacks invoked.
    pub fired: u64,
    /// The number of pending tasks, not counting one that is executing.
    pub outstanding: usize,
    /// The largest value `outstanding` has ever had.
    pub high_water: usize,
    /// The number of released task records held for reuse.
    pub cached: usize,
}

/// A listing of a scheduler's tasks, returned by
/// [`Scheduler::dump`](crate::Scheduler::dump).
#[derive(Clone, Debug)]
pub struct Dump {
    pub(crate) name: &'static str,
    pub(crate) stats: Stats,
    pub(crate) executing: Option<DumpEntry>,
    pub(crate) entries: Vec<DumpEntry>,
}

/// Counts of a scheduler's pending tasks by callback, returned by
/// [`Scheduler::report`](crate::Scheduler::report).
#[derive(Clone, Debug)]
pub struct Report {
    pub(crate) stats: Stats,
    pub(crate) categories: Vec<(String, usize)>,
    pub(crate) unknown: usize,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) struct DumpEntry {
    pub(crate) id: TaskId,
    pub(crate) callback: usize,
    pub(crate) remaining: Duration,
}

const RULE: &str = "=============================================================";

// === impl Dump ===

impl Dump {
    /// Returns the counters at the time of the dump.
    #[must_use]
    pub fn stats(&self) -> Stats {
        self.stats
    }

    /// Returns the ids of the pending tasks, earliest deadline first.
    pub fn ids(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.entries.iter().map(|entry| entry.id)
    }

    /// Returns the id of the task that was executing at the time of the
    /// dump, if any.
    #[must_use]
    pub fn executing(&self) -> Option<TaskId> {
        self.executing.map(|entry| entry.id)
    }
}

impl fmt::Display for Dump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Schedule dump for {}: {} events processed, {} waiting",
            self.name, self.stats.fired, self.stats.outstanding
        )?;
        writeln!(f, "{RULE}")?;
        writeln!(f, "|ID    Callback            Time  (sec:usec)               |")?;
        writeln!(f, "+-----+-------------------+---------------------------------+")?;
        if let Some(ref entry) = self.executing {
            writeln!(f, "{entry} (executing)")?;
        }
        for entry in &self.entries {
            writeln!(f, "{entry}")?;
        }
        writeln!(f, "{RULE}")
    }
}

// === impl DumpEntry ===

impl fmt::Display for DumpEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            " {:<5} {:<19} {:>6} : {:<6}",
            self.id,
            Addr(self.callback).to_string(),
            self.remaining.as_secs(),
            self.remaining.subsec_micros()
        )
    }
}

// === impl Report ===

impl Report {
    /// Returns the counters at the time of the report.
    #[must_use]
    pub fn stats(&self) -> Stats {
        self.stats
    }

    /// Returns the number of pending tasks in the named category, or `None`
    /// if there is no such category.
    #[must_use]
    pub fn count(&self, category: &str) -> Option<usize> {
        self.categories
            .iter()
            .find(|(name, _)| name == category)
            .map(|&(_, count)| count)
    }

    /// Returns the number of pending tasks that matched no category.
    #[must_use]
    pub fn unknown(&self) -> usize {
        self.unknown
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, " Highwater = {}", self.stats.high_water)?;
        writeln!(f, " schedcnt = {}", self.stats.outstanding)?;
        for (name, count) in &self.categories {
            writeln!(f, "   {name:>15} : {count}")?;
        }
        writeln!(f, "   {:>15} : {}", "<unknown>", self.unknown)
    }
}
