//! Daily time-of-day trigger.

use chrono::{Duration, NaiveDateTime, NaiveTime};

/// Fires once per calendar day at a fixed wall-clock time.
///
/// The trigger is driven by polling: the scheduler asks [`is_due`] on every
/// poll and calls [`advance`] after firing. Missed days (for example after a
/// suspend) are not replayed; the trigger fires once and moves to the next
/// future occurrence.
///
/// [`is_due`]: DailyTrigger::is_due
/// [`advance`]: DailyTrigger::advance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyTrigger {
    at: NaiveTime,
    next_run: NaiveDateTime,
}

impl DailyTrigger {
    /// Creates a trigger whose first run is today at `at` if that is still
    /// ahead of `now`, otherwise tomorrow.
    pub fn new(at: NaiveTime, now: NaiveDateTime) -> Self {
        Self {
            at,
            next_run: next_occurrence(at, now),
        }
    }

    pub fn at(&self) -> NaiveTime {
        self.at
    }

    pub fn next_run(&self) -> NaiveDateTime {
        self.next_run
    }

    pub fn is_due(&self, now: NaiveDateTime) -> bool {
        now >= self.next_run
    }

    /// Moves the next run to the first occurrence strictly after `now`.
    pub fn advance(&mut self, now: NaiveDateTime) {
        self.next_run = next_occurrence(self.at, now);
    }
}

fn next_occurrence(at: NaiveTime, now: NaiveDateTime) -> NaiveDateTime {
    let today = now.date().and_time(at);
    if today > now {
        today
    } else {
        today + Duration::days(1)
    }
}
