//! Time source and day-rollover helpers
//!
//! Everything that needs "now" goes through [`Clock`] so tests can pin the
//! wall clock with [`ManualClock`].

use chrono::{Duration as ChronoDuration, Local, NaiveDateTime};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::alarm::{AlarmTime, ScheduledAlarm};

/// Source of the current local wall-clock time
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// The system's local time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Clock that only moves when told to
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<NaiveDateTime>>,
}

impl ManualClock {
    pub fn new(start: NaiveDateTime) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn set(&self, instant: NaiveDateTime) {
        *self.lock() = instant;
    }

    pub fn advance(&self, by: Duration) {
        let step = ChronoDuration::from_std(by).unwrap_or(ChronoDuration::zero());
        let mut now = self.lock();
        *now += step;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, NaiveDateTime> {
        // a poisoned clock still holds a valid instant
        self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        *self.lock()
    }
}

/// Next instant strictly after `now` whose time of day is `time`.
///
/// A time equal to the current minute rolls over to tomorrow.
pub fn next_occurrence(time: AlarmTime, now: NaiveDateTime) -> NaiveDateTime {
    let today = now.date().and_time(time.as_naive_time());
    if today > now {
        today
    } else {
        today + ChronoDuration::days(1)
    }
}

/// Non-negative time left from `now` until `target`
pub fn until(target: NaiveDateTime, now: NaiveDateTime) -> Duration {
    (target - now).to_std().unwrap_or(Duration::ZERO)
}

/// Whether the display should be in night mode.
///
/// Night mode covers the `offset_hours` leading up to an armed alarm.
pub fn in_night_window(
    now: NaiveDateTime,
    alarm: Option<&ScheduledAlarm>,
    offset_hours: u32,
) -> bool {
    let Some(alarm) = alarm.filter(|a| a.state.is_active()) else {
        return false;
    };
    let start = alarm.target - ChronoDuration::hours(offset_hours.into());
    now >= start && now < alarm.target
}
