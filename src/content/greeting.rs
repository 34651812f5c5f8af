//! Spoken greeting stating the day and time

use chrono::{NaiveDateTime, Timelike};

/// Greeting for an alarm going off at `at`
pub fn greeting(at: NaiveDateTime) -> String {
    let salutation = match at.hour() {
        0..=11 => "Good morning",
        12..=17 => "Good afternoon",
        _ => "Good evening",
    };

    format!(
        "{}. It is {}. The time is {}.",
        salutation,
        at.format("%A, %B %-d"),
        at.format("%-H:%M")
    )
}
