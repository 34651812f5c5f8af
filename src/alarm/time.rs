//! Alarm time and scheduled alarm data types

use chrono::{NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::AlarmError;

/// Wall-clock time of day an alarm goes off at
///
/// Serialized as `"HH:MM"`; deserializing goes through the same range check
/// as [`AlarmTime::new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AlarmTime {
    hour: u8,
    minute: u8,
}

impl AlarmTime {
    pub fn new(hour: u8, minute: u8) -> crate::Result<Self> {
        if hour > 23 || minute > 59 {
            return Err(AlarmError::InvalidTime(format!(
                "{:02}:{:02} is not a valid 24h time",
                hour, minute
            )));
        }
        Ok(Self { hour, minute })
    }

    pub fn hour(&self) -> u8 {
        self.hour
    }

    pub fn minute(&self) -> u8 {
        self.minute
    }

    pub fn as_naive_time(&self) -> NaiveTime {
        // hour and minute are range checked on construction
        NaiveTime::from_hms_opt(self.hour.into(), self.minute.into(), 0).unwrap_or(NaiveTime::MIN)
    }

    /// Time of day of `instant`, seconds dropped
    pub fn of(instant: NaiveDateTime) -> Self {
        Self {
            hour: instant.hour() as u8,
            minute: instant.minute() as u8,
        }
    }
}

impl FromStr for AlarmTime {
    type Err = AlarmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (h, m) = s
            .trim()
            .split_once(':')
            .ok_or_else(|| AlarmError::InvalidTime(format!("expected HH:MM, got '{}'", s)))?;
        let hour = h
            .parse::<u8>()
            .map_err(|_| AlarmError::InvalidTime(format!("bad hour in '{}'", s)))?;
        let minute = m
            .parse::<u8>()
            .map_err(|_| AlarmError::InvalidTime(format!("bad minute in '{}'", s)))?;
        Self::new(hour, minute)
    }
}

impl TryFrom<String> for AlarmTime {
    type Error = AlarmError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AlarmTime> for String {
    fn from(time: AlarmTime) -> Self {
        time.to_string()
    }
}

impl fmt::Display for AlarmTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// Lifecycle of a scheduled alarm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlarmState {
    /// Countdowns running
    Armed,
    /// Content is being built ahead of time
    PreBuilding,
    /// Content built, waiting for the play countdown
    Built,
    /// Being read aloud
    Playing,
    /// Played to the end
    Completed,
    /// Cleared by the user
    Cancelled,
}

impl AlarmState {
    /// Whether the alarm still counts as the active one
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            Self::Armed | Self::PreBuilding | Self::Built | Self::Playing
        )
    }
}

/// An alarm with a concrete target instant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledAlarm {
    /// Distinguishes countdown fires of replaced alarms
    pub id: u64,

    /// Date and time the alarm plays at
    pub target: NaiveDateTime,

    /// Time of day the user asked for
    pub time: AlarmTime,

    pub state: AlarmState,
}
