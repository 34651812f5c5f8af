//! Alarm scheduling and playback
//!
//! The scheduler decides when content is built and when it is played; the
//! coordinator does the building and playing on a background worker.

pub mod builder;
pub mod clock;
pub mod coordinator;
pub mod scheduler;
mod time;

pub use builder::{AlarmContentBuilder, ContentArtifact, Section, SectionKind, SECTION_FAILED_PHRASE};
pub use clock::{in_night_window, next_occurrence, Clock, ManualClock, SystemClock};
pub use coordinator::{AlarmPlaybackCoordinator, PlaybackEvent, PlaybackOutcome, PlaybackState};
pub use scheduler::{AlarmFire, AlarmScheduler};
pub use time::{AlarmState, AlarmTime, ScheduledAlarm};
