//! Alarm scheduler
//!
//! Owns the single armed alarm and its two one-shot countdowns: one that
//! fires `prebuild_lead` before the alarm to build content ahead of time,
//! and one that fires at the alarm itself. Countdown fires are delivered on
//! a channel to the daemon's event loop, which hands them back through
//! [`AlarmScheduler::accept`] so fires of replaced alarms are dropped.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::alarm::clock::{next_occurrence, until, Clock};
use crate::alarm::{AlarmState, AlarmTime, ScheduledAlarm};

/// A countdown that reached zero
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmFire {
    /// Time to build the alarm's content
    Prebuild { alarm_id: u64 },
    /// Time to play the alarm
    Play { alarm_id: u64 },
}

impl AlarmFire {
    pub fn alarm_id(&self) -> u64 {
        match self {
            Self::Prebuild { alarm_id } | Self::Play { alarm_id } => *alarm_id,
        }
    }
}

pub type FireReceiver = mpsc::UnboundedReceiver<AlarmFire>;

pub struct AlarmScheduler {
    clock: Arc<dyn Clock>,
    prebuild_lead: Duration,
    fire_tx: mpsc::UnboundedSender<AlarmFire>,
    current: Option<ScheduledAlarm>,
    countdowns: Vec<JoinHandle<()>>,
    next_id: u64,
}

impl AlarmScheduler {
    /// Create a scheduler and the receiving end of its countdown fires
    pub fn new(clock: Arc<dyn Clock>, prebuild_lead: Duration) -> (Self, FireReceiver) {
        let (fire_tx, fire_rx) = mpsc::unbounded_channel();
        let scheduler = Self {
            clock,
            prebuild_lead,
            fire_tx,
            current: None,
            countdowns: Vec::new(),
            next_id: 0,
        };
        (scheduler, fire_rx)
    }

    /// Arm an alarm for the next occurrence of `time`, replacing any
    /// alarm that is currently armed.
    pub fn set_alarm(&mut self, time: AlarmTime) -> ScheduledAlarm {
        self.cancel_alarm();

        let now = self.clock.now();
        let target = next_occurrence(time, now);
        let play_in = until(target, now);
        // never skipped: with less time left than the lead it fires at once
        let prebuild_in = play_in.saturating_sub(self.prebuild_lead);

        self.next_id += 1;
        let alarm = ScheduledAlarm {
            id: self.next_id,
            target,
            time,
            state: AlarmState::Armed,
        };

        self.countdowns.push(spawn_countdown(
            prebuild_in,
            AlarmFire::Prebuild { alarm_id: alarm.id },
            self.fire_tx.clone(),
        ));
        self.countdowns.push(spawn_countdown(
            play_in,
            AlarmFire::Play { alarm_id: alarm.id },
            self.fire_tx.clone(),
        ));

        info!(
            "Alarm set for {} (in {}s, content build in {}s)",
            alarm.target.format("%a %Y-%m-%d %H:%M"),
            play_in.as_secs(),
            prebuild_in.as_secs()
        );

        self.current = Some(alarm.clone());
        alarm
    }

    /// Stop both countdowns and clear the alarm. Returns the cancelled
    /// alarm, or `None` if nothing was armed.
    pub fn cancel_alarm(&mut self) -> Option<ScheduledAlarm> {
        for countdown in self.countdowns.drain(..) {
            countdown.abort();
        }

        let mut alarm = self.current.take()?;
        alarm.state = AlarmState::Cancelled;
        info!("Alarm for {} cancelled", alarm.time);
        Some(alarm)
    }

    /// The active alarm, if any
    pub fn current_alarm(&self) -> Option<&ScheduledAlarm> {
        self.current.as_ref()
    }

    /// Validate a fire against the active alarm and advance its state.
    ///
    /// Returns `None` for fires of alarms that were replaced or cancelled
    /// and for fires that arrive in a state they no longer apply to.
    pub fn accept(&mut self, fire: AlarmFire) -> Option<AlarmFire> {
        let Some(alarm) = self
            .current
            .as_mut()
            .filter(|a| a.id == fire.alarm_id())
        else {
            debug!("Ignoring stale countdown {:?}", fire);
            return None;
        };

        match fire {
            AlarmFire::Prebuild { .. } if alarm.state == AlarmState::Armed => {
                alarm.state = AlarmState::PreBuilding;
                Some(fire)
            }
            AlarmFire::Play { .. }
                if matches!(
                    alarm.state,
                    AlarmState::Armed | AlarmState::PreBuilding | AlarmState::Built
                ) =>
            {
                alarm.state = AlarmState::Playing;
                Some(fire)
            }
            _ => {
                debug!("Ignoring {:?} in state {:?}", fire, alarm.state);
                None
            }
        }
    }

    /// Content for `alarm_id` finished building
    pub fn mark_built(&mut self, alarm_id: u64) {
        if let Some(alarm) = self.current.as_mut().filter(|a| a.id == alarm_id) {
            if alarm.state == AlarmState::PreBuilding {
                alarm.state = AlarmState::Built;
            }
        }
    }

    /// Content for `alarm_id` could not be built ahead of time; the play
    /// countdown builds it again.
    pub fn mark_build_failed(&mut self, alarm_id: u64) {
        if let Some(alarm) = self.current.as_mut().filter(|a| a.id == alarm_id) {
            if alarm.state == AlarmState::PreBuilding {
                alarm.state = AlarmState::Armed;
            }
        }
    }

    /// Playback of `alarm_id` ended; the alarm is done and cleared
    pub fn mark_completed(&mut self, alarm_id: u64) -> Option<ScheduledAlarm> {
        if self.current.as_ref().map(|a| a.id) != Some(alarm_id) {
            return None;
        }
        self.countdowns.clear();
        let mut alarm = self.current.take()?;
        alarm.state = AlarmState::Completed;
        info!("Alarm for {} completed", alarm.time);
        Some(alarm)
    }
}

impl Drop for AlarmScheduler {
    fn drop(&mut self) {
        for countdown in self.countdowns.drain(..) {
            countdown.abort();
        }
    }
}

fn spawn_countdown(
    delay: Duration,
    fire: AlarmFire,
    tx: mpsc::UnboundedSender<AlarmFire>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let _ = tx.send(fire);
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alarm::clock::ManualClock;
    use chrono::{NaiveDate, NaiveDateTime};

    const LEAD: Duration = Duration::from_secs(300);

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 14)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn scheduler_at(h: u32, m: u32) -> (AlarmScheduler, FireReceiver) {
        AlarmScheduler::new(Arc::new(ManualClock::new(at(h, m))), LEAD)
    }

    fn time(h: u8, m: u8) -> AlarmTime {
        AlarmTime::new(h, m).unwrap()
    }

    async fn advance(secs: u64) {
        tokio::time::sleep(Duration::from_secs(secs)).await;
    }

    fn drain(rx: &mut FireReceiver) -> Vec<AlarmFire> {
        let mut fires = Vec::new();
        while let Ok(fire) = rx.try_recv() {
            fires.push(fire);
        }
        fires
    }

    #[tokio::test(start_paused = true)]
    async fn future_time_targets_today() {
        let (mut scheduler, _rx) = scheduler_at(6, 0);
        let alarm = scheduler.set_alarm(time(7, 0));

        assert_eq!(alarm.target, at(7, 0));
        assert_eq!(alarm.state, AlarmState::Armed);
        assert_eq!(scheduler.current_alarm(), Some(&alarm));
    }

    #[tokio::test(start_paused = true)]
    async fn prebuild_fires_lead_before_play() {
        let (mut scheduler, mut rx) = scheduler_at(6, 0);
        let alarm = scheduler.set_alarm(time(7, 0));

        advance(3600 - 300 - 1).await;
        assert!(drain(&mut rx).is_empty());

        advance(2).await;
        assert_eq!(
            drain(&mut rx),
            vec![AlarmFire::Prebuild { alarm_id: alarm.id }]
        );

        advance(300).await;
        assert_eq!(drain(&mut rx), vec![AlarmFire::Play { alarm_id: alarm.id }]);
    }

    #[tokio::test(start_paused = true)]
    async fn short_remaining_time_prebuilds_immediately() {
        let (mut scheduler, mut rx) = scheduler_at(6, 58);
        let alarm = scheduler.set_alarm(time(7, 0));

        tokio::task::yield_now().await;
        advance(0).await;
        assert_eq!(
            drain(&mut rx),
            vec![AlarmFire::Prebuild { alarm_id: alarm.id }]
        );

        advance(121).await;
        assert_eq!(drain(&mut rx), vec![AlarmFire::Play { alarm_id: alarm.id }]);
    }

    #[tokio::test(start_paused = true)]
    async fn replacing_an_alarm_leaves_one_play() {
        let (mut scheduler, mut rx) = scheduler_at(6, 0);
        scheduler.set_alarm(time(6, 30));
        let second = scheduler.set_alarm(time(6, 45));

        advance(3600).await;
        let plays: Vec<_> = drain(&mut rx)
            .into_iter()
            .filter_map(|fire| scheduler.accept(fire))
            .filter(|fire| matches!(fire, AlarmFire::Play { .. }))
            .collect();

        assert_eq!(plays, vec![AlarmFire::Play { alarm_id: second.id }]);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_clears_alarm_and_silences_countdowns() {
        let (mut scheduler, mut rx) = scheduler_at(6, 0);
        scheduler.set_alarm(time(6, 10));

        let cancelled = scheduler.cancel_alarm().expect("alarm was armed");
        assert_eq!(cancelled.state, AlarmState::Cancelled);
        assert!(scheduler.current_alarm().is_none());

        advance(3600).await;
        assert!(drain(&mut rx).is_empty());

        // idempotent
        assert!(scheduler.cancel_alarm().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn alarm_for_current_minute_plays_once_tomorrow() {
        let (mut scheduler, mut rx) = scheduler_at(7, 30);
        let alarm = scheduler.set_alarm(time(7, 30));
        assert_eq!(alarm.target, at(7, 30) + chrono::Duration::days(1));

        advance(60).await;
        assert!(drain(&mut rx).is_empty());

        advance(2 * 24 * 3600).await;
        let fires = drain(&mut rx);
        assert_eq!(
            fires,
            vec![
                AlarmFire::Prebuild { alarm_id: alarm.id },
                AlarmFire::Play { alarm_id: alarm.id },
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn accept_walks_alarm_states() {
        let (mut scheduler, _rx) = scheduler_at(6, 0);
        let alarm = scheduler.set_alarm(time(7, 0));
        let id = alarm.id;

        assert!(scheduler.accept(AlarmFire::Prebuild { alarm_id: id }).is_some());
        // edge triggered: a second prebuild is not accepted
        assert!(scheduler.accept(AlarmFire::Prebuild { alarm_id: id }).is_none());

        scheduler.mark_built(id);
        assert_eq!(scheduler.current_alarm().unwrap().state, AlarmState::Built);

        assert!(scheduler.accept(AlarmFire::Play { alarm_id: id }).is_some());
        assert!(scheduler.accept(AlarmFire::Play { alarm_id: id }).is_none());

        let done = scheduler.mark_completed(id).unwrap();
        assert_eq!(done.state, AlarmState::Completed);
        assert!(scheduler.current_alarm().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn fires_for_other_alarms_are_stale() {
        let (mut scheduler, _rx) = scheduler_at(6, 0);
        let alarm = scheduler.set_alarm(time(7, 0));

        assert!(scheduler
            .accept(AlarmFire::Play { alarm_id: alarm.id + 1 })
            .is_none());
        assert!(scheduler.mark_completed(alarm.id + 1).is_none());
        assert_eq!(scheduler.current_alarm().unwrap().state, AlarmState::Armed);
    }
}
