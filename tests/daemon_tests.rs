mod common;

use chrono::Duration as ChronoDuration;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use alarmpi::alarm::{AlarmContentBuilder, AlarmState, AlarmTime, ManualClock, PlaybackState};
use alarmpi::config::{ConfigHandle, Settings};
use alarmpi::daemon::ipc::{DaemonRequest, DaemonResponse, StatusReport};
use alarmpi::daemon::service::AlarmDaemon;
use common::fakes::{at, tone, FakeRadio, FakeSource, RecordingBackend};

const RADIO_URL: &str = "http://radio.example/stream";

type Commands = mpsc::Sender<(DaemonRequest, mpsc::Sender<DaemonResponse>)>;

struct Harness {
    commands: Commands,
    backend: Arc<RecordingBackend>,
    source: Arc<FakeSource>,
    radio: Arc<FakeRadio>,
    clock: Arc<ManualClock>,
    task: JoinHandle<anyhow::Result<()>>,
    start: Instant,
}

impl Harness {
    async fn start(settings: Settings) -> Self {
        let clock = Arc::new(ManualClock::new(at(7, 0, 0)));
        let backend = RecordingBackend::new();
        let source = FakeSource::ok("Mostly sunny.");
        let radio = FakeRadio::new();

        let builder = AlarmContentBuilder::new(
            clock.clone(),
            backend.clone(),
            vec![source.configured("weather")],
        )
        // one clip per alarm keeps the play counts simple
        .with_greeting(false);
        let (daemon, inbox) = AlarmDaemon::new(
            ConfigHandle::new(settings),
            clock.clone(),
            builder,
            tone("true"),
            radio.clone(),
        )
        .await;

        let (commands, rx) = mpsc::channel(8);
        let task = tokio::spawn(daemon.serve(inbox, rx));

        Self {
            commands,
            backend,
            source,
            radio,
            clock,
            task,
            start: Instant::now(),
        }
    }

    async fn send(&self, request: DaemonRequest) -> DaemonResponse {
        let (tx, mut rx) = mpsc::channel(1);
        self.commands.send((request, tx)).await.unwrap();
        rx.recv().await.unwrap()
    }

    async fn status(&self) -> StatusReport {
        match self.send(DaemonRequest::GetStatus).await {
            DaemonResponse::Status(report) => report,
            other => panic!("expected status, got {:?}", other),
        }
    }

    async fn set_alarm(&self, time: &str) -> DaemonResponse {
        self.send(DaemonRequest::SetAlarm {
            time: time.parse().unwrap(),
        })
        .await
    }

    /// Sleep until `secs` after the harness started
    async fn at_secs(&self, secs: u64) {
        tokio::time::sleep_until(self.start + Duration::from_secs(secs)).await;
    }
}

fn radio_settings() -> Settings {
    let mut settings = Settings::default();
    settings.radio.enabled = true;
    settings.radio.url = RADIO_URL.to_string();
    settings
}

#[tokio::test(start_paused = true)]
async fn alarm_prebuilds_plays_once_and_hands_off_to_radio() {
    let h = Harness::start(radio_settings()).await;

    let DaemonResponse::AlarmSet { alarm } = h.set_alarm("07:30").await else {
        panic!("expected AlarmSet");
    };
    assert_eq!(alarm.target, at(7, 30, 0));
    assert_eq!(alarm.state, AlarmState::Armed);
    assert!(h.status().await.night_mode);

    // content is built five minutes ahead
    h.at_secs(1499).await;
    assert_eq!(h.source.fetches(), 0);
    h.at_secs(1501).await;
    let status = h.status().await;
    assert_eq!(status.alarm.unwrap().state, AlarmState::Built);
    assert_eq!(status.playback, PlaybackState::Built);
    assert_eq!(h.source.fetches(), 1);

    h.at_secs(1801).await;
    let status = h.status().await;
    assert!(status.alarm.is_none(), "completed alarm should be cleared");
    assert_eq!(status.playback, PlaybackState::Idle);
    assert!(status.radio_playing);
    assert_eq!(h.backend.played().len(), 1);
    assert_eq!(h.source.fetches(), 1);
    assert_eq!(h.radio.started(), vec![RADIO_URL.to_string()]);

    // nothing re-arms itself
    h.at_secs(3 * 86_400).await;
    assert_eq!(h.backend.played().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn replacing_an_alarm_plays_only_the_new_one() {
    let h = Harness::start(Settings::default()).await;

    h.set_alarm("07:30").await;
    h.set_alarm("07:45").await;

    h.at_secs(1801).await;
    assert!(h.backend.played().is_empty());
    let alarm = h.status().await.alarm.unwrap();
    assert_eq!(alarm.time, AlarmTime::new(7, 45).unwrap());

    h.at_secs(2701).await;
    assert_eq!(h.backend.played().len(), 1);
    assert!(h.radio.started().is_empty(), "radio is disabled");

    h.at_secs(86_400 + 3600).await;
    assert_eq!(h.backend.played().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn cancelled_alarm_never_fires() {
    let h = Harness::start(Settings::default()).await;

    h.set_alarm("07:30").await;
    let DaemonResponse::AlarmCancelled { alarm } = h.send(DaemonRequest::CancelAlarm).await
    else {
        panic!("expected AlarmCancelled");
    };
    assert_eq!(alarm.unwrap().state, AlarmState::Cancelled);

    // idempotent
    assert_eq!(
        h.send(DaemonRequest::CancelAlarm).await,
        DaemonResponse::AlarmCancelled { alarm: None }
    );

    h.at_secs(2 * 86_400).await;
    assert_eq!(h.source.fetches(), 0);
    assert!(h.backend.played().is_empty());
    assert!(!h.status().await.night_mode);
}

#[tokio::test(start_paused = true)]
async fn cancel_after_prebuild_discards_the_content() {
    let h = Harness::start(Settings::default()).await;

    h.set_alarm("07:30").await;
    h.at_secs(1501).await;
    assert_eq!(h.source.fetches(), 1);

    h.send(DaemonRequest::CancelAlarm).await;
    assert_eq!(h.send(DaemonRequest::PlayNow).await, DaemonResponse::PlayQueued);

    h.at_secs(1510).await;
    assert_eq!(h.backend.played().len(), 1);
    assert_eq!(h.source.fetches(), 2, "play after cancel must rebuild");
}

#[tokio::test(start_paused = true)]
async fn alarm_at_the_current_minute_is_tomorrow() {
    let h = Harness::start(Settings::default()).await;
    h.clock.set(at(7, 30, 0));

    let DaemonResponse::AlarmSet { alarm } = h.set_alarm("07:30").await else {
        panic!("expected AlarmSet");
    };
    assert_eq!(alarm.target, at(7, 30, 0) + ChronoDuration::days(1));

    h.at_secs(10).await;
    assert!(h.backend.played().is_empty());

    h.at_secs(86_401).await;
    assert_eq!(h.backend.played().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn short_notice_alarm_still_prebuilds() {
    let h = Harness::start(Settings::default()).await;
    h.clock.set(at(7, 29, 0));

    h.set_alarm("07:30").await;
    h.at_secs(1).await;
    assert_eq!(h.source.fetches(), 1);

    h.at_secs(61).await;
    assert_eq!(h.backend.played().len(), 1);
    assert_eq!(h.source.fetches(), 1);
}

#[tokio::test(start_paused = true)]
async fn runtime_settings_are_applied_and_validated() {
    let h = Harness::start(Settings::default()).await;

    assert_eq!(
        h.send(DaemonRequest::SetReadaloud { enabled: false }).await,
        DaemonResponse::Ok
    );
    assert_eq!(
        h.send(DaemonRequest::SetBrightnessOnAlarm { enabled: false }).await,
        DaemonResponse::Ok
    );
    assert!(matches!(
        h.send(DaemonRequest::SetNightmodeOffset { hours: 30 }).await,
        DaemonResponse::Error { .. }
    ));

    let status = h.status().await;
    assert!(!status.readaloud);
    assert!(!status.brightness_on_alarm);
    assert_eq!(status.nightmode_offset_hours, 8);
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_the_loop_and_the_radio() {
    let h = Harness::start(radio_settings()).await;

    assert_eq!(h.send(DaemonRequest::Ping).await, DaemonResponse::Pong);
    assert_eq!(h.send(DaemonRequest::Shutdown).await, DaemonResponse::Ok);

    h.task.await.unwrap().unwrap();
    assert!(h.radio.stops() >= 1);
}
