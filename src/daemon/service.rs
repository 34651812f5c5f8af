//! The daemon's foreground event loop
//!
//! One task owns the scheduler and reacts to three inputs: IPC commands,
//! countdown fires and playback events from the coordinator's worker.
//! Nothing in here waits on the network or the speaker.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::alarm::coordinator::EventReceiver;
use crate::alarm::scheduler::FireReceiver;
use crate::alarm::{
    in_night_window, AlarmContentBuilder, AlarmFire, AlarmPlaybackCoordinator, AlarmScheduler,
    AlarmTime, Clock, PlaybackEvent, ScheduledAlarm, SystemClock,
};
use crate::config::{ConfigHandle, PollerConfig, Settings};
use crate::content::{build_source, ConfiguredSource};
use crate::daemon::ipc::{DaemonRequest, DaemonResponse, PollerStatus, StatusReport};
use crate::daemon::server::{Command, CommandReceiver, IpcServer};
use crate::poller::{source_poller, RetryingPoller};
use crate::radio::{ProcessRadio, RadioStreamer};
use crate::tts::{build_backend, fallback_backend, ToneBackend};

/// Run the daemon until a shutdown request or a termination signal
pub async fn run(settings: &Settings) -> Result<()> {
    info!("Starting alarmpi daemon");

    settings
        .validate()
        .context("Refusing to start with an invalid configuration")?;
    settings.ensure_dirs()?;

    let config = ConfigHandle::persistent(settings.clone(), Settings::config_path()?);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let (mut daemon, inbox) = AlarmDaemon::from_settings(settings, config, clock)?;
    daemon.start_pollers(settings)?;
    daemon.arm_default_alarm(settings)?;

    std::fs::write(settings.pid_path(), std::process::id().to_string())?;

    let (cmd_tx, cmd_rx) = mpsc::channel::<Command>(32);
    let server = IpcServer::bind(&settings.socket_path())?;
    let server_handle = tokio::spawn(server.serve(cmd_tx));

    let result = tokio::select! {
        result = daemon.serve(inbox, cmd_rx) => result,
        _ = shutdown_signal() => {
            info!("Received termination signal");
            Ok(())
        }
    };

    info!("Shutting down daemon");
    let _ = std::fs::remove_file(settings.pid_path());

    // dropping the server removes the socket file
    server_handle.abort();
    let _ = server_handle.await;

    result
}

async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = match signal(SignalKind::terminate()) {
        Ok(term) => term,
        Err(e) => {
            warn!("Cannot listen for SIGTERM: {}", e);
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = term.recv() => {}
        _ = tokio::signal::ctrl_c() => {}
    }
}

/// Receiving ends the event loop selects over besides IPC
pub struct Inbox {
    fires: FireReceiver,
    events: EventReceiver,
}

pub struct AlarmDaemon {
    config: ConfigHandle,
    clock: Arc<dyn Clock>,
    scheduler: AlarmScheduler,
    coordinator: AlarmPlaybackCoordinator,
    radio: Arc<dyn RadioStreamer>,
    pollers: Vec<RetryingPoller<String>>,
}

impl AlarmDaemon {
    /// Wire the daemon from its parts
    pub async fn new(
        config: ConfigHandle,
        clock: Arc<dyn Clock>,
        builder: AlarmContentBuilder,
        fallback: Arc<ToneBackend>,
        radio: Arc<dyn RadioStreamer>,
    ) -> (Self, Inbox) {
        let lead = config.snapshot().await.prebuild_lead();
        Self::assemble(config, clock, lead, builder, fallback, radio)
    }

    /// Wire the daemon from validated settings
    fn from_settings(
        settings: &Settings,
        config: ConfigHandle,
        clock: Arc<dyn Clock>,
    ) -> crate::Result<(Self, Inbox)> {
        let backend = build_backend(settings)?;
        let builder = AlarmContentBuilder::from_settings(settings, clock.clone(), backend)?;
        let fallback = Arc::new(fallback_backend(settings));
        let radio: Arc<dyn RadioStreamer> = Arc::new(ProcessRadio::from_settings(&settings.radio));

        Ok(Self::assemble(
            config,
            clock,
            settings.prebuild_lead(),
            builder,
            fallback,
            radio,
        ))
    }

    fn assemble(
        config: ConfigHandle,
        clock: Arc<dyn Clock>,
        prebuild_lead: std::time::Duration,
        builder: AlarmContentBuilder,
        fallback: Arc<ToneBackend>,
        radio: Arc<dyn RadioStreamer>,
    ) -> (Self, Inbox) {
        let (scheduler, fires) = AlarmScheduler::new(clock.clone(), prebuild_lead);
        let (coordinator, events) = AlarmPlaybackCoordinator::spawn(builder, fallback, config.clone());

        let daemon = Self {
            config,
            clock,
            scheduler,
            coordinator,
            radio,
            pollers: Vec::new(),
        };
        (daemon, Inbox { fires, events })
    }

    /// Start the enabled side-panel pollers
    pub fn start_pollers(&mut self, settings: &Settings) -> crate::Result<()> {
        let retry_delay = settings.retry_delay();
        for (name, poller) in [
            ("weather", &settings.pollers.weather),
            ("trains", &settings.pollers.trains),
        ] {
            if !poller.enabled {
                continue;
            }
            self.pollers
                .push(spawn_poller(name, self.clock.clone(), poller, retry_delay)?);
            info!("{} poller every {}s", name, poller.interval_secs);
        }
        Ok(())
    }

    /// Arm `alarm.default_time`, if configured
    pub fn arm_default_alarm(&mut self, settings: &Settings) -> crate::Result<Option<ScheduledAlarm>> {
        Ok(settings
            .default_alarm_time()?
            .map(|time| self.scheduler.set_alarm(time)))
    }

    /// Handle commands and events until a shutdown request
    pub async fn serve(mut self, mut inbox: Inbox, mut commands: CommandReceiver) -> Result<()> {
        loop {
            tokio::select! {
                command = commands.recv() => {
                    let Some((request, resp_tx)) = command else {
                        warn!("Command channel closed");
                        break;
                    };
                    let shutdown = matches!(request, DaemonRequest::Shutdown);
                    let response = self.handle(request).await;
                    let _ = resp_tx.send(response).await;
                    if shutdown {
                        break;
                    }
                }
                Some(fire) = inbox.fires.recv() => self.on_fire(fire).await,
                Some(event) = inbox.events.recv() => self.on_event(event).await,
            }
        }

        self.stop().await;
        Ok(())
    }

    /// Stop the radio and every background task
    pub async fn stop(self) {
        self.stop_radio().await;
        self.coordinator.shutdown();
    }

    /// Answer one IPC request
    pub async fn handle(&mut self, request: DaemonRequest) -> DaemonResponse {
        match request {
            DaemonRequest::SetAlarm { time } => self.set_alarm(time).await,
            DaemonRequest::CancelAlarm => self.cancel_alarm().await,
            DaemonRequest::PlayNow => {
                self.stop_radio().await;
                match self.coordinator.trigger_play(None) {
                    Ok(()) => DaemonResponse::PlayQueued,
                    Err(e) => error_response(e),
                }
            }
            DaemonRequest::GetStatus => DaemonResponse::Status(self.status().await),
            DaemonRequest::SetReadaloud { enabled } => {
                ack(self.config.set_readaloud(enabled).await)
            }
            DaemonRequest::SetNightmodeOffset { hours } => {
                ack(self.config.set_nightmode_offset(hours).await)
            }
            DaemonRequest::SetBrightnessOnAlarm { enabled } => {
                ack(self.config.set_brightness_on_alarm(enabled).await)
            }
            DaemonRequest::Ping => DaemonResponse::Pong,
            DaemonRequest::Shutdown => DaemonResponse::Ok,
        }
    }

    pub async fn status(&self) -> StatusReport {
        let settings = self.config.snapshot().await;
        let alarm = self.scheduler.current_alarm();

        let mut pollers = Vec::with_capacity(self.pollers.len());
        for poller in &self.pollers {
            pollers.push(PollerStatus {
                name: poller.name().to_string(),
                state: poller.state().await,
            });
        }

        StatusReport {
            alarm: alarm.cloned(),
            playback: self.coordinator.state().await,
            night_mode: in_night_window(
                self.clock.now(),
                alarm,
                settings.alarm.nightmode_offset_hours,
            ),
            readaloud: settings.alarm.readaloud,
            nightmode_offset_hours: settings.alarm.nightmode_offset_hours,
            brightness_on_alarm: settings.alarm.brightness_on_alarm,
            radio_playing: self.radio.is_playing().await,
            pollers,
        }
    }

    async fn set_alarm(&mut self, time: AlarmTime) -> DaemonResponse {
        self.stop_radio().await;
        if self.scheduler.current_alarm().is_some() {
            self.discard_content();
        }
        let alarm = self.scheduler.set_alarm(time);
        DaemonResponse::AlarmSet { alarm }
    }

    async fn cancel_alarm(&mut self) -> DaemonResponse {
        self.stop_radio().await;
        let alarm = self.scheduler.cancel_alarm();
        if alarm.is_some() {
            self.discard_content();
        }
        DaemonResponse::AlarmCancelled { alarm }
    }

    async fn on_fire(&mut self, fire: AlarmFire) {
        let Some(fire) = self.scheduler.accept(fire) else {
            return;
        };

        match fire {
            AlarmFire::Prebuild { alarm_id } => {
                let time = self.scheduler.current_alarm().map(|a| a.time);
                match self.coordinator.trigger_prebuild(Some(alarm_id), time) {
                    Ok(true) => info!("Building content for alarm {}", alarm_id),
                    Ok(false) => self.scheduler.mark_build_failed(alarm_id),
                    Err(e) => {
                        error!("Cannot queue content build: {}", e);
                        self.scheduler.mark_build_failed(alarm_id);
                    }
                }
            }
            AlarmFire::Play { alarm_id } => {
                info!("Alarm {} going off", alarm_id);
                self.stop_radio().await;
                if let Err(e) = self.coordinator.trigger_play(Some(alarm_id)) {
                    error!("Cannot queue alarm playback: {}", e);
                }
            }
        }
    }

    async fn on_event(&mut self, event: PlaybackEvent) {
        debug!("Playback event: {:?}", event);
        match event {
            PlaybackEvent::Built { alarm_id } => {
                if let Some(id) = alarm_id {
                    self.scheduler.mark_built(id);
                }
            }
            PlaybackEvent::BuildFailed { alarm_id } => {
                if let Some(id) = alarm_id {
                    self.scheduler.mark_build_failed(id);
                }
            }
            PlaybackEvent::Finished { alarm_id, outcome } => {
                let handoff = match alarm_id {
                    Some(id) => self.scheduler.mark_completed(id).is_some(),
                    None => true,
                };
                info!("Playback finished ({:?})", outcome);
                if handoff {
                    self.start_radio().await;
                }
            }
        }
    }

    async fn start_radio(&self) {
        let settings = self.config.snapshot().await;
        if !settings.radio.enabled || settings.radio.url.trim().is_empty() {
            return;
        }
        if let Err(e) = self.radio.play(settings.radio.url.trim()).await {
            error!("Radio hand-off failed: {}", e);
        }
    }

    async fn stop_radio(&self) {
        if let Err(e) = self.radio.stop().await {
            warn!("Failed to stop radio: {}", e);
        }
    }

    fn discard_content(&self) {
        if let Err(e) = self.coordinator.discard() {
            warn!("Cannot discard built content: {}", e);
        }
    }
}

fn spawn_poller(
    name: &str,
    clock: Arc<dyn Clock>,
    config: &PollerConfig,
    retry_delay: std::time::Duration,
) -> crate::Result<RetryingPoller<String>> {
    let source = ConfiguredSource::new(name, config.options.clone(), build_source(&config.handler)?);
    Ok(source_poller(
        name,
        clock,
        source,
        std::time::Duration::from_secs(config.interval_secs),
        retry_delay,
    ))
}

fn ack(result: Result<()>) -> DaemonResponse {
    match result {
        Ok(()) => DaemonResponse::Ok,
        Err(e) => error_response(e),
    }
}

fn error_response(e: impl std::fmt::Display) -> DaemonResponse {
    DaemonResponse::Error {
        message: e.to_string(),
    }
}
