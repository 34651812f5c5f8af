//! Alarm playback coordinator
//!
//! Runs content building and playback on one background worker so the
//! daemon's event loop never waits on the network, the synthesizer or the
//! speaker. Work is queued and handled strictly one task at a time; every
//! play request ends in exactly one [`PlaybackEvent::Finished`].

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::alarm::builder::{AlarmContentBuilder, ContentArtifact};
use crate::alarm::AlarmTime;
use crate::config::ConfigHandle;
use crate::tts::{ToneBackend, TtsBackend};
use crate::AlarmError;

/// What the worker is doing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    Idle,
    Building,
    Built,
    Playing,
}

/// How an alarm ended up being played
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackOutcome {
    /// The content was read aloud
    Spoken,
    /// Synthesis or playback failed; the alarm tone was played instead
    FallbackTone,
    /// Readaloud is off or there was nothing to say; only the alarm tone
    /// was played
    ToneOnly,
}

/// Notifications from the worker to the event loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEvent {
    /// Content for the alarm is ready
    Built { alarm_id: Option<u64> },
    /// Content could not be built ahead of time
    BuildFailed { alarm_id: Option<u64> },
    /// A play request finished
    Finished {
        alarm_id: Option<u64>,
        outcome: PlaybackOutcome,
    },
}

pub type EventReceiver = mpsc::UnboundedReceiver<PlaybackEvent>;

/// Thread-safe state container
pub type SharedPlaybackState = Arc<RwLock<PlaybackState>>;

#[derive(Debug)]
enum Task {
    Prebuild {
        alarm_id: Option<u64>,
        alarm_time: Option<AlarmTime>,
    },
    Play {
        alarm_id: Option<u64>,
    },
    Discard,
}

pub struct AlarmPlaybackCoordinator {
    tasks: mpsc::UnboundedSender<Task>,
    state: SharedPlaybackState,
    prebuild_pending: Arc<AtomicBool>,
    worker: JoinHandle<()>,
}

impl AlarmPlaybackCoordinator {
    /// Start the background worker
    pub fn spawn(
        builder: AlarmContentBuilder,
        fallback: Arc<ToneBackend>,
        config: ConfigHandle,
    ) -> (Self, EventReceiver) {
        let (task_tx, task_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let state = Arc::new(RwLock::new(PlaybackState::Idle));
        let prebuild_pending = Arc::new(AtomicBool::new(false));

        let worker = Worker {
            builder,
            fallback,
            config,
            state: state.clone(),
            prebuild_pending: prebuild_pending.clone(),
            events: event_tx,
            artifact: None,
        };
        let handle = tokio::spawn(worker.run(task_rx));

        let coordinator = Self {
            tasks: task_tx,
            state,
            prebuild_pending,
            worker: handle,
        };
        (coordinator, event_rx)
    }

    /// Queue a content build. Returns `false` without queueing if a build is
    /// already queued or running.
    pub fn trigger_prebuild(
        &self,
        alarm_id: Option<u64>,
        alarm_time: Option<AlarmTime>,
    ) -> crate::Result<bool> {
        if self.prebuild_pending.swap(true, Ordering::SeqCst) {
            info!("Content build already in progress");
            return Ok(false);
        }
        if let Err(e) = self.submit(Task::Prebuild {
            alarm_id,
            alarm_time,
        }) {
            self.prebuild_pending.store(false, Ordering::SeqCst);
            return Err(e);
        }
        Ok(true)
    }

    /// Queue playback. Runs after any queued or running build; builds the
    /// content first if nothing was built.
    pub fn trigger_play(&self, alarm_id: Option<u64>) -> crate::Result<()> {
        self.submit(Task::Play { alarm_id })
    }

    /// Drop prebuilt content once the work queued before it is done
    pub fn discard(&self) -> crate::Result<()> {
        self.submit(Task::Discard)
    }

    pub async fn state(&self) -> PlaybackState {
        *self.state.read().await
    }

    /// Stop the worker, abandoning queued work
    pub fn shutdown(self) {
        self.worker.abort();
    }

    fn submit(&self, task: Task) -> crate::Result<()> {
        self.tasks
            .send(task)
            .map_err(|_| AlarmError::Daemon("Playback worker has stopped".to_string()))
    }
}

impl Drop for AlarmPlaybackCoordinator {
    fn drop(&mut self) {
        self.worker.abort();
    }
}

struct Worker {
    builder: AlarmContentBuilder,
    fallback: Arc<ToneBackend>,
    config: ConfigHandle,
    state: SharedPlaybackState,
    prebuild_pending: Arc<AtomicBool>,
    events: mpsc::UnboundedSender<PlaybackEvent>,
    artifact: Option<ContentArtifact>,
}

impl Worker {
    async fn run(mut self, mut tasks: mpsc::UnboundedReceiver<Task>) {
        while let Some(task) = tasks.recv().await {
            match task {
                Task::Prebuild {
                    alarm_id,
                    alarm_time,
                } => self.prebuild(alarm_id, alarm_time).await,
                Task::Play { alarm_id } => {
                    let outcome = self.play().await;
                    self.set_state(PlaybackState::Idle).await;
                    info!("Alarm playback finished: {:?}", outcome);
                    self.notify(PlaybackEvent::Finished { alarm_id, outcome });
                }
                Task::Discard => {
                    if self.artifact.take().is_some() {
                        info!("Discarded prebuilt alarm content");
                    }
                    self.set_state(PlaybackState::Idle).await;
                }
            }
        }
    }

    async fn prebuild(&mut self, alarm_id: Option<u64>, alarm_time: Option<AlarmTime>) {
        self.set_state(PlaybackState::Building).await;

        let event = match self.builder.build(alarm_time).await {
            Ok(artifact) => {
                self.artifact = Some(artifact);
                self.set_state(PlaybackState::Built).await;
                PlaybackEvent::Built { alarm_id }
            }
            Err(e) => {
                warn!("Building alarm content failed, will retry at alarm time: {}", e);
                self.artifact = None;
                self.set_state(PlaybackState::Idle).await;
                PlaybackEvent::BuildFailed { alarm_id }
            }
        };

        self.prebuild_pending.store(false, Ordering::SeqCst);
        self.notify(event);
    }

    async fn play(&mut self) -> PlaybackOutcome {
        let settings = self.config.snapshot().await;
        if !settings.alarm.readaloud {
            self.artifact = None;
            self.set_state(PlaybackState::Playing).await;
            self.play_tone().await;
            return PlaybackOutcome::ToneOnly;
        }

        let built = match self.artifact.take() {
            Some(mut artifact) => {
                if let Err(e) = self.builder.regenerate_greeting(&mut artifact).await {
                    warn!("Greeting could not be restated, playing prebuilt content without it: {}", e);
                }
                Ok(artifact)
            }
            None => {
                self.set_state(PlaybackState::Building).await;
                self.builder.build(None).await
            }
        };

        self.set_state(PlaybackState::Playing).await;

        let artifact = match built {
            Ok(artifact) => artifact,
            Err(e) => {
                error!("Alarm content unavailable, playing alarm tone: {}", e);
                self.play_tone().await;
                return PlaybackOutcome::FallbackTone;
            }
        };

        if artifact.clips().next().is_none() {
            info!("Nothing to read aloud, playing alarm tone");
            self.play_tone().await;
            return PlaybackOutcome::ToneOnly;
        }

        for clip in artifact.clips() {
            if let Err(e) = self.builder.backend().play(clip).await {
                error!("Playing alarm content failed, playing alarm tone: {}", e);
                self.play_tone().await;
                return PlaybackOutcome::FallbackTone;
            }
        }
        PlaybackOutcome::Spoken
    }

    async fn play_tone(&self) {
        let tone = self.fallback.tone().await;
        if let Err(e) = self.fallback.play(&tone).await {
            error!("Alarm tone playback failed: {}", e);
        }
    }

    async fn set_state(&self, state: PlaybackState) {
        *self.state.write().await = state;
    }

    fn notify(&self, event: PlaybackEvent) {
        if self.events.send(event).is_err() {
            warn!("Playback event dropped, event loop is gone");
        }
    }
}
