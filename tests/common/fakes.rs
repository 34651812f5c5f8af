//! In-process stand-ins for the external leaves

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alarmpi::content::{ConfiguredSource, ContentSource};
use alarmpi::radio::RadioStreamer;
use alarmpi::tts::{AudioBlob, AudioPlayer, ToneBackend, TtsBackend};
use alarmpi::AlarmError;

/// Tuesday, May 14 2024 at `h:m:s`
pub fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 5, 14)
        .unwrap()
        .and_hms_opt(h, m, s)
        .unwrap()
}

pub struct FakeSource {
    reply: Result<String, String>,
    delay: Duration,
    fetches: AtomicUsize,
}

impl FakeSource {
    pub fn ok(text: &str) -> Arc<Self> {
        Self::new(Ok(text.to_string()), Duration::ZERO)
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Self::new(Err(message.to_string()), Duration::ZERO)
    }

    pub fn slow(text: &str, delay: Duration) -> Arc<Self> {
        Self::new(Ok(text.to_string()), delay)
    }

    fn new(reply: Result<String, String>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            reply,
            delay,
            fetches: AtomicUsize::new(0),
        })
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Wrap as a named section
    pub fn configured(self: &Arc<Self>, name: &str) -> ConfiguredSource {
        ConfiguredSource::new(name, HashMap::new(), self.clone())
    }
}

#[async_trait]
impl ContentSource for FakeSource {
    async fn fetch(&self, _options: &HashMap<String, String>) -> alarmpi::Result<String> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.reply.clone().map_err(|message| AlarmError::ContentSource {
            source_name: "fake".to_string(),
            message,
        })
    }
}

/// Backend that "synthesizes" text into its UTF-8 bytes and records calls
#[derive(Default)]
pub struct RecordingBackend {
    synthesized: Mutex<Vec<String>>,
    played: Mutex<Vec<String>>,
    /// Syntheses left before every further one fails; `None` is unlimited
    synthesis_budget: Mutex<Option<usize>>,
    fail_playback: AtomicBool,
}

impl RecordingBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing_synthesis() -> Arc<Self> {
        Self::failing_synthesis_after(0)
    }

    /// Synthesizes `count` times, then fails
    pub fn failing_synthesis_after(count: usize) -> Arc<Self> {
        let backend = Self::default();
        *backend.synthesis_budget.lock().unwrap() = Some(count);
        Arc::new(backend)
    }

    pub fn failing_playback() -> Arc<Self> {
        let backend = Self::default();
        backend.fail_playback.store(true, Ordering::SeqCst);
        Arc::new(backend)
    }

    pub fn synthesized(&self) -> Vec<String> {
        self.synthesized.lock().unwrap().clone()
    }

    pub fn played(&self) -> Vec<String> {
        self.played.lock().unwrap().clone()
    }
}

#[async_trait]
impl TtsBackend for RecordingBackend {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn synthesize(&self, text: &str) -> alarmpi::Result<AudioBlob> {
        self.synthesized.lock().unwrap().push(text.to_string());
        if let Some(left) = self.synthesis_budget.lock().unwrap().as_mut() {
            if *left == 0 {
                return Err(AlarmError::Tts("network unreachable".to_string()));
            }
            *left -= 1;
        }
        Ok(AudioBlob::wav(text.as_bytes().to_vec()))
    }

    async fn play(&self, audio: &AudioBlob) -> alarmpi::Result<()> {
        if self.fail_playback.load(Ordering::SeqCst) {
            return Err(AlarmError::Playback("sound card busy".to_string()));
        }
        self.played
            .lock()
            .unwrap()
            .push(String::from_utf8_lossy(&audio.data).to_string());
        Ok(())
    }
}

/// Tone fallback playing through `wav_player`
pub fn tone(wav_player: &str) -> Arc<ToneBackend> {
    Arc::new(ToneBackend::new(AudioPlayer::new(wav_player, "true"), None))
}

#[derive(Default)]
pub struct FakeRadio {
    started: Mutex<Vec<String>>,
    stops: AtomicUsize,
    playing: AtomicBool,
}

impl FakeRadio {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn started(&self) -> Vec<String> {
        self.started.lock().unwrap().clone()
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RadioStreamer for FakeRadio {
    async fn play(&self, url: &str) -> alarmpi::Result<()> {
        self.started.lock().unwrap().push(url.to_string());
        self.playing.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> alarmpi::Result<()> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.playing.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }
}
