//! Text-to-speech backends
//!
//! Exactly one backend is active at a time: the single enabled entry in
//! `[[tts.backends]]`, or the offline [`ToneBackend`] when none is enabled.
//! The tone backend is also what playback falls back to when the active
//! backend fails.

mod espeak;
mod google;
mod player;
mod tone;

pub use espeak::EspeakBackend;
pub use google::GoogleBackend;
pub use player::AudioPlayer;
pub(crate) use player::split_command;
pub use tone::ToneBackend;

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::Settings;
use crate::AlarmError;

/// Encoding of a synthesized clip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Wav,
    Mp3,
}

/// Playable audio produced by a backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioBlob {
    pub format: AudioFormat,
    pub data: Vec<u8>,
}

impl AudioBlob {
    pub fn wav(data: Vec<u8>) -> Self {
        Self {
            format: AudioFormat::Wav,
            data,
        }
    }

    pub fn mp3(data: Vec<u8>) -> Self {
        Self {
            format: AudioFormat::Mp3,
            data,
        }
    }
}

/// A speech synthesizer that can also play what it produced
#[async_trait]
pub trait TtsBackend: Send + Sync {
    /// Registry key, for logging
    fn name(&self) -> &'static str;

    async fn synthesize(&self, text: &str) -> crate::Result<AudioBlob>;

    async fn play(&self, audio: &AudioBlob) -> crate::Result<()>;
}

/// Handler key, required option keys
const REGISTRY: &[(&str, &[&str])] = &[("tone", &[]), ("espeak", &[]), ("google", &[])];

/// Option keys a backend needs, or `None` if the backend is unknown
pub fn required_options(handler: &str) -> Option<&'static [&'static str]> {
    REGISTRY
        .iter()
        .find(|(key, _)| *key == handler)
        .map(|(_, required)| *required)
}

/// The offline backend used when nothing else is enabled or usable
pub fn fallback_backend(settings: &Settings) -> ToneBackend {
    ToneBackend::new(AudioPlayer::from_settings(&settings.playback), settings.tone_path())
}

/// Build the active backend from runtime settings.
pub fn build_backend(settings: &Settings) -> crate::Result<Arc<dyn TtsBackend>> {
    let mut enabled = settings.tts.backends.iter().filter(|b| b.enabled);
    let Some(config) = enabled.next() else {
        tracing::info!("No TTS backend enabled, using offline tone");
        return Ok(Arc::new(fallback_backend(settings)));
    };
    if enabled.next().is_some() {
        return Err(AlarmError::Config(
            "More than one TTS backend enabled".to_string(),
        ));
    }

    let player = AudioPlayer::from_settings(&settings.playback);
    let backend: Arc<dyn TtsBackend> = match config.handler.as_str() {
        "tone" => Arc::new(fallback_backend(settings)),
        "espeak" => Arc::new(EspeakBackend::new(player, &config.options)),
        "google" => Arc::new(GoogleBackend::new(player, &config.options)?),
        other => {
            return Err(AlarmError::Config(format!(
                "Unsupported TTS backend '{}'. Supported backends: tone, espeak, google",
                other
            )))
        }
    };

    tracing::info!("Using {} TTS backend", backend.name());
    Ok(backend)
}
