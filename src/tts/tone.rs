//! Offline alarm tone
//!
//! Needs no network and no credentials: either the configured tone file or
//! a beep pattern rendered in memory.

use async_trait::async_trait;
use std::f32::consts::PI;
use std::io::Cursor;
use std::path::PathBuf;
use tracing::warn;

use crate::tts::{AudioBlob, AudioPlayer, TtsBackend};

const SAMPLE_RATE: u32 = 16000;
const BEEP_HZ: f32 = 880.0;
const BEEP_SECS: f32 = 0.25;
const GAP_SECS: f32 = 0.15;
const BEEPS: usize = 8;

pub struct ToneBackend {
    player: AudioPlayer,
    tone_file: Option<PathBuf>,
}

impl ToneBackend {
    pub fn new(player: AudioPlayer, tone_file: Option<PathBuf>) -> Self {
        Self { player, tone_file }
    }

    /// The alarm tone; a read failure on the tone file falls back to the beep
    pub async fn tone(&self) -> AudioBlob {
        if let Some(path) = &self.tone_file {
            match tokio::fs::read(path).await {
                Ok(data) => return AudioBlob::wav(data),
                Err(e) => warn!("Cannot read alarm tone {}: {}", path.display(), e),
            }
        }
        AudioBlob::wav(render_beeps())
    }
}

#[async_trait]
impl TtsBackend for ToneBackend {
    fn name(&self) -> &'static str {
        "tone"
    }

    async fn synthesize(&self, _text: &str) -> crate::Result<AudioBlob> {
        Ok(self.tone().await)
    }

    async fn play(&self, audio: &AudioBlob) -> crate::Result<()> {
        self.player.play(audio).await
    }
}

/// 16 bit mono WAV with `BEEPS` short sine beeps
pub fn render_beeps() -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let beep_len = (SAMPLE_RATE as f32 * BEEP_SECS) as usize;
    let gap_len = (SAMPLE_RATE as f32 * GAP_SECS) as usize;
    let amplitude = i16::MAX as f32 * 0.6;

    let mut buffer = Cursor::new(Vec::new());
    // writing into memory cannot fail short of allocation failure
    if let Ok(mut writer) = hound::WavWriter::new(&mut buffer, spec) {
        for _ in 0..BEEPS {
            for n in 0..beep_len {
                let t = n as f32 / SAMPLE_RATE as f32;
                let sample = (2.0 * PI * BEEP_HZ * t).sin() * amplitude;
                let _ = writer.write_sample(sample as i16);
            }
            for _ in 0..gap_len {
                let _ = writer.write_sample(0i16);
            }
        }
        let _ = writer.finalize();
    }
    buffer.into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tts::AudioFormat;

    #[test]
    fn beeps_are_valid_wav() {
        let data = render_beeps();
        let reader = hound::WavReader::new(Cursor::new(data)).unwrap();
        assert_eq!(reader.spec().sample_rate, SAMPLE_RATE);
        assert_eq!(reader.spec().channels, 1);
        assert!(reader.duration() > SAMPLE_RATE);
    }

    #[tokio::test]
    async fn missing_tone_file_falls_back_to_beeps() {
        let backend = ToneBackend::new(
            AudioPlayer::new("cat", "cat"),
            Some(PathBuf::from("/nonexistent/alarm.wav")),
        );
        let audio = backend.synthesize("ignored").await.unwrap();
        assert_eq!(audio.format, AudioFormat::Wav);
        assert_eq!(audio.data, render_beeps());
    }

    #[tokio::test]
    async fn configured_tone_file_is_used() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("tone.wav");
        std::fs::write(&path, b"RIFFtone").unwrap();

        let backend = ToneBackend::new(AudioPlayer::new("cat", "cat"), Some(path));
        assert_eq!(backend.tone().await.data, b"RIFFtone".to_vec());
    }
}
