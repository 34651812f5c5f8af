//! Local speech synthesis with espeak-ng

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::process::Command;

use crate::tts::{AudioBlob, AudioPlayer, TtsBackend};
use crate::AlarmError;

const DEFAULT_VOICE: &str = "en";
const DEFAULT_SPEED: &str = "150";

pub struct EspeakBackend {
    player: AudioPlayer,
    voice: String,
    speed: String,
}

impl EspeakBackend {
    pub fn new(player: AudioPlayer, options: &HashMap<String, String>) -> Self {
        let option = |key: &str, default: &str| {
            options
                .get(key)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .unwrap_or(default)
                .to_string()
        };

        Self {
            player,
            voice: option("voice", DEFAULT_VOICE),
            speed: option("speed", DEFAULT_SPEED),
        }
    }
}

#[async_trait]
impl TtsBackend for EspeakBackend {
    fn name(&self) -> &'static str {
        "espeak"
    }

    async fn synthesize(&self, text: &str) -> crate::Result<AudioBlob> {
        let output = Command::new("espeak-ng")
            .args(["--stdout", "-v", &self.voice, "-s", &self.speed])
            .arg(text)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| AlarmError::Tts(format!("Failed to run espeak-ng: {}", e)))?;

        if !output.status.success() || output.stdout.is_empty() {
            return Err(AlarmError::Tts(format!(
                "espeak-ng exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(AudioBlob::wav(output.stdout))
    }

    async fn play(&self, audio: &AudioBlob) -> crate::Result<()> {
        self.player.play(audio).await
    }
}
