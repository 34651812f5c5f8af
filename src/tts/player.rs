//! External audio players fed through stdin

use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::config::PlaybackSettings;
use crate::tts::{AudioBlob, AudioFormat};
use crate::AlarmError;

/// Plays audio by piping it into a player process
#[derive(Debug, Clone)]
pub struct AudioPlayer {
    wav_player: Vec<String>,
    mp3_player: Vec<String>,
}

impl AudioPlayer {
    pub fn new(wav_player: &str, mp3_player: &str) -> Self {
        Self {
            wav_player: split_command(wav_player),
            mp3_player: split_command(mp3_player),
        }
    }

    pub fn from_settings(playback: &PlaybackSettings) -> Self {
        Self::new(&playback.wav_player, &playback.mp3_player)
    }

    /// Play `audio` and wait until the player exits
    pub async fn play(&self, audio: &AudioBlob) -> crate::Result<()> {
        let argv = match audio.format {
            AudioFormat::Wav => &self.wav_player,
            AudioFormat::Mp3 => &self.mp3_player,
        };
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| AlarmError::Playback("No audio player configured".to_string()))?;

        debug!("Playing {} bytes with {}", audio.data.len(), program);

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AlarmError::Playback(format!("Failed to start {}: {}", program, e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            // a player that already exited is reported through its status
            if let Err(e) = stdin.write_all(&audio.data).await {
                if e.kind() != std::io::ErrorKind::BrokenPipe {
                    return Err(e.into());
                }
            }
            drop(stdin);
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            return Err(AlarmError::Playback(format!(
                "{} exited with {}: {}",
                program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(())
    }
}

/// Split a configured command line on whitespace
pub(crate) fn split_command(command: &str) -> Vec<String> {
    command.split_whitespace().map(str::to_string).collect()
}
