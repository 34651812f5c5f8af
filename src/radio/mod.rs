//! Internet radio played after the alarm

use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::RadioSettings;
use crate::tts::split_command;
use crate::AlarmError;

/// Starts and stops a radio stream
#[async_trait]
pub trait RadioStreamer: Send + Sync {
    /// Start streaming `url`, replacing any stream already playing
    async fn play(&self, url: &str) -> crate::Result<()>;

    /// Stop the stream; a no-op if nothing is playing
    async fn stop(&self) -> crate::Result<()>;

    async fn is_playing(&self) -> bool;
}

/// Streams through an external player process (mpv, mplayer, cvlc)
pub struct ProcessRadio {
    player: Vec<String>,
    child: Mutex<Option<Child>>,
}

impl ProcessRadio {
    pub fn new(player: &str) -> Self {
        Self {
            player: split_command(player),
            child: Mutex::new(None),
        }
    }

    pub fn from_settings(radio: &RadioSettings) -> Self {
        Self::new(&radio.player)
    }
}

#[async_trait]
impl RadioStreamer for ProcessRadio {
    async fn play(&self, url: &str) -> crate::Result<()> {
        let (program, args) = self
            .player
            .split_first()
            .ok_or_else(|| AlarmError::Radio("No radio player configured".to_string()))?;

        let mut guard = self.child.lock().await;
        if let Some(mut old) = guard.take() {
            let _ = old.kill().await;
        }

        let child = Command::new(program)
            .args(args)
            .arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AlarmError::Radio(format!("Failed to start {}: {}", program, e)))?;

        info!("Radio started: {}", url);
        *guard = Some(child);
        Ok(())
    }

    async fn stop(&self) -> crate::Result<()> {
        let mut guard = self.child.lock().await;
        if let Some(mut child) = guard.take() {
            if let Err(e) = child.kill().await {
                warn!("Failed to stop radio player: {}", e);
                return Err(e.into());
            }
            info!("Radio stopped");
        }
        Ok(())
    }

    async fn is_playing(&self) -> bool {
        let mut guard = self.child.lock().await;
        match guard.as_mut().map(|c| c.try_wait()) {
            Some(Ok(None)) => true,
            Some(_) => {
                // player exited on its own
                *guard = None;
                false
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn play_then_stop() {
        // `sleep 30` stands in for a player streaming a URL
        let radio = ProcessRadio::new("sleep");
        radio.play("30").await.unwrap();
        assert!(radio.is_playing().await);

        radio.stop().await.unwrap();
        assert!(!radio.is_playing().await);

        // idempotent
        radio.stop().await.unwrap();
    }

    #[tokio::test]
    async fn missing_player_is_a_radio_error() {
        let radio = ProcessRadio::new("/nonexistent/player");
        let err = radio.play("http://example.invalid/stream").await.unwrap_err();
        assert!(matches!(err, AlarmError::Radio(_)));
    }
}
