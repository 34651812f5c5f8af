//! Shared, mutable view of the settings
//!
//! The daemon owns one `ConfigHandle`; components receive clones and read
//! snapshots. Runtime toggles go through the setters here so they are
//! validated and persisted in one place.

use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::config::Settings;

#[derive(Debug, Clone)]
pub struct ConfigHandle {
    inner: Arc<RwLock<Settings>>,
    persist_to: Option<PathBuf>,
}

impl ConfigHandle {
    /// In-memory handle; setters are not written back
    pub fn new(settings: Settings) -> Self {
        Self {
            inner: Arc::new(RwLock::new(settings)),
            persist_to: None,
        }
    }

    /// Handle whose setters also rewrite the config file at `path`
    pub fn persistent(settings: Settings, path: PathBuf) -> Self {
        Self {
            inner: Arc::new(RwLock::new(settings)),
            persist_to: Some(path),
        }
    }

    /// Copy of the current settings
    pub async fn snapshot(&self) -> Settings {
        self.inner.read().await.clone()
    }

    pub async fn set_readaloud(&self, enabled: bool) -> Result<()> {
        self.update(|s| s.alarm.readaloud = enabled).await?;
        info!("Readaloud {}", if enabled { "enabled" } else { "disabled" });
        Ok(())
    }

    pub async fn set_nightmode_offset(&self, hours: u32) -> Result<()> {
        if hours > 24 {
            anyhow::bail!("Night mode offset must be at most 24 hours, got {}", hours);
        }
        self.update(|s| s.alarm.nightmode_offset_hours = hours).await?;
        info!("Night mode offset set to {}h", hours);
        Ok(())
    }

    pub async fn set_brightness_on_alarm(&self, enabled: bool) -> Result<()> {
        self.update(|s| s.alarm.brightness_on_alarm = enabled).await
    }

    async fn update(&self, apply: impl FnOnce(&mut Settings)) -> Result<()> {
        let mut guard = self.inner.write().await;
        apply(&mut guard);

        if let Some(path) = &self.persist_to {
            if let Err(e) = guard.save(path) {
                warn!("Failed to persist settings to {}: {}", path.display(), e);
                return Err(e);
            }
        }

        Ok(())
    }
}
