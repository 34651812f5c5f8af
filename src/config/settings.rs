//! Application settings management

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::alarm::AlarmTime;
use crate::AlarmError;

/// Allowed range for the display backlight value
pub const BRIGHTNESS_RANGE: std::ops::RangeInclusive<u32> = 9..=255;

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// General settings
    #[serde(default)]
    pub general: GeneralSettings,

    /// Alarm behaviour
    #[serde(default)]
    pub alarm: AlarmSettings,

    /// Audio players used for synthesized speech
    #[serde(default)]
    pub playback: PlaybackSettings,

    /// Spoken content assembled for each alarm
    #[serde(default)]
    pub content: ContentSettings,

    /// Text-to-speech backends
    #[serde(default)]
    pub tts: TtsSettings,

    /// Radio played after the alarm
    #[serde(default)]
    pub radio: RadioSettings,

    /// Side-panel pollers
    #[serde(default)]
    pub pollers: PollerSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralSettings {
    /// Data directory for generated audio
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlarmSettings {
    /// Alarm armed when the daemon starts ("HH:MM", empty = none)
    #[serde(default)]
    pub default_time: String,

    /// How long before the alarm its content is built
    #[serde(default = "default_prebuild_lead_secs")]
    pub prebuild_lead_secs: u64,

    /// Read the alarm content aloud (off = tone only)
    #[serde(default = "default_true")]
    pub readaloud: bool,

    /// Hours before an armed alarm during which the display is in night mode
    #[serde(default = "default_nightmode_offset_hours")]
    pub nightmode_offset_hours: u32,

    /// Display backlight value
    #[serde(default = "default_brightness")]
    pub brightness: u32,

    /// Raise the display to full brightness when the alarm plays
    #[serde(default = "default_true")]
    pub brightness_on_alarm: bool,

    /// Custom alarm tone (WAV). Empty = generated beep
    #[serde(default)]
    pub tone_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackSettings {
    /// Command that plays WAV data from stdin
    #[serde(default = "default_wav_player")]
    pub wav_player: String,

    /// Command that plays MP3 data from stdin
    #[serde(default = "default_mp3_player")]
    pub mp3_player: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentSettings {
    /// Start the alarm with a spoken greeting
    #[serde(default = "default_true")]
    pub greeting: bool,

    /// Phrase read after all content sections
    #[serde(default = "default_closing")]
    pub closing: String,

    /// Content sources, read in this order
    #[serde(default = "default_sources")]
    pub sources: Vec<SourceConfig>,
}

/// One content source entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Section name used in logs and status
    pub name: String,

    /// Registry key of the implementation (text, command, weather)
    pub handler: String,

    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub options: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsSettings {
    /// Configured backends; at most one may be enabled
    #[serde(default = "default_backends")]
    pub backends: Vec<BackendConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Registry key of the implementation (tone, espeak, google)
    pub handler: String,

    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub options: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RadioSettings {
    /// Start the radio once the alarm has been read
    #[serde(default)]
    pub enabled: bool,

    /// Stream URL
    #[serde(default = "default_radio_url")]
    pub url: String,

    /// Player command; the URL is appended
    #[serde(default = "default_radio_player")]
    pub player: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollerSettings {
    /// Delay of the single retry after a failed poll
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,

    #[serde(default = "default_weather_poller")]
    pub weather: PollerConfig,

    #[serde(default = "default_trains_poller")]
    pub trains: PollerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollerConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_poll_interval_secs")]
    pub interval_secs: u64,

    /// Content source polled for the side panel
    pub handler: String,

    #[serde(default)]
    pub options: HashMap<String, String>,
}

// Default value functions

fn default_data_dir() -> PathBuf {
    ProjectDirs::from("com", "alarmpi", "alarmpi")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("~/.local/share/alarmpi"))
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_prebuild_lead_secs() -> u64 {
    300
}

fn default_true() -> bool {
    true
}

fn default_nightmode_offset_hours() -> u32 {
    8
}

fn default_brightness() -> u32 {
    255
}

fn default_wav_player() -> String {
    "aplay -q".to_string()
}

fn default_mp3_player() -> String {
    "mpg123 -q -".to_string()
}

fn default_closing() -> String {
    "That's all for now. Have a nice day.".to_string()
}

fn default_sources() -> Vec<SourceConfig> {
    vec![SourceConfig {
        name: "weather".to_string(),
        handler: "weather".to_string(),
        enabled: false,
        options: HashMap::from([
            ("latitude".to_string(), "60.17".to_string()),
            ("longitude".to_string(), "24.94".to_string()),
            ("location".to_string(), "Helsinki".to_string()),
        ]),
    }]
}

fn default_backends() -> Vec<BackendConfig> {
    vec![
        BackendConfig {
            handler: "espeak".to_string(),
            enabled: false,
            options: HashMap::new(),
        },
        BackendConfig {
            handler: "google".to_string(),
            enabled: false,
            options: HashMap::from([("lang".to_string(), "en".to_string())]),
        },
    ]
}

fn default_radio_url() -> String {
    "https://icecast.omroep.nl/radio1-bb-mp3".to_string()
}

fn default_radio_player() -> String {
    "mpv --no-video --really-quiet".to_string()
}

fn default_retry_delay_secs() -> u64 {
    10
}

fn default_poll_interval_secs() -> u64 {
    1800
}

fn default_weather_poller() -> PollerConfig {
    PollerConfig {
        enabled: false,
        interval_secs: default_poll_interval_secs(),
        handler: "weather".to_string(),
        options: HashMap::from([
            ("latitude".to_string(), "60.17".to_string()),
            ("longitude".to_string(), "24.94".to_string()),
        ]),
    }
}

fn default_trains_poller() -> PollerConfig {
    PollerConfig {
        enabled: false,
        interval_secs: 120,
        handler: "command".to_string(),
        options: HashMap::from([("command".to_string(), "echo no trains configured".to_string())]),
    }
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_level: default_log_level(),
        }
    }
}

impl Default for AlarmSettings {
    fn default() -> Self {
        Self {
            default_time: String::new(),
            prebuild_lead_secs: default_prebuild_lead_secs(),
            readaloud: true,
            nightmode_offset_hours: default_nightmode_offset_hours(),
            brightness: default_brightness(),
            brightness_on_alarm: true,
            tone_path: String::new(),
        }
    }
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            wav_player: default_wav_player(),
            mp3_player: default_mp3_player(),
        }
    }
}

impl Default for ContentSettings {
    fn default() -> Self {
        Self {
            greeting: true,
            closing: default_closing(),
            sources: default_sources(),
        }
    }
}

impl Default for TtsSettings {
    fn default() -> Self {
        Self {
            backends: default_backends(),
        }
    }
}

impl Default for RadioSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            url: default_radio_url(),
            player: default_radio_player(),
        }
    }
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            retry_delay_secs: default_retry_delay_secs(),
            weather: default_weather_poller(),
            trains: default_trains_poller(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            general: GeneralSettings::default(),
            alarm: AlarmSettings::default(),
            playback: PlaybackSettings::default(),
            content: ContentSettings::default(),
            tts: TtsSettings::default(),
            radio: RadioSettings::default(),
            pollers: PollerSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings from the configuration file
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            tracing::info!("No config file found, using defaults");
            let mut settings = Self::default();
            settings.apply_env_overrides();
            return Ok(settings);
        }

        Self::load_from(&config_path)
    }

    /// Load settings from an explicit path
    pub fn load_from(config_path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut settings: Settings = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        settings.apply_env_overrides();

        Ok(settings)
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("ALARMPI_RADIO_URL") {
            if !url.trim().is_empty() {
                self.radio.url = url;
            }
        }
    }

    /// Get the path to the configuration file
    pub fn config_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("com", "alarmpi", "alarmpi")
            .context("Could not determine config directory")?;

        let config_dir = dirs.config_dir();
        Ok(config_dir.join("config.toml"))
    }

    /// Write default configuration to a file
    pub fn write_default(path: &Path) -> Result<()> {
        Self::default().save(path)
    }

    /// Serialize these settings to `path`
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check the settings for combinations the daemon refuses to run with
    pub fn validate(&self) -> crate::Result<()> {
        let enabled: Vec<&str> = self
            .tts
            .backends
            .iter()
            .filter(|b| b.enabled)
            .map(|b| b.handler.as_str())
            .collect();
        if enabled.len() > 1 {
            return Err(AlarmError::Config(format!(
                "More than one TTS backend enabled: {}",
                enabled.join(", ")
            )));
        }

        for backend in &self.tts.backends {
            let required = crate::tts::required_options(&backend.handler).ok_or_else(|| {
                AlarmError::Config(format!("Unknown TTS backend '{}'", backend.handler))
            })?;
            if backend.enabled {
                check_options("TTS backend", &backend.handler, required, &backend.options)?;
            }
        }

        for source in &self.content.sources {
            let required = crate::content::required_options(&source.handler).ok_or_else(|| {
                AlarmError::Config(format!(
                    "Unknown content source handler '{}' for '{}'",
                    source.handler, source.name
                ))
            })?;
            if source.enabled {
                check_options("Content source", &source.name, required, &source.options)?;
            }
        }

        for (name, poller) in [("weather", &self.pollers.weather), ("trains", &self.pollers.trains)] {
            if !poller.enabled {
                continue;
            }
            let required = crate::content::required_options(&poller.handler).ok_or_else(|| {
                AlarmError::Config(format!(
                    "Unknown content source handler '{}' for {} poller",
                    poller.handler, name
                ))
            })?;
            check_options("Poller", name, required, &poller.options)?;
            if poller.interval_secs == 0 {
                return Err(AlarmError::Config(format!(
                    "pollers.{}.interval_secs must be greater than zero",
                    name
                )));
            }
        }

        if self.pollers.retry_delay_secs == 0 {
            return Err(AlarmError::Config(
                "pollers.retry_delay_secs must be greater than zero".to_string(),
            ));
        }

        if !BRIGHTNESS_RANGE.contains(&self.alarm.brightness) {
            return Err(AlarmError::Config(format!(
                "alarm.brightness {} is outside {}..={}",
                self.alarm.brightness,
                BRIGHTNESS_RANGE.start(),
                BRIGHTNESS_RANGE.end()
            )));
        }

        self.default_alarm_time()?;

        Ok(())
    }

    /// Alarm armed at startup, if one is configured
    pub fn default_alarm_time(&self) -> crate::Result<Option<AlarmTime>> {
        let raw = self.alarm.default_time.trim();
        if raw.is_empty() {
            return Ok(None);
        }
        raw.parse::<AlarmTime>()
            .map(Some)
            .map_err(|e| AlarmError::Config(format!("alarm.default_time: {}", e)))
    }

    /// Content build lead before the alarm
    pub fn prebuild_lead(&self) -> Duration {
        Duration::from_secs(self.alarm.prebuild_lead_secs)
    }

    /// Delay of the single poller retry
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.pollers.retry_delay_secs)
    }

    /// The single enabled TTS backend, if any
    pub fn enabled_backend(&self) -> Option<&BackendConfig> {
        self.tts.backends.iter().find(|b| b.enabled)
    }

    /// Custom alarm tone, if configured
    pub fn tone_path(&self) -> Option<PathBuf> {
        let raw = self.alarm.tone_path.trim();
        (!raw.is_empty()).then(|| PathBuf::from(raw))
    }

    /// Directory for generated audio
    pub fn audio_dir(&self) -> PathBuf {
        self.general.data_dir.join("audio")
    }

    /// Get the Unix socket path for IPC
    pub fn socket_path(&self) -> PathBuf {
        let runtime_dir = std::env::var("XDG_RUNTIME_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"));
        runtime_dir.join("alarmpi.sock")
    }

    /// Get the PID file path
    pub fn pid_path(&self) -> PathBuf {
        let runtime_dir = std::env::var("XDG_RUNTIME_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"));
        runtime_dir.join("alarmpi.pid")
    }

    /// Ensure all required directories exist
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.general.data_dir)?;
        std::fs::create_dir_all(self.audio_dir())?;
        Ok(())
    }
}

fn check_options(
    kind: &str,
    name: &str,
    required: &[&str],
    options: &HashMap<String, String>,
) -> crate::Result<()> {
    for key in required {
        let present = options.get(*key).is_some_and(|v| !v.trim().is_empty());
        if !present {
            return Err(AlarmError::Config(format!(
                "{} '{}' is missing required option '{}'",
                kind, name, key
            )));
        }
    }
    Ok(())
}
