//! Configuration module for alarmpi
//!
//! Handles loading settings from TOML files and sharing them between the
//! daemon's components.

mod handle;
mod settings;

pub use handle::ConfigHandle;
pub use settings::{
    AlarmSettings, BackendConfig, ContentSettings, GeneralSettings, PlaybackSettings,
    PollerConfig, PollerSettings, RadioSettings, Settings, SourceConfig, TtsSettings,
    BRIGHTNESS_RANGE,
};
