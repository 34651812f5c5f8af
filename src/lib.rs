//! alarmpi - A talking alarm clock for the Raspberry Pi
//!
//! At the alarm time a greeting, the weather and any other configured
//! content is read aloud through a text-to-speech backend, optionally
//! followed by an internet radio stream.

pub mod alarm;
pub mod cli;
pub mod config;
pub mod content;
pub mod daemon;
pub mod poller;
pub mod radio;
pub mod tts;

use thiserror::Error;

/// Main error type for alarmpi
#[derive(Error, Debug)]
pub enum AlarmError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Content source '{source_name}' failed: {message}")]
    ContentSource {
        source_name: String,
        message: String,
    },

    #[error("TTS error: {0}")]
    Tts(String),

    #[error("Playback error: {0}")]
    Playback(String),

    #[error("Radio error: {0}")]
    Radio(String),

    #[error("IPC error: {0}")]
    Ipc(String),

    #[error("Daemon error: {0}")]
    Daemon(String),

    #[error("Invalid alarm time: {0}")]
    InvalidTime(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, AlarmError>;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "alarmpi";
