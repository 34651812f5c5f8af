//! Content sources read aloud by the alarm
//!
//! Each source turns its string options into a short piece of text. Sources
//! are looked up by handler key from a static registry when the settings are
//! validated, so a misspelled handler fails at startup instead of at 7am.

mod command;
mod greeting;
mod text;
mod weather;

pub use command::CommandSource;
pub use greeting::greeting;
pub use text::TextSource;
pub use weather::WeatherSource;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::SourceConfig;
use crate::AlarmError;

/// A provider of spoken text
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Produce the text for this section
    async fn fetch(&self, options: &HashMap<String, String>) -> crate::Result<String>;
}

/// Handler key, required option keys
const REGISTRY: &[(&str, &[&str])] = &[
    ("text", &["text"]),
    ("command", &["command"]),
    ("weather", &["latitude", "longitude"]),
];

/// Option keys a handler needs, or `None` if the handler is unknown
pub fn required_options(handler: &str) -> Option<&'static [&'static str]> {
    REGISTRY
        .iter()
        .find(|(key, _)| *key == handler)
        .map(|(_, required)| *required)
}

/// Instantiate the source registered under `handler`
pub fn build_source(handler: &str) -> crate::Result<Arc<dyn ContentSource>> {
    match handler {
        "text" => Ok(Arc::new(TextSource)),
        "command" => Ok(Arc::new(CommandSource)),
        "weather" => Ok(Arc::new(WeatherSource::new()?)),
        other => Err(AlarmError::Config(format!(
            "Unknown content source handler '{}'. Supported: {}",
            other,
            REGISTRY
                .iter()
                .map(|(key, _)| *key)
                .collect::<Vec<_>>()
                .join(", ")
        ))),
    }
}

/// A source together with its section name and options
#[derive(Clone)]
pub struct ConfiguredSource {
    pub name: String,
    pub options: HashMap<String, String>,
    pub source: Arc<dyn ContentSource>,
}

impl ConfiguredSource {
    pub fn new(
        name: impl Into<String>,
        options: HashMap<String, String>,
        source: Arc<dyn ContentSource>,
    ) -> Self {
        Self {
            name: name.into(),
            options,
            source,
        }
    }

    pub async fn fetch(&self) -> crate::Result<String> {
        self.source.fetch(&self.options).await
    }
}

impl std::fmt::Debug for ConfiguredSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfiguredSource")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Build the enabled sources, in configured order
pub fn enabled_sources(configs: &[SourceConfig]) -> crate::Result<Vec<ConfiguredSource>> {
    configs
        .iter()
        .filter(|c| c.enabled)
        .map(|c| {
            Ok(ConfiguredSource::new(
                c.name.clone(),
                c.options.clone(),
                build_source(&c.handler)?,
            ))
        })
        .collect()
}
