//! Alarm content builder
//!
//! Assembles greeting, content sources and closing phrase and has the active
//! TTS backend synthesize them. The greeting is synthesized on its own so it
//! can be restated at play time without touching the rest. A failing source
//! only costs its own section.

use chrono::{Duration as ChronoDuration, NaiveDateTime};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::alarm::clock::{next_occurrence, Clock};
use crate::alarm::AlarmTime;
use crate::config::Settings;
use crate::content::{enabled_sources, greeting, ConfiguredSource};
use crate::tts::{AudioBlob, TtsBackend};

/// Read in place of a section whose source failed
pub const SECTION_FAILED_PHRASE: &str = "Sorry, this part of the alarm is not available.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SectionKind {
    Greeting,
    Source(String),
    Closing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub kind: SectionKind,
    pub text: String,
    /// Whether the text is the failure phrase
    pub failed: bool,
}

/// Synthesized alarm content plus the text it was made from
#[derive(Debug, Clone)]
pub struct ContentArtifact {
    pub sections: Vec<Section>,
    /// `None` when there is no greeting or its synthesis failed
    pub greeting: Option<AudioBlob>,
    /// Every section after the greeting
    pub body: Option<AudioBlob>,
}

impl ContentArtifact {
    /// The full spoken text
    pub fn text(&self) -> String {
        join_sections(&self.sections)
    }

    /// Audio clips in playing order
    pub fn clips(&self) -> impl Iterator<Item = &AudioBlob> {
        self.greeting.iter().chain(self.body.iter())
    }

    fn greeting_section(&mut self) -> Option<&mut Section> {
        self.sections
            .iter_mut()
            .find(|s| s.kind == SectionKind::Greeting)
    }
}

pub struct AlarmContentBuilder {
    clock: Arc<dyn Clock>,
    tts: Arc<dyn TtsBackend>,
    sources: Vec<ConfiguredSource>,
    greeting: bool,
    closing: String,
}

impl AlarmContentBuilder {
    pub fn new(
        clock: Arc<dyn Clock>,
        tts: Arc<dyn TtsBackend>,
        sources: Vec<ConfiguredSource>,
    ) -> Self {
        Self {
            clock,
            tts,
            sources,
            greeting: true,
            closing: String::new(),
        }
    }

    /// Builder for the enabled sources of `settings`
    pub fn from_settings(
        settings: &Settings,
        clock: Arc<dyn Clock>,
        tts: Arc<dyn TtsBackend>,
    ) -> crate::Result<Self> {
        let sources = enabled_sources(&settings.content.sources)?;
        Ok(Self::new(clock, tts, sources)
            .with_greeting(settings.content.greeting)
            .with_closing(settings.content.closing.clone()))
    }

    pub fn with_greeting(mut self, enabled: bool) -> Self {
        self.greeting = enabled;
        self
    }

    pub fn with_closing(mut self, closing: impl Into<String>) -> Self {
        self.closing = closing.into();
        self
    }

    pub fn backend(&self) -> &Arc<dyn TtsBackend> {
        &self.tts
    }

    /// Collect the text of every section. Never fails: a source error is
    /// logged and replaced by [`SECTION_FAILED_PHRASE`].
    pub async fn compose(&self, alarm_time: Option<AlarmTime>) -> Vec<Section> {
        let mut sections = Vec::with_capacity(self.sources.len() + 2);

        if self.greeting {
            let now = self.clock.now();
            let at = match alarm_time {
                Some(time) => greeting_instant(time, now),
                None => now,
            };
            sections.push(Section {
                kind: SectionKind::Greeting,
                text: greeting(at),
                failed: false,
            });
        }

        for source in &self.sources {
            let (text, failed) = match source.fetch().await {
                Ok(text) => (text, false),
                Err(e) => {
                    warn!("Content source '{}' failed: {}", source.name, e);
                    (SECTION_FAILED_PHRASE.to_string(), true)
                }
            };
            debug!("Section '{}': {} chars", source.name, text.len());
            sections.push(Section {
                kind: SectionKind::Source(source.name.clone()),
                text,
                failed,
            });
        }

        if !self.closing.trim().is_empty() {
            sections.push(Section {
                kind: SectionKind::Closing,
                text: self.closing.trim().to_string(),
                failed: false,
            });
        }

        sections
    }

    /// Build the alarm content. `alarm_time` is stated in the greeting in
    /// place of the current time when given.
    ///
    /// Only synthesis can fail; the caller decides what to play instead.
    pub async fn build(&self, alarm_time: Option<AlarmTime>) -> crate::Result<ContentArtifact> {
        let sections = self.compose(alarm_time).await;
        self.synthesize(sections).await
    }

    /// Restate the greeting with the current time and synthesize only that.
    /// The body audio is left as it was built.
    ///
    /// On error the artifact keeps its body but loses its greeting audio, so a
    /// stale greeting is never played.
    pub async fn regenerate_greeting(&self, artifact: &mut ContentArtifact) -> crate::Result<()> {
        let now = self.clock.now();
        let Some(section) = artifact.greeting_section() else {
            return Ok(());
        };
        section.text = greeting(now);
        let text = section.text.clone();

        artifact.greeting = None;
        artifact.greeting = Some(self.tts.synthesize(&text).await?);
        debug!("Greeting restated for {}", now.format("%H:%M"));
        Ok(())
    }

    async fn synthesize(&self, sections: Vec<Section>) -> crate::Result<ContentArtifact> {
        let (greeting, body): (Vec<Section>, Vec<Section>) = sections
            .iter()
            .cloned()
            .partition(|s| s.kind == SectionKind::Greeting);

        let greeting = self.synthesize_text(&join_sections(&greeting)).await?;
        let body = self.synthesize_text(&join_sections(&body)).await?;

        info!(
            "Built alarm content: {} sections, {} bytes of audio from {}",
            sections.len(),
            greeting.iter().chain(body.iter()).map(|a| a.data.len()).sum::<usize>(),
            self.tts.name()
        );
        Ok(ContentArtifact {
            sections,
            greeting,
            body,
        })
    }

    async fn synthesize_text(&self, text: &str) -> crate::Result<Option<AudioBlob>> {
        if text.is_empty() {
            return Ok(None);
        }
        self.tts.synthesize(text).await.map(Some)
    }
}

fn join_sections(sections: &[Section]) -> String {
    sections
        .iter()
        .map(|s| s.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Instant an alarm at `time` refers to, as seen from `now`.
///
/// An alarm time within the last minute is still today's alarm.
fn greeting_instant(time: AlarmTime, now: NaiveDateTime) -> NaiveDateTime {
    next_occurrence(time, now - ChronoDuration::minutes(1))
}
