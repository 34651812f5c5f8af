//! Google Translate speech endpoint
//!
//! Free to use without credentials but limited to short requests, so the
//! text is sent in chunks and the returned MP3 frames are concatenated.

use async_trait::async_trait;
use reqwest::Client;
use std::collections::HashMap;

use crate::tts::{AudioBlob, AudioPlayer, TtsBackend};
use crate::AlarmError;

const DEFAULT_ENDPOINT: &str = "https://translate.google.com/translate_tts";
const MAX_CHUNK_CHARS: usize = 200;

pub struct GoogleBackend {
    http: Client,
    player: AudioPlayer,
    lang: String,
    endpoint: String,
}

impl GoogleBackend {
    pub fn new(player: AudioPlayer, options: &HashMap<String, String>) -> crate::Result<Self> {
        let lang = options
            .get("lang")
            .map(|l| l.trim())
            .filter(|l| !l.is_empty())
            .unwrap_or("en")
            .to_string();
        let endpoint = options
            .get("endpoint")
            .map(|e| e.trim().trim_end_matches('/').to_string())
            .filter(|e| !e.is_empty())
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());

        Ok(Self {
            http: Client::builder()
                .timeout(std::time::Duration::from_secs(20))
                .build()?,
            player,
            lang,
            endpoint,
        })
    }
}

#[async_trait]
impl TtsBackend for GoogleBackend {
    fn name(&self) -> &'static str {
        "google"
    }

    async fn synthesize(&self, text: &str) -> crate::Result<AudioBlob> {
        let chunks = chunk_text(text, MAX_CHUNK_CHARS);
        let total = chunks.len().to_string();
        let mut audio = Vec::new();

        for (idx, chunk) in chunks.iter().enumerate() {
            let response = self
                .http
                .get(&self.endpoint)
                .query(&[
                    ("ie", "UTF-8"),
                    ("client", "tw-ob"),
                    ("tl", self.lang.as_str()),
                    ("q", chunk.as_str()),
                    ("total", total.as_str()),
                    ("idx", idx.to_string().as_str()),
                    ("textlen", chunk.chars().count().to_string().as_str()),
                ])
                .send()
                .await
                .map_err(|e| AlarmError::Tts(format!("Google TTS request failed: {}", e)))?
                .error_for_status()
                .map_err(|e| AlarmError::Tts(format!("Google TTS returned an error: {}", e)))?;

            let bytes = response
                .bytes()
                .await
                .map_err(|e| AlarmError::Tts(format!("Google TTS response truncated: {}", e)))?;
            audio.extend_from_slice(&bytes);
        }

        if audio.is_empty() {
            return Err(AlarmError::Tts("Google TTS returned no audio".to_string()));
        }
        Ok(AudioBlob::mp3(audio))
    }

    async fn play(&self, audio: &AudioBlob) -> crate::Result<()> {
        self.player.play(audio).await
    }
}

/// Split `text` on word boundaries into pieces of at most `max` characters.
/// Words longer than `max` are split mid-word.
fn chunk_text(text: &str, max: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();
        while word.len() > max {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            let rest = word.split_off(max);
            chunks.push(word.into_iter().collect());
            word = rest;
        }

        let extra = if current.is_empty() { 0 } else { 1 };
        if current.chars().count() + extra + word.len() > max {
            chunks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.extend(word);
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}
