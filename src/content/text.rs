//! Fixed text from the configuration

use async_trait::async_trait;
use std::collections::HashMap;

use crate::content::ContentSource;
use crate::AlarmError;

/// Reads the `text` option as is
pub struct TextSource;

#[async_trait]
impl ContentSource for TextSource {
    async fn fetch(&self, options: &HashMap<String, String>) -> crate::Result<String> {
        options
            .get("text")
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AlarmError::ContentSource {
                source_name: "text".to_string(),
                message: "option 'text' is empty".to_string(),
            })
    }
}
