//! Text produced by an external command
//!
//! Lets users plug in any script (news headlines, calendar, train times)
//! without a dedicated handler.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio::process::Command;

use crate::content::ContentSource;
use crate::AlarmError;

const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Runs the `command` option through `sh -c` and reads its stdout
pub struct CommandSource;

fn failure(message: impl Into<String>) -> AlarmError {
    AlarmError::ContentSource {
        source_name: "command".to_string(),
        message: message.into(),
    }
}

#[async_trait]
impl ContentSource for CommandSource {
    async fn fetch(&self, options: &HashMap<String, String>) -> crate::Result<String> {
        let command = options
            .get("command")
            .ok_or_else(|| failure("option 'command' is missing"))?;

        let output = tokio::time::timeout(
            COMMAND_TIMEOUT,
            Command::new("sh")
                .arg("-c")
                .arg(command)
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| failure(format!("'{}' timed out", command)))??;

        if !output.status.success() {
            return Err(failure(format!(
                "'{}' exited with {}: {}",
                command,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if text.is_empty() {
            return Err(failure(format!("'{}' printed nothing", command)));
        }
        Ok(text)
    }
}
