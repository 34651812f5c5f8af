//! IPC protocol definitions for daemon communication
//!
//! Every message is a 4-byte little-endian length followed by a JSON body.

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::alarm::{AlarmTime, PlaybackState, ScheduledAlarm};
use crate::poller::PollState;
use crate::AlarmError;

/// Largest message body either side accepts
pub const MAX_MESSAGE_LEN: usize = 1024 * 1024;

/// Request sent from the CLI to the daemon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DaemonRequest {
    /// Arm the alarm, replacing any armed alarm
    SetAlarm { time: AlarmTime },

    /// Clear the armed alarm
    CancelAlarm,

    /// Build and play alarm content right away
    PlayNow,

    /// Get current status
    GetStatus,

    SetReadaloud { enabled: bool },

    SetNightmodeOffset { hours: u32 },

    SetBrightnessOnAlarm { enabled: bool },

    /// Ping to check if daemon is alive
    Ping,

    /// Shutdown the daemon
    Shutdown,
}

/// Response sent from the daemon to the CLI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DaemonResponse {
    /// Alarm armed
    AlarmSet { alarm: ScheduledAlarm },

    /// Alarm cleared; `None` if nothing was armed
    AlarmCancelled { alarm: Option<ScheduledAlarm> },

    /// Playback queued on the worker
    PlayQueued,

    /// Current status
    Status(StatusReport),

    /// Pong response to ping
    Pong,

    /// Acknowledgment (for shutdown, setters)
    Ok,

    /// Error response
    Error { message: String },
}

/// Snapshot of the daemon for `alarmpi status`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub alarm: Option<ScheduledAlarm>,
    pub playback: PlaybackState,
    /// Within the night-mode offset before the armed alarm
    pub night_mode: bool,
    pub readaloud: bool,
    pub nightmode_offset_hours: u32,
    pub brightness_on_alarm: bool,
    pub radio_playing: bool,
    pub pollers: Vec<PollerStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollerStatus {
    pub name: String,
    pub state: PollState<String>,
}

fn frame<T: Serialize>(message: &T) -> crate::Result<Vec<u8>> {
    let json = serde_json::to_vec(message)
        .map_err(|e| AlarmError::Ipc(format!("Failed to serialize message: {}", e)))?;
    let len = u32::try_from(json.len())
        .map_err(|_| AlarmError::Ipc("Message too large".to_string()))?;
    let mut bytes = len.to_le_bytes().to_vec();
    bytes.extend(json);
    Ok(bytes)
}

/// Serialize a request to bytes for IPC
pub fn serialize_request(request: &DaemonRequest) -> crate::Result<Vec<u8>> {
    frame(request)
}

/// Serialize a response to bytes for IPC
pub fn serialize_response(response: &DaemonResponse) -> crate::Result<Vec<u8>> {
    frame(response)
}

/// Read one frame body. `Ok(None)` means the peer closed the connection
/// between frames.
pub async fn read_frame<R>(reader: &mut R) -> crate::Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_MESSAGE_LEN {
        return Err(AlarmError::Ipc(format!("Message too large: {} bytes", len)));
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(Some(body))
}

/// Write an already framed message
pub async fn write_frame<W>(writer: &mut W, frame: &[u8]) -> crate::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Deserialize a request body
pub fn deserialize_request(data: &[u8]) -> Result<DaemonRequest, String> {
    serde_json::from_slice(data).map_err(|e| e.to_string())
}

/// Deserialize a response body
pub fn deserialize_response(data: &[u8]) -> Result<DaemonResponse, String> {
    serde_json::from_slice(data).map_err(|e| e.to_string())
}
