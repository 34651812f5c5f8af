//! IPC client for talking to a running daemon

use anyhow::{Context, Result};
use tokio::net::UnixStream;

use crate::config::Settings;
use crate::daemon::ipc::{
    deserialize_response, read_frame, serialize_request, write_frame, DaemonRequest,
    DaemonResponse,
};

pub struct DaemonClient {
    stream: UnixStream,
}

impl DaemonClient {
    pub async fn connect(settings: &Settings) -> Result<Self> {
        let socket_path = settings.socket_path();

        let stream = UnixStream::connect(&socket_path).await.with_context(|| {
            format!(
                "Failed to connect to daemon at {:?}. Is the daemon running? Try: alarmpi daemon start",
                socket_path
            )
        })?;

        Ok(Self { stream })
    }

    /// Send a request and wait for its response
    pub async fn send(&mut self, request: DaemonRequest) -> Result<DaemonResponse> {
        write_frame(&mut self.stream, &serialize_request(&request)?).await?;

        let body = read_frame(&mut self.stream)
            .await?
            .context("Daemon closed the connection without answering")?;

        deserialize_response(&body).map_err(|e| anyhow::anyhow!("Failed to parse response: {}", e))
    }

    /// Send a request, turning an error response into an `Err`
    pub async fn request(&mut self, request: DaemonRequest) -> Result<DaemonResponse> {
        match self.send(request).await? {
            DaemonResponse::Error { message } => anyhow::bail!("Daemon error: {}", message),
            response => Ok(response),
        }
    }
}
