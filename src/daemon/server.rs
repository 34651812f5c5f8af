//! Unix socket front door of the daemon
//!
//! Each connection gets its own task that decodes requests, hands them to the
//! event loop together with a reply channel and writes the reply back. The
//! server never interprets requests itself.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::daemon::ipc::{
    deserialize_request, read_frame, serialize_response, write_frame, DaemonRequest,
    DaemonResponse,
};

/// A request paired with the channel its reply goes back on
pub type Command = (DaemonRequest, mpsc::Sender<DaemonResponse>);
pub type CommandSender = mpsc::Sender<Command>;
pub type CommandReceiver = mpsc::Receiver<Command>;

/// Bound socket; removes the socket file when dropped
pub struct IpcServer {
    socket_path: PathBuf,
    listener: UnixListener,
}

impl IpcServer {
    /// Bind `socket_path`, replacing a socket file left by a previous run
    pub fn bind(socket_path: &Path) -> Result<Self> {
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        if socket_path.exists() {
            std::fs::remove_file(socket_path)
                .with_context(|| format!("Failed to remove stale {}", socket_path.display()))?;
        }

        let listener = UnixListener::bind(socket_path)
            .with_context(|| format!("Failed to bind {}", socket_path.display()))?;
        info!("Listening on {}", socket_path.display());

        Ok(Self {
            socket_path: socket_path.to_path_buf(),
            listener,
        })
    }

    /// Serve connections until the task is aborted
    pub async fn serve(self, commands: CommandSender) {
        loop {
            let stream = match self.listener.accept().await {
                Ok((stream, _)) => stream,
                Err(e) => {
                    error!("Accept failed: {}", e);
                    continue;
                }
            };

            let commands = commands.clone();
            tokio::spawn(async move {
                if let Err(e) = serve_client(stream, commands).await {
                    warn!("Client connection ended with an error: {:#}", e);
                }
            });
        }
    }
}

impl Drop for IpcServer {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.socket_path);
    }
}

async fn serve_client(mut stream: UnixStream, commands: CommandSender) -> Result<()> {
    while let Some(body) = read_frame(&mut stream).await? {
        let response = match deserialize_request(&body) {
            Ok(request) => {
                debug!("Request: {:?}", request);
                dispatch(request, &commands).await
            }
            Err(e) => DaemonResponse::Error {
                message: format!("Invalid request: {}", e),
            },
        };
        write_frame(&mut stream, &serialize_response(&response)?).await?;
    }
    debug!("Client disconnected");
    Ok(())
}

async fn dispatch(request: DaemonRequest, commands: &CommandSender) -> DaemonResponse {
    let (reply_tx, mut reply_rx) = mpsc::channel(1);
    if commands.send((request, reply_tx)).await.is_err() {
        return DaemonResponse::Error {
            message: "Daemon is shutting down".to_string(),
        };
    }
    reply_rx.recv().await.unwrap_or(DaemonResponse::Error {
        message: "Daemon dropped the request".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::daemon::ipc::{deserialize_response, serialize_request};

    #[tokio::test]
    async fn requests_are_answered_by_the_event_loop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alarmpi.sock");
        let server = IpcServer::bind(&path).unwrap();

        let (tx, mut rx) = mpsc::channel::<Command>(4);
        let serving = tokio::spawn(server.serve(tx));
        tokio::spawn(async move {
            while let Some((request, reply)) = rx.recv().await {
                let response = match request {
                    DaemonRequest::Ping => DaemonResponse::Pong,
                    _ => DaemonResponse::Ok,
                };
                let _ = reply.send(response).await;
            }
        });

        let mut client = UnixStream::connect(&path).await.unwrap();
        write_frame(&mut client, &serialize_request(&DaemonRequest::Ping).unwrap())
            .await
            .unwrap();
        let body = read_frame(&mut client).await.unwrap().unwrap();
        assert_eq!(deserialize_response(&body).unwrap(), DaemonResponse::Pong);

        // a malformed body gets an error reply and the connection stays usable
        write_frame(&mut client, &[2, 0, 0, 0, b'{', b'{']).await.unwrap();
        let body = read_frame(&mut client).await.unwrap().unwrap();
        assert!(matches!(
            deserialize_response(&body).unwrap(),
            DaemonResponse::Error { .. }
        ));

        serving.abort();
    }

    #[tokio::test]
    async fn stale_socket_file_is_replaced_and_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run").join("alarmpi.sock");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"stale").unwrap();

        let server = IpcServer::bind(&path).unwrap();
        assert!(path.exists());
        drop(server);
        assert!(!path.exists());
    }
}
