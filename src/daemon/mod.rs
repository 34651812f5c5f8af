//! Daemon module for alarmpi
//!
//! Runs the scheduler, the playback worker and the pollers in the
//! background and answers CLI requests over a Unix socket.

pub mod client;
pub mod ipc;
pub mod server;
pub mod service;

use anyhow::Result;
use std::process::Command;
use std::time::{Duration, Instant};

use crate::config::Settings;

/// PID of a live daemon, if the PID file points at one
pub fn running_pid(settings: &Settings) -> Option<i32> {
    let pid = std::fs::read_to_string(settings.pid_path())
        .ok()?
        .trim()
        .parse::<i32>()
        .ok()?;
    std::path::Path::new(&format!("/proc/{}", pid))
        .exists()
        .then_some(pid)
}

/// Start the daemon as a background process
pub fn start_daemon(settings: &Settings) -> Result<()> {
    let pid_path = settings.pid_path();
    let socket_path = settings.socket_path();

    if let Some(pid) = running_pid(settings) {
        anyhow::bail!("Daemon is already running (PID: {})", pid);
    }
    if pid_path.exists() {
        std::fs::remove_file(&pid_path)?;
    }
    if socket_path.exists() {
        let _ = std::fs::remove_file(&socket_path);
    }

    // the child validates the config again; failing early gives a better message
    settings.validate()?;

    let exe = std::env::current_exe()?;
    let mut child = Command::new(exe)
        .args(["daemon", "start", "--foreground"])
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()?;

    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if let Some(status) = child.try_wait()? {
            anyhow::bail!(
                "Daemon failed to start (exit: {}). Run `alarmpi daemon start --foreground` for details.",
                status
            );
        }

        if pid_path.exists() && socket_path.exists() {
            return Ok(());
        }

        std::thread::sleep(Duration::from_millis(50));
    }

    anyhow::bail!("Daemon start timed out. Run `alarmpi daemon start --foreground` for details.")
}

/// Run the daemon in the foreground
pub async fn run_foreground(settings: &Settings) -> Result<()> {
    service::run(settings).await
}
