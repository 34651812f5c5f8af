//! CLI command implementations

use anyhow::{Context, Result};
use serde::Serialize;
use std::process::{Command, Stdio};
use std::sync::Arc;

use crate::alarm::{
    AlarmContentBuilder, AlarmPlaybackCoordinator, AlarmTime, Clock, PlaybackEvent,
    ScheduledAlarm, SectionKind, SystemClock,
};
use crate::cli::args::{ConfigCommand, DaemonCommand};
use crate::config::{ConfigHandle, Settings};
use crate::daemon::client::DaemonClient;
use crate::daemon::ipc::{DaemonRequest, DaemonResponse, StatusReport};
use crate::tts::{build_backend, fallback_backend, split_command};

/// Arm the alarm on the daemon
pub async fn set_alarm(settings: &Settings, time: &str) -> Result<()> {
    let time: AlarmTime = time.parse()?;
    let mut client = DaemonClient::connect(settings).await?;

    match client.request(DaemonRequest::SetAlarm { time }).await? {
        DaemonResponse::AlarmSet { alarm } => {
            println!("Alarm set for {}", describe_alarm(&alarm));
        }
        _ => anyhow::bail!("Unexpected response from daemon"),
    }

    Ok(())
}

/// Clear the alarm on the daemon
pub async fn cancel_alarm(settings: &Settings) -> Result<()> {
    let mut client = DaemonClient::connect(settings).await?;

    match client.request(DaemonRequest::CancelAlarm).await? {
        DaemonResponse::AlarmCancelled { alarm: Some(alarm) } => {
            println!("Alarm for {} cancelled", alarm.time);
        }
        DaemonResponse::AlarmCancelled { alarm: None } => {
            println!("No alarm set");
        }
        _ => anyhow::bail!("Unexpected response from daemon"),
    }

    Ok(())
}

/// Show the daemon's status
pub async fn show_status(settings: &Settings) -> Result<()> {
    let mut client = match DaemonClient::connect(settings).await {
        Ok(c) => c,
        Err(_) => {
            println!("Daemon is not running");
            return Ok(());
        }
    };

    match client.request(DaemonRequest::GetStatus).await? {
        DaemonResponse::Status(report) => print!("{}", format_status(&report)),
        _ => anyhow::bail!("Unexpected response from daemon"),
    }

    Ok(())
}

/// Play the alarm content now, through the daemon or in this process
pub async fn play(settings: &Settings, local: bool) -> Result<()> {
    if !local {
        let mut client = DaemonClient::connect(settings).await?;
        match client.request(DaemonRequest::PlayNow).await? {
            DaemonResponse::PlayQueued => println!("Playing alarm content"),
            _ => anyhow::bail!("Unexpected response from daemon"),
        }
        return Ok(());
    }

    settings.validate()?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let builder =
        AlarmContentBuilder::from_settings(settings, clock, build_backend(settings)?)?;
    let fallback = Arc::new(fallback_backend(settings));
    let (coordinator, mut events) =
        AlarmPlaybackCoordinator::spawn(builder, fallback, ConfigHandle::new(settings.clone()));

    coordinator.trigger_play(None)?;
    while let Some(event) = events.recv().await {
        if let PlaybackEvent::Finished { outcome, .. } = event {
            println!("Playback finished: {:?}", outcome);
            break;
        }
    }
    coordinator.shutdown();

    Ok(())
}

/// Print the text the alarm would read, section by section
pub async fn preview(settings: &Settings) -> Result<()> {
    settings.validate()?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let builder =
        AlarmContentBuilder::from_settings(settings, clock, build_backend(settings)?)?;

    for section in builder.compose(None).await {
        let label = match &section.kind {
            SectionKind::Greeting => "greeting".to_string(),
            SectionKind::Source(name) => name.clone(),
            SectionKind::Closing => "closing".to_string(),
        };
        let marker = if section.failed { " (failed)" } else { "" };
        println!("[{}]{} {}", label, marker, section.text);
    }

    Ok(())
}

/// Handle daemon subcommands
pub async fn daemon_command(settings: &Settings, cmd: DaemonCommand) -> Result<()> {
    match cmd {
        DaemonCommand::Start { foreground } => {
            if foreground {
                crate::daemon::run_foreground(settings).await?;
            } else {
                crate::daemon::start_daemon(settings)?;
                println!("Daemon started");
            }
        }
        DaemonCommand::Stop => {
            let mut client = DaemonClient::connect(settings).await?;
            client.send(DaemonRequest::Shutdown).await?;
            println!("Daemon stopped");
        }
        DaemonCommand::Restart => {
            if let Ok(mut client) = DaemonClient::connect(settings).await {
                let _ = client.send(DaemonRequest::Shutdown).await;
                tokio::time::sleep(std::time::Duration::from_millis(500)).await;
            }
            crate::daemon::start_daemon(settings)?;
            println!("Daemon restarted");
        }
        DaemonCommand::Status => match DaemonClient::connect(settings).await {
            Ok(mut client) => {
                let response = client.send(DaemonRequest::Ping).await?;
                if matches!(response, DaemonResponse::Pong) {
                    match crate::daemon::running_pid(settings) {
                        Some(pid) => println!("Daemon is running (PID: {})", pid),
                        None => println!("Daemon is running"),
                    }
                }
            }
            Err(_) => {
                println!("Daemon is not running");
            }
        },
    }

    Ok(())
}

/// Handle config subcommands
pub async fn config_command(settings: &Settings, cmd: ConfigCommand) -> Result<()> {
    match cmd {
        ConfigCommand::Show => {
            let toml = toml::to_string_pretty(settings)?;
            println!("{}", toml);
        }
        ConfigCommand::Path => {
            let path = Settings::config_path()?;
            println!("{}", path.display());
        }
        ConfigCommand::Init { force } => {
            let path = Settings::config_path()?;
            if path.exists() && !force {
                anyhow::bail!(
                    "Config file already exists at {}. Use --force to overwrite.",
                    path.display()
                );
            }
            Settings::write_default(&path)?;
            println!("Configuration initialized at: {}", path.display());
        }
        ConfigCommand::Set { key, value } => {
            let request = runtime_setting(&key, &value)?;
            set_runtime(settings, request).await?;
            println!("Set {} = {}", key, value);
        }
        ConfigCommand::Validate => {
            settings.validate()?;
            println!("Configuration is valid");
        }
    }

    Ok(())
}

/// Map a `config set` key to the daemon request that changes it
fn runtime_setting(key: &str, value: &str) -> Result<DaemonRequest> {
    let request = match key {
        "alarm.readaloud" => DaemonRequest::SetReadaloud {
            enabled: parse_bool(value)?,
        },
        "alarm.nightmode_offset_hours" => DaemonRequest::SetNightmodeOffset {
            hours: value
                .parse()
                .with_context(|| format!("'{}' is not a number of hours", value))?,
        },
        "alarm.brightness_on_alarm" => DaemonRequest::SetBrightnessOnAlarm {
            enabled: parse_bool(value)?,
        },
        other => anyhow::bail!(
            "Unsupported key '{}'. Supported keys: alarm.readaloud, alarm.nightmode_offset_hours, alarm.brightness_on_alarm",
            other
        ),
    };
    Ok(request)
}

/// Apply a runtime setting through the daemon, or to the file if it is not running
async fn set_runtime(settings: &Settings, request: DaemonRequest) -> Result<()> {
    if let Ok(mut client) = DaemonClient::connect(settings).await {
        client.request(request).await?;
        return Ok(());
    }

    let handle = ConfigHandle::persistent(settings.clone(), Settings::config_path()?);
    match request {
        DaemonRequest::SetReadaloud { enabled } => handle.set_readaloud(enabled).await,
        DaemonRequest::SetNightmodeOffset { hours } => handle.set_nightmode_offset(hours).await,
        DaemonRequest::SetBrightnessOnAlarm { enabled } => {
            handle.set_brightness_on_alarm(enabled).await
        }
        other => anyhow::bail!("{:?} is not a setting", other),
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "on" | "yes" | "1" => Ok(true),
        "false" | "off" | "no" | "0" => Ok(false),
        _ => anyhow::bail!("'{}' is not a boolean (use true or false)", value),
    }
}

#[derive(Serialize)]
struct DoctorCheck {
    name: String,
    status: &'static str,
    detail: &'static str,
}

#[derive(Serialize)]
struct DoctorReport {
    tts_backend: String,
    checks: Vec<DoctorCheck>,
    config_error: Option<String>,
}

/// Check the external programs the configuration relies on
pub async fn run_doctor(settings: &Settings, json: bool) -> Result<()> {
    let report = collect_doctor_report(settings);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("alarmpi doctor");
    println!("tts backend: {}", report.tts_backend);
    println!();

    for check in &report.checks {
        println!("{:<12} {:<8} {}", check.name, check.status, check.detail);
    }

    if let Some(err) = &report.config_error {
        println!();
        println!("warning: {}", err);
    }

    Ok(())
}

fn collect_doctor_report(settings: &Settings) -> DoctorReport {
    let mut wanted: Vec<(String, &'static str)> = vec![
        (program(&settings.playback.wav_player), "plays speech and the alarm tone"),
        (program(&settings.playback.mp3_player), "plays google speech"),
    ];
    let backend = settings
        .enabled_backend()
        .map(|b| b.handler.clone())
        .unwrap_or_else(|| "tone".to_string());
    if backend == "espeak" {
        wanted.push(("espeak-ng".to_string(), "local speech synthesis"));
    }
    if settings.radio.enabled {
        wanted.push((program(&settings.radio.player), "streams the radio"));
    }

    let checks = wanted
        .into_iter()
        .filter(|(name, _)| !name.is_empty())
        .map(|(name, detail)| DoctorCheck {
            status: if command_exists(&name) { "ok" } else { "missing" },
            name,
            detail,
        })
        .collect();

    DoctorReport {
        tts_backend: backend,
        checks,
        config_error: settings.validate().err().map(|e| e.to_string()),
    }
}

fn program(command: &str) -> String {
    split_command(command).into_iter().next().unwrap_or_default()
}

fn command_exists(bin: &str) -> bool {
    Command::new(bin)
        .arg("--help")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok()
}

fn describe_alarm(alarm: &ScheduledAlarm) -> String {
    format!("{} ({})", alarm.time, alarm.target.format("%a %Y-%m-%d"))
}

fn on_off(flag: bool) -> &'static str {
    if flag {
        "on"
    } else {
        "off"
    }
}

fn format_status(report: &StatusReport) -> String {
    let mut out = String::new();

    match &report.alarm {
        Some(alarm) => out.push_str(&format!(
            "Alarm: {} [{:?}]\n",
            describe_alarm(alarm),
            alarm.state
        )),
        None => out.push_str("Alarm: not set\n"),
    }
    out.push_str(&format!("Playback: {:?}\n", report.playback));
    out.push_str(&format!("Night mode: {}\n", on_off(report.night_mode)));
    out.push_str(&format!(
        "Readaloud: {}  Night mode offset: {}h  Brightness on alarm: {}\n",
        on_off(report.readaloud),
        report.nightmode_offset_hours,
        on_off(report.brightness_on_alarm)
    ));
    out.push_str(&format!("Radio: {}\n", on_off(report.radio_playing)));

    if !report.pollers.is_empty() {
        out.push_str("Pollers:\n");
    }
    for poller in &report.pollers {
        let state = &poller.state;
        let health = match (state.failed, state.retry_armed) {
            (false, _) => "ok",
            (true, true) => "failed, retrying",
            (true, false) => "failed",
        };
        let updated = state
            .updated_at
            .map(|t| t.format("%H:%M").to_string())
            .unwrap_or_else(|| "never".to_string());
        out.push_str(&format!(
            "  {:<8} {:<17} updated {}  {}\n",
            poller.name,
            health,
            updated,
            state.last_success.as_deref().unwrap_or("")
        ));
    }

    out
}
