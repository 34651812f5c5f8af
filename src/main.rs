//! alarmpi - A talking alarm clock
//!
//! Entry point for the alarmpi CLI application.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use alarmpi::cli::{commands, Cli, Commands};
use alarmpi::config::Settings;

fn init_logging(default_level: &str) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Completions { shell } => {
            alarmpi::cli::completions::print(shell);
        }
        command => {
            let settings = Settings::load()?;
            let level = if cli.verbose {
                "debug"
            } else {
                settings.general.log_level.as_str()
            };
            init_logging(level);

            match command {
                Commands::Set { time } => commands::set_alarm(&settings, &time).await?,
                Commands::Cancel => commands::cancel_alarm(&settings).await?,
                Commands::Status => commands::show_status(&settings).await?,
                Commands::Play { local } => commands::play(&settings, local).await?,
                Commands::Preview => commands::preview(&settings).await?,
                Commands::Doctor { json } => commands::run_doctor(&settings, json).await?,
                Commands::Daemon(daemon_cmd) => {
                    commands::daemon_command(&settings, daemon_cmd).await?
                }
                Commands::Config(config_cmd) => {
                    commands::config_command(&settings, config_cmd).await?
                }
                Commands::Completions { .. } => unreachable!(),
            }
        }
    }

    Ok(())
}
