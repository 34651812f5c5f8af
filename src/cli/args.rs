//! CLI argument definitions using clap

use clap::{Parser, Subcommand};
use clap_complete::Shell;

/// alarmpi - A talking alarm clock
#[derive(Parser, Debug)]
#[command(name = "alarmpi")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Set the alarm, replacing any alarm already set
    Set {
        /// Alarm time as HH:MM (24h)
        time: String,
    },

    /// Cancel the alarm
    Cancel,

    /// Show the alarm, playback and poller status
    Status,

    /// Play the alarm content now
    Play {
        /// Build and play in this process instead of through the daemon
        #[arg(short, long)]
        local: bool,
    },

    /// Print the alarm text without synthesizing it
    Preview,

    /// Check that the external players and synthesizers are installed
    Doctor {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Daemon management commands
    #[command(subcommand)]
    Daemon(DaemonCommand),

    /// Configuration management
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Generate shell completions
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand, Debug)]
pub enum DaemonCommand {
    /// Start the background daemon
    Start {
        /// Run in foreground (don't daemonize)
        #[arg(short, long)]
        foreground: bool,
    },

    /// Stop the running daemon
    Stop,

    /// Restart the daemon
    Restart,

    /// Check daemon status
    Status,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Initialize default configuration
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },

    /// Set a runtime setting (alarm.readaloud, alarm.nightmode_offset_hours,
    /// alarm.brightness_on_alarm)
    Set {
        /// Configuration key
        key: String,

        /// Value to set
        value: String,
    },

    /// Check the configuration without starting anything
    Validate,
}
