//! CLI argument definitions for firehose-daemon.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.

use std::path::PathBuf;

use clap::Parser;

/// Forwards platform firehose envelopes to a syslog collector.
#[derive(Parser, Debug)]
#[command(name = "firehose-daemon")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to firehose.toml configuration file.
    #[arg(short, long, default_value = "/etc/firehose/firehose.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_format: Option<String>,

    /// Override the comma-separated event selection.
    #[arg(long)]
    pub events: Option<String>,

    /// Validate configuration file and exit without starting the daemon.
    #[arg(long)]
    pub validate: bool,

    /// Newline-delimited JSON envelopes to read, or `-` for stdin.
    #[arg(long)]
    pub envelopes: Option<String>,

    /// Shut down once the envelope source reaches end of input.
    #[arg(long, requires = "envelopes")]
    pub exit_on_eof: bool,
}

impl DaemonCli {
    /// Apply flag overrides on top of the file and environment values.
    pub fn apply_overrides(&self, config: &mut firehose_core::FirehoseConfig) {
        if let Some(level) = &self.log_level {
            config.general.log_level = level.clone();
        }
        if let Some(format) = &self.log_format {
            config.general.log_format = format.clone();
        }
        if let Some(events) = &self.events {
            config.routing.selected_events = events.clone();
        }
    }
}
