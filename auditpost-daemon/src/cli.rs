//! CLI argument definitions for auditpost-daemon.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.

use std::path::PathBuf;

use clap::Parser;

use auditpost_core::config::AuditpostConfig;

/// auditpost kernel audit reassembly daemon.
///
/// Reads audit records from stdin, reassembles them into events,
/// applies filter rules and writes JSON lines to the configured output.
#[derive(Parser, Debug)]
#[command(name = "auditpost-daemon")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to auditpost.toml configuration file.
    #[arg(short, long, default_value = "/etc/auditpost/auditpost.toml")]
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

    /// Validate configuration file and exit without starting the daemon.
    #[arg(long)]
    pub validate: bool,
}

impl DaemonCli {
    /// Apply CLI overrides on top of a loaded configuration.
    pub fn apply_overrides(&self, config: &mut AuditpostConfig) {
        if let Some(level) = &self.log_level {
            config.general.log_level = level.clone();
        }
        if let Some(format) = &self.log_format {
            config.general.log_format = format.clone();
        }
    }
}
