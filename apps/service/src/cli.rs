use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Poll an endpoint until a result is published and mail the operator
#[derive(Debug, Parser)]
#[command(name = "pollwatch", version, about)]
pub struct Cli {
    /// Config file (defaults to $XDG_CONFIG_HOME/pollwatch/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Parse a captured curl command (from a file or stdin)
    Parse {
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Store url, stage, user agent and cookies in the config file
        #[arg(long)]
        save: bool,
    },

    /// Start polling until the result is published
    Run {
        /// Captured curl command to take the request from
        #[arg(long)]
        curl: Option<PathBuf>,

        /// Seconds between attempts
        #[arg(long)]
        interval: Option<u64>,

        /// Stop after this many attempts, 0 for no limit
        #[arg(long)]
        max_attempts: Option<u32>,

        /// Send a failure reminder every N attempts
        #[arg(long)]
        fail_notify_every: Option<u32>,
    },

    /// Send a test mail with the configured SMTP account
    TestEmail,

    /// Print the current configuration
    Config,
}
