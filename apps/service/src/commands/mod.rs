//! Subcommand implementations.

mod mail;
mod parse;
mod run;

use std::path::Path;

use anyhow::{Context, Result};

use crate::cli::Command;
use crate::config::{self, Config};

pub use mail::test_email;
pub use parse::parse;
pub use run::{RunOverrides, run};

pub async fn dispatch(command: Command, config_override: Option<&Path>) -> Result<()> {
    let config_path = config::resolve_path(config_override)?;
    let mut config = Config::from_config(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    // `parse --save` writes the config back, so it must not see env secrets
    if let Command::Parse { file, save } = command {
        return parse(config, &config_path, file.as_deref(), save);
    }
    config.apply_env();

    match command {
        Command::Run { curl, interval, max_attempts, fail_notify_every } => {
            let overrides = RunOverrides { curl, interval, max_attempts, fail_notify_every };
            run(config, overrides).await
        }
        Command::TestEmail => test_email(&config).await,
        Command::Config | Command::Parse { .. } => {
            println!("{config}");
            println!("  (file: {})", config_path.display());
            Ok(())
        }
    }
}

/// Read a captured command from `file`, or stdin when absent
fn read_command(file: Option<&Path>) -> Result<String> {
    let text = match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?,
        None => std::io::read_to_string(std::io::stdin()).context("reading stdin")?,
    };
    Ok(text.trim().to_string())
}
