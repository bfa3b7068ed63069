use std::path::Path;

use anyhow::{Result, bail};
use tracing::info;

use crate::config::Config;

pub fn parse(mut config: Config, config_path: &Path, file: Option<&Path>, save: bool) -> Result<()> {
    let command = super::read_command(file)?;
    if command.is_empty() {
        bail!("empty command, paste a curl command to parse");
    }

    let descriptor = pollwatch::parse_command(&command)?;

    println!("URL: {}", descriptor.target_url());
    for (name, value) in descriptor.headers() {
        println!("Header: {name} = {value}");
    }
    for (key, value) in descriptor.cookies() {
        println!("Cookie: {key} = {value}");
    }
    match descriptor.body_field() {
        Some(stage) => println!("Stage: {stage}"),
        None => println!("Stage: <not found>"),
    }

    if save {
        config.merge_descriptor(&descriptor);
        config.write_config(config_path)?;
        info!(path = %config_path.display(), "Parsed request saved to config");
    }

    Ok(())
}
