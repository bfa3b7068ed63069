#![warn(clippy::all, clippy::pedantic)]

mod cli;
mod commands;
mod config;

use anyhow::Result;
use clap::Parser;

use cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();
    logger::init();

    let cli = Cli::parse();
    commands::dispatch(cli.command, cli.config.as_deref()).await
}
