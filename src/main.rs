mod analysis;
mod cli;
mod config;
mod dataset;
mod error;
mod insights;
mod models;
mod optimizer;
mod output;
mod run_log;
mod training;

use anyhow::Result;
use clap::Parser;
use cli::Cli;
use log::info;

fn main() -> Result<()> {
    env_logger::init();

    output::print_banner();

    let cli = Cli::parse();
    info!("Starting runcast - CI/CD Workflow Run Forecasting");
    cli.execute()?;

    Ok(())
}
