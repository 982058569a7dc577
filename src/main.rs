//! odrisk: Overdraft Risk Scoring CLI Tool
//!
//! Fits the scoring pipeline, scores datasets with persisted artifacts
//! and runs what-if simulations for single businesses.

use anyhow::{Context, Result};
use clap::Parser;

use odrisk::cli::{run_fit, run_score, run_simulate, Cli, Commands};
use odrisk::pipeline::PipelineConfig;

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = PipelineConfig::load(cli.config.as_deref())
        .context("Failed to load pipeline configuration")?;

    match &cli.command {
        Commands::Fit(args) => run_fit(args, config),
        Commands::Score(args) => run_score(args, config),
        Commands::Simulate(args) => run_simulate(args, config),
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}
