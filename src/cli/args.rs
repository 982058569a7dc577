//! Command-line argument definitions using clap

use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};

/// odrisk - Score overdraft risk with PCA, K-Means segmentation and a neural PD model
#[derive(Parser, Debug)]
#[command(name = "odrisk")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// JSON configuration file overriding the built-in defaults.
    /// ODRISK_* environment variables are applied on top of it.
    #[arg(long, global = true, env = "ODRISK_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fit every stage on a dataset, persist the artifacts, then score the dataset
    Fit(BatchArgs),

    /// Score a dataset with previously persisted artifacts
    Score(BatchArgs),

    /// Score one hypothetical business (what-if simulator)
    Simulate(SimulateArgs),

    /// Print the effective configuration as JSON
    Config,
}

#[derive(Args, Debug, Clone)]
pub struct BatchArgs {
    /// Input file path (CSV or Parquet)
    #[arg(short, long)]
    pub input: PathBuf,

    /// Artifact directory
    #[arg(short, long, env = "ODRISK_ARTIFACTS", default_value = "models")]
    pub artifacts: PathBuf,

    /// Scored output file (CSV or Parquet, determined by extension).
    /// Defaults to the input directory with a '_scored' suffix (e.g., data.csv -> data_scored.csv).
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Sector strategy report (CSV). A JSON copy is written next to it.
    /// Defaults to the input directory with a '_strategy' suffix.
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Number of rows to use for schema inference (CSV only).
    /// Use 0 for full table scan (very slow for large files).
    #[arg(long, default_value = "10000")]
    pub infer_schema_length: usize,
}

#[derive(Args, Debug, Clone)]
pub struct SimulateArgs {
    /// Artifact directory
    #[arg(short, long, env = "ODRISK_ARTIFACTS", default_value = "models")]
    pub artifacts: PathBuf,

    /// JSON object mapping the fifteen raw field names to values.
    /// Without it, each field is prompted for interactively.
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Print the result as JSON instead of a table
    #[arg(long, default_value = "false")]
    pub json: bool,
}

impl BatchArgs {
    /// Scored output path, derived from the input when not given.
    pub fn output_path(&self) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| sibling(&self.input, "scored", "csv"))
    }

    /// Sector report path, derived from the input when not given.
    pub fn report_path(&self) -> PathBuf {
        self.report
            .clone()
            .unwrap_or_else(|| sibling(&self.input, "strategy", "csv"))
    }

    /// `None` means scan the whole file.
    pub fn schema_rows(&self) -> Option<usize> {
        match self.infer_schema_length {
            0 => None,
            rows => Some(rows),
        }
    }
}

fn sibling(input: &Path, suffix: &str, extension: &str) -> PathBuf {
    let parent = input.parent().unwrap_or_else(|| Path::new("."));
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");
    parent.join(format!("{}_{}.{}", stem, suffix, extension))
}
