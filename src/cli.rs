//! Command-line interface options using `clap`

use crate::dispatch::Operation;
use clap::Parser;
use std::path::PathBuf;

/// Discover, combine, clip and aggregate per-region Daymet files
#[derive(Parser, Debug)]
#[command(
    name = "daymet-proc",
    version,
    about = "Per-region Daymet processing: combine yearly files, clip to polygons, aggregate to time series"
)]
pub struct Args {
    /// Operation to run (`merge` is accepted for `combine`)
    #[arg(value_enum)]
    pub operation: Operation,

    /// Path to the TOML or JSON configuration file
    pub config: PathBuf,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Number of threads for parallel processing, overrides `threads` in the config
    #[arg(short = 't', long)]
    pub threads: Option<usize>,

    /// Print parallel processing information before running
    #[arg(long)]
    pub parallel_info: bool,
}
