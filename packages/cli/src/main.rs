#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the segregation metrics pipeline.
//!
//! Reads census regions from a gzipped JSON-lines file, runs the full
//! neighborhood/metrics/normalization pipeline, and writes the enriched
//! records back out in the same format.

mod io;

use std::path::PathBuf;

use clap::Parser;
use seg_map_models::{CensusYear, SummaryLevel};
use seg_map_pipeline::{Config, run};

#[derive(Parser)]
#[command(name = "seg_map_cli", about = "Neighborhood segregation index pipeline")]
struct Cli {
    /// Census year of the input data (2000 or 2010)
    #[arg(long)]
    year: CensusYear,

    /// Summary level: tract, blockgroup, or cousub
    #[arg(long)]
    sumlevel: SummaryLevel,

    /// Target neighborhood population (required for tract and blockgroup,
    /// must be omitted for cousub)
    #[arg(long, default_value_t = 0)]
    targetpop: u32,

    /// Maximum neighborhood radius in miles
    #[arg(long, default_value_t = 30.0)]
    maxradius: f64,

    /// Exponential distance-weight decay rate
    #[arg(long, default_value_t = 2.0)]
    escale: f64,

    /// Input file (gzipped JSON lines)
    #[arg(long)]
    infile: PathBuf,

    /// Output file (gzipped JSON lines)
    #[arg(long)]
    outfile: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();
    let cli = Cli::parse();

    let mut config = Config::new(cli.sumlevel, cli.year);
    config.target_pop = cli.targetpop;
    config.max_radius_miles = cli.maxradius;
    config.escale = cli.escale;
    config.validate()?;

    let regions = io::read_regions(&cli.infile, cli.year)?;
    let (regions, stats) = run(regions, None, &config).await?;
    io::write_regions(&cli.outfile, &regions)?;

    log::info!(
        "Done: {} in, {} out, {} skipped sparse, {} skipped degenerate",
        stats.input,
        stats.output,
        stats.skipped_sparse,
        stats.skipped_degenerate
    );

    Ok(())
}
