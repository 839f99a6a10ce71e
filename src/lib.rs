pub mod adapters;
pub mod cli;
pub mod frame;
pub mod geo_io;
pub mod io_utils;
pub mod normalize;
pub mod pipeline;
pub mod ranges;
pub mod resolve;
pub mod spatial;
pub mod species;
pub mod transform;

use std::{env, sync::OnceLock};

use anyhow::Result;
use clap::Parser;
use log::LevelFilter;

use crate::cli::{Cli, Commands};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("canopy_etl", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Normalize(args) => normalize::execute(&args),
        Commands::Species(args) => species::execute(&args),
        Commands::Enrich(args) => spatial::execute(&args),
        Commands::Pipeline(args) => pipeline::execute(&args),
    }
}
