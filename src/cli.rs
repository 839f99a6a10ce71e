use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(author, version, about = "Normalize, match, and enrich municipal tree inventories", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Normalize per-city inventory sources into the unified tree schema
    Normalize(NormalizeArgs),
    /// Match botanical names against the canonical species table
    Species(SpeciesArgs),
    /// Enrich tree records with street-segment planting and pruning metadata
    Enrich(EnrichArgs),
    /// Run normalization, species matching, and enrichment end to end
    Pipeline(PipelineArgs),
}

#[derive(Debug, Args)]
pub struct NormalizeArgs {
    /// Root data directory holding one sub-directory per city
    #[arg(short = 'd', long = "data")]
    pub data: PathBuf,
    /// Output CSV file (stdout if omitted)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
    /// Two-letter state code stamped on every record
    #[arg(long, default_value = "CA")]
    pub state: String,
    /// Restrict processing to this comma-separated list of city keys
    #[arg(long = "cities", value_delimiter = ',')]
    pub cities: Vec<String>,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of CSV inputs (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

#[derive(Debug, Args)]
pub struct SpeciesArgs {
    /// Input tree records CSV (the output of `normalize`)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Canonical species attributes CSV
    #[arg(short = 's', long = "species")]
    pub species: PathBuf,
    /// Output CSV file (stdout if omitted)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
    /// Keep trees without a species match, with a null species key
    #[arg(long = "keep-unmatched")]
    pub keep_unmatched: bool,
    /// Write the records missing from the species table instead of matches
    #[arg(long = "report-missing")]
    pub report_missing: bool,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of CSV inputs (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

#[derive(Debug, Args)]
pub struct EnrichArgs {
    /// Input tree records CSV (the output of `species`)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Output CSV file (stdout if omitted)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
    /// Street planting segments (GeoJSON or shapefile)
    #[arg(long = "planting-streets")]
    pub planting_streets: PathBuf,
    /// Median planting segments (GeoJSON or shapefile)
    #[arg(long = "planting-medians")]
    pub planting_medians: PathBuf,
    /// Directory holding pruning<years>_{streets,medians} datasets
    #[arg(long = "pruning")]
    pub pruning: Option<PathBuf>,
    /// Pruning zone polygons (GeoJSON or shapefile)
    #[arg(long = "zones")]
    pub zones: Option<PathBuf>,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of CSV inputs (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

#[derive(Debug, Args)]
pub struct PipelineArgs {
    /// Root data directory holding one sub-directory per city
    #[arg(short = 'd', long = "data")]
    pub data: PathBuf,
    /// Canonical species attributes CSV
    #[arg(short = 's', long = "species")]
    pub species: PathBuf,
    /// Output CSV file (stdout if omitted)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
    /// Street planting segments (GeoJSON or shapefile)
    #[arg(long = "planting-streets")]
    pub planting_streets: PathBuf,
    /// Median planting segments (GeoJSON or shapefile)
    #[arg(long = "planting-medians")]
    pub planting_medians: PathBuf,
    /// Directory holding pruning<years>_{streets,medians} datasets
    #[arg(long = "pruning")]
    pub pruning: Option<PathBuf>,
    /// Pruning zone polygons (GeoJSON or shapefile)
    #[arg(long = "zones")]
    pub zones: Option<PathBuf>,
    /// Two-letter state code stamped on every record
    #[arg(long, default_value = "CA")]
    pub state: String,
    /// Restrict processing to this comma-separated list of city keys
    #[arg(long = "cities", value_delimiter = ',')]
    pub cities: Vec<String>,
    /// Keep trees without a species match, with a null species key
    #[arg(long = "keep-unmatched")]
    pub keep_unmatched: bool,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of CSV inputs (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}
