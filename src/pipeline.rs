//! End-to-end orchestration: normalize → species match → enrich.

use anyhow::Result;
use log::info;

use crate::cli::PipelineArgs;
use crate::io_utils;
use crate::normalize;
use crate::spatial;
use crate::species;

pub fn execute(args: &PipelineArgs) -> Result<()> {
    let encoding = io_utils::resolve_encoding(args.input_encoding.as_deref())?;
    let delimiter = args.delimiter.unwrap_or(io_utils::DEFAULT_CSV_DELIMITER);

    let trees = normalize::normalize_all(&args.data, &args.cities, &args.state, delimiter, encoding)?;
    info!("Normalized {} tree record(s)", trees.row_count());

    let species_table = species::load_species_table(&args.species, delimiter, encoding)?;
    let index = species::build_index(&species_table)?;
    let matched = species::match_species(&trees, &index, args.keep_unmatched)?;
    info!(
        "Matched {} of {} tree record(s) against {} species",
        matched.row_count(),
        trees.row_count(),
        species_table.row_count()
    );

    let enriched = spatial::enrich_frame(
        matched,
        &args.planting_streets,
        &args.planting_medians,
        args.pruning.as_deref(),
        args.zones.as_deref(),
    )?;
    io_utils::write_frame(&enriched, args.output.as_deref(), delimiter)?;
    info!("Wrote {} enriched tree record(s)", enriched.row_count());
    Ok(())
}
