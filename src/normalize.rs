//! The normalization pipeline: per-city sources to the unified tree schema.
//!
//! Step order matters. Range categorization runs before exact height/diameter
//! resolution so the exact-value step can exclude whichever source column the
//! categorizer consumed — otherwise a single bucket column would be counted
//! both as a range and as an exact measurement.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use encoding_rs::Encoding;
use log::{debug, info};

use crate::adapters::{self, CityAdapter};
use crate::cli::NormalizeArgs;
use crate::frame::{Frame, Value};
use crate::geo_io;
use crate::io_utils;
use crate::ranges;
use crate::resolve;

/// Canonical output columns, in output order. Projection keeps the
/// intersection of this set with what a source actually produced.
pub const PROJECTION_COLUMNS: &[&str] = &[
    "tree_id",
    "name_common",
    "name_botanical",
    "condition",
    "address",
    "city",
    "estimated_value",
    "diameter_min_in",
    "diameter_max_in",
    "exact_diameter",
    "height_min_feet",
    "height_max_feet",
    "exact_height",
    "latitude",
    "longitude",
    "location_description",
    "heritage",
    "heritage_year",
    "heritage_number",
    "heritage_text",
];

const STRING_CLEANUP_COLUMNS: &[&str] =
    &["name_common", "name_botanical", "address", "city", "condition"];

const HEIGHT_RANGE_SOURCES: &[&str] = &["height", "HEIGHT_RAN"];
const DIAMETER_RANGE_SOURCES: &[&str] = &["diameter", "DBH"];

pub fn execute(args: &NormalizeArgs) -> Result<()> {
    let encoding = io_utils::resolve_encoding(args.input_encoding.as_deref())?;
    let delimiter = args.delimiter.unwrap_or(io_utils::DEFAULT_CSV_DELIMITER);
    let frame = normalize_all(&args.data, &args.cities, &args.state, delimiter, encoding)?;
    io_utils::write_frame(&frame, args.output.as_deref(), delimiter)?;
    info!(
        "Wrote {} normalized tree record(s) across {} column(s)",
        frame.row_count(),
        frame.columns().len()
    );
    Ok(())
}

/// Normalizes every city with an available source under `data_root` and
/// concatenates the results into one frame with the unified schema.
pub fn normalize_all(
    data_root: &Path,
    cities: &[String],
    state: &str,
    delimiter: u8,
    encoding: &'static Encoding,
) -> Result<Frame> {
    if !data_root.is_dir() {
        bail!("Data root {data_root:?} is not a directory");
    }
    let city_dirs = list_city_dirs(data_root)?;
    let fallback_pool = fallback_geojsons(data_root)?;

    let mut normalized = Vec::new();
    for adapter in adapters::REGISTRY {
        if !cities.is_empty() && !cities.iter().any(|c| c == adapter.city) {
            continue;
        }
        let city_dir = city_dirs.get(adapter.city).map(PathBuf::as_path);
        let fallback = fallback_pool.get(adapter.city).map(PathBuf::as_path);
        match normalize_city(adapter, city_dir, fallback, delimiter, encoding)
            .with_context(|| format!("Normalizing city '{}'", adapter.city))?
        {
            Some(frame) => {
                info!("{}: {} record(s)", adapter.city, frame.row_count());
                normalized.push(frame);
            }
            None => info!("{}: no source dataset, skipping", adapter.city),
        }
    }
    if normalized.is_empty() {
        bail!("No city produced any records under {data_root:?}");
    }

    let mut combined = Frame::concat(normalized);
    for column in STRING_CLEANUP_COLUMNS {
        combined.coerce_trim_strings(column);
    }
    let state_column = vec![Some(Value::String(state.to_string())); combined.row_count()];
    combined.set_column("state", state_column)?;
    Ok(combined)
}

/// Reads and normalizes one city. Returns `None` when the city has no source.
pub fn normalize_city(
    adapter: &CityAdapter,
    city_dir: Option<&Path>,
    fallback_geojson: Option<&Path>,
    delimiter: u8,
    encoding: &'static Encoding,
) -> Result<Option<Frame>> {
    let Some(mut frame) =
        read_city_source(adapter.city, city_dir, fallback_geojson, delimiter, encoding)?
    else {
        return Ok(None);
    };
    adapters::apply_ops(&mut frame, adapter, city_dir, delimiter, encoding)?;
    Ok(Some(maximal_frame(frame)?))
}

/// Loads the city's raw records, tagging every row with the city key. A CSV
/// source wins over a GeoJSON one; a directory-less city can still be fed by
/// a fallback GeoJSON from the shared `all/` pool.
fn read_city_source(
    city: &str,
    city_dir: Option<&Path>,
    fallback_geojson: Option<&Path>,
    delimiter: u8,
    encoding: &'static Encoding,
) -> Result<Option<Frame>> {
    let source = match city_dir {
        Some(dir) => geo_io::discover_city_source(dir)?,
        None => geo_io::CitySource {
            geojson: None,
            csv: None,
        },
    };
    let mut frame = if let Some(csv_path) = source.csv {
        let mut frame = io_utils::read_frame(&csv_path, delimiter, encoding)
            .with_context(|| format!("Reading city CSV {csv_path:?}"))?;
        geo_io::synthesize_csv_points(&mut frame)
            .with_context(|| format!("CSV {csv_path:?} has no geometry"))?;
        frame
    } else if let Some(geojson_path) = source.geojson.or(fallback_geojson.map(Path::to_path_buf)) {
        let features = geo_io::read_features(&geojson_path)?;
        geo_io::into_point_frame(features)
            .with_context(|| format!("Loading point dataset {geojson_path:?}"))?
    } else {
        return Ok(None);
    };

    let city_column = vec![Some(Value::String(city.to_string())); frame.row_count()];
    frame.set_column("city", city_column)?;
    Ok(Some(frame))
}

/// Runs the fixed resolve/categorize sequence and projects the result down to
/// the canonical column set.
pub fn maximal_frame(mut frame: Frame) -> Result<Frame> {
    resolve::resolve_column(&mut frame, resolve::ADDRESS, None, true);
    resolve::resolve_column(&mut frame, resolve::NAME_COMMON, None, true);
    resolve::resolve_column(&mut frame, resolve::NAME_BOTANICAL, None, true);
    resolve::resolve_column(&mut frame, resolve::TREE_ID, None, false);
    resolve::resolve_column(&mut frame, resolve::CONDITION, None, false);
    resolve::resolve_column(&mut frame, resolve::ESTIMATED_VALUE, None, false);

    let height_source = categorize_first(
        &mut frame,
        HEIGHT_RANGE_SOURCES,
        "height_min_feet",
        "height_max_feet",
    )?;
    let diameter_source = categorize_first(
        &mut frame,
        DIAMETER_RANGE_SOURCES,
        "diameter_min_in",
        "diameter_max_in",
    )?;

    resolve::resolve_column(
        &mut frame,
        resolve::EXACT_HEIGHT,
        height_source.as_deref(),
        false,
    );
    resolve::resolve_column(
        &mut frame,
        resolve::EXACT_DIAMETER,
        diameter_source.as_deref(),
        false,
    );

    resolve::resolve_column(&mut frame, resolve::DIAMETER_MIN_IN, None, false);
    resolve::resolve_column(&mut frame, resolve::DIAMETER_MAX_IN, None, false);
    resolve::resolve_column(&mut frame, resolve::HEIGHT_MAX_FEET, None, false);
    resolve::resolve_column(&mut frame, resolve::HEIGHT_MIN_FEET, None, false);

    let mut projected = frame.select(PROJECTION_COLUMNS);
    projected.rename_column("height_min_feet", "height_min_ft");
    projected.rename_column("height_max_feet", "height_max_ft");
    projected.dedup_rows();
    Ok(projected)
}

/// Tries each range-source column (as given, upper-cased, lower-cased) until
/// one categorizes; returns the name of the consumed column, if any. A column
/// that exists but is numeric is skipped rather than categorized.
fn categorize_first(
    frame: &mut Frame,
    sources: &[&str],
    min_field: &str,
    max_field: &str,
) -> Result<Option<String>> {
    for source in sources {
        for candidate in [
            source.to_string(),
            source.to_uppercase(),
            source.to_lowercase(),
        ] {
            if ranges::categorize(frame, min_field, max_field, &candidate, None)? {
                debug!("Categorized '{candidate}' into {min_field}/{max_field}");
                return Ok(Some(candidate));
            }
        }
    }
    Ok(None)
}

fn list_city_dirs(data_root: &Path) -> Result<BTreeMap<String, PathBuf>> {
    let mut dirs = BTreeMap::new();
    for entry in
        fs::read_dir(data_root).with_context(|| format!("Listing data root {data_root:?}"))?
    {
        let path = entry?.path();
        if path.is_dir()
            && let Some(name) = path.file_name().and_then(|n| n.to_str())
        {
            dirs.insert(name.to_string(), path);
        }
    }
    Ok(dirs)
}

/// GeoJSONs under `<root>/all/`, keyed by file stem, used as fallbacks for
/// cities without their own directory.
fn fallback_geojsons(data_root: &Path) -> Result<BTreeMap<String, PathBuf>> {
    let all_dir = data_root.join("all");
    let mut pool = BTreeMap::new();
    if !all_dir.is_dir() {
        return Ok(pool);
    }
    for entry in
        fs::read_dir(&all_dir).with_context(|| format!("Listing fallback pool {all_dir:?}"))?
    {
        let path = entry?.path();
        if path.is_file()
            && path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("geojson"))
            && let Some(stem) = path.file_stem().and_then(|s| s.to_str())
        {
            pool.insert(stem.to_string(), path);
        }
    }
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_strings(frame: &mut Frame, cells: &[Option<&str>]) {
        frame
            .push_row(
                cells
                    .iter()
                    .map(|c| c.map(|v| Value::String(v.to_string())))
                    .collect(),
            )
            .unwrap();
    }

    #[test]
    fn bucket_column_is_not_double_counted_as_exact() {
        let mut frame = Frame::new(vec![
            "city".to_string(),
            "DBH".to_string(),
            "latitude".to_string(),
            "longitude".to_string(),
        ]);
        push_strings(&mut frame, &[Some("x"), Some("07-12"), Some("34"), Some("-118")]);

        let result = maximal_frame(frame).unwrap();
        let min_idx = result.column_index("diameter_min_in").unwrap();
        let max_idx = result.column_index("diameter_max_in").unwrap();
        assert_eq!(result.value(0, min_idx), Some(&Value::Integer(7)));
        assert_eq!(result.value(0, max_idx), Some(&Value::Integer(12)));
        // DBH was consumed as a bucket column, so no exact diameter appears
        assert!(result.column_index("exact_diameter").is_none());
    }

    #[test]
    fn numeric_diameter_resolves_as_exact_instead() {
        let mut frame = Frame::new(vec!["city".to_string(), "diameter".to_string()]);
        frame
            .push_row(vec![
                Some(Value::String("x".to_string())),
                Some(Value::Float(14.5)),
            ])
            .unwrap();

        let result = maximal_frame(frame).unwrap();
        assert!(result.column_index("diameter_min_in").is_none());
        let exact_idx = result.column_index("exact_diameter").unwrap();
        assert_eq!(result.value(0, exact_idx), Some(&Value::Float(14.5)));
    }

    #[test]
    fn projection_renames_height_bounds() {
        let mut frame = Frame::new(vec![
            "city".to_string(),
            "height_min_feet".to_string(),
            "height_max_feet".to_string(),
        ]);
        frame
            .push_row(vec![
                Some(Value::String("x".to_string())),
                Some(Value::Integer(1)),
                Some(Value::Integer(15)),
            ])
            .unwrap();
        let result = maximal_frame(frame).unwrap();
        assert!(result.column_index("height_min_ft").is_some());
        assert!(result.column_index("height_max_ft").is_some());
        assert!(result.column_index("height_min_feet").is_none());
    }

    #[test]
    fn duplicate_rows_collapse() {
        let mut frame = Frame::new(vec!["city".to_string(), "address".to_string()]);
        push_strings(&mut frame, &[Some("x"), Some("1 Elm St")]);
        push_strings(&mut frame, &[Some("x"), Some("1 Elm St")]);
        let result = maximal_frame(frame).unwrap();
        assert_eq!(result.row_count(), 1);
    }
}
