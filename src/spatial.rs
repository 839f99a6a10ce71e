//! Nearest-segment spatial matching and planting/pruning enrichment.
//!
//! Street and median planting segments are exploded into their constituent
//! vertex points, each tagged with a geohash at [`GEOHASH_PRECISION`]. Trees
//! are matched coarse-to-fine: the prefix length starts at the full precision
//! and shrinks one character per round, with matched trees leaving the pool.
//! This is a bucket approximation, not an exact nearest-neighbor query — two
//! points sharing a 9-character prefix need not be the globally closest pair.
//! Within a bucket, though, the winner is deterministic: smallest squared
//! lon/lat distance, then smallest segment id.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use geo::Contains;
use geo_types::MultiPolygon;
use geohash::Coord;
use log::{info, warn};

use crate::cli::EnrichArgs;
use crate::frame::{Frame, Value};
use crate::geo_io;
use crate::io_utils;

pub const GEOHASH_PRECISION: usize = 9;

pub const SEGMENT_COLUMN: &str = "SEGMENT";
const PLANTING_YEAR_COLUMN: &str = "YEAR";
const REPLACEMENT_COLUMN: &str = "REPLACE";
const ZONE_ID_COLUMN: &str = "Id";

/// Pruning datasets in priority order: the first dataset containing a tree's
/// segment supplies its pruning year.
const PRUNING_YEARS: &[(&str, &str)] = &[
    ("1718", "2017-2018"),
    ("1819", "2018-2019"),
    ("1920", "2019-2020"),
];

/// One vertex of a planting segment.
#[derive(Debug, Clone)]
pub struct SegmentVertex {
    pub segment: String,
    pub lon: f64,
    pub lat: f64,
    pub hash: String,
}

/// A tree point awaiting a segment match, tracked by its row position.
#[derive(Debug, Clone)]
pub struct TreePoint {
    pub row: usize,
    pub lon: f64,
    pub lat: f64,
    pub hash: String,
}

pub fn encode_geohash(lon: f64, lat: f64) -> Result<String> {
    geohash::encode(Coord { x: lon, y: lat }, GEOHASH_PRECISION)
        .with_context(|| format!("Geohashing point ({lon}, {lat})"))
}

/// A planting dataset: per-segment attributes plus hashed vertex points.
pub struct SegmentDataset {
    pub attributes: Frame,
    pub vertices: Vec<SegmentVertex>,
}

pub fn load_segments(path: &Path) -> Result<SegmentDataset> {
    let set = geo_io::read_features(path)?;
    let segment_idx = set
        .frame
        .column_index(SEGMENT_COLUMN)
        .ok_or_else(|| anyhow!("Segment dataset {path:?} has no '{SEGMENT_COLUMN}' column"))?;

    let mut vertices = Vec::new();
    for (row_idx, geometry) in set.geometries.iter().enumerate() {
        let Some(segment) = set.frame.value(row_idx, segment_idx) else {
            warn!("Feature {row_idx} of {path:?} has a null segment id; skipped");
            continue;
        };
        let segment = segment.as_display();
        for (lon, lat) in geo_io::line_vertices(geometry)
            .with_context(|| format!("Exploding feature {row_idx} of {path:?}"))?
        {
            vertices.push(SegmentVertex {
                segment: segment.clone(),
                lon,
                lat,
                hash: encode_geohash(lon, lat)?,
            });
        }
    }
    Ok(SegmentDataset {
        attributes: set.frame,
        vertices,
    })
}

/// Coarse-to-fine prefix matching of trees against candidate vertices.
/// Returns `tree row → segment id` for every tree that found a bucket before
/// the prefix length ran out.
pub fn match_off_hashes(
    candidates: &[SegmentVertex],
    trees: &[TreePoint],
) -> HashMap<usize, String> {
    let mut mapper: HashMap<usize, String> = HashMap::new();
    let mut remaining: Vec<&TreePoint> = trees.iter().collect();

    for digits in (1..=GEOHASH_PRECISION).rev() {
        if remaining.is_empty() || candidates.is_empty() {
            break;
        }
        let mut buckets: HashMap<&str, Vec<&SegmentVertex>> = HashMap::new();
        for candidate in candidates {
            buckets
                .entry(&candidate.hash[..digits])
                .or_default()
                .push(candidate);
        }
        remaining.retain(|tree| {
            let Some(bucket) = buckets.get(&tree.hash[..digits]) else {
                return true;
            };
            if let Some(best) = nearest_in_bucket(bucket, tree) {
                mapper.insert(tree.row, best.segment.clone());
                return false;
            }
            true
        });
    }
    mapper
}

fn nearest_in_bucket<'a>(
    bucket: &[&'a SegmentVertex],
    tree: &TreePoint,
) -> Option<&'a SegmentVertex> {
    bucket.iter().copied().min_by(|a, b| {
        let da = squared_distance(a, tree);
        let db = squared_distance(b, tree);
        da.total_cmp(&db).then_with(|| a.segment.cmp(&b.segment))
    })
}

fn squared_distance(vertex: &SegmentVertex, tree: &TreePoint) -> f64 {
    let dx = vertex.lon - tree.lon;
    let dy = vertex.lat - tree.lat;
    dx * dx + dy * dy
}

/// Enriches matched tree records with planting segments, pruning years, and
/// pruning-zone containment.
pub fn enrich_frame(
    mut trees: Frame,
    planting_streets: &Path,
    planting_medians: &Path,
    pruning_dir: Option<&Path>,
    zones_path: Option<&Path>,
) -> Result<Frame> {
    let streets = load_segments(planting_streets)?;
    let medians = load_segments(planting_medians)?;
    info!(
        "Planting segments: {} street vertex point(s), {} median vertex point(s)",
        streets.vertices.len(),
        medians.vertices.len()
    );

    let points = collect_tree_points(&trees)?;
    let (median_points, street_points) = partition_by_location(&trees, points);

    let mut mapper = match_off_hashes(&streets.vertices, &street_points);
    mapper.extend(match_off_hashes(&medians.vertices, &median_points));
    let matched = mapper.len();
    info!(
        "Matched {matched} of {} tree(s) to a planting segment",
        trees.row_count()
    );

    let segments: Vec<Option<Value>> = (0..trees.row_count())
        .map(|row| mapper.get(&row).map(|seg| Value::String(seg.clone())))
        .collect();
    trees.set_column(SEGMENT_COLUMN, segments)?;

    join_planting_attributes(&mut trees, &[&streets.attributes, &medians.attributes])?;
    if let Some(dir) = pruning_dir {
        join_pruning_years(&mut trees, dir)?;
    }
    if let Some(path) = zones_path {
        join_pruning_zones(&mut trees, path)?;
    }
    add_location_wkt(&mut trees)?;
    Ok(trees)
}

fn collect_tree_points(trees: &Frame) -> Result<Vec<TreePoint>> {
    let lat_idx = trees
        .column_index("latitude")
        .ok_or_else(|| anyhow!("Tree records have no 'latitude' column"))?;
    let lon_idx = trees
        .column_index("longitude")
        .ok_or_else(|| anyhow!("Tree records have no 'longitude' column"))?;
    let mut points = Vec::with_capacity(trees.row_count());
    for (row_idx, row) in trees.rows().iter().enumerate() {
        let (Some(lat), Some(lon)) = (
            row[lat_idx].as_ref().and_then(Value::as_f64),
            row[lon_idx].as_ref().and_then(Value::as_f64),
        ) else {
            bail!("Tree record {} has no point geometry", row_idx + 1);
        };
        points.push(TreePoint {
            row: row_idx,
            lon,
            lat,
            hash: encode_geohash(lon, lat)?,
        });
    }
    Ok(points)
}

/// Median-located trees match only median segments; everything else matches
/// street segments.
fn partition_by_location(trees: &Frame, points: Vec<TreePoint>) -> (Vec<TreePoint>, Vec<TreePoint>) {
    let location_idx = trees.column_index("location_description");
    points.into_iter().partition(|point| {
        location_idx
            .and_then(|idx| trees.value(point.row, idx))
            .is_some_and(|value| value.as_display().to_lowercase() == "median")
    })
}

/// Left-joins `YEAR` and `REPLACE` from the segment attribute tables, first
/// de-duplicating segments (street datasets take precedence over medians).
fn join_planting_attributes(trees: &mut Frame, attribute_frames: &[&Frame]) -> Result<()> {
    let mut attrs: HashMap<String, (Option<Value>, Option<Value>)> = HashMap::new();
    for frame in attribute_frames {
        let Some(segment_idx) = frame.column_index(SEGMENT_COLUMN) else {
            continue;
        };
        let year_idx = frame.column_index(PLANTING_YEAR_COLUMN);
        let replace_idx = frame.column_index(REPLACEMENT_COLUMN);
        for row in frame.rows() {
            let Some(segment) = row[segment_idx].as_ref() else {
                continue;
            };
            attrs.entry(segment.as_display()).or_insert_with(|| {
                (
                    year_idx.and_then(|idx| row[idx].clone()),
                    replace_idx.and_then(|idx| row[idx].clone()),
                )
            });
        }
    }

    let segment_idx = trees
        .column_index(SEGMENT_COLUMN)
        .ok_or_else(|| anyhow!("Tree records have no '{SEGMENT_COLUMN}' column"))?;
    let mut years = Vec::with_capacity(trees.row_count());
    let mut replacements = Vec::with_capacity(trees.row_count());
    for row in trees.rows() {
        let hit = row[segment_idx]
            .as_ref()
            .and_then(|segment| attrs.get(&segment.as_display()));
        match hit {
            Some((year, replacement)) => {
                years.push(year.clone());
                replacements.push(replacement.clone());
            }
            None => {
                years.push(None);
                replacements.push(None);
            }
        }
    }
    trees.set_column("planting_year", years)?;
    trees.set_column("replacement_species", replacements)?;
    Ok(())
}

/// Collapses the year-labelled pruning datasets into one `pruning_year`
/// column: the first dataset (in priority order) whose segments include the
/// tree's segment wins.
fn join_pruning_years(trees: &mut Frame, pruning_dir: &Path) -> Result<()> {
    let mut year_segments: Vec<(&str, HashSet<String>)> = Vec::new();
    for (code, label) in PRUNING_YEARS {
        let mut segments = HashSet::new();
        for kind in ["streets", "medians"] {
            let path = find_dataset(pruning_dir, &format!("pruning{code}_{kind}"))?;
            let set = geo_io::read_features(&path)?;
            if set.frame.is_empty() {
                continue;
            }
            let Some(segment_idx) = set.frame.column_index(SEGMENT_COLUMN) else {
                bail!("Pruning dataset {path:?} has no '{SEGMENT_COLUMN}' column");
            };
            for row in set.frame.rows() {
                if let Some(segment) = row[segment_idx].as_ref() {
                    segments.insert(segment.as_display());
                }
            }
        }
        year_segments.push((label, segments));
    }

    let segment_idx = trees
        .column_index(SEGMENT_COLUMN)
        .ok_or_else(|| anyhow!("Tree records have no '{SEGMENT_COLUMN}' column"))?;
    let values: Vec<Option<Value>> = trees
        .rows()
        .iter()
        .map(|row| {
            let segment = row[segment_idx].as_ref()?.as_display();
            year_segments
                .iter()
                .find(|(_, segments)| segments.contains(&segment))
                .map(|(label, _)| Value::String(label.to_string()))
        })
        .collect();
    trees.set_column("pruning_year", values)?;
    Ok(())
}

/// Point-in-polygon join against the pruning zones; a tree outside every
/// zone keeps a null zone id.
fn join_pruning_zones(trees: &mut Frame, zones_path: &Path) -> Result<()> {
    let set = geo_io::read_features(zones_path)?;
    let id_idx = set
        .frame
        .column_index(ZONE_ID_COLUMN)
        .ok_or_else(|| anyhow!("Zone dataset {zones_path:?} has no '{ZONE_ID_COLUMN}' column"))?;
    let mut zones: Vec<(Option<Value>, MultiPolygon<f64>)> = Vec::new();
    for (row_idx, geometry) in set.geometries.iter().enumerate() {
        let boundary = geo_io::as_multipolygon(geometry)
            .with_context(|| format!("Zone feature {row_idx} of {zones_path:?}"))?;
        zones.push((set.frame.value(row_idx, id_idx).cloned(), boundary));
    }

    let points = collect_tree_points(trees)?;
    let values: Vec<Option<Value>> = points
        .iter()
        .map(|point| {
            let location = geo::Point::new(point.lon, point.lat);
            zones
                .iter()
                .find(|(_, boundary)| boundary.contains(&location))
                .and_then(|(id, _)| id.clone())
        })
        .collect();
    trees.set_column("pruning_zone", values)?;
    Ok(())
}

/// The WKT form the storage loader feeds to `ST_GeomFromText` — latitude
/// first.
fn add_location_wkt(trees: &mut Frame) -> Result<()> {
    let points = collect_tree_points(trees)?;
    let values: Vec<Option<Value>> = points
        .iter()
        .map(|point| Some(Value::String(format!("POINT ({} {})", point.lat, point.lon))))
        .collect();
    trees.set_column("location", values)?;
    Ok(())
}

/// Finds `<stem>.shp` or `<stem>.geojson` under `dir`.
fn find_dataset(dir: &Path, stem: &str) -> Result<PathBuf> {
    for extension in ["shp", "geojson"] {
        let candidate = dir.join(format!("{stem}.{extension}"));
        if candidate.is_file() {
            return Ok(candidate);
        }
    }
    bail!("No dataset named '{stem}' (.shp or .geojson) under {dir:?}")
}

pub fn execute(args: &EnrichArgs) -> Result<()> {
    let encoding = io_utils::resolve_encoding(args.input_encoding.as_deref())?;
    let delimiter = io_utils::resolve_input_delimiter(&args.input, args.delimiter);
    let trees = io_utils::read_frame(&args.input, delimiter, encoding)
        .with_context(|| format!("Reading tree records {:?}", args.input))?;
    let enriched = enrich_frame(
        trees,
        &args.planting_streets,
        &args.planting_medians,
        args.pruning.as_deref(),
        args.zones.as_deref(),
    )?;
    io_utils::write_frame(&enriched, args.output.as_deref(), delimiter)?;
    info!("Wrote {} enriched tree record(s)", enriched.row_count());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vertex(segment: &str, lon: f64, lat: f64) -> SegmentVertex {
        SegmentVertex {
            segment: segment.to_string(),
            lon,
            lat,
            hash: encode_geohash(lon, lat).unwrap(),
        }
    }

    fn tree(row: usize, lon: f64, lat: f64) -> TreePoint {
        TreePoint {
            row,
            lon,
            lat,
            hash: encode_geohash(lon, lat).unwrap(),
        }
    }

    #[test]
    fn exact_vertex_point_matches_at_full_precision() {
        let candidates = vec![
            vertex("100", -118.4912, 34.0195),
            vertex("200", -118.3000, 34.1000),
        ];
        let trees = vec![tree(0, -118.4912, 34.0195)];
        let mapper = match_off_hashes(&candidates, &trees);
        assert_eq!(mapper.get(&0).map(String::as_str), Some("100"));
    }

    #[test]
    fn far_away_tree_matches_at_coarser_precision() {
        let candidates = vec![vertex("100", -118.4912, 34.0195)];
        // ~0.01 degrees away: same coarse prefix, different fine prefix
        let trees = vec![tree(0, -118.4812, 34.0195)];
        let mapper = match_off_hashes(&candidates, &trees);
        assert_eq!(mapper.get(&0).map(String::as_str), Some("100"));
    }

    #[test]
    fn unmatchable_tree_stays_unmatched() {
        // Opposite hemisphere: no shared prefix even at one digit
        let candidates = vec![vertex("100", -118.4912, 34.0195)];
        let trees = vec![tree(0, 120.0, -34.0)];
        let mapper = match_off_hashes(&candidates, &trees);
        assert!(mapper.is_empty());
    }

    #[test]
    fn bucket_ties_break_by_distance_then_segment() {
        let near = vertex("200", -118.49121, 34.01951);
        let far = vertex("100", -118.49129, 34.01959);
        let trees = vec![tree(0, -118.49121, 34.01951)];
        let mapper = match_off_hashes(&[far.clone(), near.clone()], &trees);
        assert_eq!(mapper.get(&0).map(String::as_str), Some("200"));

        // Identical candidate points: smaller segment id wins
        let twin_a = vertex("300", -118.49121, 34.01951);
        let twin_b = vertex("250", -118.49121, 34.01951);
        let mapper = match_off_hashes(&[twin_a, twin_b], &trees);
        assert_eq!(mapper.get(&0).map(String::as_str), Some("250"));
    }

    #[test]
    fn matched_trees_leave_the_pool() {
        let candidates = vec![vertex("100", -118.4912, 34.0195)];
        let trees = vec![tree(0, -118.4912, 34.0195), tree(1, -118.4912, 34.0196)];
        let mapper = match_off_hashes(&candidates, &trees);
        assert_eq!(mapper.len(), 2);
        assert_eq!(mapper.get(&0).map(String::as_str), Some("100"));
        assert_eq!(mapper.get(&1).map(String::as_str), Some("100"));
    }

    #[test]
    fn geohash_precision_is_nine_characters() {
        assert_eq!(encode_geohash(-118.4912, 34.0195).unwrap().len(), 9);
    }
}
