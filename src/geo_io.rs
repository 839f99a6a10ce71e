//! Geometry dataset loading: GeoJSON feature collections and ESRI shapefiles
//! into attribute [`Frame`]s with a parallel geometry list.
//!
//! All geometry inputs are expected in WGS84 lon/lat. Attribute columns from
//! shapefile DBF records are emitted in sorted field-name order so output is
//! stable across runs.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use geo_types::{Geometry, MultiPolygon};
use geojson::{FeatureCollection, GeoJson};
use shapefile::dbase::FieldValue;

use crate::frame::{Frame, Value};

/// A loaded geometry dataset: one attribute row and one geometry per feature.
pub struct FeatureSet {
    pub frame: Frame,
    pub geometries: Vec<Geometry<f64>>,
}

/// The candidate source files of a single city directory.
pub struct CitySource {
    pub geojson: Option<PathBuf>,
    pub csv: Option<PathBuf>,
}

/// Finds the city's source files: at most one `.geojson` and at most one
/// `.csv` are allowed, anything more is a configuration error.
pub fn discover_city_source(dir: &Path) -> Result<CitySource> {
    let mut geojsons: Vec<PathBuf> = Vec::new();
    let mut csvs: Vec<PathBuf> = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("Listing city directory {dir:?}"))? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("geojson") => geojsons.push(path),
            Some(ext) if ext.eq_ignore_ascii_case("csv") => csvs.push(path),
            _ => {}
        }
    }
    if geojsons.len() > 1 {
        bail!("City directory {dir:?} has {} GeoJSON files, expected at most one", geojsons.len());
    }
    if csvs.len() > 1 {
        bail!("City directory {dir:?} has {} CSV files, expected at most one", csvs.len());
    }
    Ok(CitySource {
        geojson: geojsons.pop(),
        csv: csvs.pop(),
    })
}

/// Loads a GeoJSON or shapefile dataset, dispatching on the file extension.
pub fn read_features(path: &Path) -> Result<FeatureSet> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("shp") => read_shapefile(path),
        Some(ext) if ext.eq_ignore_ascii_case("geojson") || ext.eq_ignore_ascii_case("json") => {
            read_geojson(path)
        }
        other => bail!("Unsupported geometry dataset extension {other:?} for {path:?}"),
    }
}

fn read_geojson(path: &Path) -> Result<FeatureSet> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("Reading GeoJSON file {path:?}"))?;
    let geojson: GeoJson = contents
        .parse()
        .with_context(|| format!("Parsing GeoJSON file {path:?}"))?;
    let collection = FeatureCollection::try_from(geojson)
        .with_context(|| format!("{path:?} is not a feature collection"))?;

    let mut columns: Vec<String> = Vec::new();
    for feature in &collection.features {
        if let Some(properties) = &feature.properties {
            for key in properties.keys() {
                if !columns.iter().any(|c| c == key) {
                    columns.push(key.clone());
                }
            }
        }
    }

    let mut frame = Frame::new(columns.clone());
    let mut geometries = Vec::with_capacity(collection.features.len());
    for (idx, feature) in collection.features.into_iter().enumerate() {
        let geometry = feature
            .geometry
            .ok_or_else(|| anyhow!("Feature {idx} of {path:?} has no geometry"))?;
        let geometry = Geometry::<f64>::try_from(geometry)
            .with_context(|| format!("Converting geometry of feature {idx} in {path:?}"))?;
        let row = columns
            .iter()
            .map(|column| {
                feature
                    .properties
                    .as_ref()
                    .and_then(|props| props.get(column))
                    .and_then(json_to_value)
            })
            .collect();
        frame.push_row(row)?;
        geometries.push(geometry);
    }
    Ok(FeatureSet { frame, geometries })
}

fn read_shapefile(path: &Path) -> Result<FeatureSet> {
    let mut reader = shapefile::Reader::from_path(path)
        .with_context(|| format!("Opening shapefile {path:?}"))?;

    let mut rows: Vec<BTreeMap<String, Option<Value>>> = Vec::new();
    let mut geometries = Vec::new();
    for (idx, result) in reader.iter_shapes_and_records().enumerate() {
        let (shape, record) =
            result.with_context(|| format!("Reading feature {idx} of {path:?}"))?;
        geometries.push(shape_to_geometry(shape).with_context(|| {
            format!("Converting geometry of feature {idx} in {path:?}")
        })?);
        let fields: BTreeMap<String, Option<Value>> = record
            .into_iter()
            .map(|(name, value)| (name, dbf_to_value(value)))
            .collect();
        rows.push(fields);
    }

    let mut columns: Vec<String> = Vec::new();
    for row in &rows {
        for name in row.keys() {
            if !columns.iter().any(|c| c == name) {
                columns.push(name.clone());
            }
        }
    }

    let mut frame = Frame::new(columns.clone());
    for mut row in rows {
        let cells = columns
            .iter()
            .map(|column| row.remove(column).flatten())
            .collect();
        frame.push_row(cells)?;
    }
    Ok(FeatureSet { frame, geometries })
}

fn shape_to_geometry(shape: shapefile::Shape) -> Result<Geometry<f64>> {
    match shape {
        shapefile::Shape::Point(point) => Ok(Geometry::Point(point.into())),
        shapefile::Shape::Polyline(line) => Ok(Geometry::MultiLineString(line.into())),
        shapefile::Shape::Polygon(polygon) => Ok(Geometry::MultiPolygon(polygon.into())),
        other => bail!("Unsupported shape type {}", other.shapetype()),
    }
}

fn dbf_to_value(value: FieldValue) -> Option<Value> {
    match value {
        FieldValue::Character(text) => text.map(Value::String),
        FieldValue::Numeric(number) => number.map(Value::Float),
        FieldValue::Float(number) => number.map(|f| Value::Float(f as f64)),
        FieldValue::Integer(number) => Some(Value::Integer(number as i64)),
        FieldValue::Double(number) => Some(Value::Float(number)),
        FieldValue::Logical(flag) => flag.map(Value::Boolean),
        FieldValue::Date(date) => date.map(|d| {
            Value::String(format!("{:04}-{:02}-{:02}", d.year(), d.month(), d.day()))
        }),
        _ => None,
    }
}

fn json_to_value(value: &serde_json::Value) -> Option<Value> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::Bool(flag) => Some(Value::Boolean(*flag)),
        serde_json::Value::Number(number) => {
            if let Some(int) = number.as_i64() {
                Some(Value::Integer(int))
            } else {
                number.as_f64().map(Value::Float)
            }
        }
        serde_json::Value::String(text) => Some(Value::String(text.clone())),
        other => Some(Value::String(other.to_string())),
    }
}

/// Converts a point-feature dataset into a plain frame with `latitude` and
/// `longitude` columns derived from the geometry.
pub fn into_point_frame(set: FeatureSet) -> Result<Frame> {
    let FeatureSet {
        mut frame,
        geometries,
    } = set;
    let mut longitudes = Vec::with_capacity(geometries.len());
    let mut latitudes = Vec::with_capacity(geometries.len());
    for (idx, geometry) in geometries.iter().enumerate() {
        match geometry {
            Geometry::Point(point) => {
                longitudes.push(Some(Value::Float(point.x())));
                latitudes.push(Some(Value::Float(point.y())));
            }
            _ => bail!("Feature {idx} is not a point geometry"),
        }
    }
    frame.set_column("longitude", longitudes)?;
    frame.set_column("latitude", latitudes)?;
    Ok(frame)
}

/// Returns the constituent vertex points of a line geometry, in order.
pub fn line_vertices(geometry: &Geometry<f64>) -> Result<Vec<(f64, f64)>> {
    match geometry {
        Geometry::LineString(line) => Ok(line.coords().map(|c| (c.x, c.y)).collect()),
        Geometry::MultiLineString(lines) => Ok(lines
            .iter()
            .flat_map(|line| line.coords().map(|c| (c.x, c.y)))
            .collect()),
        _ => bail!("Geometry is not a line nor a multi-line"),
    }
}

/// Widens a polygon geometry to a multi-polygon for containment tests.
pub fn as_multipolygon(geometry: &Geometry<f64>) -> Result<MultiPolygon<f64>> {
    match geometry {
        Geometry::Polygon(polygon) => Ok(MultiPolygon(vec![polygon.clone()])),
        Geometry::MultiPolygon(polygons) => Ok(polygons.clone()),
        _ => bail!("Geometry is not a polygon nor a multi-polygon"),
    }
}

/// Synthesizes point columns for a CSV source, trying the lower- then the
/// upper-case spelling of the coordinate columns. The matched pair is renamed
/// to the canonical lower-case names.
pub fn synthesize_csv_points(frame: &mut Frame) -> Result<()> {
    for (lon, lat) in [("longitude", "latitude"), ("LONGITUDE", "LATITUDE")] {
        if frame.column_index(lon).is_some() && frame.column_index(lat).is_some() {
            frame.rename_column(lon, "longitude");
            frame.rename_column(lat, "latitude");
            return Ok(());
        }
    }
    bail!("CSV source has no longitude/latitude columns")
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::{LineString, MultiLineString, line_string};

    #[test]
    fn line_vertices_flattens_multi_lines() {
        let single: Geometry<f64> = Geometry::LineString(line_string![
            (x: -118.0, y: 34.0),
            (x: -118.1, y: 34.1),
        ]);
        assert_eq!(line_vertices(&single).unwrap().len(), 2);

        let multi: Geometry<f64> = Geometry::MultiLineString(MultiLineString::new(vec![
            LineString::from(vec![(-118.0, 34.0), (-118.1, 34.1)]),
            LineString::from(vec![(-118.2, 34.2)]),
        ]));
        assert_eq!(
            line_vertices(&multi).unwrap(),
            vec![(-118.0, 34.0), (-118.1, 34.1), (-118.2, 34.2)]
        );

        let point: Geometry<f64> = Geometry::Point((1.0, 2.0).into());
        assert!(line_vertices(&point).is_err());
    }

    #[test]
    fn synthesize_csv_points_tries_both_spellings() {
        let mut frame = Frame::new(vec!["LONGITUDE".to_string(), "LATITUDE".to_string()]);
        frame
            .push_row(vec![Some(Value::Float(-118.2)), Some(Value::Float(34.1))])
            .unwrap();
        synthesize_csv_points(&mut frame).unwrap();
        assert!(frame.column_index("longitude").is_some());
        assert!(frame.column_index("latitude").is_some());

        let mut no_geometry = Frame::new(vec!["address".to_string()]);
        no_geometry
            .push_row(vec![Some(Value::String("1 Main St".to_string()))])
            .unwrap();
        assert!(synthesize_csv_points(&mut no_geometry).is_err());
    }
}
