#![allow(dead_code)]

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::{TempDir, tempdir};

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    /// Creates a fresh scratch directory for the current test case.
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    /// Returns the root path for all files owned by this workspace.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace (creating parent
    /// directories as needed) and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent dirs");
        }
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents.as_bytes())
            .expect("write temp file contents");
        path
    }

    /// Reads a workspace file back as a string.
    pub fn read(&self, name: &str) -> String {
        fs::read_to_string(self.temp_dir.path().join(name)).expect("read temp file")
    }
}

/// Builds a minimal GeoJSON feature collection of point features, each with
/// the given properties object.
pub fn point_collection(features: &[(&str, f64, f64)]) -> String {
    let features: Vec<String> = features
        .iter()
        .map(|(properties, lon, lat)| {
            format!(
                r#"{{"type":"Feature","properties":{properties},"geometry":{{"type":"Point","coordinates":[{lon},{lat}]}}}}"#
            )
        })
        .collect();
    format!(
        r#"{{"type":"FeatureCollection","features":[{}]}}"#,
        features.join(",")
    )
}

/// Builds a GeoJSON feature collection of line features.
pub fn line_collection(features: &[(&str, &[(f64, f64)])]) -> String {
    let features: Vec<String> = features
        .iter()
        .map(|(properties, coords)| {
            let coords: Vec<String> = coords
                .iter()
                .map(|(lon, lat)| format!("[{lon},{lat}]"))
                .collect();
            format!(
                r#"{{"type":"Feature","properties":{properties},"geometry":{{"type":"LineString","coordinates":[{}]}}}}"#,
                coords.join(",")
            )
        })
        .collect();
    format!(
        r#"{{"type":"FeatureCollection","features":[{}]}}"#,
        features.join(",")
    )
}

/// Builds a GeoJSON feature collection of polygon features (one outer ring
/// each).
pub fn polygon_collection(features: &[(&str, &[(f64, f64)])]) -> String {
    let features: Vec<String> = features
        .iter()
        .map(|(properties, ring)| {
            let coords: Vec<String> = ring
                .iter()
                .map(|(lon, lat)| format!("[{lon},{lat}]"))
                .collect();
            format!(
                r#"{{"type":"Feature","properties":{properties},"geometry":{{"type":"Polygon","coordinates":[[{}]]}}}}"#,
                coords.join(",")
            )
        })
        .collect();
    format!(
        r#"{{"type":"FeatureCollection","features":[{}]}}"#,
        features.join(",")
    )
}
