mod common;

use std::collections::HashMap;
use std::path::Path;

use assert_cmd::Command;
use predicates::str::contains;

use common::{TestWorkspace, point_collection};

fn run_normalize(data: &Path, output: &Path) {
    Command::cargo_bin("canopy-etl")
        .expect("binary exists")
        .args([
            "normalize",
            "-d",
            data.to_str().expect("data path utf-8"),
            "-o",
            output.to_str().expect("output path utf-8"),
        ])
        .assert()
        .success();
}

fn read_rows(path: &Path) -> (Vec<String>, Vec<HashMap<String, String>>) {
    let mut reader = csv::Reader::from_path(path).expect("open output");
    let headers: Vec<String> = reader
        .headers()
        .expect("headers")
        .iter()
        .map(|h| h.to_string())
        .collect();
    let rows = reader
        .records()
        .map(|record| {
            let record = record.expect("record");
            headers
                .iter()
                .cloned()
                .zip(record.iter().map(|cell| cell.to_string()))
                .collect()
        })
        .collect();
    (headers, rows)
}

#[test]
fn disjoint_city_columns_null_fill_after_concat() {
    let ws = TestWorkspace::new();
    ws.write(
        "data/los-angeles-city/trees.geojson",
        &point_collection(&[
            (
                r#"{"botanicaln":"quercus agrifolia","condition":"good","tree":77}"#,
                -118.25,
                34.05,
            ),
            (
                r#"{"botanicaln":"platanus racemosa","condition":"fair","tree":78}"#,
                -118.26,
                34.06,
            ),
        ]),
    );
    ws.write(
        "data/bellflower/inventory.csv",
        "Address,Street,SPECIES,DBH,latitude,longitude\n\
         1200,elm st,coast live oak,31+,33.88,-118.12\n\
         1201,elm st,coast live oak,0-6,33.89,-118.13\n",
    );
    let output = ws.path().join("trees.csv");
    run_normalize(&ws.path().join("data"), &output);

    let (headers, rows) = read_rows(&output);
    for column in [
        "tree_id",
        "name_botanical",
        "condition",
        "name_common",
        "address",
        "city",
        "diameter_min_in",
        "diameter_max_in",
        "latitude",
        "longitude",
        "state",
    ] {
        assert!(headers.iter().any(|h| h == column), "missing {column}");
    }
    assert_eq!(rows.len(), 4);

    let la = &rows[0];
    assert_eq!(la["city"], "los-angeles-city");
    assert_eq!(la["name_botanical"], "Quercus Agrifolia");
    assert_eq!(la["condition"], "good");
    assert_eq!(la["tree_id"], "77");
    // bellflower-only columns are null for los-angeles rows
    assert_eq!(la["address"], "");
    assert_eq!(la["diameter_min_in"], "");

    let bell = &rows[2];
    assert_eq!(bell["city"], "bellflower");
    assert_eq!(bell["address"], "1200 Elm St");
    assert_eq!(bell["name_common"], "Coast Live Oak");
    assert_eq!(bell["diameter_min_in"], "31");
    assert_eq!(bell["diameter_max_in"], "");
    assert_eq!(bell["condition"], "");
    assert_eq!(bell["state"], "CA");

    let bell_closed = &rows[3];
    assert_eq!(bell_closed["diameter_min_in"], "0");
    assert_eq!(bell_closed["diameter_max_in"], "6");
}

#[test]
fn dash_sentinel_rows_keep_null_bounds() {
    let ws = TestWorkspace::new();
    ws.write(
        "data/los-angeles-city/trees.csv",
        "SPECIES,HEIGHT_RAN,latitude,longitude\n\
         coast live oak,---,34.05,-118.25\n\
         coast live oak,01-15,34.06,-118.26\n",
    );
    let output = ws.path().join("trees.csv");
    run_normalize(&ws.path().join("data"), &output);

    let (_, rows) = read_rows(&output);
    assert_eq!(rows[0]["height_min_ft"], "");
    assert_eq!(rows[0]["height_max_ft"], "");
    assert_eq!(rows[1]["height_min_ft"], "1");
    assert_eq!(rows[1]["height_max_ft"], "15");
}

#[test]
fn fallback_geojson_pool_feeds_directoryless_cities() {
    let ws = TestWorkspace::new();
    ws.write(
        "data/all/los-angeles-county.geojson",
        &point_collection(&[(r#"{"species":"western sycamore"}"#, -118.3, 34.1)]),
    );
    let output = ws.path().join("trees.csv");
    run_normalize(&ws.path().join("data"), &output);

    let (_, rows) = read_rows(&output);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["city"], "los-angeles-county");
    assert_eq!(rows[0]["name_common"], "Western Sycamore");
}

#[test]
fn santa_monica_feed_renames_and_joins_heritage() {
    let ws = TestWorkspace::new();
    ws.write(
        "data/santa-monica/trees.csv",
        "Tree ID,Name Botanical,Name Common,Height Min,Height Max,DBH Min,DBH Max,\
         Latitude,Longitude,Location Description,Address,Street\n\
         1,Quercus agrifolia,Coast live oak,5,15,6,12,34.01,-118.49,Median,2600,Ocean Ave\n\
         2,Platanus racemosa,Western sycamore,1,15,0,6,34.02,-118.48,,2700,Ocean Ave\n",
    );
    ws.write(
        "data/santa-monica/heritage_trees.csv",
        "tree_id,year_added,heritage_number,text\n1,2015,77,Moreton Bay fig row\n",
    );
    let output = ws.path().join("trees.csv");
    run_normalize(&ws.path().join("data"), &output);

    let (_, rows) = read_rows(&output);
    assert_eq!(rows.len(), 2);

    let heritage_tree = &rows[0];
    assert_eq!(heritage_tree["city"], "santa-monica");
    assert_eq!(heritage_tree["tree_id"], "1");
    assert_eq!(heritage_tree["name_botanical"], "Quercus Agrifolia");
    assert_eq!(heritage_tree["address"], "2600 Ocean Ave");
    assert_eq!(heritage_tree["height_min_ft"], "5");
    assert_eq!(heritage_tree["height_max_ft"], "15");
    assert_eq!(heritage_tree["diameter_min_in"], "6");
    assert_eq!(heritage_tree["location_description"], "Median");
    assert_eq!(heritage_tree["heritage"], "true");
    assert_eq!(heritage_tree["heritage_year"], "2015");
    assert_eq!(heritage_tree["heritage_number"], "77");
    assert_eq!(heritage_tree["heritage_text"], "Moreton Bay fig row");

    let plain_tree = &rows[1];
    assert_eq!(plain_tree["heritage"], "false");
    assert_eq!(plain_tree["heritage_year"], "");
}

#[test]
fn duplicate_source_files_abort_the_run() {
    let ws = TestWorkspace::new();
    let collection = point_collection(&[(r#"{"species":"oak"}"#, -118.3, 34.1)]);
    ws.write("data/glendale/a.geojson", &collection);
    ws.write("data/glendale/b.geojson", &collection);
    Command::cargo_bin("canopy-etl")
        .expect("binary exists")
        .args([
            "normalize",
            "-d",
            ws.path().join("data").to_str().expect("utf-8"),
        ])
        .assert()
        .failure()
        .stderr(contains("expected at most one"));
}

#[test]
fn unrecognized_bucket_token_aborts_the_run() {
    let ws = TestWorkspace::new();
    ws.write(
        "data/los-angeles-city/trees.csv",
        "SPECIES,DBH,latitude,longitude\ncoast live oak,huge,34.05,-118.25\n",
    );
    Command::cargo_bin("canopy-etl")
        .expect("binary exists")
        .args([
            "normalize",
            "-d",
            ws.path().join("data").to_str().expect("utf-8"),
        ])
        .assert()
        .failure()
        .stderr(contains("Unrecognized category token"));
}

#[test]
fn csv_without_coordinates_aborts_the_run() {
    let ws = TestWorkspace::new();
    ws.write(
        "data/los-angeles-city/trees.csv",
        "SPECIES,address\ncoast live oak,1 Elm St\n",
    );
    Command::cargo_bin("canopy-etl")
        .expect("binary exists")
        .args([
            "normalize",
            "-d",
            ws.path().join("data").to_str().expect("utf-8"),
        ])
        .assert()
        .failure()
        .stderr(contains("no geometry"));
}
