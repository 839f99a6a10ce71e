//! Species synonym matching against the canonical species table.
//!
//! The species table keys on `botanical_name` and carries extra name columns:
//! plain alias columns plus JSON-encoded synonym lists. Index construction
//! flattens all of them into one lowercased synonym → botanical name lookup.
//! A synonym claimed by two species goes to the first species in table order;
//! the collision is logged, never silently reshuffled.

use std::collections::{BTreeSet, HashMap, HashSet};

use anyhow::{Context, Result, anyhow};
use log::{info, warn};

use crate::cli::SpeciesArgs;
use crate::frame::{Frame, Value};
use crate::io_utils;
use crate::transform::string_ops;

pub const BOTANICAL_NAME: &str = "botanical_name";
pub const REGULAR_SYNONYM_COLUMNS: &[&str] = &["sm_botanical_name"];
pub const JSON_SYNONYM_COLUMNS: &[&str] = &["botanical_synonyms"];

pub struct SynonymIndex {
    entries: HashMap<String, String>,
}

impl SynonymIndex {
    pub fn lookup(&self, botanical: &str) -> Option<&str> {
        let key = string_ops::lowercase(botanical.trim());
        self.entries.get(&*key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Loads the species table, dropping duplicate `botanical_name` rows (first
/// occurrence wins).
pub fn load_species_table(
    path: &std::path::Path,
    delimiter: u8,
    encoding: &'static encoding_rs::Encoding,
) -> Result<Frame> {
    let mut frame = io_utils::read_frame(path, delimiter, encoding)
        .with_context(|| format!("Reading species table {path:?}"))?;
    let key_idx = frame
        .column_index(BOTANICAL_NAME)
        .ok_or_else(|| anyhow!("Species table {path:?} has no '{BOTANICAL_NAME}' column"))?;
    let mut seen: HashSet<String> = HashSet::new();
    frame.retain_rows(|row| match row[key_idx].as_ref() {
        Some(key) => seen.insert(key.as_display()),
        None => false,
    });
    Ok(frame)
}

/// The full synonym set of one species row: the lowercased primary name, each
/// non-null plain alias, and every entry of each JSON-array column. A JSON
/// column that fails to parse contributes its raw text as a single synonym.
pub fn row_synonyms(frame: &Frame, row_idx: usize) -> Vec<String> {
    let mut synonyms: BTreeSet<String> = BTreeSet::new();
    if let Some(base_idx) = frame.column_index(BOTANICAL_NAME)
        && let Some(base) = frame.value(row_idx, base_idx)
    {
        synonyms.insert(base.as_display().to_lowercase());
    }
    for column in REGULAR_SYNONYM_COLUMNS {
        if let Some(idx) = frame.column_index(column)
            && let Some(value) = frame.value(row_idx, idx)
        {
            let text = value.as_display();
            if !text.is_empty() {
                synonyms.insert(text.to_lowercase());
            }
        }
    }
    for column in JSON_SYNONYM_COLUMNS {
        if let Some(idx) = frame.column_index(column)
            && let Some(value) = frame.value(row_idx, idx)
        {
            let raw = value.as_display();
            match serde_json::from_str::<Vec<String>>(&raw) {
                Ok(parsed) => {
                    synonyms.extend(parsed.into_iter().map(|s| s.to_lowercase()));
                }
                Err(_) => {
                    synonyms.insert(raw.to_lowercase());
                }
            }
        }
    }
    synonyms.into_iter().collect()
}

/// Flattens the species table into the synonym lookup.
pub fn build_index(species: &Frame) -> Result<SynonymIndex> {
    let key_idx = species
        .column_index(BOTANICAL_NAME)
        .ok_or_else(|| anyhow!("Species table has no '{BOTANICAL_NAME}' column"))?;
    let mut entries: HashMap<String, String> = HashMap::new();
    for row_idx in 0..species.row_count() {
        let Some(botanical) = species.value(row_idx, key_idx) else {
            continue;
        };
        let botanical = botanical.as_display();
        for synonym in row_synonyms(species, row_idx) {
            match entries.get(&synonym) {
                Some(existing) if existing != &botanical => {
                    warn!(
                        "Synonym '{synonym}' claimed by both '{existing}' and '{botanical}'; keeping '{existing}'"
                    );
                }
                Some(_) => {}
                None => {
                    entries.insert(synonym, botanical.clone());
                }
            }
        }
    }
    Ok(SynonymIndex { entries })
}

/// Matches each tree's `name_botanical` against the index, replacing the
/// column with the canonical `botanical_name`. With `keep_unmatched` the
/// output keeps non-matching rows with a null species key; otherwise they
/// are dropped.
pub fn match_species(trees: &Frame, index: &SynonymIndex, keep_unmatched: bool) -> Result<Frame> {
    let name_idx = trees
        .column_index("name_botanical")
        .ok_or_else(|| anyhow!("Tree records have no 'name_botanical' column"))?;

    let mut matched = Frame::new(trees.columns().to_vec());
    let mut keys: Vec<Option<Value>> = Vec::new();
    let mut misses = 0usize;
    for row in trees.rows() {
        let hit = row[name_idx]
            .as_ref()
            .and_then(|name| index.lookup(&name.as_display()));
        match hit {
            Some(botanical) => {
                matched.push_row(row.clone())?;
                keys.push(Some(Value::String(botanical.to_string())));
            }
            None => {
                misses += 1;
                if keep_unmatched {
                    matched.push_row(row.clone())?;
                    keys.push(None);
                }
            }
        }
    }
    matched.set_column(BOTANICAL_NAME, keys)?;
    matched.drop_column("name_botanical");
    if misses > 0 {
        warn!("{misses} tree record(s) had no species match");
    }
    Ok(matched)
}

/// Tree rows whose botanical name matches no synonym — the inventory side of
/// a missing-species review.
pub fn missing_species(trees: &Frame, index: &SynonymIndex) -> Result<Frame> {
    let name_idx = trees
        .column_index("name_botanical")
        .ok_or_else(|| anyhow!("Tree records have no 'name_botanical' column"))?;
    let mut missing = Frame::new(trees.columns().to_vec());
    for row in trees.rows() {
        let unmatched = match row[name_idx].as_ref() {
            Some(name) => index.lookup(&name.as_display()).is_none(),
            None => true,
        };
        if unmatched {
            missing.push_row(row.clone())?;
        }
    }
    Ok(missing)
}

pub fn execute(args: &SpeciesArgs) -> Result<()> {
    let encoding = io_utils::resolve_encoding(args.input_encoding.as_deref())?;
    let delimiter = io_utils::resolve_input_delimiter(&args.input, args.delimiter);

    let species = load_species_table(&args.species, delimiter, encoding)?;
    let index = build_index(&species)?;
    info!(
        "Synonym index: {} synonym(s) across {} species",
        index.len(),
        species.row_count()
    );

    let trees = io_utils::read_frame(&args.input, delimiter, encoding)
        .with_context(|| format!("Reading tree records {:?}", args.input))?;

    let output = if args.report_missing {
        let missing = missing_species(&trees, &index)?;
        info!(
            "{} of {} record(s) have no species in the table",
            missing.row_count(),
            trees.row_count()
        );
        missing
    } else {
        let matched = match_species(&trees, &index, args.keep_unmatched)?;
        info!(
            "Matched {} of {} tree record(s)",
            matched.row_count(),
            trees.row_count()
        );
        matched
    };
    io_utils::write_frame(&output, args.output.as_deref(), delimiter)?;
    Ok(())
}
