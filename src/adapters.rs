//! Per-city source adapters.
//!
//! Each source needs a small amount of pre-shaping before the shared
//! normalization pipeline takes over — typically building a single `address`
//! string out of a house-number column and a street column, plus the odd
//! rename or row filter. Adapters are data, not subclasses: an ordered list of
//! [`PreShapeOp`]s selected by city key from [`REGISTRY`]. Cities without an
//! entry run the pipeline as-is.

use std::path::Path;

use anyhow::{Context, Result, anyhow};
use encoding_rs::Encoding;
use log::debug;

use crate::frame::{Frame, Value};
use crate::io_utils;
use crate::transform::string_ops;

#[derive(Debug, Clone, Copy)]
pub struct ConcatRule {
    pub target: &'static str,
    pub left: &'static str,
    pub right: &'static str,
    pub titleize_right: bool,
    pub trim_right: bool,
    pub titleize_result: bool,
}

#[derive(Debug, Clone, Copy)]
pub enum PreShapeOp {
    /// `target = left + " " + right`; null on either side stays null.
    Concat(ConcatRule),
    /// `target` = title-cased text of `source` up to the first `stop`.
    SplitKeepFirst {
        target: &'static str,
        source: &'static str,
        stop: &'static str,
    },
    Rename {
        from: &'static str,
        to: &'static str,
    },
    Drop {
        column: &'static str,
    },
    /// Keeps only rows where `column` is non-null.
    DropNullRows {
        column: &'static str,
    },
    /// Left-joins `<city dir>/<file>` on `tree_id`, adding heritage columns.
    JoinHeritage {
        file: &'static str,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct CityAdapter {
    pub city: &'static str,
    pub ops: &'static [PreShapeOp],
}

const fn concat(target: &'static str, left: &'static str, right: &'static str) -> ConcatRule {
    ConcatRule {
        target,
        left,
        right,
        titleize_right: false,
        trim_right: false,
        titleize_result: false,
    }
}

const fn concat_titled(
    target: &'static str,
    left: &'static str,
    right: &'static str,
) -> ConcatRule {
    ConcatRule {
        target,
        left,
        right,
        titleize_right: true,
        trim_right: false,
        titleize_result: false,
    }
}

const fn concat_trimmed(
    target: &'static str,
    left: &'static str,
    right: &'static str,
) -> ConcatRule {
    ConcatRule {
        target,
        left,
        right,
        titleize_right: false,
        trim_right: true,
        titleize_result: false,
    }
}

const fn concat_result_titled(
    target: &'static str,
    left: &'static str,
    right: &'static str,
) -> ConcatRule {
    ConcatRule {
        target,
        left,
        right,
        titleize_right: false,
        trim_right: false,
        titleize_result: true,
    }
}

/// City keys in processing order. Cities not listed here still normalize,
/// they just get no pre-shaping.
pub const REGISTRY: &[CityAdapter] = &[
    CityAdapter {
        city: "los-angeles-city",
        ops: &[],
    },
    CityAdapter {
        city: "los-angeles-county",
        ops: &[],
    },
    CityAdapter {
        city: "agoura-hills",
        ops: &[
            PreShapeOp::Concat(concat_titled("address", "Address", "Street")),
            PreShapeOp::Drop { column: "Address" },
        ],
    },
    CityAdapter {
        city: "alhambra",
        ops: &[
            PreShapeOp::Concat(concat_titled("address", "Address", "Street")),
            PreShapeOp::Drop { column: "Address" },
        ],
    },
    CityAdapter {
        city: "arcadia",
        ops: &[PreShapeOp::SplitKeepFirst {
            target: "address",
            source: "ADDR",
            stop: "ARCADIA",
        }],
    },
    CityAdapter {
        city: "artesia",
        ops: &[
            PreShapeOp::Concat(concat_titled("address", "ADDRESS", "STREET")),
            PreShapeOp::Drop { column: "ADDRESS" },
        ],
    },
    CityAdapter {
        city: "bell-gardens",
        ops: &[
            PreShapeOp::Concat(concat_titled("address", "ADDRESS", "STREET")),
            PreShapeOp::Drop { column: "ADDRESS" },
        ],
    },
    CityAdapter {
        city: "bellflower",
        ops: &[
            PreShapeOp::Concat(concat_titled("address", "Address", "Street")),
            PreShapeOp::Drop { column: "Address" },
        ],
    },
    CityAdapter {
        city: "beverly-hills",
        ops: &[
            PreShapeOp::Rename {
                from: "height",
                to: "exact_height",
            },
            PreShapeOp::Concat(concat_titled("address", "ADDRESS", "STREET")),
            PreShapeOp::Drop { column: "ADDRESS" },
        ],
    },
    CityAdapter {
        city: "long-beach",
        ops: &[PreShapeOp::Drop { column: "ADDRESS" }],
    },
    CityAdapter {
        city: "santa-clarita",
        ops: &[
            PreShapeOp::DropNullRows { column: "PROP_ADR" },
            PreShapeOp::Concat(concat_titled("address", "PROP_ADR", "PROPSTREET")),
        ],
    },
    CityAdapter {
        city: "santa-clarita-parks",
        ops: &[
            PreShapeOp::Concat(concat_titled("address", "ADDRESS", "STREET")),
            PreShapeOp::Drop { column: "ADDRESS" },
        ],
    },
    CityAdapter {
        city: "pasadena",
        ops: &[
            PreShapeOp::Concat(concat_result_titled("Botanical", "Genus", "Species")),
            PreShapeOp::Drop { column: "Species" },
            PreShapeOp::Concat(concat("Street", "Street_Nam", "Street_Typ")),
            PreShapeOp::Concat(concat("Address", "House_Numb", "Street")),
        ],
    },
    CityAdapter {
        city: "glendale",
        ops: &[
            PreShapeOp::Drop { column: "Address" },
            PreShapeOp::Concat(concat_trimmed("address", "OnAddress", "OnStreet")),
        ],
    },
    CityAdapter {
        city: "pomona",
        ops: &[
            PreShapeOp::Concat(concat_trimmed("address", "ADDRESS", "STREET")),
            PreShapeOp::Drop { column: "ADDRESS" },
        ],
    },
    CityAdapter {
        city: "santa-monica",
        ops: &[
            PreShapeOp::Rename {
                from: "Tree ID",
                to: "tree_id",
            },
            PreShapeOp::Rename {
                from: "Name Botanical",
                to: "name_botanical",
            },
            PreShapeOp::Rename {
                from: "Name Common",
                to: "name_common",
            },
            PreShapeOp::Rename {
                from: "Height Min",
                to: "height_min_feet",
            },
            PreShapeOp::Rename {
                from: "Height Max",
                to: "height_max_feet",
            },
            PreShapeOp::Rename {
                from: "DBH Min",
                to: "diameter_min_in",
            },
            PreShapeOp::Rename {
                from: "DBH Max",
                to: "diameter_max_in",
            },
            PreShapeOp::Rename {
                from: "Latitude",
                to: "latitude",
            },
            PreShapeOp::Rename {
                from: "Longitude",
                to: "longitude",
            },
            PreShapeOp::Rename {
                from: "Location Description",
                to: "location_description",
            },
            PreShapeOp::JoinHeritage {
                file: "heritage_trees.csv",
            },
            PreShapeOp::Concat(concat("address", "Address", "Street")),
            PreShapeOp::Drop { column: "Address" },
        ],
    },
];

pub fn adapter_for(city: &str) -> Option<&'static CityAdapter> {
    REGISTRY.iter().find(|adapter| adapter.city == city)
}

/// Applies an adapter's ops in order. `city_dir` anchors file-backed ops such
/// as the heritage join.
pub fn apply_ops(
    frame: &mut Frame,
    adapter: &CityAdapter,
    city_dir: Option<&Path>,
    delimiter: u8,
    encoding: &'static Encoding,
) -> Result<()> {
    for op in adapter.ops {
        apply_op(frame, op, city_dir, delimiter, encoding)
            .with_context(|| format!("Pre-shaping city '{}'", adapter.city))?;
    }
    Ok(())
}

fn apply_op(
    frame: &mut Frame,
    op: &PreShapeOp,
    city_dir: Option<&Path>,
    delimiter: u8,
    encoding: &'static Encoding,
) -> Result<()> {
    match op {
        PreShapeOp::Concat(rule) => apply_concat(frame, rule),
        PreShapeOp::SplitKeepFirst {
            target,
            source,
            stop,
        } => apply_split(frame, target, source, stop),
        PreShapeOp::Rename { from, to } => {
            frame.rename_column(from, to);
            Ok(())
        }
        PreShapeOp::Drop { column } => {
            if !frame.drop_column(column) {
                return Err(anyhow!("Cannot drop missing column '{column}'"));
            }
            Ok(())
        }
        PreShapeOp::DropNullRows { column } => {
            let idx = frame
                .column_index(column)
                .ok_or_else(|| anyhow!("Cannot filter on missing column '{column}'"))?;
            frame.retain_rows(|row| row[idx].is_some());
            Ok(())
        }
        PreShapeOp::JoinHeritage { file } => apply_heritage_join(frame, file, city_dir, delimiter, encoding),
    }
}

fn apply_concat(frame: &mut Frame, rule: &ConcatRule) -> Result<()> {
    let left_idx = frame
        .column_index(rule.left)
        .ok_or_else(|| anyhow!("Concat source column '{}' is missing", rule.left))?;
    let right_idx = frame
        .column_index(rule.right)
        .ok_or_else(|| anyhow!("Concat source column '{}' is missing", rule.right))?;

    let values: Vec<Option<Value>> = frame
        .rows()
        .iter()
        .map(|row| {
            let (Some(left), Some(right)) = (row[left_idx].as_ref(), row[right_idx].as_ref())
            else {
                return None;
            };
            let mut right_text = right.as_display();
            if rule.trim_right {
                right_text = right_text.trim().to_string();
            }
            if rule.titleize_right {
                right_text = string_ops::title_case(&right_text).into_owned();
            }
            let mut joined = format!("{} {}", left.as_display(), right_text);
            if rule.titleize_result {
                joined = string_ops::title_case(&joined).into_owned();
            }
            Some(Value::String(joined))
        })
        .collect();
    frame.set_column(rule.target, values)
}

fn apply_split(frame: &mut Frame, target: &str, source: &str, stop: &str) -> Result<()> {
    let source_idx = frame
        .column_index(source)
        .ok_or_else(|| anyhow!("Split source column '{source}' is missing"))?;
    let values: Vec<Option<Value>> = frame
        .rows()
        .iter()
        .map(|row| {
            row[source_idx].as_ref().map(|value| {
                let text = value.as_display();
                let head = match text.find(stop) {
                    Some(pos) => &text[..pos],
                    None => text.as_str(),
                };
                Value::String(string_ops::title_case(head).into_owned())
            })
        })
        .collect();
    frame.set_column(target, values)
}

fn apply_heritage_join(
    frame: &mut Frame,
    file: &str,
    city_dir: Option<&Path>,
    delimiter: u8,
    encoding: &'static Encoding,
) -> Result<()> {
    let Some(dir) = city_dir else {
        debug!("No city directory for heritage join; skipping");
        return Ok(());
    };
    let path = dir.join(file);
    if !path.is_file() {
        debug!("Heritage file {path:?} not present; skipping join");
        return Ok(());
    }
    let heritage = io_utils::read_frame(&path, delimiter, encoding)
        .with_context(|| format!("Reading heritage file {path:?}"))?;

    let key_idx = heritage
        .column_index("tree_id")
        .ok_or_else(|| anyhow!("Heritage file {path:?} has no tree_id column"))?;
    let year_idx = heritage.column_index("year_added");
    let number_idx = heritage.column_index("heritage_number");
    let text_idx = heritage.column_index("text");

    let mut lookup = std::collections::HashMap::new();
    for row in heritage.rows() {
        if let Some(key) = row[key_idx].as_ref() {
            lookup.entry(key.as_display()).or_insert_with(|| {
                (
                    year_idx.and_then(|idx| row[idx].clone()),
                    number_idx.and_then(|idx| row[idx].clone()),
                    text_idx.and_then(|idx| row[idx].clone()),
                )
            });
        }
    }

    let tree_key_idx = frame
        .column_index("tree_id")
        .ok_or_else(|| anyhow!("Heritage join requires a tree_id column"))?;
    let mut years = Vec::with_capacity(frame.row_count());
    let mut numbers = Vec::with_capacity(frame.row_count());
    let mut texts = Vec::with_capacity(frame.row_count());
    let mut flags = Vec::with_capacity(frame.row_count());
    for row in frame.rows() {
        let hit = row[tree_key_idx]
            .as_ref()
            .and_then(|key| lookup.get(&key.as_display()));
        match hit {
            Some((year, number, text)) => {
                years.push(year.clone());
                numbers.push(number.clone());
                texts.push(text.clone());
                flags.push(Some(Value::Boolean(number.is_some())));
            }
            None => {
                years.push(None);
                numbers.push(None);
                texts.push(None);
                flags.push(Some(Value::Boolean(false)));
            }
        }
    }
    frame.set_column("heritage_year", years)?;
    frame.set_column("heritage_number", numbers)?;
    frame.set_column("heritage_text", texts)?;
    frame.set_column("heritage", flags)?;
    Ok(())
}
