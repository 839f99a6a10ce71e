//! Canonical field alias tables and the column resolver.
//!
//! Every source dataset spells its columns differently. Each canonical field
//! carries an ordered alias list (lowercase; the first entry doubles as the
//! canonical output name) and [`resolve_column`] walks the list against the
//! source's columns, copying the first hit into a column named after the
//! canonical entry. Alias order encodes priority — reordering a list changes
//! behavior.

use crate::frame::{Frame, Value};
use crate::transform::string_ops;

pub const NAME_COMMON: &[&str] = &["name_common", "species", "com_name", "trees_spec"];
pub const NAME_BOTANICAL: &[&str] = &[
    "name_botanical",
    "botanical",
    "botanicaln",
    "botanicalna",
    "trees_bota",
];
pub const CONDITION: &[&str] = &["condition", "treecondition", "treeconditi"];
pub const ADDRESS: &[&str] = &["address"];
pub const DIAMETER_MIN_IN: &[&str] = &["diameter_min_in"];
pub const DIAMETER_MAX_IN: &[&str] = &["diameter_max_in"];
pub const EXACT_DIAMETER: &[&str] = &[
    "exact_diameter",
    "diameter",
    "exact_dbh",
    "trunk_diam",
    "actualdbh",
];
pub const HEIGHT_MIN_FEET: &[&str] = &["height_min_feet"];
pub const HEIGHT_MAX_FEET: &[&str] = &["height_max_feet"];
pub const EXACT_HEIGHT: &[&str] = &["exact_height", "exact_heigh", "height", "actualheight"];
pub const TREE_ID: &[&str] = &[
    "tree_id",
    "inventoryid",
    "tree",
    "inventoryi",
    "treeid",
    "objectid",
    "trees_ogc_",
];
pub const ESTIMATED_VALUE: &[&str] = &["estimated_value", "est_value", "estvalue"];

/// Copies the first alias present in the source into a column named after the
/// canonical (first) alias. Column comparison is trimmed and case-insensitive
/// on both sides; `exclude` skips an alias equal to a column another field
/// already consumed. Returns whether a source column was found — when none
/// is, the frame is left unchanged and the canonical column stays absent.
pub fn resolve_column(
    frame: &mut Frame,
    aliases: &[&str],
    exclude: Option<&str>,
    titleize: bool,
) -> bool {
    let canonical = aliases[0];
    for alias in aliases {
        if let Some(excluded) = exclude
            && excluded.to_lowercase() == alias.to_lowercase()
        {
            continue;
        }
        let Some(idx) = frame.column_index_folded(alias) else {
            continue;
        };
        let values: Vec<Option<Value>> = frame
            .column_values(idx)
            .into_iter()
            .map(|cell| {
                cell.map(|value| {
                    if titleize && let Value::String(text) = &value {
                        Value::String(string_ops::title_case(text).into_owned())
                    } else {
                        value
                    }
                })
            })
            .collect();
        // set_column cannot fail here: the value count equals the row count
        let _ = frame.set_column(canonical, values);
        return true;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_with(columns: &[&str], row: Vec<Option<Value>>) -> Frame {
        let mut frame = Frame::new(columns.iter().map(|c| c.to_string()).collect());
        frame.push_row(row).unwrap();
        frame
    }

    #[test]
    fn first_matching_alias_wins() {
        let mut frame = frame_with(
            &["COM_NAME", "SPECIES"],
            vec![
                Some(Value::String("oak".to_string())),
                Some(Value::String("coast live oak".to_string())),
            ],
        );
        assert!(resolve_column(&mut frame, NAME_COMMON, None, true));
        let idx = frame.column_index("name_common").unwrap();
        // "species" precedes "com_name" in the alias list
        assert_eq!(
            frame.value(0, idx),
            Some(&Value::String("Coast Live Oak".to_string()))
        );
    }

    #[test]
    fn missing_alias_leaves_frame_unchanged() {
        let mut frame = frame_with(&["other"], vec![None]);
        assert!(!resolve_column(&mut frame, CONDITION, None, false));
        assert!(frame.column_index("condition").is_none());
        assert_eq!(frame.columns().len(), 1);
    }

    #[test]
    fn excluded_column_is_skipped() {
        let mut frame = frame_with(
            &["HEIGHT", "actualheight"],
            vec![
                Some(Value::String("13-18".to_string())),
                Some(Value::Float(15.0)),
            ],
        );
        assert!(resolve_column(&mut frame, EXACT_HEIGHT, Some("HEIGHT"), false));
        let idx = frame.column_index("exact_height").unwrap();
        assert_eq!(frame.value(0, idx), Some(&Value::Float(15.0)));
    }

    #[test]
    fn resolver_is_idempotent() {
        let mut frame = frame_with(
            &["botanicaln"],
            vec![Some(Value::String("quercus agrifolia".to_string()))],
        );
        assert!(resolve_column(&mut frame, NAME_BOTANICAL, None, true));
        let first = frame.clone();
        assert!(resolve_column(&mut frame, NAME_BOTANICAL, None, true));
        let idx = frame.column_index("name_botanical").unwrap();
        assert_eq!(frame.value(0, idx), first.value(0, idx));
        assert_eq!(frame.columns(), first.columns());
    }

    #[test]
    fn titleize_leaves_non_string_values_alone() {
        let mut frame = frame_with(&["address"], vec![Some(Value::Integer(42))]);
        assert!(resolve_column(&mut frame, ADDRESS, None, true));
        let idx = frame.column_index("address").unwrap();
        assert_eq!(frame.value(0, idx), Some(&Value::Integer(42)));
    }
}
