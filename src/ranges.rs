//! Range categorizer: bucketed category strings to numeric bounds.
//!
//! Sources report height/diameter as categorical buckets such as `"07-12"`,
//! `"31+"`, or `">60"`. [`categorize`] converts a bucket column into a pair of
//! integer min/max columns. The category vocabulary is inferred from the
//! column's distinct values when not supplied; tokens that are nothing but
//! dashes are the "no data" sentinel and never enter the vocabulary. A token
//! that matches none of the three shapes aborts the run — an unmapped bucket
//! must not silently become a wrong range.

use anyhow::{Context, Result, bail};
use itertools::Itertools;

use crate::frame::{Frame, Value};

/// Parsed bounds of one category token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Bounds {
    min: i64,
    max: Option<i64>,
}

/// Applies bucket categorization of `source` into `min_field`/`max_field`.
///
/// Returns `Ok(false)` without touching the frame when the source column's
/// non-null values are not all strings — a numeric column is not a bucket
/// column, and the caller is expected to fall through to its next candidate.
/// Rows whose trimmed value matches no category keep both fields null.
pub fn categorize(
    frame: &mut Frame,
    min_field: &str,
    max_field: &str,
    source: &str,
    categories: Option<&[String]>,
) -> Result<bool> {
    let Some(source_idx) = frame.column_index(source) else {
        return Ok(false);
    };
    if !frame.is_string_column(source_idx) {
        return Ok(false);
    }

    let inferred;
    let categories: &[String] = match categories {
        Some(given) => given,
        None => {
            inferred = infer_categories(frame, source_idx);
            &inferred
        }
    };

    let mut parsed: Vec<(String, Bounds)> = Vec::with_capacity(categories.len());
    for category in categories {
        let token = category.trim();
        if is_dash_sentinel(token) {
            continue;
        }
        let bounds = parse_category(token)
            .with_context(|| format!("Unrecognized category token '{token}' in column '{source}'"))?;
        parsed.push((token.to_string(), bounds));
    }

    let mut min_values: Vec<Option<Value>> = vec![None; frame.row_count()];
    let mut max_values: Vec<Option<Value>> = vec![None; frame.row_count()];
    for (row_idx, row) in frame.rows().iter().enumerate() {
        let Some(cell) = row[source_idx].as_ref().and_then(Value::as_str) else {
            continue;
        };
        let trimmed = cell.trim();
        if let Some((_, bounds)) = parsed.iter().find(|(token, _)| token == trimmed) {
            min_values[row_idx] = Some(Value::Integer(bounds.min));
            max_values[row_idx] = bounds.max.map(Value::Integer);
        }
    }

    frame.set_column(min_field, min_values)?;
    frame.set_column(max_field, max_values)?;
    Ok(true)
}

fn infer_categories(frame: &Frame, source_idx: usize) -> Vec<String> {
    frame
        .rows()
        .iter()
        .filter_map(|row| row[source_idx].as_ref().and_then(Value::as_str))
        .map(str::trim)
        .filter(|token| !is_dash_sentinel(token))
        .unique()
        .map(str::to_string)
        .collect()
}

fn is_dash_sentinel(token: &str) -> bool {
    !token.is_empty() && token.chars().all(|ch| ch == '-')
}

fn parse_category(token: &str) -> Result<Bounds> {
    let parts: Vec<&str> = token.split('-').collect();
    if parts.len() == 2 {
        let min = parts[0].trim().parse::<i64>()?;
        let max = parts[1].trim().parse::<i64>()?;
        return Ok(Bounds { min, max: Some(max) });
    }
    if let Some(stripped) = token.strip_suffix('+') {
        let min = stripped.trim().parse::<i64>()?;
        return Ok(Bounds { min, max: None });
    }
    if let Some(stripped) = token.strip_prefix('>') {
        let min = stripped.trim().parse::<i64>()?;
        return Ok(Bounds { min, max: None });
    }
    bail!("Token matches no category shape")
}
