//! In-memory record set shared by every pipeline stage.
//!
//! A [`Frame`] is a named-column table whose cells are optional [`Value`]s.
//! Source datasets arrive with arbitrary column names and spotty coverage, so
//! the model is deliberately loose: columns can be looked up case-insensitively,
//! assigned over, projected, renamed, and concatenated across sources with
//! null-fill for columns a source never had.

use std::collections::HashSet;
use std::fmt;

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

const KEY_SEPARATOR: &str = "\u{1f}";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Value {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
}

impl Value {
    pub fn as_display(&self) -> String {
        match self {
            Value::String(s) => s.clone(),
            Value::Integer(i) => i.to_string(),
            Value::Float(f) => {
                if f.fract() == 0.0 {
                    (*f as i64).to_string()
                } else {
                    f.to_string()
                }
            }
            Value::Boolean(b) => b.to_string(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_display())
    }
}

#[derive(Debug, Clone, Default)]
pub struct Frame {
    columns: Vec<String>,
    rows: Vec<Vec<Option<Value>>>,
}

impl Frame {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Option<Value>>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn push_row(&mut self, row: Vec<Option<Value>>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(anyhow!(
                "Row has {} cell(s), frame has {} column(s)",
                row.len(),
                self.columns.len()
            ));
        }
        self.rows.push(row);
        Ok(())
    }

    /// Exact-name column lookup.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Trimmed, case-insensitive column lookup.
    pub fn column_index_folded(&self, name: &str) -> Option<usize> {
        let wanted = name.trim().to_lowercase();
        self.columns
            .iter()
            .position(|c| c.trim().to_lowercase() == wanted)
    }

    pub fn value(&self, row: usize, column: usize) -> Option<&Value> {
        self.rows.get(row).and_then(|r| r[column].as_ref())
    }

    pub fn column_values(&self, column: usize) -> Vec<Option<Value>> {
        self.rows.iter().map(|row| row[column].clone()).collect()
    }

    /// Assigns a column by exact name, overwriting it when present and
    /// appending it otherwise.
    pub fn set_column(&mut self, name: &str, values: Vec<Option<Value>>) -> Result<()> {
        if values.len() != self.rows.len() {
            return Err(anyhow!(
                "Column '{name}' has {} value(s), frame has {} row(s)",
                values.len(),
                self.rows.len()
            ));
        }
        match self.column_index(name) {
            Some(idx) => {
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row[idx] = value;
                }
            }
            None => {
                self.columns.push(name.to_string());
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row.push(value);
                }
            }
        }
        Ok(())
    }

    pub fn rename_column(&mut self, from: &str, to: &str) -> bool {
        match self.column_index(from) {
            Some(idx) => {
                self.columns[idx] = to.to_string();
                true
            }
            None => false,
        }
    }

    pub fn drop_column(&mut self, name: &str) -> bool {
        match self.column_index(name) {
            Some(idx) => {
                self.columns.remove(idx);
                for row in &mut self.rows {
                    row.remove(idx);
                }
                true
            }
            None => false,
        }
    }

    /// Projects onto `wanted` in the given order, silently skipping columns
    /// the frame does not have.
    pub fn select(&self, wanted: &[&str]) -> Frame {
        let indices: Vec<usize> = wanted
            .iter()
            .filter_map(|name| self.column_index(name))
            .collect();
        let columns = indices
            .iter()
            .map(|&idx| self.columns[idx].clone())
            .collect();
        let rows = self
            .rows
            .iter()
            .map(|row| indices.iter().map(|&idx| row[idx].clone()).collect())
            .collect();
        Frame { columns, rows }
    }

    /// Concatenates frames over the union of their columns (first-seen
    /// order); cells for columns a frame never had become null.
    pub fn concat(frames: Vec<Frame>) -> Frame {
        let mut columns: Vec<String> = Vec::new();
        for frame in &frames {
            for column in &frame.columns {
                if !columns.contains(column) {
                    columns.push(column.clone());
                }
            }
        }
        let mut rows = Vec::new();
        for frame in frames {
            let mapping: Vec<Option<usize>> = columns
                .iter()
                .map(|column| frame.column_index(column))
                .collect();
            for row in frame.rows {
                rows.push(
                    mapping
                        .iter()
                        .map(|idx| idx.and_then(|i| row[i].clone()))
                        .collect(),
                );
            }
        }
        Frame { columns, rows }
    }

    /// Drops rows that are exact duplicates of an earlier row.
    pub fn dedup_rows(&mut self) {
        let mut seen: HashSet<String> = HashSet::new();
        self.rows.retain(|row| seen.insert(row_key(row)));
    }

    pub fn retain_rows<F>(&mut self, mut predicate: F)
    where
        F: FnMut(&[Option<Value>]) -> bool,
    {
        self.rows.retain(|row| predicate(row));
    }

    /// Whether every non-null cell in the column is a string.
    pub fn is_string_column(&self, column: usize) -> bool {
        self.rows
            .iter()
            .filter_map(|row| row[column].as_ref())
            .all(|value| matches!(value, Value::String(_)))
    }

    /// Coerces non-null cells of `name` to trimmed strings; nulls stay null.
    pub fn coerce_trim_strings(&mut self, name: &str) {
        if let Some(idx) = self.column_index(name) {
            for row in &mut self.rows {
                if let Some(value) = row[idx].take() {
                    row[idx] = Some(Value::String(value.as_display().trim().to_string()));
                }
            }
        }
    }
}

fn row_key(row: &[Option<Value>]) -> String {
    row.iter()
        .map(|cell| cell.as_ref().map(Value::as_display).unwrap_or_default())
        .collect::<Vec<_>>()
        .join(KEY_SEPARATOR)
}
