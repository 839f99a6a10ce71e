//! CSV I/O: reader/writer construction, delimiter and encoding resolution,
//! and Frame ⇄ CSV conversion.
//!
//! Frames read from CSV get per-column type inference: a column whose
//! non-empty cells all parse as integers becomes `Integer`, all-float becomes
//! `Float`, anything else stays `String`, and empty cells are nulls. The
//! distinction matters downstream — the range categorizer only applies to
//! string-typed columns, so a source whose `diameter` column is numeric falls
//! through to exact-value resolution instead.

use std::{
    fs::File,
    io::{BufReader, BufWriter, Read, Write},
    path::Path,
};

use anyhow::{Context, Result, anyhow};
use csv::QuoteStyle;
use encoding_rs::{Encoding, UTF_8};

use crate::frame::{Frame, Value};

pub const DEFAULT_CSV_DELIMITER: u8 = b',';
pub const DEFAULT_TSV_DELIMITER: u8 = b'\t';

pub fn is_dash(path: &Path) -> bool {
    path == Path::new("-")
}

pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding> {
    if let Some(value) = label {
        Encoding::for_label(value.trim().as_bytes())
            .ok_or_else(|| anyhow!("Unknown encoding '{value}'"))
    } else {
        Ok(UTF_8)
    }
}

pub fn resolve_input_delimiter(path: &Path, provided: Option<u8>) -> u8 {
    provided.unwrap_or_else(|| match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") => DEFAULT_TSV_DELIMITER,
        _ => DEFAULT_CSV_DELIMITER,
    })
}

pub fn open_csv_reader<R>(reader: R, delimiter: u8) -> csv::Reader<R>
where
    R: Read,
{
    let mut builder = csv::ReaderBuilder::new();
    builder
        .has_headers(true)
        .delimiter(delimiter)
        .double_quote(true)
        .flexible(false);
    builder.from_reader(reader)
}

pub fn open_csv_reader_from_path(path: &Path, delimiter: u8) -> Result<csv::Reader<Box<dyn Read>>> {
    let reader: Box<dyn Read> = if is_dash(path) {
        Box::new(std::io::stdin().lock())
    } else {
        Box::new(BufReader::new(
            File::open(path).with_context(|| format!("Opening input file {path:?}"))?,
        ))
    };
    Ok(open_csv_reader(reader, delimiter))
}

pub fn open_csv_writer(path: Option<&Path>, delimiter: u8) -> Result<csv::Writer<Box<dyn Write>>> {
    let base: Box<dyn Write> = match path {
        Some(p) if !is_dash(p) => Box::new(BufWriter::new(
            File::create(p).with_context(|| format!("Creating output file {p:?}"))?,
        )),
        _ => Box::new(std::io::stdout()),
    };
    let mut builder = csv::WriterBuilder::new();
    builder
        .delimiter(delimiter)
        .quote_style(QuoteStyle::Necessary)
        .double_quote(true);
    Ok(builder.from_writer(base))
}

pub fn decode_bytes(bytes: &[u8], encoding: &'static Encoding) -> Result<String> {
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        Err(anyhow!(
            "Failed to decode text with encoding {}",
            encoding.name()
        ))
    } else {
        Ok(text.into_owned())
    }
}

pub fn decode_record(record: &csv::ByteRecord, encoding: &'static Encoding) -> Result<Vec<String>> {
    record
        .iter()
        .map(|field| decode_bytes(field, encoding))
        .collect()
}

/// Reads a whole CSV file into a typed [`Frame`].
pub fn read_frame(path: &Path, delimiter: u8, encoding: &'static Encoding) -> Result<Frame> {
    let mut reader = open_csv_reader_from_path(path, delimiter)?;
    let headers = decode_record(&reader.byte_headers()?.clone(), encoding)
        .with_context(|| format!("Decoding headers of {path:?}"))?;

    let mut raw_rows: Vec<Vec<Option<String>>> = Vec::new();
    for (row_idx, record) in reader.byte_records().enumerate() {
        let record =
            record.with_context(|| format!("Reading row {} of {path:?}", row_idx + 2))?;
        let decoded = decode_record(&record, encoding)
            .with_context(|| format!("Decoding row {} of {path:?}", row_idx + 2))?;
        raw_rows.push(
            decoded
                .into_iter()
                .map(|cell| if cell.is_empty() { None } else { Some(cell) })
                .collect(),
        );
    }

    let kinds: Vec<ColumnKind> = (0..headers.len())
        .map(|col| infer_column_kind(raw_rows.iter().filter_map(|row| row[col].as_deref())))
        .collect();

    let mut frame = Frame::new(headers);
    for raw in raw_rows {
        let row = raw
            .into_iter()
            .zip(kinds.iter())
            .map(|(cell, kind)| cell.map(|text| kind.parse(&text)))
            .collect();
        frame.push_row(row)?;
    }
    Ok(frame)
}

/// Writes a [`Frame`] as CSV; null cells become empty fields.
pub fn write_frame(frame: &Frame, path: Option<&Path>, delimiter: u8) -> Result<()> {
    let mut writer = open_csv_writer(path, delimiter)?;
    writer
        .write_record(frame.columns())
        .context("Writing output headers")?;
    for row in frame.rows() {
        let cells: Vec<String> = row
            .iter()
            .map(|cell| cell.as_ref().map(Value::as_display).unwrap_or_default())
            .collect();
        writer.write_record(&cells).context("Writing output row")?;
    }
    writer.flush().context("Flushing output")?;
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Integer,
    Float,
    Text,
}

impl ColumnKind {
    fn parse(self, text: &str) -> Value {
        match self {
            ColumnKind::Integer => Value::Integer(text.trim().parse().unwrap_or_default()),
            ColumnKind::Float => Value::Float(text.trim().parse().unwrap_or_default()),
            ColumnKind::Text => Value::String(text.to_string()),
        }
    }
}

fn infer_column_kind<'a, I>(values: I) -> ColumnKind
where
    I: Iterator<Item = &'a str>,
{
    let mut kind = ColumnKind::Integer;
    let mut saw_any = false;
    for value in values {
        saw_any = true;
        let trimmed = value.trim();
        if kind == ColumnKind::Integer && trimmed.parse::<i64>().is_err() {
            kind = ColumnKind::Float;
        }
        if kind == ColumnKind::Float && trimmed.parse::<f64>().is_err() {
            return ColumnKind::Text;
        }
    }
    if saw_any { kind } else { ColumnKind::Text }
}
