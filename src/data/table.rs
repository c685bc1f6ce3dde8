//! Delimited table plumbing shared by the measurement and result readers.

use crate::data::schema::Schema;
use crate::error::{QuantError, Result};
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

/// Number of significant digits used for every floating-point output cell.
pub const OUTPUT_SIG_DIGITS: usize = 6;

/// What kind of table a file holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    /// Raw per-measurement abundance rows.
    Measurements,
    /// Pre-computed differential results from another pipeline.
    Results,
}

/// Pick the field delimiter for a path.
///
/// Analyzer `.xls` exports are really tab-delimited text.
pub fn delimiter_for<P: AsRef<Path>>(path: P) -> u8 {
    let is_xls = path
        .as_ref()
        .to_str()
        .map(|s| s.contains(".xls"))
        .unwrap_or(false);
    if is_xls {
        b'\t'
    } else {
        b','
    }
}

/// Open a delimited reader with headers and ragged-row tolerance.
pub fn open_reader<P: AsRef<Path>>(path: P) -> Result<csv::Reader<File>> {
    let delimiter = delimiter_for(&path);
    let reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .trim(csv::Trim::Fields)
        .from_path(path)?;
    Ok(reader)
}

/// Classify a table by its key columns.
pub fn detect_input<P: AsRef<Path>>(path: P, schema: &Schema) -> Result<InputKind> {
    let name = path.as_ref().display().to_string();
    let mut reader = open_reader(&path)?;
    let headers = reader.headers()?;
    if headers.iter().any(|h| h == schema.uid) {
        Ok(InputKind::Measurements)
    } else if headers.iter().any(|h| h == schema.result_id) {
        Ok(InputKind::Results)
    } else {
        Err(QuantError::UnrecognizedInput(name))
    }
}

/// Header name to column position lookup.
#[derive(Debug, Clone)]
pub struct ColumnIndex {
    table: String,
    positions: HashMap<String, usize>,
}

impl ColumnIndex {
    /// Build from a header record.
    pub fn new(table: &str, headers: &csv::StringRecord) -> Self {
        let positions = headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.to_string(), i))
            .collect();
        Self {
            table: table.to_string(),
            positions,
        }
    }

    /// Position of a column that must be present.
    pub fn require(&self, column: &str) -> Result<usize> {
        self.optional(column)
            .ok_or_else(|| QuantError::MissingColumn {
                column: column.to_string(),
                table: self.table.clone(),
            })
    }

    /// Position of a column that may be absent.
    pub fn optional(&self, column: &str) -> Option<usize> {
        self.positions.get(column).copied()
    }

    /// Check whether a column exists.
    pub fn contains(&self, column: &str) -> bool {
        self.positions.contains_key(column)
    }
}

/// Parse a numeric cell, mapping the missing sentinel to NaN.
pub fn parse_float(raw: &str, missing_token: &str, column: &str, row: usize) -> Result<f64> {
    let v = raw.trim();
    if v.is_empty() || v == missing_token || v.eq_ignore_ascii_case("nan") || v == "NA" {
        return Ok(f64::NAN);
    }
    v.parse::<f64>().map_err(|_| QuantError::InvalidValue {
        value: v.to_string(),
        column: column.to_string(),
        row,
    })
}

/// Format a float like C's `%.{sig}g`. Missing values become empty cells.
pub fn format_float(x: f64, sig: usize) -> String {
    if x.is_nan() {
        return String::new();
    }
    if x.is_infinite() {
        return if x > 0.0 { "inf".to_string() } else { "-inf".to_string() };
    }
    if x == 0.0 {
        return "0".to_string();
    }
    let sig = sig.max(1);
    let sci = format!("{:.*e}", sig - 1, x);
    let (mantissa, exponent) = match sci.split_once('e') {
        Some(parts) => parts,
        None => return sci,
    };
    let exponent: i32 = exponent.parse().unwrap_or(0);

    if exponent < -4 || exponent >= sig as i32 {
        format!(
            "{}e{}{:02}",
            trim_fraction(mantissa),
            if exponent < 0 { '-' } else { '+' },
            exponent.abs()
        )
    } else {
        let decimals = (sig as i32 - 1 - exponent).max(0) as usize;
        trim_fraction(&format!("{:.*}", decimals, x)).to_string()
    }
}

fn trim_fraction(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}
