//! Allowed-identifier lists.

use crate::data::schema::{IdLevel, Schema};
use crate::data::table::open_reader;
use crate::error::{QuantError, Result};
use std::collections::HashSet;
use std::path::Path;

/// A set of identifiers that restricts quantification.
#[derive(Debug, Clone, Default)]
pub struct Whitelist {
    ids: HashSet<String>,
}

impl Whitelist {
    /// Create from identifiers.
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ids: ids.into_iter().map(Into::into).collect(),
        }
    }

    /// Load identifiers from a table.
    ///
    /// The raw identifier column for `level` is preferred; a result table's
    /// identifier column is accepted as well.
    pub fn from_csv<P: AsRef<Path>>(path: P, schema: &Schema, level: IdLevel) -> Result<Self> {
        let name = path.as_ref().display().to_string();
        let mut reader = open_reader(&path)?;
        let headers = reader.headers()?.clone();
        let col = headers
            .iter()
            .position(|h| h == schema.id_column(level))
            .or_else(|| headers.iter().position(|h| h == schema.result_id))
            .ok_or_else(|| QuantError::MissingColumn {
                column: format!("{} or {}", schema.id_column(level), schema.result_id),
                table: name.clone(),
            })?;

        let mut ids = HashSet::new();
        for record in reader.records() {
            let record = record?;
            if let Some(id) = record.get(col).map(str::trim).filter(|s| !s.is_empty()) {
                ids.insert(id.to_string());
            }
        }
        tracing::debug!(table = %name, n = ids.len(), "loaded whitelist");
        Ok(Self { ids })
    }

    /// Check whether an identifier is allowed.
    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Number of identifiers.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
