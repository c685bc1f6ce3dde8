//! Raw abundance measurements.

use crate::data::schema::{IdLevel, Schema};
use crate::data::table::{open_reader, parse_float, ColumnIndex};
use crate::error::{QuantError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Isotope label channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeightType {
    Light,
    Heavy,
}

impl WeightType {
    /// Get the descriptive name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Heavy => "heavy",
        }
    }
}

impl std::str::FromStr for WeightType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "light" => Ok(Self::Light),
            "heavy" => Ok(Self::Heavy),
            other => Err(format!("unknown weight type '{}'", other)),
        }
    }
}

/// Cross-link topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkType {
    Monolink,
    Xlink,
    Intralink,
}

impl LinkType {
    /// Get the descriptive name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Monolink => "monolink",
            Self::Xlink => "xlink",
            Self::Intralink => "intralink",
        }
    }
}

impl std::str::FromStr for LinkType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "monolink" | "mono" => Ok(Self::Monolink),
            "xlink" | "crosslink" => Ok(Self::Xlink),
            "intralink" | "loop" | "looplink" => Ok(Self::Intralink),
            other => Err(format!("unknown link type '{}'", other)),
        }
    }
}

/// One observed abundance value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementRow {
    /// Identifier at the table's grouping level. Empty means missing.
    pub identifier: String,
    /// Experiment label. Empty means missing.
    pub experiment: String,
    /// Biological replicate ordinal.
    pub bio_rep: Option<u32>,
    /// Technical replicate ordinal.
    pub tech_rep: Option<u32>,
    /// Isotope channel, unset for non-labelled data.
    pub weight: Option<WeightType>,
    /// Abundance; NaN marks a missing measurement.
    pub abundance: f64,
    /// Link topology, when annotated.
    pub link_type: Option<LinkType>,
    /// Upstream violation annotation, when non-empty.
    pub violation: Option<String>,
}

impl MeasurementRow {
    /// Create a row with only the mandatory attributes set.
    pub fn new(identifier: &str, experiment: &str, bio_rep: u32, abundance: f64) -> Self {
        Self {
            identifier: identifier.to_string(),
            experiment: experiment.to_string(),
            bio_rep: Some(bio_rep),
            tech_rep: Some(1),
            weight: None,
            abundance,
            link_type: None,
            violation: None,
        }
    }

    /// Set the technical replicate.
    pub fn tech(mut self, tech_rep: u32) -> Self {
        self.tech_rep = Some(tech_rep);
        self
    }

    /// Set the isotope channel.
    pub fn weight(mut self, weight: WeightType) -> Self {
        self.weight = Some(weight);
        self
    }

    /// Set the link type.
    pub fn link(mut self, link_type: LinkType) -> Self {
        self.link_type = Some(link_type);
        self
    }

    /// Set the upstream violation annotation.
    pub fn violation(mut self, violation: &str) -> Self {
        self.violation = Some(violation.to_string());
        self
    }

    /// Check whether the abundance is missing.
    pub fn is_missing(&self) -> bool {
        self.abundance.is_nan()
    }
}

/// A set of measurement rows at one identifier level.
#[derive(Debug, Clone)]
pub struct MeasurementTable {
    level: IdLevel,
    rows: Vec<MeasurementRow>,
}

impl MeasurementTable {
    /// Create a table from rows.
    pub fn new(level: IdLevel, rows: Vec<MeasurementRow>) -> Self {
        Self { level, rows }
    }

    /// Load a measurement table from a delimited file.
    ///
    /// The identifier column for `level` must exist; the experiment,
    /// biological replicate and abundance columns are required too. Technical
    /// replicate, weight type, link type and violation columns are optional.
    pub fn from_csv<P: AsRef<Path>>(
        path: P,
        schema: &Schema,
        level: IdLevel,
        missing_token: &str,
    ) -> Result<Self> {
        let name = path.as_ref().display().to_string();
        let mut reader = open_reader(&path)?;
        let columns = ColumnIndex::new(&name, reader.headers()?);

        if !columns.contains(&schema.uid) && !columns.contains(&schema.uxid) {
            return Err(QuantError::MissingColumn {
                column: format!("{} or {}", schema.uid, schema.uxid),
                table: name,
            });
        }
        let id_col = columns.require(schema.id_column(level))?;
        let exp_col = columns.require(&schema.experiment)?;
        let bio_col = columns.require(&schema.bio_rep)?;
        let area_col = columns.require(&schema.abundance)?;
        let tech_col = columns.optional(&schema.tech_rep);
        let weight_col = columns.optional(&schema.weight_type);
        let link_col = columns.optional(&schema.link_type);
        let vio_col = columns.optional(&schema.violation);

        let mut rows = Vec::new();
        for (row_idx, record) in reader.records().enumerate() {
            let record = record?;
            let field = |col: usize| record.get(col).unwrap_or("").trim();

            let abundance = parse_abundance(field(area_col), missing_token, &schema.abundance, row_idx)?;
            let bio_rep = parse_ordinal(field(bio_col), missing_token, &schema.bio_rep, row_idx)?;
            let tech_rep = match tech_col {
                Some(c) => parse_ordinal(field(c), missing_token, &schema.tech_rep, row_idx)?,
                None => Some(1),
            };
            let weight = match weight_col {
                Some(c) => parse_enum::<WeightType>(field(c), missing_token, &schema.weight_type, row_idx)?,
                None => None,
            };
            let link_type = match link_col {
                Some(c) => parse_enum::<LinkType>(field(c), missing_token, &schema.link_type, row_idx)?,
                None => None,
            };
            let violation = vio_col
                .map(field)
                .filter(|v| !v.is_empty() && *v != missing_token)
                .map(String::from);

            rows.push(MeasurementRow {
                identifier: field(id_col).to_string(),
                experiment: field(exp_col).to_string(),
                bio_rep,
                tech_rep,
                weight,
                abundance,
                link_type,
                violation,
            });
        }

        if rows.is_empty() {
            return Err(QuantError::EmptyData(format!("No measurement rows in {}", name)));
        }

        tracing::debug!(table = %name, rows = rows.len(), level = level.name(), "loaded measurements");
        Ok(Self { level, rows })
    }

    /// Concatenate several tables at the same level.
    pub fn concat(tables: Vec<MeasurementTable>) -> Result<Self> {
        let mut iter = tables.into_iter();
        let mut first = iter
            .next()
            .ok_or_else(|| QuantError::EmptyData("No measurement tables to concatenate".to_string()))?;
        for table in iter {
            if table.level != first.level {
                return Err(QuantError::InvalidParameter(format!(
                    "Cannot concatenate {} and {} tables",
                    first.level.name(),
                    table.level.name()
                )));
            }
            first.rows.extend(table.rows);
        }
        Ok(first)
    }

    /// Identifier level.
    pub fn level(&self) -> IdLevel {
        self.level
    }

    /// All rows.
    pub fn rows(&self) -> &[MeasurementRow] {
        &self.rows
    }

    /// Consume into rows.
    pub fn into_rows(self) -> Vec<MeasurementRow> {
        self.rows
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Experiments in order of first appearance.
    pub fn experiments(&self) -> Vec<String> {
        experiments_in_order(&self.rows)
    }
}

/// Distinct non-empty experiment labels in order of first appearance.
pub fn experiments_in_order(rows: &[MeasurementRow]) -> Vec<String> {
    let mut seen = HashSet::new();
    rows.iter()
        .filter(|r| !r.experiment.is_empty())
        .filter(|r| seen.insert(r.experiment.clone()))
        .map(|r| r.experiment.clone())
        .collect()
}

/// Abundances are non-negative; the missing token maps to NaN.
fn parse_abundance(raw: &str, missing_token: &str, column: &str, row: usize) -> Result<f64> {
    let v = parse_float(raw, missing_token, column, row)?;
    if v < 0.0 {
        return Err(QuantError::InvalidValue {
            value: raw.to_string(),
            column: column.to_string(),
            row,
        });
    }
    Ok(v)
}

fn parse_ordinal(raw: &str, missing_token: &str, column: &str, row: usize) -> Result<Option<u32>> {
    let v = parse_float(raw, missing_token, column, row)?;
    if v.is_nan() {
        return Ok(None);
    }
    if v < 0.0 || v.fract() != 0.0 || v > u32::MAX as f64 {
        return Err(QuantError::InvalidValue {
            value: raw.to_string(),
            column: column.to_string(),
            row,
        });
    }
    Ok(Some(v as u32))
}

fn parse_enum<T: std::str::FromStr>(
    raw: &str,
    missing_token: &str,
    column: &str,
    row: usize,
) -> Result<Option<T>> {
    if raw.is_empty() || raw == missing_token {
        return Ok(None);
    }
    raw.parse::<T>().map(Some).map_err(|_| QuantError::InvalidValue {
        value: raw.to_string(),
        column: column.to_string(),
        row,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::Builder;

    fn write_table(suffix: &str, content: &str) -> tempfile::NamedTempFile {
        let mut file = Builder::new().suffix(suffix).tempfile().unwrap();
        write!(file, "{}", content).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_from_csv_reads_all_roles() {
        let file = write_table(
            ".csv",
            "b_peptide_uID,b_peptide_uxID,exp_name,exp_biol_rep,exp_tech_rep,weight_type,ms1_area_sum,link_type,violation\n\
             p1,x1,E1,1,1,light,100.5,xlink,\n\
             p2,x1,E1,1,2,heavy,-,monolink,missing_channel\n",
        );
        let table = MeasurementTable::from_csv(file.path(), &Schema::default(), IdLevel::Uxid, "-").unwrap();

        assert_eq!(table.len(), 2);
        let rows = table.rows();
        assert_eq!(rows[0].identifier, "x1");
        assert_eq!(rows[0].weight, Some(WeightType::Light));
        assert_eq!(rows[0].link_type, Some(LinkType::Xlink));
        assert_eq!(rows[0].violation, None);
        assert_eq!(rows[1].tech_rep, Some(2));
        assert!(rows[1].is_missing());
        assert_eq!(rows[1].violation.as_deref(), Some("missing_channel"));
    }

    #[test]
    fn test_from_xls_is_tab_delimited() {
        let file = write_table(
            ".xls",
            "b_peptide_uID\texp_name\texp_biol_rep\tms1_area_sum\n\
             p1\tE1\t1\t5\n\
             p1\tE1\t2\t-\n",
        );
        let table = MeasurementTable::from_csv(file.path(), &Schema::default(), IdLevel::Uid, "-").unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows()[0].tech_rep, Some(1));
        assert!(table.rows()[1].abundance.is_nan());
    }

    #[test]
    fn test_missing_identifier_is_fatal() {
        let file = write_table(".csv", "protein,exp_name,exp_biol_rep,ms1_area_sum\nA,E1,1,5\n");
        let err = MeasurementTable::from_csv(file.path(), &Schema::default(), IdLevel::Uxid, "-");
        assert!(matches!(err, Err(QuantError::MissingColumn { .. })));
    }

    #[test]
    fn test_out_of_range_values_rejected() {
        let header = "b_peptide_uID,exp_name,exp_biol_rep,ms1_area_sum\n";
        for body in ["p1,E1,1e12,5\n", "p1,E1,1.5,5\n", "p1,E1,-1,5\n", "p1,E1,1,-5\n"] {
            let file = write_table(".csv", &format!("{}{}", header, body));
            let err = MeasurementTable::from_csv(file.path(), &Schema::default(), IdLevel::Uid, "-");
            assert!(matches!(err, Err(QuantError::InvalidValue { .. })), "accepted {}", body.trim());
        }

        let file = write_table(".csv", &format!("{}p1,E1,4294967295,0\n", header));
        let table = MeasurementTable::from_csv(file.path(), &Schema::default(), IdLevel::Uid, "-").unwrap();
        assert_eq!(table.rows()[0].bio_rep, Some(u32::MAX));
        assert_eq!(table.rows()[0].abundance, 0.0);
    }

    #[test]
    fn test_experiments_in_order() {
        let rows = vec![
            MeasurementRow::new("a", "E2", 1, 1.0),
            MeasurementRow::new("a", "E0", 1, 1.0),
            MeasurementRow::new("b", "E2", 1, 1.0),
        ];
        let table = MeasurementTable::new(IdLevel::Uxid, rows);
        assert_eq!(table.experiments(), vec!["E2".to_string(), "E0".to_string()]);
    }
}
