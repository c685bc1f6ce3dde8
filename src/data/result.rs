//! Result types for differential quantification.

use crate::data::schema::Schema;
use crate::data::table::{format_float, open_reader, parse_float, ColumnIndex, OUTPUT_SIG_DIGITS};
use crate::error::{QuantError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Statistics for one (identifier, experiment) pair relative to a reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DifferentialResult {
    /// Identifier (cross-link or peptide key).
    pub identifier: String,
    /// Experiment being compared.
    pub experiment: String,
    /// Reference experiment.
    pub reference: String,
    /// log2(mean experiment / mean reference); NaN when undefined.
    pub log2_ratio: f64,
    /// Two-sided p-value; NaN when undefined.
    pub p_value: f64,
    /// Corrected p-value within the experiment; NaN when undefined.
    pub fdr: f64,
    /// Number of significance samples on the experiment side.
    pub n_experiment: usize,
    /// Number of significance samples on the reference side.
    pub n_reference: usize,
    /// Which pipeline produced this row.
    pub origin: String,
}

impl DifferentialResult {
    /// Create a result with undefined statistics.
    pub fn undefined(identifier: &str, experiment: &str, reference: &str) -> Self {
        Self {
            identifier: identifier.to_string(),
            experiment: experiment.to_string(),
            reference: reference.to_string(),
            log2_ratio: f64::NAN,
            p_value: f64::NAN,
            fdr: f64::NAN,
            n_experiment: 0,
            n_reference: 0,
            origin: String::new(),
        }
    }

    /// Check whether the log2 ratio is defined.
    pub fn has_ratio(&self) -> bool {
        self.log2_ratio.is_finite()
    }

    /// Check if significant at a corrected threshold.
    pub fn is_significant_at(&self, alpha: f64) -> bool {
        self.fdr < alpha
    }

    /// (identifier, experiment) key.
    pub fn key(&self) -> (&str, &str) {
        (&self.identifier, &self.experiment)
    }
}

/// Mean statistics of one experiment, as printed after quantification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentMean {
    pub experiment: String,
    pub n: usize,
    pub log2_ratio: f64,
    pub p_value: f64,
    pub fdr: f64,
}

/// Collection of differential results.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DifferentialResultSet {
    /// Individual results.
    pub results: Vec<DifferentialResult>,
}

impl DifferentialResultSet {
    /// Create a new result set.
    pub fn new(results: Vec<DifferentialResult>) -> Self {
        Self { results }
    }

    /// Number of results.
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Iterate over results.
    pub fn iter(&self) -> impl Iterator<Item = &DifferentialResult> {
        self.results.iter()
    }

    /// Tag every row with an origin label.
    pub fn with_origin(mut self, origin: &str) -> Self {
        for r in &mut self.results {
            r.origin = origin.to_string();
        }
        self
    }

    /// Sort by identifier, experiment, then origin.
    pub fn sort(&mut self) {
        self.results.sort_by(|a, b| {
            (&a.identifier, &a.experiment, &a.origin).cmp(&(&b.identifier, &b.experiment, &b.origin))
        });
    }

    /// Mean log2 ratio, p-value and FDR per experiment, ignoring undefined values.
    pub fn experiment_means(&self) -> Vec<ExperimentMean> {
        let mut by_exp: BTreeMap<&str, Vec<&DifferentialResult>> = BTreeMap::new();
        for r in &self.results {
            by_exp.entry(&r.experiment).or_default().push(r);
        }
        by_exp
            .into_iter()
            .map(|(exp, rows)| ExperimentMean {
                experiment: exp.to_string(),
                n: rows.len(),
                log2_ratio: nan_mean(rows.iter().map(|r| r.log2_ratio)),
                p_value: nan_mean(rows.iter().map(|r| r.p_value)),
                fdr: nan_mean(rows.iter().map(|r| r.fdr)),
            })
            .collect()
    }

    /// Mean p-value per origin, ignoring undefined values.
    pub fn origin_mean_p_values(&self) -> BTreeMap<String, f64> {
        let mut by_origin: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        for r in &self.results {
            by_origin.entry(r.origin.clone()).or_default().push(r.p_value);
        }
        by_origin
            .into_iter()
            .map(|(origin, p)| (origin, nan_mean(p.into_iter())))
            .collect()
    }

    /// Count results at corrected-significance thresholds.
    pub fn summary(&self) -> ResultSummary {
        ResultSummary {
            total: self.len(),
            undefined: self.results.iter().filter(|r| !r.has_ratio()).count(),
            significant_01: self.results.iter().filter(|r| r.fdr < 0.01).count(),
            significant_05: self.results.iter().filter(|r| r.fdr < 0.05).count(),
            significant_10: self.results.iter().filter(|r| r.fdr < 0.10).count(),
        }
    }

    /// Load a result table, e.g. one written by another quantification pipeline.
    ///
    /// Identifier, experiment, log2 ratio and p-value columns are required;
    /// reference, FDR and origin columns are read when present.
    pub fn from_csv<P: AsRef<Path>>(path: P, schema: &Schema, missing_token: &str) -> Result<Self> {
        let name = path.as_ref().display().to_string();
        let mut reader = open_reader(&path)?;
        let columns = ColumnIndex::new(&name, reader.headers()?);

        let id_col = columns.require(&schema.result_id)?;
        let exp_col = columns.require(&schema.result_experiment)?;
        let log2_col = columns.require(&schema.log2_ratio)?;
        let p_col = columns.require(&schema.p_value)?;
        let ref_col = columns.optional(&schema.reference);
        let fdr_col = columns.optional(&schema.fdr);
        let origin_col = columns.optional(&schema.origin);

        let mut results = Vec::new();
        for (row_idx, record) in reader.records().enumerate() {
            let record = record?;
            let field = |col: usize| record.get(col).unwrap_or("").trim();

            let identifier = field(id_col);
            let experiment = field(exp_col);
            if identifier.is_empty() || experiment.is_empty() {
                continue;
            }
            let fdr = match fdr_col {
                Some(c) => parse_float(field(c), missing_token, &schema.fdr, row_idx)?,
                None => f64::NAN,
            };
            results.push(DifferentialResult {
                identifier: identifier.to_string(),
                experiment: experiment.to_string(),
                reference: ref_col.map(field).unwrap_or("").to_string(),
                log2_ratio: parse_float(field(log2_col), missing_token, &schema.log2_ratio, row_idx)?,
                p_value: parse_float(field(p_col), missing_token, &schema.p_value, row_idx)?,
                fdr,
                n_experiment: 0,
                n_reference: 0,
                origin: origin_col.map(field).unwrap_or("").to_string(),
            });
        }

        if results.is_empty() {
            return Err(QuantError::EmptyData(format!("No result rows in {}", name)));
        }
        Ok(Self { results })
    }

    /// Write results as comma-separated text with `%.6g` floats.
    pub fn to_csv<P: AsRef<Path>>(&self, path: P, schema: &Schema) -> Result<()> {
        let mut wtr = csv::WriterBuilder::new().from_path(path)?;
        wtr.write_record([
            schema.result_id.as_str(),
            schema.result_experiment.as_str(),
            schema.reference.as_str(),
            schema.log2_ratio.as_str(),
            schema.p_value.as_str(),
            schema.fdr.as_str(),
            "n_experiment",
            "n_reference",
            schema.origin.as_str(),
        ])?;
        for r in &self.results {
            wtr.write_record([
                r.identifier.clone(),
                r.experiment.clone(),
                r.reference.clone(),
                format_float(r.log2_ratio, OUTPUT_SIG_DIGITS),
                format_float(r.p_value, OUTPUT_SIG_DIGITS),
                format_float(r.fdr, OUTPUT_SIG_DIGITS),
                r.n_experiment.to_string(),
                r.n_reference.to_string(),
                r.origin.clone(),
            ])?;
        }
        wtr.flush()?;
        Ok(())
    }
}

/// Summary statistics for a result set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultSummary {
    pub total: usize,
    pub undefined: usize,
    pub significant_01: usize,
    pub significant_05: usize,
    pub significant_10: usize,
}

impl std::fmt::Display for ResultSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Total pairs reported:  {}", self.total)?;
        writeln!(f, "Undefined log2 ratio:  {}", self.undefined)?;
        writeln!(f, "Significant at FDR < 0.01: {}", self.significant_01)?;
        writeln!(f, "Significant at FDR < 0.05: {}", self.significant_05)?;
        writeln!(f, "Significant at FDR < 0.10: {}", self.significant_10)?;
        Ok(())
    }
}

fn nan_mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values
        .filter(|v| !v.is_nan())
        .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        f64::NAN
    } else {
        sum / n as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use tempfile::Builder;

    fn result(id: &str, exp: &str, log2: f64, p: f64, fdr: f64) -> DifferentialResult {
        DifferentialResult {
            log2_ratio: log2,
            p_value: p,
            fdr,
            ..DifferentialResult::undefined(id, exp, "E0")
        }
    }

    #[test]
    fn test_experiment_means_skip_undefined() {
        let set = DifferentialResultSet::new(vec![
            result("a", "E1", 1.0, 0.01, 0.02),
            result("b", "E1", f64::NAN, f64::NAN, f64::NAN),
            result("c", "E1", 3.0, 0.03, 0.04),
            result("a", "E2", -1.0, 0.5, 0.5),
        ]);
        let means = set.experiment_means();

        assert_eq!(means.len(), 2);
        assert_eq!(means[0].experiment, "E1");
        assert_eq!(means[0].n, 3);
        assert_relative_eq!(means[0].log2_ratio, 2.0, epsilon = 1e-12);
        assert_relative_eq!(means[0].p_value, 0.02, epsilon = 1e-12);
        assert_relative_eq!(means[1].log2_ratio, -1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_summary() {
        let set = DifferentialResultSet::new(vec![
            result("a", "E1", 1.0, 0.001, 0.005),
            result("b", "E1", 1.0, 0.01, 0.03),
            result("c", "E1", f64::NAN, f64::NAN, f64::NAN),
        ]);
        let summary = set.summary();
        assert_eq!(summary.total, 3);
        assert_eq!(summary.undefined, 1);
        assert_eq!(summary.significant_01, 1);
        assert_eq!(summary.significant_05, 2);
    }

    #[test]
    fn test_csv_roundtrip_keeps_missing() {
        let schema = Schema::default();
        let set = DifferentialResultSet::new(vec![
            result("x1", "E1", 1.0, 0.0123456789, 0.05),
            result("x2", "E1", f64::NAN, f64::NAN, f64::NAN),
        ])
        .with_origin("bag");

        let file = Builder::new().suffix(".csv").tempfile().unwrap();
        set.to_csv(file.path(), &schema).unwrap();
        let loaded = DifferentialResultSet::from_csv(file.path(), &schema, "-").unwrap();

        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.results[0].origin, "bag");
        assert_eq!(loaded.results[0].reference, "E0");
        assert_relative_eq!(loaded.results[0].p_value, 0.0123457, epsilon = 1e-12);
        assert!(loaded.results[1].log2_ratio.is_nan());
    }
}
