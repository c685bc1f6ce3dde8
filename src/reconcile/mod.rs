//! Reconciliation of two independently computed result tables.
//!
//! Both tables are tagged with their origin and merged. The merge is then
//! narrowed in three stages: (identifier, experiment) groups holding exactly
//! one row per origin, groups whose log2 ratios agree after significant-figure
//! rounding, and groups whose p-values agree the same way. Every stage reports
//! its row counts, which is the main health signal when validating one
//! pipeline against another.

use crate::aggregate::{group_rows, select_groups, text_part, GroupColumn, GroupKey, KeyPart, Keyed};
use crate::data::{DifferentialResult, DifferentialResultSet, Schema};
use crate::error::{QuantError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// Significant figures compared by default.
pub const DEFAULT_SIG_DIGITS: usize = 4;

/// Round to `sig` significant figures.
///
/// Zero and non-finite values are returned unchanged.
pub fn round_sig(x: f64, sig: usize) -> f64 {
    if x == 0.0 || !x.is_finite() {
        return x;
    }
    let sig = sig.max(1);
    format!("{:.*e}", sig - 1, x).parse().unwrap_or(x)
}

/// Equality after rounding. NaN never equals anything.
pub fn equal_at_sig(a: f64, b: f64, sig: usize) -> bool {
    !a.is_nan() && !b.is_nan() && round_sig(a, sig) == round_sig(b, sig)
}

impl Keyed for DifferentialResult {
    fn key_part(&self, column: GroupColumn) -> Option<KeyPart> {
        match column {
            GroupColumn::Identifier => text_part(&self.identifier),
            GroupColumn::Experiment => text_part(&self.experiment),
            _ => None,
        }
    }
}

/// A reconciliation stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Merged,
    Paired,
    Log2Equal,
    PValueEqual,
}

impl Stage {
    /// All stages in execution order.
    pub const ALL: [Stage; 4] = [Stage::Merged, Stage::Paired, Stage::Log2Equal, Stage::PValueEqual];

    /// Suffix of the stage artifact file.
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Merged => "merged",
            Stage::Paired => "paired",
            Stage::Log2Equal => "log2_equal",
            Stage::PValueEqual => "pval_equal",
        }
    }
}

/// Row counts of one stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageReport {
    pub stage: Stage,
    pub rows_before: usize,
    pub rows_after: usize,
    /// Mean p-value per origin over the surviving rows.
    pub mean_p_values: BTreeMap<String, f64>,
}

impl StageReport {
    fn new(stage: Stage, rows_before: usize, kept: &DifferentialResultSet) -> Self {
        Self {
            stage,
            rows_before,
            rows_after: kept.len(),
            mean_p_values: kept.origin_mean_p_values(),
        }
    }

    /// Rows removed by this stage.
    pub fn dropped(&self) -> usize {
        self.rows_before.saturating_sub(self.rows_after)
    }
}

/// Output of [`reconcile`]: the table after each stage and the stage reports.
#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub merged: DifferentialResultSet,
    pub paired: DifferentialResultSet,
    pub log2_equal: DifferentialResultSet,
    pub pval_equal: DifferentialResultSet,
    pub stages: Vec<StageReport>,
}

impl Reconciliation {
    /// Table after `stage`.
    pub fn stage(&self, stage: Stage) -> &DifferentialResultSet {
        match stage {
            Stage::Merged => &self.merged,
            Stage::Paired => &self.paired,
            Stage::Log2Equal => &self.log2_equal,
            Stage::PValueEqual => &self.pval_equal,
        }
    }

    /// Report of `stage`.
    pub fn report(&self, stage: Stage) -> Option<&StageReport> {
        self.stages.iter().find(|r| r.stage == stage)
    }

    /// Write one CSV per stage as `<base>_<stage>.csv` and return the paths.
    pub fn write_stages<P: AsRef<Path>>(&self, base: P, schema: &Schema) -> Result<Vec<PathBuf>> {
        let base = base.as_ref().display().to_string();
        let mut paths = Vec::with_capacity(Stage::ALL.len());
        for stage in Stage::ALL {
            let path = PathBuf::from(format!("{}_{}.csv", base, stage.name()));
            self.stage(stage).to_csv(&path, schema)?;
            tracing::debug!(path = %path.display(), rows = self.stage(stage).len(), "wrote stage artifact");
            paths.push(path);
        }
        Ok(paths)
    }
}

fn keep_groups(set: &DifferentialResultSet, keys: &BTreeSet<GroupKey>) -> DifferentialResultSet {
    let results = set
        .iter()
        .filter(|r| {
            r.group_key(&[GroupColumn::Identifier, GroupColumn::Experiment])
                .is_some_and(|k| keys.contains(&k))
        })
        .cloned()
        .collect();
    DifferentialResultSet::new(results)
}

fn narrow<F>(set: &DifferentialResultSet, predicate: F) -> DifferentialResultSet
where
    F: Fn(&[&DifferentialResult]) -> bool,
{
    let groups = group_rows(&set.results, &[GroupColumn::Identifier, GroupColumn::Experiment]);
    let keys = select_groups(&groups, predicate);
    keep_groups(set, &keys)
}

/// Reconcile two result tables. Rows of `a` are tagged `origin_a`, rows of
/// `b` are tagged `origin_b`.
///
/// An empty table is a valid input and shows up as rows lost in the stage
/// reports. Fails with [`QuantError::MissingOrigin`] if an origin label is
/// blank or both labels are the same.
pub fn reconcile(
    a: DifferentialResultSet,
    origin_a: &str,
    b: DifferentialResultSet,
    origin_b: &str,
    sig: usize,
) -> Result<Reconciliation> {
    if origin_a.trim().is_empty() || origin_b.trim().is_empty() {
        return Err(QuantError::MissingOrigin("origin label is blank".to_string()));
    }
    if origin_a == origin_b {
        return Err(QuantError::MissingOrigin(format!(
            "both tables are labelled '{}'",
            origin_a
        )));
    }
    let (a, b) = (a.with_origin(origin_a), b.with_origin(origin_b));

    let n_inputs = a.len() + b.len();
    let mut results = a.results;
    results.extend(b.results);
    let mut merged = DifferentialResultSet::new(results);
    merged.sort();
    let mut stages = vec![StageReport::new(Stage::Merged, n_inputs, &merged)];

    let paired = narrow(&merged, |m| m.len() == 2 && m[0].origin != m[1].origin);
    stages.push(StageReport::new(Stage::Paired, merged.len(), &paired));

    let log2_equal = narrow(&paired, |m| equal_at_sig(m[0].log2_ratio, m[1].log2_ratio, sig));
    stages.push(StageReport::new(Stage::Log2Equal, paired.len(), &log2_equal));

    let pval_equal = narrow(&log2_equal, |m| equal_at_sig(m[0].p_value, m[1].p_value, sig));
    stages.push(StageReport::new(Stage::PValueEqual, log2_equal.len(), &pval_equal));

    for report in &stages {
        tracing::info!(
            stage = report.stage.name(),
            before = report.rows_before,
            after = report.rows_after,
            dropped = report.dropped(),
            "reconciliation stage"
        );
    }

    Ok(Reconciliation {
        merged,
        paired,
        log2_equal,
        pval_equal,
        stages,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn row(id: &str, exp: &str, log2: f64, p: f64) -> DifferentialResult {
        DifferentialResult {
            log2_ratio: log2,
            p_value: p,
            fdr: p,
            ..DifferentialResult::undefined(id, exp, "E0")
        }
    }

    fn table() -> DifferentialResultSet {
        DifferentialResultSet::new(vec![
            row("x1", "E1", 1.0, 0.0036),
            row("x1", "E2", -0.4150375, 0.2),
            row("x2", "E1", 0.000123456, 1.2345e-8),
        ])
    }

    #[test]
    fn test_round_sig() {
        assert_eq!(round_sig(1.23456, 4), 1.235);
        assert_eq!(round_sig(-98765.4, 2), -99000.0);
        assert_eq!(round_sig(0.0, 4), 0.0);
        assert!(round_sig(f64::NAN, 4).is_nan());
        assert_relative_eq!(round_sig(0.000123456, 4), round_sig(0.123456, 4) * 1e-3, max_relative = 1e-12);
    }

    #[test]
    fn test_nan_never_equal() {
        assert!(!equal_at_sig(f64::NAN, f64::NAN, 4));
        assert!(equal_at_sig(0.00012344, 0.00012341, 4));
        assert!(!equal_at_sig(0.0001235, 0.0001234, 4));
    }

    #[test]
    fn test_identical_tables_drop_nothing() {
        let rec = reconcile(table(), "bag", table(), "analyzer_quant", 4).unwrap();
        assert_eq!(rec.stages.len(), 4);
        for report in &rec.stages {
            assert_eq!(report.rows_before, 6);
            assert_eq!(report.rows_after, 6);
            assert_eq!(report.dropped(), 0);
        }
        let means = &rec.report(Stage::Log2Equal).unwrap().mean_p_values;
        assert_relative_eq!(means["bag"], means["analyzer_quant"]);
    }

    #[test]
    fn test_stage_counts_non_increasing() {
        let other = DifferentialResultSet::new(vec![
            row("x1", "E1", 1.00001, 0.0036),
            row("x1", "E2", -0.4150375, 0.25),
            row("x2", "E1", 0.5, 1.2345e-8),
            row("x3", "E1", 0.5, 0.5),
        ]);
        let rec = reconcile(table(), "bag", other, "analyzer_quant", 4).unwrap();
        let counts: Vec<usize> = rec.stages.iter().map(|r| r.rows_after).collect();
        assert_eq!(counts, vec![7, 6, 4, 2]);
        assert!(counts.windows(2).all(|w| w[0] >= w[1]));
        assert_eq!(rec.pval_equal.results[0].identifier, "x1");
    }

    #[test]
    fn test_requires_two_origins() {
        let same = reconcile(table(), "bag", table(), "bag", 4);
        assert!(matches!(same, Err(QuantError::MissingOrigin(_))));

        let blank = reconcile(table(), "", table(), "bag", 4);
        assert!(matches!(blank, Err(QuantError::MissingOrigin(_))));
    }

    #[test]
    fn test_empty_side_loses_every_row() {
        let reference = DifferentialResultSet::new(vec![row("x1", "E1", 1.0, 0.0036)]);
        let rec = reconcile(DifferentialResultSet::default(), "bag", reference, "analyzer_quant", 4).unwrap();

        let shape: Vec<(usize, usize)> = rec.stages.iter().map(|r| (r.rows_before, r.rows_after)).collect();
        assert_eq!(shape, vec![(1, 1), (1, 0), (0, 0), (0, 0)]);
        assert_eq!(rec.merged.results[0].origin, "analyzer_quant");
        assert!(rec.pval_equal.is_empty());
    }

    #[test]
    fn test_write_stages() {
        let dir = tempfile::tempdir().unwrap();
        let rec = reconcile(table(), "bag", table(), "analyzer_quant", 4).unwrap();
        let paths = rec.write_stages(dir.path().join("run"), &Schema::default()).unwrap();

        assert_eq!(paths.len(), 4);
        assert!(paths[0].ends_with("run_merged.csv"));
        assert!(paths[3].ends_with("run_pval_equal.csv"));
        let text = std::fs::read_to_string(&paths[2]).unwrap();
        assert_eq!(text.lines().count(), 7);
        assert!(text.contains("0.000123456"));
    }
}
