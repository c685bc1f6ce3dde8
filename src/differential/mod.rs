//! Differential statistics against a reference experiment.
//!
//! For every (identifier, experiment) pair the log2 ratio of mean abundance
//! against the reference experiment is computed together with a two-sided
//! t-test p-value. Pairs are independent and are evaluated in parallel; the
//! FDR correction is a barrier that runs per experiment once all of its
//! p-values are known.

mod samples;

pub use samples::{ratio_values, significance_samples};

use crate::aggregate::{group_rows, GroupColumn, KeyPart, ReplicateValue};
use crate::correct::CorrectionMethod;
use crate::data::{DifferentialResult, DifferentialResultSet};
use crate::error::{QuantError, Result};
use crate::test::{t_test, VarianceModel};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Settings of the differential step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DifferentialConfig {
    /// Reference experiment every other experiment is compared to.
    pub reference: String,
    /// Variance assumption of the t-test.
    pub variance: VarianceModel,
    /// Use technical replicates as separate significance samples.
    pub include_technical: bool,
    /// FDR procedure applied per experiment.
    pub correction: CorrectionMethod,
    /// Compare pairs that still contain missing replicate values, using
    /// only the defined ones. Off unless missing values were imputed.
    #[serde(default)]
    pub keep_incomplete: bool,
}

impl DifferentialConfig {
    /// Create a config with default test settings.
    pub fn new(reference: &str) -> Self {
        Self {
            reference: reference.to_string(),
            variance: VarianceModel::default(),
            include_technical: false,
            correction: CorrectionMethod::default(),
            keep_incomplete: false,
        }
    }
}

/// log2 of the ratio of means; NaN unless both means are positive.
pub fn log2_ratio(experiment: &[f64], reference: &[f64]) -> f64 {
    match (positive_mean(experiment), positive_mean(reference)) {
        (Some(e), Some(r)) => (e / r).log2(),
        _ => f64::NAN,
    }
}

fn positive_mean(values: &[f64]) -> Option<f64> {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        return None;
    }
    let mean = finite.iter().sum::<f64>() / finite.len() as f64;
    (mean > 0.0).then_some(mean)
}

/// Compare every experiment against the configured reference.
///
/// Pairs whose experiment is the reference are not reported. Identifiers
/// without reference values still yield a row with undefined statistics, as
/// do pairs with a missing replicate value on either side unless
/// `keep_incomplete` is set.
pub fn differential(values: &[ReplicateValue], config: &DifferentialConfig) -> Result<DifferentialResultSet> {
    let groups = group_rows(values, &[GroupColumn::Identifier, GroupColumn::Experiment]);

    let reference_part = KeyPart::Text(config.reference.clone());
    let experiments: BTreeSet<&KeyPart> = groups.keys().filter_map(|k| k.get(1)).collect();
    if !experiments.contains(&reference_part) {
        return Err(QuantError::InvalidParameter(format!(
            "Reference experiment '{}' not found in data",
            config.reference
        )));
    }

    // identifier -> experiment -> members
    let mut by_id: BTreeMap<&KeyPart, BTreeMap<&KeyPart, &[&ReplicateValue]>> = BTreeMap::new();
    for (key, members) in &groups {
        if let [id, exp] = key.as_slice() {
            by_id.entry(id).or_default().insert(exp, members.as_slice());
        }
    }

    let tasks: Vec<(&KeyPart, &KeyPart, &[&ReplicateValue], &[&ReplicateValue])> = by_id
        .iter()
        .flat_map(|(id, per_exp)| {
            let reference: &[&ReplicateValue] = per_exp.get(&reference_part).copied().unwrap_or(&[]);
            per_exp
                .iter()
                .filter(|(exp, _)| ***exp != reference_part)
                .map(move |(exp, members)| (*id, *exp, *members, reference))
        })
        .collect();

    let mut results: Vec<DifferentialResult> = tasks
        .into_par_iter()
        .map(|(id, exp, members, reference)| compare_pair(&id.to_string(), &exp.to_string(), members, reference, config))
        .collect();

    apply_correction(&mut results, config.correction);

    let n_undefined = results.iter().filter(|r| !r.has_ratio()).count();
    tracing::info!(
        pairs = results.len(),
        undefined = n_undefined,
        reference = %config.reference,
        "computed differential statistics"
    );
    Ok(DifferentialResultSet::new(results))
}

fn compare_pair(
    identifier: &str,
    experiment: &str,
    members: &[&ReplicateValue],
    reference: &[&ReplicateValue],
    config: &DifferentialConfig,
) -> DifferentialResult {
    if !config.keep_incomplete && members.iter().chain(reference).any(|v| !v.is_valid()) {
        tracing::debug!(identifier, experiment, "missing replicate value, pair excluded");
        return DifferentialResult::undefined(identifier, experiment, &config.reference);
    }

    let log2 = log2_ratio(&ratio_values(members), &ratio_values(reference));

    let exp_samples = significance_samples(members, config.include_technical);
    let ref_samples = significance_samples(reference, config.include_technical);
    let test = t_test(&exp_samples, &ref_samples, config.variance);

    if !test.is_defined() {
        tracing::debug!(identifier, experiment, n_exp = exp_samples.len(), n_ref = ref_samples.len(), "p-value undefined");
    }

    DifferentialResult {
        log2_ratio: log2,
        p_value: test.p_value,
        n_experiment: exp_samples.len(),
        n_reference: ref_samples.len(),
        ..DifferentialResult::undefined(identifier, experiment, &config.reference)
    }
}

/// Correct p-values per experiment. All p-values of an experiment must be
/// present before this runs.
fn apply_correction(results: &mut [DifferentialResult], method: CorrectionMethod) {
    let mut by_exp: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for (i, r) in results.iter().enumerate() {
        by_exp.entry(r.experiment.clone()).or_default().push(i);
    }
    for indices in by_exp.values() {
        let p: Vec<f64> = indices.iter().map(|&i| results[i].p_value).collect();
        for (&i, q) in indices.iter().zip(method.apply(&p)) {
            results[i].fdr = q;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn values(id: &str, exp: &str, vals: &[f64]) -> Vec<ReplicateValue> {
        vals.iter()
            .enumerate()
            .map(|(i, &v)| ReplicateValue::new(id, exp, i as u32 + 1, 1, v))
            .collect()
    }

    #[test]
    fn test_log2_ratio_basic() {
        assert_relative_eq!(log2_ratio(&[10.0, 10.0, 10.0], &[5.0, 5.0, 5.0]), 1.0, epsilon = 1e-12);
        assert!(log2_ratio(&[f64::NAN], &[5.0]).is_nan());
        assert!(log2_ratio(&[0.0], &[5.0]).is_nan());
        assert!(log2_ratio(&[], &[5.0]).is_nan());
    }

    #[test]
    fn test_log2_ratio_inverse_and_self() {
        let a = [3.0, 7.5, 12.0];
        let b = [1.0, 2.0, f64::NAN];
        assert_relative_eq!(log2_ratio(&a, &b), -log2_ratio(&b, &a), epsilon = 1e-12);
        assert_eq!(log2_ratio(&a, &a), 0.0);
    }

    #[test]
    fn test_reference_is_excluded() {
        let mut data = values("x1", "E0", &[5.0, 5.0, 5.0]);
        data.extend(values("x1", "E1", &[10.0, 10.0, 10.0]));
        let set = differential(&data, &DifferentialConfig::new("E0")).unwrap();

        assert_eq!(set.len(), 1);
        let r = &set.results[0];
        assert_eq!(r.experiment, "E1");
        assert_eq!(r.reference, "E0");
        assert_relative_eq!(r.log2_ratio, 1.0, epsilon = 1e-12);
        assert_eq!(r.p_value, 0.0);
        assert_eq!(r.fdr, 0.0);
    }

    #[test]
    fn test_unknown_reference() {
        let data = values("x1", "E1", &[1.0, 2.0]);
        assert!(differential(&data, &DifferentialConfig::new("E0")).is_err());
    }

    #[test]
    fn test_missing_reference_side_is_undefined() {
        let mut data = values("x1", "E0", &[5.0, 6.0]);
        data.extend(values("x1", "E1", &[10.0, 11.0]));
        data.extend(values("x2", "E1", &[10.0, 11.0]));
        data.extend(values("x2", "E0", &[f64::NAN, f64::NAN]));
        let set = differential(&data, &DifferentialConfig::new("E0")).unwrap();

        let x2 = set.iter().find(|r| r.identifier == "x2").unwrap();
        assert!(x2.log2_ratio.is_nan());
        assert!(x2.p_value.is_nan());
        assert!(x2.fdr.is_nan());
        assert_eq!(x2.n_reference, 0);
    }

    #[test]
    fn test_partly_missing_pair_is_undefined() {
        let mut data = values("x1", "E0", &[5.0, 5.0, f64::NAN]);
        data.extend(values("x1", "E1", &[10.0, 10.0, 10.0]));

        let set = differential(&data, &DifferentialConfig::new("E0")).unwrap();
        assert_eq!(set.len(), 1);
        assert!(!set.results[0].has_ratio());
        assert!(set.results[0].p_value.is_nan());

        let config = DifferentialConfig {
            keep_incomplete: true,
            ..DifferentialConfig::new("E0")
        };
        let set = differential(&data, &config).unwrap();
        let r = &set.results[0];
        assert_relative_eq!(r.log2_ratio, 1.0, epsilon = 1e-12);
        assert_eq!(r.n_reference, 2);
    }

    #[test]
    fn test_fdr_is_per_experiment() {
        let mut data = Vec::new();
        for (i, id) in ["a", "b", "c"].iter().enumerate() {
            let shift = i as f64;
            data.extend(values(id, "E0", &[5.0, 6.0, 7.0]));
            data.extend(values(id, "E1", &[6.0 + shift, 8.0 + shift, 7.0 + shift]));
            data.extend(values(id, "E2", &[50.0, 61.0, 70.0]));
        }
        let set = differential(&data, &DifferentialConfig::new("E0")).unwrap();
        assert_eq!(set.len(), 6);

        for exp in ["E1", "E2"] {
            let rows: Vec<_> = set.iter().filter(|r| r.experiment == exp).collect();
            let p: Vec<f64> = rows.iter().map(|r| r.p_value).collect();
            let q = crate::correct::correct_bh(&p);
            for (r, expected) in rows.iter().zip(q) {
                assert_relative_eq!(r.fdr, expected, epsilon = 1e-12);
            }
        }
    }
}
