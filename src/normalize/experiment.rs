//! Experiment-level scaling factors.

use super::valid_total;
use crate::aggregate::{group_rows, GroupColumn, GroupKey, KeyPart, ReplicateValue};
use std::collections::{BTreeMap, BTreeSet};

/// Factor per experiment from mean replicate totals.
///
/// Each experiment's mean replicate total is scaled to the mean of those
/// totals over all experiments.
pub fn experiment_factors_default(values: &[ReplicateValue]) -> BTreeMap<GroupKey, Option<f64>> {
    let replicate_cols = [GroupColumn::Experiment, GroupColumn::BioRep, GroupColumn::TechRep];
    let mut per_exp: BTreeMap<KeyPart, Vec<f64>> = BTreeMap::new();
    let mut experiments: BTreeSet<KeyPart> = BTreeSet::new();
    for (key, members) in group_rows(values, &replicate_cols) {
        let Some(exp) = key.into_iter().next() else { continue };
        experiments.insert(exp.clone());
        if let Some(total) = valid_total(members.into_iter()) {
            per_exp.entry(exp).or_default().push(total);
        }
    }

    let exp_means: BTreeMap<KeyPart, f64> = per_exp
        .into_iter()
        .map(|(exp, totals)| {
            let mean = totals.iter().sum::<f64>() / totals.len() as f64;
            (exp, mean)
        })
        .collect();
    if exp_means.is_empty() {
        return experiments.into_iter().map(|e| (vec![e], None)).collect();
    }
    let global = exp_means.values().sum::<f64>() / exp_means.len() as f64;

    experiments
        .into_iter()
        .map(|exp| {
            let factor = exp_means.get(&exp).map(|m| global / m);
            (vec![exp], factor)
        })
        .collect()
}

/// Factor per experiment by median-of-ratios.
///
/// For every identifier with a positive mean in each experiment, the ratio
/// of its experiment mean to its cross-experiment mean is taken; the factor
/// is the inverse median of those ratios. Experiments without any positive
/// value, or runs without a shared identifier, get no factor.
pub fn experiment_factors_xtract(values: &[ReplicateValue]) -> BTreeMap<GroupKey, Option<f64>> {
    let mut experiments: BTreeSet<KeyPart> = BTreeSet::new();
    // identifier -> experiment -> mean of positive values
    let mut means: BTreeMap<KeyPart, BTreeMap<KeyPart, f64>> = BTreeMap::new();
    for (key, members) in group_rows(values, &[GroupColumn::Identifier, GroupColumn::Experiment]) {
        let mut parts = key.into_iter();
        let (Some(id), Some(exp)) = (parts.next(), parts.next()) else { continue };
        experiments.insert(exp.clone());
        let positive: Vec<f64> = members
            .iter()
            .map(|v| v.value)
            .filter(|v| v.is_finite() && *v > 0.0)
            .collect();
        if !positive.is_empty() {
            let mean = positive.iter().sum::<f64>() / positive.len() as f64;
            means.entry(id).or_default().insert(exp, mean);
        }
    }

    let observed: BTreeSet<&KeyPart> = means.values().flat_map(|m| m.keys()).collect();
    let mut ratios: BTreeMap<&KeyPart, Vec<f64>> = BTreeMap::new();
    for per_exp in means.values().filter(|m| m.len() == observed.len()) {
        let reference = per_exp.values().sum::<f64>() / per_exp.len() as f64;
        for (exp, mean) in per_exp {
            ratios.entry(exp).or_default().push(mean / reference);
        }
    }

    experiments
        .iter()
        .map(|exp| {
            let factor = ratios
                .get(exp)
                .and_then(|r| median(r))
                .filter(|m| *m > 0.0)
                .map(|m| 1.0 / m);
            (vec![exp.clone()], factor)
        })
        .collect()
}

fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::{normalize, NormalizationMode};
    use approx::assert_relative_eq;

    fn exp(name: &str) -> GroupKey {
        vec![KeyPart::Text(name.to_string())]
    }

    #[test]
    fn test_default_factors() {
        let values = vec![
            ReplicateValue::new("x1", "E1", 1, 1, 100.0),
            ReplicateValue::new("x1", "E1", 2, 1, 300.0),
            ReplicateValue::new("x1", "E2", 1, 1, 100.0),
        ];
        let factors = experiment_factors_default(&values);
        // Means 200 and 100, global 150.
        assert_relative_eq!(factors[&exp("E1")].unwrap(), 0.75, epsilon = 1e-12);
        assert_relative_eq!(factors[&exp("E2")].unwrap(), 1.5, epsilon = 1e-12);
    }

    #[test]
    fn test_xtract_median_of_ratios() {
        // E2 is uniformly twice E1 except for one outlier identifier.
        let values = vec![
            ReplicateValue::new("a", "E1", 1, 1, 10.0),
            ReplicateValue::new("b", "E1", 1, 1, 20.0),
            ReplicateValue::new("c", "E1", 1, 1, 30.0),
            ReplicateValue::new("a", "E2", 1, 1, 20.0),
            ReplicateValue::new("b", "E2", 1, 1, 40.0),
            ReplicateValue::new("c", "E2", 1, 1, 600.0),
        ];
        let out = normalize(values, NormalizationMode::PerExperimentXtractCompatible);
        let get = |id: &str, e: &str| {
            out.values
                .iter()
                .find(|v| v.identifier == id && v.experiment == e)
                .unwrap()
                .value
        };
        // After scaling the non-outlier identifiers agree across experiments.
        assert_relative_eq!(get("a", "E1"), get("a", "E2"), epsilon = 1e-9);
        assert_relative_eq!(get("b", "E1"), get("b", "E2"), epsilon = 1e-9);
    }

    #[test]
    fn test_xtract_empty_experiment_undefined() {
        let values = vec![
            ReplicateValue::new("a", "E1", 1, 1, 10.0),
            ReplicateValue::new("a", "E2", 1, 1, f64::NAN),
        ];
        let factors = experiment_factors_xtract(&values);
        assert!(factors[&exp("E1")].is_some());
        assert!(factors[&exp("E2")].is_none());
    }

    #[test]
    fn test_median() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), Some(2.5));
        assert_eq!(median(&[]), None);
    }
}
