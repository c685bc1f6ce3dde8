//! Replicate-level scaling factors.

use super::{valid_total, NormalizationMode};
use crate::aggregate::{group_rows, GroupKey, ReplicateValue};
use std::collections::BTreeMap;

/// Factor per (experiment, biological replicate, technical replicate).
///
/// Each replicate's total abundance across identifiers is scaled to the
/// mean total of the defined replicates in the same experiment.
pub fn replicate_factors(values: &[ReplicateValue]) -> BTreeMap<GroupKey, Option<f64>> {
    let groups = group_rows(values, NormalizationMode::PerReplicateMean.group_columns());
    let totals: BTreeMap<GroupKey, Option<f64>> = groups
        .into_iter()
        .map(|(key, members)| (key, valid_total(members.into_iter())))
        .collect();

    // Mean defined total per experiment; the experiment is the first key part.
    let mut by_exp: BTreeMap<_, (f64, usize)> = BTreeMap::new();
    for (key, total) in &totals {
        if let (Some(exp), Some(t)) = (key.first(), total) {
            let e = by_exp.entry(exp.clone()).or_insert((0.0, 0));
            e.0 += t;
            e.1 += 1;
        }
    }

    totals
        .into_iter()
        .map(|(key, total)| {
            let factor = total.and_then(|t| {
                let (sum, n) = by_exp.get(key.first()?)?;
                Some(sum / *n as f64 / t)
            });
            (key, factor)
        })
        .collect()
}
