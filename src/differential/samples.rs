//! Sample sets for ratios and significance tests.

use crate::aggregate::{group_rows, AggregateOp, GroupColumn, ReplicateValue};

/// Values entering the log2 ratio mean: every replicate value.
pub fn ratio_values(members: &[&ReplicateValue]) -> Vec<f64> {
    members.iter().map(|v| v.value).collect()
}

/// Values entering the t-test.
///
/// With `include_technical` every defined replicate value is a sample.
/// Otherwise technical replicates are averaged within each (biological
/// replicate, weight) channel first.
pub fn significance_samples(members: &[&ReplicateValue], include_technical: bool) -> Vec<f64> {
    let defined: Vec<ReplicateValue> = members
        .iter()
        .filter(|v| v.is_valid())
        .map(|v| (*v).clone())
        .collect();
    if include_technical {
        return defined.iter().map(|v| v.value).collect();
    }
    group_rows(&defined, &[GroupColumn::BioRep, GroupColumn::Weight])
        .into_values()
        .map(|channel| {
            let values: Vec<f64> = channel.iter().map(|v| v.value).collect();
            crate::aggregate::reduce(&values, AggregateOp::Mean)
        })
        .collect()
}
