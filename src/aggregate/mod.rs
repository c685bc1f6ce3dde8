//! Grouping and aggregation over measurement rows.
//!
//! Grouping is a two-phase affair: [`group_rows`] builds an ordered index
//! from key to member rows, and callers then evaluate a pure predicate or
//! reduction per group. [`aggregate`] is the reduction used throughout the
//! pipeline; [`replicate_values`] is the fine-grained level that feeds
//! normalization and statistics.

mod replicate;

pub use replicate::{replicate_values, ReplicateValue};

use crate::data::{MeasurementRow, WeightType};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A column that rows can be grouped by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupColumn {
    Identifier,
    Experiment,
    BioRep,
    TechRep,
    Weight,
}

/// Group columns of the fine aggregation level.
pub const REPLICATE_COLUMNS: [GroupColumn; 5] = [
    GroupColumn::Identifier,
    GroupColumn::Experiment,
    GroupColumn::BioRep,
    GroupColumn::TechRep,
    GroupColumn::Weight,
];

/// One component of a grouping key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum KeyPart {
    Text(String),
    Ordinal(u32),
    Weight(WeightType),
    /// Weight column of non-labelled data.
    Unlabelled,
}

impl std::fmt::Display for KeyPart {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyPart::Text(s) => write!(f, "{}", s),
            KeyPart::Ordinal(n) => write!(f, "{}", n),
            KeyPart::Weight(w) => write!(f, "{}", w.name()),
            KeyPart::Unlabelled => write!(f, "-"),
        }
    }
}

/// Ordered tuple of key parts, one per grouping column.
pub type GroupKey = Vec<KeyPart>;

/// Rows that expose values for grouping columns.
pub trait Keyed {
    /// Value of `column`, or `None` when the field is missing.
    fn key_part(&self, column: GroupColumn) -> Option<KeyPart>;

    /// Full key over `columns`, or `None` if any field is missing.
    fn group_key(&self, columns: &[GroupColumn]) -> Option<GroupKey> {
        columns.iter().map(|&c| self.key_part(c)).collect()
    }
}

impl Keyed for MeasurementRow {
    fn key_part(&self, column: GroupColumn) -> Option<KeyPart> {
        match column {
            GroupColumn::Identifier => text_part(&self.identifier),
            GroupColumn::Experiment => text_part(&self.experiment),
            GroupColumn::BioRep => self.bio_rep.map(KeyPart::Ordinal),
            GroupColumn::TechRep => self.tech_rep.map(KeyPart::Ordinal),
            GroupColumn::Weight => Some(weight_part(self.weight)),
        }
    }
}

pub(crate) fn text_part(s: &str) -> Option<KeyPart> {
    if s.is_empty() {
        None
    } else {
        Some(KeyPart::Text(s.to_string()))
    }
}

pub(crate) fn weight_part(weight: Option<WeightType>) -> KeyPart {
    weight.map(KeyPart::Weight).unwrap_or(KeyPart::Unlabelled)
}

/// Reduction applied to each group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateOp {
    Sum,
    Mean,
}

/// The reduced value of one group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedGroup {
    /// Grouping key, in the order of the requested columns.
    pub key: GroupKey,
    /// Sum or mean of the member values; NaN if any member is missing.
    pub value: f64,
    /// Number of source rows.
    pub count: usize,
}

/// Index rows by their key over `columns`.
///
/// Rows with a missing key field are left out.
pub fn group_rows<'a, T: Keyed>(rows: &'a [T], columns: &[GroupColumn]) -> BTreeMap<GroupKey, Vec<&'a T>> {
    let mut groups: BTreeMap<GroupKey, Vec<&'a T>> = BTreeMap::new();
    for row in rows {
        if let Some(key) = row.group_key(columns) {
            groups.entry(key).or_default().push(row);
        }
    }
    groups
}

/// Keys of the groups for which `predicate` holds.
pub fn select_groups<T, F>(groups: &BTreeMap<GroupKey, Vec<&T>>, predicate: F) -> BTreeSet<GroupKey>
where
    F: Fn(&[&T]) -> bool,
{
    groups
        .iter()
        .filter(|(_, members)| predicate(members))
        .map(|(key, _)| key.clone())
        .collect()
}

/// Aggregate `value` over distinct combinations of `columns`.
///
/// Returns one group per observed key, ordered by key. The result does not
/// depend on row order.
pub fn aggregate<T, V>(rows: &[T], columns: &[GroupColumn], value: V, op: AggregateOp) -> Vec<AggregatedGroup>
where
    T: Keyed,
    V: Fn(&T) -> f64,
{
    group_rows(rows, columns)
        .into_iter()
        .map(|(key, members)| {
            let values: Vec<f64> = members.iter().map(|r| value(r)).collect();
            AggregatedGroup {
                key,
                value: reduce(&values, op),
                count: members.len(),
            }
        })
        .collect()
}

/// Reduce values; any missing value makes the result missing.
///
/// Values are summed in sorted order so the result is independent of the
/// order rows arrived in.
pub fn reduce(values: &[f64], op: AggregateOp) -> f64 {
    if values.is_empty() || values.iter().any(|v| v.is_nan()) {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let sum: f64 = sorted.iter().sum();
    match op {
        AggregateOp::Sum => sum,
        AggregateOp::Mean => sum / sorted.len() as f64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::WeightType;
    use approx::assert_relative_eq;

    fn rows() -> Vec<MeasurementRow> {
        vec![
            MeasurementRow::new("x1", "E1", 1, 10.0).weight(WeightType::Light),
            MeasurementRow::new("x1", "E1", 1, 0.1).weight(WeightType::Light),
            MeasurementRow::new("x1", "E1", 1, 7.0).weight(WeightType::Heavy),
            MeasurementRow::new("x1", "E1", 2, 3.3),
            MeasurementRow::new("x2", "E1", 1, 1e6),
            MeasurementRow::new("x2", "E2", 1, 5.0),
        ]
    }

    #[test]
    fn test_sum_by_identifier_experiment() {
        let groups = aggregate(
            &rows(),
            &[GroupColumn::Identifier, GroupColumn::Experiment],
            |r| r.abundance,
            AggregateOp::Sum,
        );
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].key, vec![KeyPart::Text("x1".into()), KeyPart::Text("E1".into())]);
        assert_relative_eq!(groups[0].value, 20.4, epsilon = 1e-12);
        assert_eq!(groups[0].count, 4);
    }

    #[test]
    fn test_mean_by_weight() {
        let groups = aggregate(&rows(), &[GroupColumn::Weight], |r| r.abundance, AggregateOp::Mean);
        assert_eq!(groups.len(), 3);
        let light = groups.iter().find(|g| g.key == vec![KeyPart::Weight(WeightType::Light)]).unwrap();
        assert_relative_eq!(light.value, 5.05, epsilon = 1e-12);
    }

    #[test]
    fn test_aggregation_is_order_independent() {
        let forward = rows();
        let mut backward = rows();
        backward.reverse();
        let mut shuffled = rows();
        shuffled.swap(0, 4);
        shuffled.swap(1, 3);

        let cols = [GroupColumn::Experiment];
        let a = aggregate(&forward, &cols, |r| r.abundance, AggregateOp::Sum);
        let b = aggregate(&backward, &cols, |r| r.abundance, AggregateOp::Sum);
        let c = aggregate(&shuffled, &cols, |r| r.abundance, AggregateOp::Sum);
        assert_eq!(a, b);
        assert_eq!(a, c);
    }

    #[test]
    fn test_missing_key_fields_are_excluded() {
        let mut data = rows();
        data[0].bio_rep = None;
        data[1].experiment = String::new();
        let groups = aggregate(
            &data,
            &[GroupColumn::Experiment, GroupColumn::BioRep],
            |r| r.abundance,
            AggregateOp::Sum,
        );
        let total: usize = groups.iter().map(|g| g.count).sum();
        assert_eq!(total, 4);
    }

    #[test]
    fn test_missing_value_propagates() {
        let mut data = rows();
        data[2].abundance = f64::NAN;
        let groups = aggregate(
            &data,
            &[GroupColumn::Identifier, GroupColumn::BioRep],
            |r| r.abundance,
            AggregateOp::Sum,
        );
        assert!(groups[0].value.is_nan());
        assert_relative_eq!(groups[1].value, 3.3, epsilon = 1e-12);
    }

    #[test]
    fn test_select_groups() {
        let data = rows();
        let groups = group_rows(&data, &[GroupColumn::Identifier]);
        let big = select_groups(&groups, |members| members.len() > 2);
        assert_eq!(big.len(), 1);
        assert!(big.contains(&vec![KeyPart::Text("x1".into())]));
    }
}
