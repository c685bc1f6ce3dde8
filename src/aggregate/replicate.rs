//! Fine-grained replicate totals.

use super::{group_rows, reduce, text_part, weight_part, AggregateOp, GroupColumn, KeyPart, Keyed, REPLICATE_COLUMNS};
use crate::data::{MeasurementRow, WeightType};
use serde::{Deserialize, Serialize};

/// Total abundance of one identifier in one replicate channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicateValue {
    pub identifier: String,
    pub experiment: String,
    pub bio_rep: u32,
    pub tech_rep: u32,
    pub weight: Option<WeightType>,
    /// Summed abundance; NaN if any contributing measurement was missing.
    pub value: f64,
    /// Number of measurement rows summed.
    pub n_rows: usize,
}

impl ReplicateValue {
    /// Create a replicate value from one row.
    pub fn new(identifier: &str, experiment: &str, bio_rep: u32, tech_rep: u32, value: f64) -> Self {
        Self {
            identifier: identifier.to_string(),
            experiment: experiment.to_string(),
            bio_rep,
            tech_rep,
            weight: None,
            value,
            n_rows: 1,
        }
    }

    /// Set the isotope channel.
    pub fn weight(mut self, weight: WeightType) -> Self {
        self.weight = Some(weight);
        self
    }

    /// Check whether the value is usable for ratios and normalization.
    pub fn is_valid(&self) -> bool {
        self.value.is_finite()
    }
}

impl Keyed for ReplicateValue {
    fn key_part(&self, column: GroupColumn) -> Option<KeyPart> {
        match column {
            GroupColumn::Identifier => text_part(&self.identifier),
            GroupColumn::Experiment => text_part(&self.experiment),
            GroupColumn::BioRep => Some(KeyPart::Ordinal(self.bio_rep)),
            GroupColumn::TechRep => Some(KeyPart::Ordinal(self.tech_rep)),
            GroupColumn::Weight => Some(weight_part(self.weight)),
        }
    }
}

/// Sum abundance per (identifier, experiment, biological replicate,
/// technical replicate, weight).
pub fn replicate_values(rows: &[MeasurementRow]) -> Vec<ReplicateValue> {
    group_rows(rows, &REPLICATE_COLUMNS)
        .into_values()
        .filter_map(|members| {
            let first = members.first()?;
            let values: Vec<f64> = members.iter().map(|r| r.abundance).collect();
            Some(ReplicateValue {
                identifier: first.identifier.clone(),
                experiment: first.experiment.clone(),
                bio_rep: first.bio_rep?,
                tech_rep: first.tech_rep?,
                weight: first.weight,
                value: reduce(&values, AggregateOp::Sum),
                n_rows: members.len(),
            })
        })
        .collect()
}
