//! Abundance normalization across replicates and experiments.
//!
//! This module provides several scaling approaches:
//!
//! - **Replicate**: each technical replicate is scaled to the mean total
//!   abundance of its experiment's replicates
//! - **Experiment (default)**: each experiment is scaled so its mean
//!   replicate total matches the mean over all experiments
//! - **Experiment (xTract-compatible)**: median-of-ratios against the
//!   per-identifier cross-experiment mean, the convention of the analyzer
//!   whose output is reconciled against ours
//!
//! A factor that cannot be computed (no valid, non-zero value in the group)
//! is never applied. The group's values are excluded instead and counted in
//! the [`NormalizationReport`].

mod experiment;
mod replicate;

pub use experiment::{experiment_factors_default, experiment_factors_xtract};
pub use replicate::replicate_factors;

use crate::aggregate::{GroupColumn, GroupKey, Keyed, ReplicateValue};
use crate::error::{QuantError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Normalization strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizationMode {
    /// Pass-through.
    None,
    /// Scale technical replicates to their experiment's mean replicate total.
    PerReplicateMean,
    /// Scale experiments to the global mean replicate total.
    PerExperimentDefault,
    /// Scale experiments by the median of per-identifier ratios.
    PerExperimentXtractCompatible,
}

impl NormalizationMode {
    /// Columns that define one normalization group.
    pub fn group_columns(&self) -> &'static [GroupColumn] {
        match self {
            Self::None => &[],
            Self::PerReplicateMean => &[GroupColumn::Experiment, GroupColumn::BioRep, GroupColumn::TechRep],
            Self::PerExperimentDefault | Self::PerExperimentXtractCompatible => &[GroupColumn::Experiment],
        }
    }

    /// Parse the experiment-normalization switch (`yes`, `xt`, `no`).
    pub fn from_experiment_switch(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "yes" | "default" => Ok(Self::PerExperimentDefault),
            "xt" | "xtract" => Ok(Self::PerExperimentXtractCompatible),
            "no" | "none" => Ok(Self::None),
            other => Err(QuantError::InvalidParameter(format!(
                "Unknown experiment normalization '{}', expected yes, xt or no",
                other
            ))),
        }
    }
}

/// What a normalization pass did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizationReport {
    pub mode: NormalizationMode,
    /// Applied factor per group key.
    pub factors: BTreeMap<GroupKey, f64>,
    /// Groups whose factor was undefined.
    pub undefined_groups: Vec<GroupKey>,
    /// Replicate values dropped because their group had no factor.
    pub excluded_values: usize,
}

impl NormalizationReport {
    fn passthrough(mode: NormalizationMode) -> Self {
        Self {
            mode,
            factors: BTreeMap::new(),
            undefined_groups: Vec::new(),
            excluded_values: 0,
        }
    }
}

/// Normalized replicate values plus the report.
#[derive(Debug, Clone)]
pub struct Normalized {
    pub values: Vec<ReplicateValue>,
    pub report: NormalizationReport,
}

/// Normalize replicate values with one mode.
pub fn normalize(values: Vec<ReplicateValue>, mode: NormalizationMode) -> Normalized {
    let factors = match mode {
        NormalizationMode::None => {
            return Normalized {
                values,
                report: NormalizationReport::passthrough(mode),
            }
        }
        NormalizationMode::PerReplicateMean => replicate_factors(&values),
        NormalizationMode::PerExperimentDefault => experiment_factors_default(&values),
        NormalizationMode::PerExperimentXtractCompatible => experiment_factors_xtract(&values),
    };
    apply_factors(values, mode, factors)
}

/// Scale each value by its group's factor, dropping values of groups
/// whose factor is `None`.
fn apply_factors(
    values: Vec<ReplicateValue>,
    mode: NormalizationMode,
    factors: BTreeMap<GroupKey, Option<f64>>,
) -> Normalized {
    let columns = mode.group_columns();
    let mut report = NormalizationReport::passthrough(mode);
    for (key, factor) in &factors {
        match factor {
            Some(f) => {
                report.factors.insert(key.clone(), *f);
            }
            None => report.undefined_groups.push(key.clone()),
        }
    }

    let mut kept = Vec::with_capacity(values.len());
    for mut v in values {
        let factor = v
            .group_key(columns)
            .and_then(|key| report.factors.get(&key).copied());
        match factor {
            Some(f) => {
                v.value *= f;
                kept.push(v);
            }
            None => report.excluded_values += 1,
        }
    }

    if !report.undefined_groups.is_empty() {
        tracing::warn!(
            ?mode,
            groups = report.undefined_groups.len(),
            excluded = report.excluded_values,
            "normalization factor undefined; excluded affected values"
        );
    }
    tracing::debug!(?mode, factors = report.factors.len(), "normalized replicate values");

    Normalized { values: kept, report }
}

/// Sum of finite values, or `None` if no value is finite and non-zero.
pub(crate) fn valid_total<'a>(values: impl Iterator<Item = &'a ReplicateValue>) -> Option<f64> {
    let mut sum = 0.0;
    let mut any_nonzero = false;
    for v in values.filter(|v| v.is_valid()) {
        sum += v.value;
        any_nonzero |= v.value != 0.0;
    }
    if any_nonzero && sum > 0.0 {
        Some(sum)
    } else {
        None
    }
}
