//! Missing-value imputation for measurement rows.
//!
//! Imputation runs before aggregation so that identifiers with many missing
//! channels still reach the ratio and significance steps. Only positive
//! observed abundances count as observations; a zero is never used as a
//! replacement since it would make log ratios infinite.

use crate::data::MeasurementRow;
use crate::error::{QuantError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How a missing abundance is estimated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ImputeStrategy {
    /// Minimum observed abundance of the same identifier in the same
    /// experiment, falling back to the experiment minimum.
    GroupMinimum,
    /// Minimum observed abundance in the same experiment.
    #[default]
    ExperimentMinimum,
    /// A fixed floor value.
    Floor { value: f64 },
}

impl std::str::FromStr for ImputeStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "group_min" | "group-min" | "group_minimum" => Ok(Self::GroupMinimum),
            "exp_min" | "exp-min" | "experiment_minimum" => Ok(Self::ExperimentMinimum),
            other => other
                .parse::<f64>()
                .map(|value| Self::Floor { value })
                .map_err(|_| format!("unknown imputation strategy '{}'", other)),
        }
    }
}

/// Counts from an imputation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImputeReport {
    /// Rows whose missing abundance was replaced.
    pub n_imputed: usize,
    /// Missing rows left as-is because no estimate existed.
    pub n_unresolved: usize,
}

/// Replace missing abundances using `strategy`.
pub fn impute(rows: &mut [MeasurementRow], strategy: ImputeStrategy) -> Result<ImputeReport> {
    if let ImputeStrategy::Floor { value } = strategy {
        if !(value.is_finite() && value > 0.0) {
            return Err(QuantError::InvalidParameter(
                "Imputation floor must be positive".to_string(),
            ));
        }
    }

    let mut exp_min: HashMap<String, f64> = HashMap::new();
    let mut group_min: HashMap<(String, String), f64> = HashMap::new();
    for r in rows.iter().filter(|r| r.abundance.is_finite() && r.abundance > 0.0) {
        let e = exp_min.entry(r.experiment.clone()).or_insert(f64::INFINITY);
        *e = e.min(r.abundance);
        let g = group_min
            .entry((r.identifier.clone(), r.experiment.clone()))
            .or_insert(f64::INFINITY);
        *g = g.min(r.abundance);
    }

    let mut report = ImputeReport::default();
    for r in rows.iter_mut().filter(|r| r.is_missing()) {
        let estimate = match strategy {
            ImputeStrategy::Floor { value } => Some(value),
            ImputeStrategy::ExperimentMinimum => exp_min.get(&r.experiment).copied(),
            ImputeStrategy::GroupMinimum => group_min
                .get(&(r.identifier.clone(), r.experiment.clone()))
                .or_else(|| exp_min.get(&r.experiment))
                .copied(),
        };
        match estimate {
            Some(v) => {
                r.abundance = v;
                report.n_imputed += 1;
            }
            None => report.n_unresolved += 1,
        }
    }

    tracing::info!(
        imputed = report.n_imputed,
        unresolved = report.n_unresolved,
        ?strategy,
        "imputed missing abundances"
    );
    Ok(report)
}
