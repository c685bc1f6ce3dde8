//! Removal of identifier/experiment groups that fail consistency checks.
//!
//! Flagging is separated from filtering: [`ViolationIndex`] records which
//! (identifier, experiment) groups fail each check, and
//! [`filter_violations`] drops result rows touching a flagged group for the
//! selected modes. A flagged reference group removes every comparison of
//! that identifier.

use crate::aggregate::{group_rows, select_groups, GroupColumn, GroupKey, ReplicateValue};
use crate::data::{DifferentialResultSet, MeasurementRow, WeightType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Default absolute light/heavy log2 ratio beyond which a group is flagged.
pub const DEFAULT_LIGHT_HEAVY_THRESHOLD: f64 = 1.0;

/// A consistency check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationMode {
    /// Light and heavy channels disagree beyond the configured band.
    LightHeavyRatio,
    /// The upstream pipeline annotated a violation type.
    PipelineType,
    /// No filtering.
    None,
}

impl std::str::FromStr for ViolationMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lh" | "light_heavy" | "light_heavy_ratio" => Ok(Self::LightHeavyRatio),
            "xt" | "pipeline" | "pipeline_type" => Ok(Self::PipelineType),
            "none" => Ok(Self::None),
            other => Err(format!("unknown violation filter '{}'", other)),
        }
    }
}

type PairKey = (String, String);

/// Flagged (identifier, experiment) groups per check.
#[derive(Debug, Clone, Default)]
pub struct ViolationIndex {
    light_heavy: BTreeSet<PairKey>,
    pipeline_type: BTreeSet<PairKey>,
}

impl ViolationIndex {
    /// Evaluate all checks.
    pub fn build(rows: &[MeasurementRow], values: &[ReplicateValue], light_heavy_threshold: f64) -> Self {
        Self {
            light_heavy: light_heavy_violations(values, light_heavy_threshold),
            pipeline_type: pipeline_type_violations(rows),
        }
    }

    /// Groups flagged by `mode`.
    pub fn flagged(&self, mode: ViolationMode) -> Option<&BTreeSet<PairKey>> {
        match mode {
            ViolationMode::LightHeavyRatio => Some(&self.light_heavy),
            ViolationMode::PipelineType => Some(&self.pipeline_type),
            ViolationMode::None => None,
        }
    }

    fn is_flagged(&self, mode: ViolationMode, id: &str, exp: &str) -> bool {
        self.flagged(mode)
            .map(|set| set.contains(&(id.to_string(), exp.to_string())))
            .unwrap_or(false)
    }
}

/// Rows removed per check. A row failing several checks counts once in
/// `removed` and once per failing check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViolationReport {
    pub removed: usize,
    pub light_heavy: usize,
    pub pipeline_type: usize,
}

/// Groups whose light/heavy log2 ratio lies outside `[-threshold, threshold]`.
///
/// Only groups with a positive mean in both channels are evaluated.
pub fn light_heavy_violations(values: &[ReplicateValue], threshold: f64) -> BTreeSet<PairKey> {
    let groups = group_rows(values, &[GroupColumn::Identifier, GroupColumn::Experiment]);
    let flagged = select_groups(&groups, |members| {
        let channel_mean = |w: WeightType| {
            let v: Vec<f64> = members
                .iter()
                .filter(|m| m.weight == Some(w) && m.is_valid())
                .map(|m| m.value)
                .collect();
            (!v.is_empty()).then(|| v.iter().sum::<f64>() / v.len() as f64)
        };
        match (channel_mean(WeightType::Light), channel_mean(WeightType::Heavy)) {
            (Some(l), Some(h)) if l > 0.0 && h > 0.0 => (l / h).log2().abs() > threshold,
            _ => false,
        }
    });
    to_pairs(flagged)
}

/// Groups with at least one row carrying a violation annotation.
pub fn pipeline_type_violations(rows: &[MeasurementRow]) -> BTreeSet<PairKey> {
    let groups = group_rows(rows, &[GroupColumn::Identifier, GroupColumn::Experiment]);
    let flagged = select_groups(&groups, |members| {
        members
            .iter()
            .any(|r| r.violation.as_deref().is_some_and(|v| !v.is_empty()))
    });
    to_pairs(flagged)
}

fn to_pairs(keys: BTreeSet<GroupKey>) -> BTreeSet<PairKey> {
    keys.into_iter()
        .filter_map(|key| match key.as_slice() {
            [id, exp] => Some((id.to_string(), exp.to_string())),
            _ => None,
        })
        .collect()
}

/// Drop result rows whose group, or whose identifier's reference group,
/// is flagged by any of `modes`.
pub fn filter_violations(
    results: DifferentialResultSet,
    index: &ViolationIndex,
    modes: &[ViolationMode],
) -> (DifferentialResultSet, ViolationReport) {
    let mut report = ViolationReport::default();
    let kept = results
        .results
        .into_iter()
        .filter(|r| {
            let fails = |mode: ViolationMode| {
                modes.contains(&mode)
                    && (index.is_flagged(mode, &r.identifier, &r.experiment)
                        || index.is_flagged(mode, &r.identifier, &r.reference))
            };
            let lh = fails(ViolationMode::LightHeavyRatio);
            let xt = fails(ViolationMode::PipelineType);
            report.light_heavy += lh as usize;
            report.pipeline_type += xt as usize;
            report.removed += (lh || xt) as usize;
            !(lh || xt)
        })
        .collect();

    tracing::info!(
        removed = report.removed,
        light_heavy = report.light_heavy,
        pipeline_type = report.pipeline_type,
        "applied violation filters"
    );
    (DifferentialResultSet::new(kept), report)
}
