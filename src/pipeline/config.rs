//! Serializable run configuration.

use crate::correct::CorrectionMethod;
use crate::data::{IdLevel, LinkType, Schema};
use crate::error::{QuantError, Result};
use crate::filter::{ViolationMode, DEFAULT_LIGHT_HEAVY_THRESHOLD};
use crate::impute::ImputeStrategy;
use crate::normalize::NormalizationMode;
use crate::test::VarianceModel;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Everything a quantification run needs besides its input tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuantConfig {
    /// Column names of input and output tables.
    pub schema: Schema,
    /// Identifier granularity.
    pub level: IdLevel,
    /// Keep only this link type.
    pub link_type: Option<LinkType>,
    /// Keep only these experiments (plus the reference).
    pub experiments: Option<Vec<String>>,
    /// Reference experiment; the first experiment of the input when unset.
    pub reference_experiment: Option<String>,
    /// Missing-value imputation; disabled when unset.
    pub impute: Option<ImputeStrategy>,
    /// Use technical replicates as separate significance samples.
    pub include_technical: bool,
    /// Normalization passes, applied in order.
    pub normalization: Vec<NormalizationMode>,
    /// Violation checks whose failures are removed.
    pub violations: Vec<ViolationMode>,
    /// Absolute light/heavy log2 ratio band.
    pub light_heavy_threshold: f64,
    pub variance: VarianceModel,
    pub correction: CorrectionMethod,
    /// Cell value read as a missing measurement.
    pub missing_token: String,
    /// Keep result rows whose log2 ratio is undefined.
    pub keep_undefined: bool,
}

impl Default for QuantConfig {
    fn default() -> Self {
        Self {
            schema: Schema::default(),
            level: IdLevel::default(),
            link_type: None,
            experiments: None,
            reference_experiment: None,
            impute: None,
            include_technical: false,
            normalization: vec![NormalizationMode::PerExperimentDefault],
            violations: vec![ViolationMode::LightHeavyRatio, ViolationMode::PipelineType],
            light_heavy_threshold: DEFAULT_LIGHT_HEAVY_THRESHOLD,
            variance: VarianceModel::default(),
            correction: CorrectionMethod::default(),
            missing_token: "-".to_string(),
            keep_undefined: false,
        }
    }
}

impl QuantConfig {
    /// Load from YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Save to YAML string.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(QuantError::from)
    }

    /// Load from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_yaml(&std::fs::read_to_string(path)?)
    }

    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if !(self.light_heavy_threshold.is_finite() && self.light_heavy_threshold >= 0.0) {
            return Err(QuantError::InvalidParameter(format!(
                "light_heavy_threshold must be a non-negative number, got {}",
                self.light_heavy_threshold
            )));
        }
        if let Some(ImputeStrategy::Floor { value }) = self.impute {
            if !(value.is_finite() && value > 0.0) {
                return Err(QuantError::InvalidParameter("Imputation floor must be positive".to_string()));
            }
        }
        if self.missing_token.is_empty() {
            return Err(QuantError::InvalidParameter("missing_token must not be empty".to_string()));
        }
        Ok(())
    }
}
