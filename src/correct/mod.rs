//! Multiple testing correction.

pub mod bh;

pub use bh::{correct_bh, correct_by};

use serde::{Deserialize, Serialize};

/// Rank-based FDR procedure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectionMethod {
    #[default]
    BenjaminiHochberg,
    BenjaminiYekutieli,
}

impl CorrectionMethod {
    /// Adjust a batch of p-values that were tested together.
    pub fn apply(&self, p_values: &[f64]) -> Vec<f64> {
        match self {
            Self::BenjaminiHochberg => correct_bh(p_values),
            Self::BenjaminiYekutieli => correct_by(p_values),
        }
    }
}

impl std::str::FromStr for CorrectionMethod {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bh" | "benjamini_hochberg" => Ok(Self::BenjaminiHochberg),
            "by" | "benjamini_yekutieli" => Ok(Self::BenjaminiYekutieli),
            other => Err(format!("unknown correction method '{}'", other)),
        }
    }
}
