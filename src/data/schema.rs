//! Column registry for measurement and result tables.
//!
//! Every component receives a `&Schema` instead of hard-coding column names,
//! so the same engine can run against differently labelled exports.

use serde::{Deserialize, Serialize};

/// Identifier granularity used as the grouping key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdLevel {
    /// Fine-grained peptide-level identifier.
    Uid,
    /// Coarse cross-link-level identifier.
    #[default]
    Uxid,
}

impl IdLevel {
    /// Get the descriptive name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Uid => "uID",
            Self::Uxid => "uxID",
        }
    }
}

impl std::str::FromStr for IdLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "uid" => Ok(Self::Uid),
            "uxid" => Ok(Self::Uxid),
            other => Err(format!("unknown identifier level '{}'", other)),
        }
    }
}

/// Column names of raw measurement tables and differential result tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Schema {
    // === Raw measurement columns ===
    /// Fine identifier column.
    pub uid: String,
    /// Coarse identifier column.
    pub uxid: String,
    /// Experiment label.
    pub experiment: String,
    /// Biological replicate ordinal.
    pub bio_rep: String,
    /// Technical replicate ordinal.
    pub tech_rep: String,
    /// Isotope channel (`light`/`heavy`).
    pub weight_type: String,
    /// Abundance (MS1 area).
    pub abundance: String,
    /// Link type (`monolink`/`xlink`/`intralink`).
    pub link_type: String,
    /// Upstream violation annotation.
    pub violation: String,

    // === Result columns ===
    /// Identifier column of result tables.
    pub result_id: String,
    /// Experiment column of result tables.
    pub result_experiment: String,
    /// Reference experiment column.
    pub reference: String,
    /// Log2 ratio column.
    pub log2_ratio: String,
    /// Raw p-value column.
    pub p_value: String,
    /// Corrected p-value column.
    pub fdr: String,
    /// Provenance column added during reconciliation.
    pub origin: String,
}

impl Default for Schema {
    fn default() -> Self {
        Self {
            uid: "b_peptide_uID".to_string(),
            uxid: "b_peptide_uxID".to_string(),
            experiment: "exp_name".to_string(),
            bio_rep: "exp_biol_rep".to_string(),
            tech_rep: "exp_tech_rep".to_string(),
            weight_type: "weight_type".to_string(),
            abundance: "ms1_area_sum".to_string(),
            link_type: "link_type".to_string(),
            violation: "violation".to_string(),
            result_id: "uxID".to_string(),
            result_experiment: "experiment".to_string(),
            reference: "ref_experiment".to_string(),
            log2_ratio: "log2ratio".to_string(),
            p_value: "pvalue".to_string(),
            fdr: "fdr".to_string(),
            origin: "origin".to_string(),
        }
    }
}

impl Schema {
    /// Raw identifier column for a grouping level.
    pub fn id_column(&self, level: IdLevel) -> &str {
        match level {
            IdLevel::Uid => &self.uid,
            IdLevel::Uxid => &self.uxid,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_column_by_level() {
        let schema = Schema::default();
        assert_eq!(schema.id_column(IdLevel::Uid), "b_peptide_uID");
        assert_eq!(schema.id_column(IdLevel::Uxid), "b_peptide_uxID");
    }

    #[test]
    fn test_level_parse() {
        assert_eq!("uxID".parse::<IdLevel>().unwrap(), IdLevel::Uxid);
        assert_eq!("uid".parse::<IdLevel>().unwrap(), IdLevel::Uid);
        assert!("protein".parse::<IdLevel>().is_err());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let schema: Schema = serde_yaml::from_str("abundance: area\n").unwrap();
        assert_eq!(schema.abundance, "area");
        assert_eq!(schema.experiment, "exp_name");
    }
}
