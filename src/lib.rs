//! Cross-link MS Quantification Library
//!
//! This library turns raw cross-link mass spectrometry abundance tables into
//! per-experiment differential results, and reconciles two such result
//! tables to validate one quantification pipeline against another.
//!
//! # Overview
//!
//! The library is organized into composable modules:
//!
//! - **data**: Core data structures (measurements, results, column schema)
//! - **aggregate**: Two-phase grouping and sum/mean aggregation
//! - **filter**: Measurement filters (whitelist, link type, experiments) and
//!   violation filters on results
//! - **impute**: Missing abundance imputation
//! - **normalize**: Replicate and experiment normalization
//! - **test**: Hypothesis testing (pooled and Welch t-test)
//! - **correct**: Multiple testing correction (Benjamini-Hochberg/Yekutieli)
//! - **differential**: Log2 ratios and p-values against a reference experiment
//! - **reconcile**: Staged agreement checks between two result tables
//! - **pipeline**: Pipeline composition and execution
//!
//! # Example
//!
//! ```no_run
//! use crosslink_quant::prelude::*;
//!
//! let config = QuantConfig::default();
//! let table = MeasurementTable::from_csv("details.csv", &config.schema, config.level, &config.missing_token).unwrap();
//!
//! let out = Pipeline::from_config(&config).reference("E0").run(&table).unwrap();
//! out.results.to_csv("quant.csv", &config.schema).unwrap();
//! ```

pub mod aggregate;
pub mod correct;
pub mod data;
pub mod differential;
pub mod error;
pub mod filter;
pub mod impute;
pub mod normalize;
pub mod pipeline;
pub mod reconcile;
pub mod test;

/// Convenient re-exports for common usage.
pub mod prelude {
    pub use crate::aggregate::{
        aggregate, group_rows, replicate_values, select_groups, AggregateOp, AggregatedGroup, GroupColumn,
        GroupKey, KeyPart, Keyed, ReplicateValue,
    };
    pub use crate::correct::{correct_bh, correct_by, CorrectionMethod};
    pub use crate::data::{
        detect_input, experiments_in_order, DifferentialResult, DifferentialResultSet, ExperimentMean, IdLevel,
        InputKind, LinkType, MeasurementRow, MeasurementTable, ResultSummary, Schema, WeightType, Whitelist,
    };
    pub use crate::differential::{differential, log2_ratio, DifferentialConfig};
    pub use crate::error::{QuantError, Result};
    pub use crate::filter::{
        filter_experiments, filter_link_type, filter_violations, filter_whitelist, ViolationIndex, ViolationMode,
        ViolationReport,
    };
    pub use crate::impute::{impute, ImputeReport, ImputeStrategy};
    pub use crate::normalize::{normalize, NormalizationMode, NormalizationReport, Normalized};
    pub use crate::pipeline::{run_quantification, Pipeline, PipelineReport, PipelineStep, QuantConfig, Quantification};
    pub use crate::reconcile::{reconcile, round_sig, Reconciliation, Stage, StageReport, DEFAULT_SIG_DIGITS};
    pub use crate::test::{t_test, TTestResult, VarianceModel};
}
