//! Pipeline runner for composing and executing quantification steps.

use crate::aggregate::{replicate_values, ReplicateValue};
use crate::correct::CorrectionMethod;
use crate::data::{experiments_in_order, DifferentialResultSet, LinkType, MeasurementRow, MeasurementTable, Whitelist};
use crate::differential::{differential, DifferentialConfig};
use crate::error::{QuantError, Result};
use crate::filter::{
    filter_experiments, filter_link_type, filter_violations, filter_whitelist, ViolationIndex, ViolationMode,
    ViolationReport,
};
use crate::impute::{impute, ImputeReport, ImputeStrategy};
use crate::normalize::{normalize, NormalizationMode, NormalizationReport};
use crate::pipeline::QuantConfig;
use crate::test::VarianceModel;
use serde::{Deserialize, Serialize};

/// A step in the quantification pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PipelineStep {
    // === Measurement Filtering ===
    /// Keep whitelisted identifiers.
    FilterWhitelist,
    /// Keep one link type.
    FilterLinkType { link_type: LinkType },
    /// Keep selected experiments and the reference.
    SelectExperiments { experiments: Vec<String> },

    // === Missing Values ===
    /// Replace missing abundances.
    Impute { strategy: ImputeStrategy },

    // === Aggregation ===
    /// Sum abundances per replicate channel.
    Aggregate,

    // === Normalization ===
    Normalize { mode: NormalizationMode },

    // === Statistics ===
    /// Log2 ratios, p-values and per-experiment FDR.
    Differential,

    // === Result Filtering ===
    /// Remove results failing consistency checks.
    FilterViolations { modes: Vec<ViolationMode>, threshold: f64 },
    /// Remove results with undefined log2 ratio.
    DropUndefined,
}

/// What happened during a run.
#[derive(Debug, Clone, Default)]
pub struct PipelineReport {
    /// Reference experiment actually used.
    pub reference: String,
    pub input_rows: usize,
    /// Measurement rows left after the measurement filters.
    pub filtered_rows: usize,
    pub impute: Option<ImputeReport>,
    pub normalization: Vec<NormalizationReport>,
    pub violations: Option<ViolationReport>,
    /// Result rows removed for an undefined log2 ratio.
    pub undefined_dropped: usize,
}

/// Results of a run together with its report.
#[derive(Debug, Clone)]
pub struct Quantification {
    pub results: DifferentialResultSet,
    pub report: PipelineReport,
}

/// Builder for constructing and running quantification pipelines.
#[derive(Debug, Clone)]
pub struct Pipeline {
    steps: Vec<PipelineStep>,
    reference: Option<String>,
    whitelist: Option<Whitelist>,
    variance: VarianceModel,
    include_technical: bool,
    correction: CorrectionMethod,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipeline {
    /// Create a new empty pipeline.
    pub fn new() -> Self {
        Self {
            steps: Vec::new(),
            reference: None,
            whitelist: None,
            variance: VarianceModel::default(),
            include_technical: false,
            correction: CorrectionMethod::default(),
        }
    }

    /// Create the standard step sequence for a config.
    ///
    /// Filters, imputation, aggregation, normalization passes, statistics,
    /// violation filtering and finally removal of undefined ratios.
    pub fn from_config(config: &QuantConfig) -> Self {
        let mut pipeline = Self::new()
            .variance(config.variance)
            .include_technical(config.include_technical)
            .correction(config.correction);
        if let Some(reference) = &config.reference_experiment {
            pipeline = pipeline.reference(reference);
        }
        if let Some(link_type) = config.link_type {
            pipeline = pipeline.filter_link_type(link_type);
        }
        if let Some(experiments) = &config.experiments {
            pipeline = pipeline.select_experiments(experiments);
        }
        if let Some(strategy) = config.impute {
            pipeline = pipeline.impute(strategy);
        }
        pipeline = pipeline.aggregate();
        for &mode in &config.normalization {
            pipeline = pipeline.normalize(mode);
        }
        pipeline = pipeline
            .differential()
            .filter_violations(&config.violations, config.light_heavy_threshold);
        if !config.keep_undefined {
            pipeline = pipeline.drop_undefined();
        }
        pipeline
    }

    /// Steps in execution order.
    pub fn steps(&self) -> &[PipelineStep] {
        &self.steps
    }

    /// Set the reference experiment.
    pub fn reference(mut self, reference: &str) -> Self {
        self.reference = Some(reference.to_string());
        self
    }

    /// Set the variance model of the t-test.
    pub fn variance(mut self, variance: VarianceModel) -> Self {
        self.variance = variance;
        self
    }

    /// Use technical replicates as separate significance samples.
    pub fn include_technical(mut self, include: bool) -> Self {
        self.include_technical = include;
        self
    }

    /// Set the FDR procedure.
    pub fn correction(mut self, correction: CorrectionMethod) -> Self {
        self.correction = correction;
        self
    }

    /// Restrict to whitelisted identifiers. The filter runs first.
    pub fn whitelist(mut self, whitelist: Whitelist) -> Self {
        self.whitelist = Some(whitelist);
        self.steps.insert(0, PipelineStep::FilterWhitelist);
        self
    }

    /// Keep one link type.
    pub fn filter_link_type(mut self, link_type: LinkType) -> Self {
        self.steps.push(PipelineStep::FilterLinkType { link_type });
        self
    }

    /// Keep selected experiments and the reference.
    pub fn select_experiments(mut self, experiments: &[String]) -> Self {
        self.steps.push(PipelineStep::SelectExperiments {
            experiments: experiments.to_vec(),
        });
        self
    }

    /// Replace missing abundances.
    pub fn impute(mut self, strategy: ImputeStrategy) -> Self {
        self.steps.push(PipelineStep::Impute { strategy });
        self
    }

    /// Sum abundances per replicate channel.
    pub fn aggregate(mut self) -> Self {
        self.steps.push(PipelineStep::Aggregate);
        self
    }

    /// Add a normalization pass.
    pub fn normalize(mut self, mode: NormalizationMode) -> Self {
        self.steps.push(PipelineStep::Normalize { mode });
        self
    }

    /// Compute differential statistics.
    pub fn differential(mut self) -> Self {
        self.steps.push(PipelineStep::Differential);
        self
    }

    /// Remove results failing any of `modes`.
    pub fn filter_violations(mut self, modes: &[ViolationMode], threshold: f64) -> Self {
        self.steps.push(PipelineStep::FilterViolations {
            modes: modes.to_vec(),
            threshold,
        });
        self
    }

    /// Remove results with undefined log2 ratio.
    pub fn drop_undefined(mut self) -> Self {
        self.steps.push(PipelineStep::DropUndefined);
        self
    }

    /// Run the pipeline.
    pub fn run(&self, table: &MeasurementTable) -> Result<Quantification> {
        let reference = match &self.reference {
            Some(r) => r.clone(),
            None => experiments_in_order(table.rows())
                .into_iter()
                .next()
                .ok_or_else(|| QuantError::EmptyData("No experiments in input".to_string()))?,
        };
        tracing::info!(reference = %reference, rows = table.len(), steps = self.steps.len(), "starting quantification");

        let mut state = PipelineState::new(table.clone(), reference);
        for (i, step) in self.steps.iter().enumerate() {
            state = state
                .apply(step, self)
                .map_err(|e| QuantError::Pipeline(format!("Step {} ({:?}) failed: {}", i + 1, step, e)))?;
        }

        state.finalize()
    }

    fn differential_config(&self, reference: &str) -> DifferentialConfig {
        DifferentialConfig {
            variance: self.variance,
            include_technical: self.include_technical,
            correction: self.correction,
            keep_incomplete: self.steps.iter().any(|s| matches!(s, PipelineStep::Impute { .. })),
            ..DifferentialConfig::new(reference)
        }
    }
}

/// Internal state during pipeline execution.
struct PipelineState {
    table: MeasurementTable,
    values: Option<Vec<ReplicateValue>>,
    results: Option<DifferentialResultSet>,
    report: PipelineReport,
}

impl PipelineState {
    fn new(table: MeasurementTable, reference: String) -> Self {
        let report = PipelineReport {
            reference,
            input_rows: table.len(),
            filtered_rows: table.len(),
            ..Default::default()
        };
        Self {
            table,
            values: None,
            results: None,
            report,
        }
    }

    fn rows_mut(&mut self, step: &str) -> Result<Vec<MeasurementRow>> {
        if self.values.is_some() {
            return Err(QuantError::Pipeline(format!("{} must run before aggregation", step)));
        }
        Ok(self.table.rows().to_vec())
    }

    fn apply(mut self, step: &PipelineStep, pipeline: &Pipeline) -> Result<Self> {
        match step {
            // === Measurement Filtering ===
            PipelineStep::FilterWhitelist => {
                let whitelist = pipeline
                    .whitelist
                    .as_ref()
                    .ok_or_else(|| QuantError::Pipeline("No whitelist supplied".to_string()))?;
                self.table = filter_whitelist(&self.table, whitelist)?;
            }
            PipelineStep::FilterLinkType { link_type } => {
                self.table = filter_link_type(&self.table, *link_type)?;
            }
            PipelineStep::SelectExperiments { experiments } => {
                self.table = filter_experiments(&self.table, experiments, &self.report.reference)?;
            }

            // === Missing Values ===
            PipelineStep::Impute { strategy } => {
                let mut rows = self.rows_mut("Imputation")?;
                self.report.impute = Some(impute(&mut rows, *strategy)?);
                self.table = MeasurementTable::new(self.table.level(), rows);
            }

            // === Aggregation ===
            PipelineStep::Aggregate => {
                self.report.filtered_rows = self.table.len();
                self.values = Some(replicate_values(self.table.rows()));
            }

            // === Normalization ===
            PipelineStep::Normalize { mode } => {
                let values = self
                    .values
                    .take()
                    .ok_or_else(|| QuantError::Pipeline("Must aggregate before normalization".to_string()))?;
                let normalized = normalize(values, *mode);
                self.values = Some(normalized.values);
                self.report.normalization.push(normalized.report);
            }

            // === Statistics ===
            PipelineStep::Differential => {
                let values = self.values.as_ref().ok_or_else(|| {
                    QuantError::Pipeline("Must aggregate before differential statistics".to_string())
                })?;
                let config = pipeline.differential_config(&self.report.reference);
                self.results = Some(differential(values, &config)?);
            }

            // === Result Filtering ===
            PipelineStep::FilterViolations { modes, threshold } => {
                let results = self.results.take().ok_or_else(|| {
                    QuantError::Pipeline("Must compute statistics before violation filtering".to_string())
                })?;
                let values = self.values.as_deref().unwrap_or(&[]);
                let index = ViolationIndex::build(self.table.rows(), values, *threshold);
                let (kept, report) = filter_violations(results, &index, modes);
                self.results = Some(kept);
                self.report.violations = Some(report);
            }
            PipelineStep::DropUndefined => {
                let results = self.results.take().ok_or_else(|| {
                    QuantError::Pipeline("Must compute statistics before dropping undefined ratios".to_string())
                })?;
                let before = results.len();
                let kept: Vec<_> = results.results.into_iter().filter(|r| r.has_ratio()).collect();
                self.report.undefined_dropped = before - kept.len();
                if self.report.undefined_dropped > 0 {
                    tracing::info!(dropped = self.report.undefined_dropped, "dropped results with undefined ratio");
                }
                self.results = Some(DifferentialResultSet::new(kept));
            }
        }
        Ok(self)
    }

    fn finalize(self) -> Result<Quantification> {
        let mut results = self
            .results
            .ok_or_else(|| QuantError::Pipeline("Pipeline must include a differential step".to_string()))?;
        results.sort();
        let summary = results.summary();
        tracing::info!(
            results = summary.total,
            significant_05 = summary.significant_05,
            "quantification finished"
        );
        Ok(Quantification {
            results,
            report: self.report,
        })
    }
}

/// Run the standard pipeline for `config` on `table`.
pub fn run_quantification(
    table: &MeasurementTable,
    config: &QuantConfig,
    whitelist: Option<Whitelist>,
) -> Result<Quantification> {
    let mut pipeline = Pipeline::from_config(config);
    if let Some(whitelist) = whitelist {
        pipeline = pipeline.whitelist(whitelist);
    }
    pipeline.run(table)
}
