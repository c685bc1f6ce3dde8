//! xlq - Cross-link quantification CLI
//!
//! Command-line interface for quantifying raw cross-link tables and for
//! reconciling the results against another pipeline's output.

use clap::{Args, Parser, Subcommand};
use crosslink_quant::data::{
    detect_input, DifferentialResultSet, ExperimentMean, IdLevel, InputKind, LinkType, MeasurementTable, Whitelist,
};
use crosslink_quant::error::{QuantError, Result};
use crosslink_quant::filter::ViolationMode;
use crosslink_quant::impute::ImputeStrategy;
use crosslink_quant::normalize::NormalizationMode;
use crosslink_quant::pipeline::{run_quantification, QuantConfig, Quantification};
use crosslink_quant::reconcile::{reconcile, Stage, DEFAULT_SIG_DIGITS};
use crosslink_quant::test::VarianceModel;
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Origin label of rows computed here.
const COMPUTED_ORIGIN: &str = "bag";
/// Origin label of rows read from a reference result table.
const REFERENCE_ORIGIN: &str = "analyzer_quant";

/// Cross-link MS quantification
#[derive(Parser)]
#[command(name = "xlq")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Options shared by quantify and compare. Flags override the config file.
#[derive(Args, Debug, Clone)]
struct QuantArgs {
    /// Path to a YAML configuration (see `xlq example`)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Keep only one link type: monolink, xlink or intralink
    #[arg(short = 'f', long = "filter")]
    link_type: Option<LinkType>,

    /// Experiments to keep; the reference is always kept
    #[arg(short = 'e', long, num_args = 1..)]
    experiments: Option<Vec<String>>,

    /// Impute missing values (experiment minimum unless --impute-strategy is given)
    #[arg(short = 'i', long)]
    impute: bool,

    /// Imputation estimator: group_min, exp_min or a floor value; implies --impute
    #[arg(long = "impute-strategy")]
    impute_strategy: Option<ImputeStrategy>,

    /// Include technical replicates in the p-value calculation
    #[arg(short = 't', long = "incl-tech")]
    incl_tech: bool,

    /// Normalize replicates to their mean experimental area
    #[arg(long = "norm-replicates")]
    norm_replicates: bool,

    /// Experiment normalization: yes (default method), xt (analyzer method) or no
    #[arg(long = "norm-experiments")]
    norm_experiments: Option<String>,

    /// Violation filters: lh (light/heavy ratio), xt (pipeline type), none
    #[arg(short = 'v', long, num_args = 1..)]
    violations: Option<Vec<ViolationMode>>,

    /// Table of allowed identifiers
    #[arg(short = 'w', long)]
    whitelist: Option<PathBuf>,

    /// Reference experiment (default: first experiment in the input)
    #[arg(short = 'r', long)]
    reference: Option<String>,

    /// Variance model of the t-test: pooled or welch
    #[arg(long)]
    variance: Option<VarianceModel>,

    /// Identifier level: uxid or uid
    #[arg(long)]
    level: Option<IdLevel>,
}

#[derive(Subcommand)]
enum Commands {
    /// Quantify a raw measurement table into a result table
    Quantify {
        /// Raw measurement table (.csv, or tab-delimited .xls)
        input: PathBuf,

        /// Output path for results CSV
        #[arg(short, long, default_value = "quant.csv")]
        output: PathBuf,

        /// Format of the per-experiment summary: text or json
        #[arg(long, default_value = "text")]
        format: String,

        #[command(flatten)]
        args: QuantArgs,
    },

    /// Quantify raw tables and reconcile against a reference result table
    Compare {
        /// Raw measurement tables and one or more reference result tables
        #[arg(required = true, num_args = 2..)]
        inputs: Vec<PathBuf>,

        /// Base name of the stage tables
        #[arg(short, long, default_value = "comparison")]
        output: PathBuf,

        /// Significant figures compared
        #[arg(long, default_value_t = DEFAULT_SIG_DIGITS)]
        sig: usize,

        #[command(flatten)]
        args: QuantArgs,
    },

    /// Write a default configuration file
    Example {
        /// Output path for the YAML configuration
        #[arg(short, long, default_value = "quant.yaml")]
        output: PathBuf,
    },
}

fn configure_log() {
    let subscriber = tracing_subscriber::registry().with(
        fmt::layer().compact().with_writer(std::io::stderr).with_filter(
            EnvFilter::builder()
                .with_default_directive(tracing::Level::INFO.into())
                .from_env_lossy(),
        ),
    );
    subscriber.init();
}

fn main() {
    configure_log();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Quantify {
            input,
            output,
            format,
            args,
        } => cmd_quantify(&input, &output, &format, &args),

        Commands::Compare {
            inputs,
            output,
            sig,
            args,
        } => cmd_compare(&inputs, &output, sig, &args),

        Commands::Example { output } => cmd_example(&output),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Merge the config file and command-line flags.
fn load_config(args: &QuantArgs) -> Result<QuantConfig> {
    let mut config = match &args.config {
        Some(path) => {
            eprintln!("Loading configuration from {:?}...", path);
            QuantConfig::from_file(path)?
        }
        None => QuantConfig::default(),
    };

    if let Some(level) = args.level {
        config.level = level;
    }
    if let Some(link_type) = args.link_type {
        config.link_type = Some(link_type);
    }
    if let Some(experiments) = &args.experiments {
        config.experiments = Some(experiments.clone());
    }
    if let Some(strategy) = args.impute_strategy {
        config.impute = Some(strategy);
    } else if args.impute && config.impute.is_none() {
        config.impute = Some(ImputeStrategy::ExperimentMinimum);
    }
    if args.incl_tech {
        config.include_technical = true;
    }
    if let Some(violations) = &args.violations {
        config.violations = violations.clone();
    }
    if let Some(reference) = &args.reference {
        config.reference_experiment = Some(reference.clone());
    }
    if let Some(variance) = args.variance {
        config.variance = variance;
    }

    let mut modes = Vec::new();
    if args.norm_replicates || config.normalization.contains(&NormalizationMode::PerReplicateMean) {
        modes.push(NormalizationMode::PerReplicateMean);
    }
    match &args.norm_experiments {
        Some(switch) => match NormalizationMode::from_experiment_switch(switch)? {
            NormalizationMode::None => {}
            mode => modes.push(mode),
        },
        None => modes.extend(config.normalization.iter().copied().filter(|m| {
            matches!(
                m,
                NormalizationMode::PerExperimentDefault | NormalizationMode::PerExperimentXtractCompatible
            )
        })),
    }
    config.normalization = modes;

    config.validate()?;
    Ok(config)
}

fn load_whitelist(args: &QuantArgs, config: &QuantConfig) -> Result<Option<Whitelist>> {
    args.whitelist
        .as_ref()
        .map(|path| {
            eprintln!("Loading whitelist from {:?}...", path);
            Whitelist::from_csv(path, &config.schema, config.level)
        })
        .transpose()
}

fn quantify(table: &MeasurementTable, args: &QuantArgs, config: &QuantConfig) -> Result<Quantification> {
    let whitelist = load_whitelist(args, config)?;
    eprintln!(
        "Quantifying {} rows in {} experiments...",
        table.len(),
        table.experiments().len()
    );
    let out = run_quantification(table, config, whitelist)?;

    let report = &out.report;
    eprintln!("  Reference experiment: {}", report.reference);
    for norm in &report.normalization {
        if norm.excluded_values > 0 {
            eprintln!(
                "  {:?}: {} values excluded for undefined factors",
                norm.mode, norm.excluded_values
            );
        }
    }
    if let Some(v) = &report.violations {
        eprintln!(
            "  Violations removed: {} (light/heavy {}, pipeline type {})",
            v.removed, v.light_heavy, v.pipeline_type
        );
    }
    Ok(out)
}

fn print_experiment_means(means: &[ExperimentMean], format: &str) -> Result<()> {
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(means)?),
        _ => {
            println!("Mean values for experiments:");
            println!("{:<20} {:>8} {:>12} {:>12} {:>12}", "experiment", "n", "log2ratio", "pvalue", "fdr");
            for m in means {
                println!(
                    "{:<20} {:>8} {:>12.6} {:>12.6} {:>12.6}",
                    m.experiment, m.n, m.log2_ratio, m.p_value, m.fdr
                );
            }
        }
    }
    Ok(())
}

/// Quantify one raw table
fn cmd_quantify(input: &Path, output: &Path, format: &str, args: &QuantArgs) -> Result<()> {
    let config = load_config(args)?;

    eprintln!("Loading measurements from {:?}...", input);
    let table = MeasurementTable::from_csv(input, &config.schema, config.level, &config.missing_token)?;

    let out = quantify(&table, args, &config)?;
    print_experiment_means(&out.results.experiment_means(), format)?;

    out.results.to_csv(output, &config.schema)?;
    eprintln!("Results written to {:?}", output);
    eprint!("{}", out.results.summary());
    Ok(())
}

/// Quantify raw tables and reconcile with reference results
fn cmd_compare(inputs: &[PathBuf], output: &Path, sig: usize, args: &QuantArgs) -> Result<()> {
    let config = load_config(args)?;

    let mut raw_tables = Vec::new();
    let mut reference_rows = Vec::new();
    for path in inputs {
        match detect_input(path, &config.schema)? {
            InputKind::Measurements => {
                eprintln!("Loading measurements from {:?}...", path);
                raw_tables.push(MeasurementTable::from_csv(
                    path,
                    &config.schema,
                    config.level,
                    &config.missing_token,
                )?);
            }
            InputKind::Results => {
                eprintln!("Loading reference results from {:?}...", path);
                let set = DifferentialResultSet::from_csv(path, &config.schema, &config.missing_token)?;
                reference_rows.extend(set.results);
            }
        }
    }
    if raw_tables.is_empty() {
        return Err(QuantError::MissingOrigin("no raw measurement table supplied".to_string()));
    }
    if reference_rows.is_empty() {
        return Err(QuantError::MissingOrigin("no reference result table supplied".to_string()));
    }

    let table = MeasurementTable::concat(raw_tables)?;
    let computed = quantify(&table, args, &config)?.results;
    let reference = DifferentialResultSet::new(reference_rows);

    let rec = reconcile(computed, COMPUTED_ORIGIN, reference, REFERENCE_ORIGIN, sig)?;
    for report in &rec.stages {
        println!(
            "{:<12} {:>8} -> {:>8} rows ({} dropped)",
            report.stage.name(),
            report.rows_before,
            report.rows_after,
            report.dropped()
        );
        if report.stage == Stage::Log2Equal {
            for (origin, p) in &report.mean_p_values {
                println!("    mean p-value {:<16} {:.6}", origin, p);
            }
        }
    }

    for path in rec.write_stages(output, &config.schema)? {
        eprintln!("Wrote {:?}", path);
    }
    Ok(())
}

/// Write the default configuration
fn cmd_example(output: &Path) -> Result<()> {
    let yaml = QuantConfig::default().to_yaml()?;
    std::fs::write(output, yaml)?;
    eprintln!("Example configuration written to {:?}", output);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quant_args(argv: &[&str]) -> (PathBuf, QuantArgs) {
        match Cli::try_parse_from(argv).unwrap().command {
            Commands::Quantify { input, args, .. } => (input, args),
            _ => panic!("expected quantify"),
        }
    }

    #[test]
    fn test_impute_flag_takes_no_value() {
        let (input, args) = quant_args(&["xlq", "quantify", "-i", "data.csv"]);
        assert_eq!(input, PathBuf::from("data.csv"));
        assert!(args.impute);
        let config = load_config(&args).unwrap();
        assert_eq!(config.impute, Some(ImputeStrategy::ExperimentMinimum));
    }

    #[test]
    fn test_impute_strategy_implies_imputation() {
        let (_, args) = quant_args(&["xlq", "quantify", "data.csv", "--impute-strategy", "group_min"]);
        let config = load_config(&args).unwrap();
        assert_eq!(config.impute, Some(ImputeStrategy::GroupMinimum));

        let (_, args) = quant_args(&["xlq", "quantify", "data.csv"]);
        assert_eq!(load_config(&args).unwrap().impute, None);
    }
}
