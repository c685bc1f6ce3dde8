//! Pipeline composition and execution for cross-link quantification.

mod config;
mod runner;

pub use config::QuantConfig;
pub use runner::{run_quantification, Pipeline, PipelineReport, PipelineStep, Quantification};
