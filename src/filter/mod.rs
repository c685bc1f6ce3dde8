//! Filtering of measurements before quantification and of results after it.

pub mod selection;
pub mod violation;

pub use selection::{filter_experiments, filter_link_type, filter_whitelist};
pub use violation::{
    filter_violations, light_heavy_violations, pipeline_type_violations, ViolationIndex, ViolationMode,
    ViolationReport, DEFAULT_LIGHT_HEAVY_THRESHOLD,
};
