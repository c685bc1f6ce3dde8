//! Data structures for cross-link quantification.

mod measurement;
mod result;
mod schema;
pub mod table;
mod whitelist;

pub use measurement::{experiments_in_order, LinkType, MeasurementRow, MeasurementTable, WeightType};
pub use result::{DifferentialResult, DifferentialResultSet, ExperimentMean, ResultSummary};
pub use schema::{IdLevel, Schema};
pub use table::{detect_input, InputKind};
pub use whitelist::Whitelist;
