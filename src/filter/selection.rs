//! Row selection applied to measurement tables before aggregation.

use crate::data::{LinkType, MeasurementRow, MeasurementTable, Whitelist};
use crate::error::{QuantError, Result};
use std::collections::BTreeSet;

fn retain<F>(table: &MeasurementTable, what: &str, keep: F) -> Result<MeasurementTable>
where
    F: Fn(&MeasurementRow) -> bool,
{
    let rows: Vec<MeasurementRow> = table.rows().iter().filter(|r| keep(r)).cloned().collect();
    if rows.is_empty() {
        return Err(QuantError::EmptyData(format!("No measurements pass the {} filter", what)));
    }
    tracing::info!(filter = what, kept = rows.len(), dropped = table.len() - rows.len(), "filtered measurements");
    Ok(MeasurementTable::new(table.level(), rows))
}

/// Keep rows of the given link type.
///
/// Fails if no row carries a link type annotation at all, since the filter
/// cannot be evaluated on such a table.
pub fn filter_link_type(table: &MeasurementTable, link_type: LinkType) -> Result<MeasurementTable> {
    if table.rows().iter().all(|r| r.link_type.is_none()) {
        return Err(QuantError::InvalidParameter(format!(
            "Cannot filter for {}: table has no link type annotation",
            link_type.name()
        )));
    }
    retain(table, link_type.name(), |r| r.link_type == Some(link_type))
}

/// Keep rows of the selected experiments. The reference experiment is kept
/// even if it is not part of `experiments`.
pub fn filter_experiments(table: &MeasurementTable, experiments: &[String], reference: &str) -> Result<MeasurementTable> {
    let present: BTreeSet<String> = table.experiments().into_iter().collect();
    for name in experiments.iter().filter(|e| !present.contains(*e)) {
        tracing::warn!(experiment = %name, "selected experiment not present in data");
    }

    let mut keep: BTreeSet<&str> = experiments.iter().map(String::as_str).collect();
    keep.insert(reference);
    retain(table, "experiment", |r| keep.contains(r.experiment.as_str()))
}

/// Keep rows whose identifier is whitelisted.
pub fn filter_whitelist(table: &MeasurementTable, whitelist: &Whitelist) -> Result<MeasurementTable> {
    retain(table, "whitelist", |r| whitelist.contains(&r.identifier))
}
