//! Spatial aggregation of region datasets
//!
//! # Organization
//!
//! - [`operations`]: the [`AggregationMode`] enum and the reduction trait
//! - [`parallel`]: Rayon-backed per-timestep reductions

pub mod operations;
pub mod parallel;

pub use operations::{AggregationMode, SpatialReduction};
pub use parallel::{nan_mean, parallel_spatial_reduce};

use crate::dataset::{AttrValue, DataVariable, Dataset, TIME_DIM};
use crate::errors::{DaymetError, Result};
use tracing::debug;

/// Collapse `y` and `x` of every data variable into one value per timestep
///
/// The result keeps the time coordinate, global attributes and variable
/// attributes; the grid and its grid mapping are dropped. Each variable's
/// `cell_methods` gains a `y: x: <method>` entry.
pub fn aggregate(dataset: &Dataset, mode: AggregationMode) -> Result<Dataset> {
    if dataset.grid.is_none() {
        return Err(DaymetError::StatisticsError(
            "dataset has no spatial grid to aggregate over".to_string(),
        ));
    }

    let mut result = Dataset::new(dataset.time.clone(), None);
    result.attributes = dataset.attributes.clone();

    for (name, variable) in &dataset.variables {
        let reduced = variable.data.reduce_spatial(mode)?;

        let mut attributes = variable.attributes.clone();
        attributes.remove("grid_mapping");
        let method = format!("y: x: {}", mode.cell_method());
        let cell_methods = match attributes.get("cell_methods").and_then(AttrValue::as_str) {
            Some(existing) => format!("{existing} {method}"),
            None => method,
        };
        attributes.insert("cell_methods".to_string(), AttrValue::from(cell_methods));

        let mut aggregated = DataVariable::new(&[TIME_DIM], reduced.into_dyn());
        aggregated.attributes = attributes;
        result.insert_variable(name, aggregated)?;

        debug!("Aggregated '{name}' with {mode}");
    }

    Ok(result)
}
