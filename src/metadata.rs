//! Dataset inspection: summaries of combined datasets and sanity logging

use crate::dataset::Dataset;
use crate::region::RegionId;
use crate::statistics::nan_mean;
use tracing::{info, warn};

/// Quick statistics of one data variable
#[derive(Debug, Clone, PartialEq)]
pub struct VariableSummary {
    pub name: String,
    pub shape: Vec<usize>,
    pub valid_count: usize,
    pub min: f32,
    pub mean: f32,
    pub max: f32,
}

/// Shape and time extent of a dataset
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetSummary {
    pub time_steps: usize,
    pub grid_shape: Option<(usize, usize)>,
    pub time_range: Option<(String, String)>,
    pub variables: Vec<VariableSummary>,
}

impl DatasetSummary {
    pub fn of(dataset: &Dataset) -> Self {
        let variables = dataset
            .variables
            .iter()
            .map(|(name, var)| {
                let finite = || var.data.iter().copied().filter(|v| v.is_finite());
                VariableSummary {
                    name: name.clone(),
                    shape: var.data.shape().to_vec(),
                    valid_count: var.valid_count(),
                    min: finite().reduce(f32::min).unwrap_or(f32::NAN),
                    mean: nan_mean(var.data.view()),
                    max: finite().reduce(f32::max).unwrap_or(f32::NAN),
                }
            })
            .collect();

        Self {
            time_steps: dataset.time_len(),
            grid_shape: dataset.grid.as_ref().map(|g| g.shape()),
            time_range: dataset.time_range(),
            variables,
        }
    }

    /// Print in the same layout as the run report
    pub fn print(&self) {
        println!("\n===== Dataset =====");
        println!("- time steps: {}", self.time_steps);
        if let Some((ny, nx)) = self.grid_shape {
            println!("- grid: {ny} x {nx}");
        }
        if let Some((first, last)) = &self.time_range {
            println!("- time range: {first} .. {last}");
        }
        println!("\n===== Variables =====");
        for var in &self.variables {
            println!(
                "- {} {:?}: {} valid, min {} / mean {:.2} / max {}",
                var.name, var.shape, var.valid_count, var.min, var.mean, var.max
            );
        }
    }
}

/// Log the time range of a region's dataset and warn about expected
/// variables that did not make it into the dataset
pub fn log_metadata(region: &RegionId, dataset: &Dataset, expected_variables: &[String]) {
    for variable in expected_variables {
        if !dataset.variables.contains_key(variable) {
            warn!(region = %region, "Variable '{variable}' is missing from the combined dataset");
        }
    }

    match dataset.time_range() {
        Some((first, last)) => info!(
            region = %region,
            "Combined {} variable(s) over {} time steps, {first} .. {last}",
            dataset.variables.len(),
            dataset.time_len()
        ),
        None => warn!(region = %region, "Combined dataset has an empty time axis"),
    }

    for (name, var) in &dataset.variables {
        let total = var.data.len();
        let valid = var.valid_count();
        if total > 0 && valid == 0 {
            warn!(region = %region, "Variable '{name}' holds no valid values");
        }
    }
}
