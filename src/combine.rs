//! Combining the files of one region into a single dataset
//!
//! Yearly files of a variable are concatenated along `time`, ordered by the
//! period in their name with the file name as tie breaker. Variables are then
//! merged with an outer join on time: a timestep one variable lacks is filled
//! with `NaN` for it. When the same timestamp appears more than once for a
//! variable, the first occurrence in file order wins.

use crate::data_source::DatasetReader;
use crate::dataset::{Coordinate, DataVariable, Dataset, TimeUnits};
use crate::errors::{DaymetError, Result};
use crate::locator::{FileDescriptor, RegionFiles};
use crate::region::RegionId;
use ndarray::{ArrayD, Axis, IxDyn};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{debug, trace};

/// Resolution of time keys, in units of the reference time axis
const TIME_KEY_SCALE: f64 = 1_000_000.0;

/// A dataset loaded from one input file, labelled for error messages
#[derive(Debug, Clone)]
pub struct LoadedInput {
    pub label: String,
    pub dataset: Dataset,
}

/// Read and combine all files of a region
pub fn combine_region(
    region: &RegionId,
    files: &RegionFiles,
    reader: &dyn DatasetReader,
) -> Result<Dataset> {
    let mut inputs = Vec::new();
    for descriptors in files.values() {
        for descriptor in ordered(descriptors) {
            trace!(region = %region, "Reading {}", descriptor.path.display());
            inputs.push(LoadedInput {
                label: descriptor.file_name(),
                dataset: reader.read(&descriptor.path)?,
            });
        }
    }
    combine_datasets(region, inputs)
}

/// Files of one variable in concatenation order
fn ordered(descriptors: &[FileDescriptor]) -> Vec<&FileDescriptor> {
    let mut sorted: Vec<&FileDescriptor> = descriptors.iter().collect();
    sorted.sort_by(|a, b| {
        a.period
            .cmp(&b.period)
            .then_with(|| a.file_name().cmp(&b.file_name()))
    });
    sorted
}

/// Where the values of one timestep of one variable come from
#[derive(Debug, Clone, Copy)]
struct Source {
    input: usize,
    step: usize,
}

/// Combine already loaded inputs, given in file order
pub fn combine_datasets(region: &RegionId, inputs: Vec<LoadedInput>) -> Result<Dataset> {
    let Some(first) = inputs.first() else {
        return Err(DaymetError::NoFiles {
            region: region.to_string(),
            dir: PathBuf::new(),
        });
    };

    let reference_grid = first.dataset.grid.clone();
    let reference_units = first.dataset.time_units();
    let time_attributes = first.dataset.time.attributes.clone();

    // every input's time values expressed in the first input's units
    let mut times: Vec<Vec<f64>> = Vec::with_capacity(inputs.len());
    for input in &inputs {
        match (&reference_grid, &input.dataset.grid) {
            (Some(expected), Some(actual)) => {
                expected
                    .check_matches(actual)
                    .map_err(|detail| DaymetError::GridMismatch {
                        region: region.to_string(),
                        detail: format!("{}: {detail}", input.label),
                    })?;
            }
            (None, None) => {}
            _ => {
                return Err(DaymetError::GridMismatch {
                    region: region.to_string(),
                    detail: format!("{}: spatial grid present in only some inputs", input.label),
                })
            }
        }
        times.push(rebase_times(
            &input.dataset.time,
            input.dataset.time_units().as_ref(),
            reference_units.as_ref(),
        ));
    }

    let mut axis: BTreeMap<i64, f64> = BTreeMap::new();
    let mut sources: BTreeMap<String, BTreeMap<i64, Source>> = BTreeMap::new();
    let mut template: BTreeMap<String, usize> = BTreeMap::new();

    for (index, input) in inputs.iter().enumerate() {
        for name in input.dataset.variables.keys() {
            template.entry(name.clone()).or_insert(index);
            let by_time = sources.entry(name.clone()).or_default();
            let mut duplicates = 0usize;
            for (step, &value) in times[index].iter().enumerate() {
                let key = time_key(value);
                axis.entry(key).or_insert(value);
                if by_time.contains_key(&key) {
                    duplicates += 1;
                } else {
                    by_time.insert(key, Source { input: index, step });
                }
            }
            if duplicates > 0 {
                debug!(
                    region = %region,
                    "{}: kept first occurrence of {duplicates} duplicate timestamp(s) of '{name}'",
                    input.label
                );
            }
        }
    }

    let position: BTreeMap<i64, usize> = axis.keys().enumerate().map(|(i, &k)| (k, i)).collect();
    let mut time = Coordinate::new(axis.values().copied().collect());
    time.attributes = time_attributes;

    let mut combined = Dataset::new(time, reference_grid);
    combined.attributes = first.dataset.attributes.clone();
    combined.grid_mapping = inputs
        .iter()
        .find_map(|input| input.dataset.grid_mapping.clone());

    let shape = combined.expected_shape();
    for (name, by_time) in &sources {
        let origin = &inputs[template[name]].dataset.variables[name];
        let mut data = ArrayD::from_elem(IxDyn(&shape), f32::NAN);
        for (key, source) in by_time {
            let values = &inputs[source.input].dataset.variables[name].data;
            data.index_axis_mut(Axis(0), position[key])
                .assign(&values.index_axis(Axis(0), source.step));
        }

        combined.insert_variable(
            name,
            DataVariable {
                dims: origin.dims.clone(),
                data,
                attributes: origin.attributes.clone(),
            },
        )?;

        if let (Some(first_key), Some(last_key)) = (by_time.keys().next(), by_time.keys().next_back()) {
            debug!(
                region = %region,
                "'{name}': {} time steps from {} to {}",
                by_time.len(),
                format_time(axis[first_key], reference_units.as_ref()),
                format_time(axis[last_key], reference_units.as_ref())
            );
        }
    }

    Ok(combined)
}

fn rebase_times(time: &Coordinate, own: Option<&TimeUnits>, reference: Option<&TimeUnits>) -> Vec<f64> {
    match (own, reference) {
        (Some(own), Some(reference)) if own != reference => time
            .values
            .iter()
            .map(|&v| reference.from_unix_seconds(own.to_unix_seconds(v)))
            .collect(),
        _ => time.values.clone(),
    }
}

fn time_key(value: f64) -> i64 {
    #[allow(clippy::cast_possible_truncation)]
    {
        (value * TIME_KEY_SCALE).round() as i64
    }
}

fn format_time(value: f64, units: Option<&TimeUnits>) -> String {
    units.map_or_else(|| value.to_string(), |u| u.format(value))
}
