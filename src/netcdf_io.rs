//! NetCDF reading and writing
//!
//! Reading picks up the `time`, `y` and `x` coordinates, every data variable
//! laid out as `(time, y, x)` (or `(time)` for files without a grid), global
//! attributes and the CF grid-mapping variable. Auxiliary variables (`lat`, `lon`, `time_bnds`, `yearday`) are
//! not carried over. Fill and missing values become `NaN` in memory and are
//! written back as `_FillValue`.

use crate::data_source::{DatasetReader, DatasetWriter, OutputFormat};
use crate::dataset::{
    AttrValue, Attributes, Coordinate, DataVariable, Dataset, Grid, GridMapping, TIME_DIM, X_DIM,
    Y_DIM,
};
use crate::errors::{DaymetError, Result};
use ndarray::{ArrayD, IxDyn};
use netcdf::{Attribute, AttributeValue, File, FileMut};
use std::{fs, path::Path};
use tracing::{debug, trace};

/// Reads Daymet NetCDF (v3 `.nc4` and v4 `.nc`) files
#[derive(Debug, Clone, Copy, Default)]
pub struct NetcdfReader;

impl NetcdfReader {
    pub fn new() -> Self {
        Self
    }
}

impl DatasetReader for NetcdfReader {
    fn read(&self, path: &Path) -> Result<Dataset> {
        let file = netcdf::open(path)?;

        let time = read_coordinate(&file, TIME_DIM, path)?;
        // aggregated files carry no spatial grid
        let grid = match (file.variable(Y_DIM), file.variable(X_DIM)) {
            (Some(_), Some(_)) => Some(Grid::new(
                read_coordinate(&file, Y_DIM, path)?,
                read_coordinate(&file, X_DIM, path)?,
            )),
            _ => None,
        };
        let layout: &[&str] = if grid.is_some() {
            &[TIME_DIM, Y_DIM, X_DIM]
        } else {
            &[TIME_DIM]
        };

        let mut dataset = Dataset::new(time, grid);
        dataset.attributes = read_attributes(file.attributes());
        let shape = dataset.expected_shape();
        let mut grid_mapping_name: Option<String> = None;

        for var in file.variables() {
            let name = var.name();
            let dims: Vec<String> = var
                .dimensions()
                .iter()
                .map(|d| d.name().to_string())
                .collect();
            if name == TIME_DIM || dims != layout {
                trace!("Skipping '{name}' with dimensions {dims:?} in {}", path.display());
                continue;
            }

            let mut attributes = read_attributes(var.attributes());
            // lat/lon are not carried over
            attributes.remove("coordinates");
            let fill_values: Vec<f32> = ["_FillValue", "missing_value"]
                .iter()
                .filter_map(|key| attributes.get(*key).and_then(AttrValue::as_f64))
                .map(|v| v as f32)
                .collect();

            let mut values = var.get_values::<f32, _>(..)?;
            if !fill_values.is_empty() {
                values
                    .iter_mut()
                    .filter(|v| fill_values.contains(&**v))
                    .for_each(|v| *v = f32::NAN);
            }

            if grid_mapping_name.is_none() {
                grid_mapping_name = attributes
                    .get("grid_mapping")
                    .and_then(AttrValue::as_str)
                    .map(str::to_string);
            }

            let data = ArrayD::from_shape_vec(IxDyn(&shape), values)?;
            dataset.insert_variable(
                &name,
                DataVariable {
                    dims,
                    data,
                    attributes,
                },
            )?;
        }

        if dataset.variables.is_empty() {
            return Err(DaymetError::Read {
                path: path.to_path_buf(),
                message: format!("no data variables over {layout:?}"),
            });
        }

        if let Some(name) = grid_mapping_name {
            match file.variable(&name) {
                Some(var) => {
                    dataset.grid_mapping = Some(GridMapping {
                        attributes: read_attributes(var.attributes()),
                        name,
                    })
                }
                None => debug!("Grid mapping variable '{name}' missing in {}", path.display()),
            }
        }

        debug!(
            "Read {} with {} time steps and variables {:?}",
            path.display(),
            dataset.time_len(),
            dataset.variable_names()
        );
        Ok(dataset)
    }
}

fn read_coordinate(file: &File, name: &str, path: &Path) -> Result<Coordinate> {
    let var = file.variable(name).ok_or_else(|| DaymetError::Read {
        path: path.to_path_buf(),
        message: format!("missing coordinate variable '{name}'"),
    })?;
    let mut attributes = read_attributes(var.attributes());
    attributes.remove("bounds");
    Ok(Coordinate {
        values: var.get_values::<f64, _>(..)?,
        attributes,
    })
}

fn read_attributes<'a>(attributes: impl Iterator<Item = Attribute<'a>>) -> Attributes {
    let mut result = Attributes::new();
    for attr in attributes {
        match attr.value() {
            Ok(value) => match from_netcdf_value(value) {
                Some(v) => {
                    result.insert(attr.name().to_string(), v);
                }
                None => debug!("Skipped unsupported attribute type for '{}'", attr.name()),
            },
            Err(e) => debug!("Cannot read attribute '{}': {e}", attr.name()),
        }
    }
    result
}

fn from_netcdf_value(value: AttributeValue) -> Option<AttrValue> {
    Some(match value {
        AttributeValue::Str(v) => AttrValue::Str(v),
        AttributeValue::Strs(v) => AttrValue::Strs(v),
        AttributeValue::Float(v) => AttrValue::Float(f64::from(v)),
        AttributeValue::Floats(v) => AttrValue::Floats(v.into_iter().map(f64::from).collect()),
        AttributeValue::Double(v) => AttrValue::Float(v),
        AttributeValue::Doubles(v) => AttrValue::Floats(v),
        AttributeValue::Schar(v) => AttrValue::Int(i64::from(v)),
        AttributeValue::Schars(v) => AttrValue::Ints(v.into_iter().map(i64::from).collect()),
        AttributeValue::Uchar(v) => AttrValue::Int(i64::from(v)),
        AttributeValue::Uchars(v) => AttrValue::Ints(v.into_iter().map(i64::from).collect()),
        AttributeValue::Short(v) => AttrValue::Int(i64::from(v)),
        AttributeValue::Shorts(v) => AttrValue::Ints(v.into_iter().map(i64::from).collect()),
        AttributeValue::Ushort(v) => AttrValue::Int(i64::from(v)),
        AttributeValue::Ushorts(v) => AttrValue::Ints(v.into_iter().map(i64::from).collect()),
        AttributeValue::Int(v) => AttrValue::Int(i64::from(v)),
        AttributeValue::Ints(v) => AttrValue::Ints(v.into_iter().map(i64::from).collect()),
        AttributeValue::Uint(v) => AttrValue::Int(i64::from(v)),
        AttributeValue::Uints(v) => AttrValue::Ints(v.into_iter().map(i64::from).collect()),
        AttributeValue::Longlong(v) => AttrValue::Int(v),
        AttributeValue::Longlongs(v) => AttrValue::Ints(v),
        #[allow(unreachable_patterns)]
        _ => return None,
    })
}

fn to_netcdf_value(value: &AttrValue) -> AttributeValue {
    match value {
        AttrValue::Str(v) => AttributeValue::Str(v.clone()),
        AttrValue::Strs(v) => AttributeValue::Strs(v.clone()),
        AttrValue::Float(v) => AttributeValue::Double(*v),
        AttrValue::Floats(v) => AttributeValue::Doubles(v.clone()),
        AttrValue::Int(v) => match i32::try_from(*v) {
            Ok(small) => AttributeValue::Int(small),
            Err(_) => AttributeValue::Longlong(*v),
        },
        AttrValue::Ints(v) => match v.iter().map(|&i| i32::try_from(i)).collect() {
            Ok(small) => AttributeValue::Ints(small),
            Err(_) => AttributeValue::Longlongs(v.clone()),
        },
    }
}

/// Writes datasets as NetCDF-4 files
#[derive(Debug, Clone, Copy, Default)]
pub struct NetcdfWriter;

impl NetcdfWriter {
    pub fn new() -> Self {
        Self
    }

    fn write_dataset(&self, dataset: &Dataset, output_path: &Path) -> Result<()> {
        if output_path.exists() {
            fs::remove_file(output_path)?;
        }

        let mut file = netcdf::create(output_path)?;

        file.add_dimension(TIME_DIM, dataset.time_len())?;
        if let Some(grid) = &dataset.grid {
            file.add_dimension(Y_DIM, grid.y.len())?;
            file.add_dimension(X_DIM, grid.x.len())?;
        }

        write_coordinate(&mut file, TIME_DIM, &dataset.time)?;
        if let Some(grid) = &dataset.grid {
            write_coordinate(&mut file, Y_DIM, &grid.y)?;
            write_coordinate(&mut file, X_DIM, &grid.x)?;
        }

        if let Some(mapping) = &dataset.grid_mapping {
            let mut var = file.add_variable::<i32>(&mapping.name, &[])?;
            for (name, value) in &mapping.attributes {
                var.put_attribute(name, to_netcdf_value(value))?;
            }
        }

        for (name, variable) in &dataset.variables {
            let dim_refs: Vec<&str> = variable.dims.iter().map(String::as_str).collect();
            let mut new_var = file.add_variable::<f32>(name, &dim_refs)?;

            // _FillValue has to exist before any data is written
            let fill_value = variable
                .attributes
                .get("_FillValue")
                .and_then(AttrValue::as_f64)
                .map_or(f32::NAN, |v| v as f32);
            new_var.put_attribute("_FillValue", fill_value)?;

            for (attr_name, value) in variable.attributes.iter().filter(|(k, _)| *k != "_FillValue") {
                new_var.put_attribute(attr_name, to_netcdf_value(value))?;
            }

            let values: Vec<f32> = variable
                .data
                .iter()
                .map(|&v| if v.is_nan() { fill_value } else { v })
                .collect();
            new_var.put_values(values.as_slice(), ..)?;
        }

        for (name, value) in &dataset.attributes {
            file.add_attribute(name, to_netcdf_value(value))?;
        }

        Ok(())
    }
}

fn write_coordinate(file: &mut FileMut, name: &str, coordinate: &Coordinate) -> Result<()> {
    let mut var = file.add_variable::<f64>(name, &[name])?;
    for (attr_name, value) in &coordinate.attributes {
        var.put_attribute(attr_name, to_netcdf_value(value))?;
    }
    var.put_values(coordinate.values.as_slice(), ..)?;
    Ok(())
}

impl DatasetWriter for NetcdfWriter {
    fn format(&self) -> OutputFormat {
        OutputFormat::Netcdf
    }

    fn write(&self, dataset: &Dataset, path: &Path) -> Result<()> {
        self.write_dataset(dataset, path).map_err(|e| match e {
            DaymetError::Write { .. } => e,
            other => DaymetError::Write {
                path: path.to_path_buf(),
                message: other.to_string(),
            },
        })
    }
}
